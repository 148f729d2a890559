//! Oracle inspectors over the `ALL_*` dictionary views. Oracle schemas are
//! users, so the owner column stands in for the schema.

use super::rows;
use super::{InspectionScope, Inspector, InspectorResolver, QueryInspector, ScopedQuery};
use crate::dialect::products::ORACLE;
use crate::metadata::MetaDataType;

fn check_query(scope: &InspectionScope) -> ScopedQuery {
    ScopedQuery::new(
        "SELECT NULL AS TABLE_CATALOG, OWNER AS TABLE_SCHEMA, TABLE_NAME, \
         CONSTRAINT_NAME, SEARCH_CONDITION_VC AS CHECK_CLAUSE FROM ALL_CONSTRAINTS",
    )
    .and("CONSTRAINT_TYPE = 'C'")
    .and("GENERATED = 'USER NAME'")
    .and_like("OWNER", scope.schema.as_deref())
    .and_like("TABLE_NAME", scope.table.as_deref())
    .order_by("OWNER, TABLE_NAME, CONSTRAINT_NAME")
}

fn sequence_query(scope: &InspectionScope) -> ScopedQuery {
    ScopedQuery::new(
        "SELECT NULL AS SEQUENCE_CATALOG, SEQUENCE_OWNER AS SEQUENCE_SCHEMA, SEQUENCE_NAME, \
         MIN_VALUE AS START_VALUE, MIN_VALUE AS MINIMUM_VALUE, MAX_VALUE AS MAXIMUM_VALUE, \
         INCREMENT_BY AS INCREMENT, CYCLE_FLAG AS CYCLE_OPTION, ORDER_FLAG, \
         CACHE_SIZE, LAST_NUMBER AS LAST_VALUE FROM ALL_SEQUENCES",
    )
    .and_like("SEQUENCE_OWNER", scope.schema.as_deref())
    .order_by("SEQUENCE_OWNER, SEQUENCE_NAME")
}

pub(super) fn register(resolver: InspectorResolver) -> InspectorResolver {
    let inspector = match resolver.object_type() {
        MetaDataType::Check => QueryInspector::new(MetaDataType::Check, check_query, |results, rows, _| {
            rows::process_checks(results, rows)
        }),
        MetaDataType::Sequence => QueryInspector::new(MetaDataType::Sequence, sequence_query, |results, rows, _| {
            rows::process_sequences(results, rows)
        }),
        _ => return resolver,
    };
    resolver.with_product(ORACLE, inspector)
}
