//! Accumulated output of one inspection pass.

use std::collections::BTreeMap;

use super::model::{Catalog, Database, MetaDataType, QualifiedName, Schema, Sequence, Table};
use crate::core::identifier::Identifier;
use crate::core::session::DatabaseInfo;

/// Identity of a discovered object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub object_type: MetaDataType,
    pub catalog: Option<Identifier>,
    pub schema: Option<Identifier>,
    /// Owning table for table-level objects.
    pub table: Option<Identifier>,
    pub name: Option<Identifier>,
}

impl ObjectRef {
    pub fn new(object_type: MetaDataType) -> Self {
        Self {
            object_type,
            catalog: None,
            schema: None,
            table: None,
            name: None,
        }
    }

    /// Reference to an object owned by `table`.
    pub fn in_table(object_type: MetaDataType, table: &QualifiedName, name: Option<Identifier>) -> Self {
        Self {
            object_type,
            catalog: table.catalog.clone(),
            schema: table.schema.clone(),
            table: Some(table.name.clone()),
            name,
        }
    }
}

/// Object tree plus a per-kind index of everything added to it.
///
/// `add_catalog`, `add_schema`, `add_table` and `add_sequence` are
/// get-or-create: they materialize missing ancestors, register each newly
/// created node exactly once and return the existing node on repeat calls.
#[derive(Debug, Default)]
pub struct InspectionResults {
    database: Option<Database>,
    objects: BTreeMap<MetaDataType, Vec<ObjectRef>>,
}

fn name_of(name: Option<&str>) -> Option<Identifier> {
    Identifier::from_option(name)
}

impl InspectionResults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a discovered object.
    pub fn add_object(&mut self, object: ObjectRef) {
        self.objects
            .entry(object.object_type)
            .or_default()
            .push(object);
    }

    pub fn objects(&self, object_type: MetaDataType) -> &[ObjectRef] {
        self.objects
            .get(&object_type)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn database(&self) -> Option<&Database> {
        self.database.as_ref()
    }

    pub fn into_database(self) -> Option<Database> {
        self.database
    }

    pub fn add_database(&mut self) -> &mut Database {
        if self.database.is_none() {
            self.add_object(ObjectRef::new(MetaDataType::Database));
        }
        self.database.get_or_insert_with(Database::default)
    }

    /// Set the product info of the (possibly new) database node.
    pub fn set_database_info(&mut self, info: DatabaseInfo) {
        self.add_database().info = info;
    }

    fn catalog_index(&mut self, catalog: Option<&str>) -> usize {
        let name = name_of(catalog);
        let database = self.add_database();
        if let Some(i) = database.catalogs.iter().position(|c| c.name == name) {
            return i;
        }
        database.catalogs.push(Catalog {
            name: name.clone(),
            schemas: Vec::new(),
        });
        let index = database.catalogs.len() - 1;
        self.add_object(ObjectRef {
            catalog: name,
            ..ObjectRef::new(MetaDataType::Catalog)
        });
        index
    }

    fn schema_index(&mut self, catalog: Option<&str>, schema: Option<&str>) -> (usize, usize) {
        let ci = self.catalog_index(catalog);
        let name = name_of(schema);
        let catalog_node = &mut self.add_database().catalogs[ci];
        if let Some(si) = catalog_node.schemas.iter().position(|s| s.name == name) {
            return (ci, si);
        }
        let catalog_name = catalog_node.name.clone();
        catalog_node.schemas.push(Schema {
            catalog: catalog_name.clone(),
            name: name.clone(),
            tables: Vec::new(),
            sequences: Vec::new(),
        });
        let si = catalog_node.schemas.len() - 1;
        self.add_object(ObjectRef {
            catalog: catalog_name,
            schema: name,
            ..ObjectRef::new(MetaDataType::Schema)
        });
        (ci, si)
    }

    fn schema_at(&mut self, (ci, si): (usize, usize)) -> &mut Schema {
        &mut self.add_database().catalogs[ci].schemas[si]
    }

    pub fn add_catalog(&mut self, catalog: Option<&str>) -> &mut Catalog {
        let ci = self.catalog_index(catalog);
        &mut self.add_database().catalogs[ci]
    }

    pub fn add_schema(&mut self, catalog: Option<&str>, schema: Option<&str>) -> &mut Schema {
        let at = self.schema_index(catalog, schema);
        self.schema_at(at)
    }

    pub fn add_table(&mut self, catalog: Option<&str>, schema: Option<&str>, table: &str) -> &mut Table {
        let at = self.schema_index(catalog, schema);
        let name = Identifier::new(table);
        let schema_node = self.schema_at(at);
        let ti = match schema_node.tables.iter().position(|t| t.name == name) {
            Some(ti) => ti,
            None => {
                let created = Table::new(schema_node.catalog.clone(), schema_node.name.clone(), name);
                let object = ObjectRef {
                    catalog: created.catalog.clone(),
                    schema: created.schema.clone(),
                    name: Some(created.name.clone()),
                    ..ObjectRef::new(MetaDataType::Table)
                };
                schema_node.tables.push(created);
                let ti = schema_node.tables.len() - 1;
                self.add_object(object);
                ti
            }
        };
        &mut self.schema_at(at).tables[ti]
    }

    pub fn add_sequence(&mut self, catalog: Option<&str>, schema: Option<&str>, sequence: &str) -> &mut Sequence {
        let at = self.schema_index(catalog, schema);
        let name = Identifier::new(sequence);
        let schema_node = self.schema_at(at);
        let qi = match schema_node.sequences.iter().position(|s| s.name == name) {
            Some(qi) => qi,
            None => {
                let created = Sequence::new(schema_node.catalog.clone(), schema_node.name.clone(), name);
                let object = ObjectRef {
                    catalog: created.catalog.clone(),
                    schema: created.schema.clone(),
                    name: Some(created.name.clone()),
                    ..ObjectRef::new(MetaDataType::Sequence)
                };
                schema_node.sequences.push(created);
                let qi = schema_node.sequences.len() - 1;
                self.add_object(object);
                qi
            }
        };
        &mut self.schema_at(at).sequences[qi]
    }

    /// Existing table lookup; never creates.
    pub fn table_mut(&mut self, name: &QualifiedName) -> Option<&mut Table> {
        let database = self.database.as_mut()?;
        database
            .catalogs
            .iter_mut()
            .filter(|c| name.catalog.is_none() || c.name == name.catalog)
            .flat_map(|c| c.schemas.iter_mut())
            .filter(|s| name.schema.is_none() || s.name == name.schema)
            .flat_map(|s| s.tables.iter_mut())
            .find(|t| t.name == name.name)
    }

    /// Detach a sequence from its schema, dropping its object entry.
    /// A `None` catalog or schema matches any.
    pub fn take_sequence(&mut self, name: &QualifiedName) -> Option<Sequence> {
        let database = self.database.as_mut()?;
        let sequence = database
            .catalogs
            .iter_mut()
            .filter(|c| name.catalog.is_none() || c.name == name.catalog)
            .flat_map(|c| c.schemas.iter_mut())
            .filter(|s| name.schema.is_none() || s.name == name.schema)
            .find_map(|s| {
                let at = s.sequences.iter().position(|q| q.name == name.name)?;
                Some(s.sequences.remove(at))
            })?;
        if let Some(objects) = self.objects.get_mut(&MetaDataType::Sequence) {
            objects.retain(|o| {
                !(o.name.as_ref() == Some(&sequence.name)
                    && o.schema == sequence.schema
                    && o.catalog == sequence.catalog)
            });
        }
        Some(sequence)
    }

    /// Qualified names of every table discovered so far.
    pub fn table_names(&self) -> Vec<QualifiedName> {
        self.database
            .iter()
            .flat_map(|d| d.tables())
            .map(Table::qualified_name)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count(results: &InspectionResults, t: MetaDataType) -> usize {
        results.objects(t).len()
    }

    #[test]
    fn test_add_catalog_registers_database_once() {
        let mut results = InspectionResults::new();
        results.add_catalog(Some("catalog"));
        results.add_catalog(Some("other"));
        assert_eq!(count(&results, MetaDataType::Database), 1);
        assert_eq!(count(&results, MetaDataType::Catalog), 2);
    }

    #[test]
    fn test_add_schema_materializes_ancestors() {
        let mut results = InspectionResults::new();
        let schema = results.add_schema(Some("catalog"), Some("schema"));
        assert_eq!(schema.catalog.as_ref().map(Identifier::value), Some("catalog"));
        assert_eq!(count(&results, MetaDataType::Database), 1);
        assert_eq!(count(&results, MetaDataType::Catalog), 1);
        assert_eq!(count(&results, MetaDataType::Schema), 1);
    }

    #[test]
    fn test_add_table_is_idempotent() {
        let mut results = InspectionResults::new();
        results
            .add_table(Some("catalog"), Some("schema"), "table")
            .comment = Some("first".to_string());
        let again = results.add_table(Some("catalog"), Some("schema"), "TABLE");
        assert_eq!(again.comment.as_deref(), Some("first"));
        assert_eq!(again.schema.as_ref().map(Identifier::value), Some("schema"));

        for t in [
            MetaDataType::Database,
            MetaDataType::Catalog,
            MetaDataType::Schema,
            MetaDataType::Table,
        ] {
            assert_eq!(count(&results, t), 1, "{t}");
        }
        let database = results.database().unwrap();
        assert_eq!(database.tables().count(), 1);
    }

    #[test]
    fn test_existing_ancestors_not_registered_again() {
        let mut results = InspectionResults::new();
        results.add_schema(None, Some("public"));
        results.add_table(None, Some("public"), "a");
        results.add_table(None, Some("public"), "b");
        results.add_sequence(None, Some("public"), "a_seq");
        assert_eq!(count(&results, MetaDataType::Schema), 1);
        assert_eq!(count(&results, MetaDataType::Table), 2);
        assert_eq!(count(&results, MetaDataType::Sequence), 1);
        assert_eq!(results.table_names().len(), 2);
    }

    #[test]
    fn test_table_mut_does_not_create() {
        let mut results = InspectionResults::new();
        results.add_table(None, Some("public"), "a");
        assert!(results
            .table_mut(&QualifiedName::new(None, None, "A"))
            .is_some());
        assert!(results
            .table_mut(&QualifiedName::new(None, Some("other"), "a"))
            .is_none());
        assert_eq!(count(&results, MetaDataType::Schema), 1);
    }
}
