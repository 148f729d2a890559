//! Target type names keyed by JDBC type code.
//!
//! Each dialect owns a [`TypeNameMap`]: an ordered list of [`TypeRule`]s.
//! The first rule whose code, optional type name and optional size ceiling
//! match the column wins. Templates may reference `{N}` (size), `{P}`
//! (precision) and `{S}` (scale); a parenthesized group whose placeholder has
//! no value is dropped, so `VARCHAR({N})` renders as `VARCHAR` for an
//! unsized column.

use crate::core::types::type_codes::OTHER;
use crate::metadata::Column;

/// One mapping from a JDBC type to a target type template.
#[derive(Debug, Clone, Copy)]
pub struct TypeRule {
    pub code: i32,
    /// Source type name that must match exactly (upper case).
    pub type_name: Option<&'static str>,
    /// Largest size this rule accepts; such rules never match unsized columns.
    pub max_size: Option<i64>,
    pub template: &'static str,
}

impl TypeRule {
    pub const fn code(code: i32, template: &'static str) -> Self {
        Self {
            code,
            type_name: None,
            max_size: None,
            template,
        }
    }

    pub const fn named(code: i32, type_name: &'static str, template: &'static str) -> Self {
        Self {
            code,
            type_name: Some(type_name),
            max_size: None,
            template,
        }
    }

    pub const fn up_to(code: i32, max_size: i64, template: &'static str) -> Self {
        Self {
            code,
            type_name: None,
            max_size: Some(max_size),
            template,
        }
    }

    fn matches(&self, column: &Column) -> bool {
        if self.code != column.type_desc.type_code {
            return false;
        }
        if let Some(name) = self.type_name {
            match column.type_desc.type_name.as_deref() {
                Some(actual) if actual.eq_ignore_ascii_case(name) => {}
                _ => return false,
            }
        }
        match (self.max_size, column.size) {
            (Some(max), Some(size)) => size <= max,
            (Some(_), None) => false,
            (None, _) => true,
        }
    }
}

/// Ordered type rules of one dialect.
#[derive(Debug, Clone)]
pub struct TypeNameMap {
    rules: Vec<TypeRule>,
}

impl TypeNameMap {
    pub fn new(rules: &[TypeRule]) -> Self {
        Self {
            rules: rules.to_vec(),
        }
    }

    /// Render the target type of `column`.
    ///
    /// Vendor types reported as `OTHER` without a rule keep their source
    /// type name; other unmapped codes yield `None`.
    pub fn type_name(&self, column: &Column) -> Option<String> {
        if let Some(rule) = self.rules.iter().find(|r| r.matches(column)) {
            return Some(render(rule.template, column));
        }
        if column.type_desc.type_code == OTHER {
            return column.type_desc.type_name.clone();
        }
        None
    }
}

fn placeholder_value(key: char, column: &Column) -> Option<String> {
    match key {
        'N' => column.size.filter(|s| *s > 0).map(|s| s.to_string()),
        'P' => column.precision.filter(|p| *p > 0).map(|p| p.to_string()),
        'S' => column
            .precision
            .filter(|p| *p > 0)
            .map(|_| column.scale.unwrap_or(0).max(0).to_string()),
        _ => None,
    }
}

/// Expand `{N}`, `{P}` and `{S}` in `template`.
fn render(template: &str, column: &Column) -> String {
    let mut out = String::with_capacity(template.len() + 8);
    let mut rest = template;
    while let Some(open) = rest.find('(') {
        let Some(close) = rest[open..].find(')').map(|c| open + c) else {
            break;
        };
        out.push_str(&rest[..open]);
        let group = &rest[open..=close];
        if let Some(expanded) = expand_group(group, column) {
            out.push_str(&expanded);
        }
        rest = &rest[close + 1..];
    }
    out.push_str(rest);
    out
}

/// Expand one parenthesized group; `None` when a placeholder has no value.
fn expand_group(group: &str, column: &Column) -> Option<String> {
    let mut out = String::with_capacity(group.len());
    let mut chars = group.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '{' {
            let key = chars.next()?;
            if chars.next() != Some('}') {
                return None;
            }
            out.push_str(&placeholder_value(key, column)?);
        } else {
            out.push(c);
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::identifier::Identifier;
    use crate::core::types::{type_codes::*, JdbcTypeDesc};

    fn column(desc: JdbcTypeDesc, size: Option<i64>, precision: Option<i32>, scale: Option<i32>) -> Column {
        let mut column = Column::new(Identifier::new("c"), 1);
        column.type_desc = desc;
        column.size = size;
        column.precision = precision;
        column.scale = scale;
        column
    }

    fn map() -> TypeNameMap {
        TypeNameMap::new(&[
            TypeRule::up_to(VARCHAR, 8000, "VARCHAR({N})"),
            TypeRule::code(VARCHAR, "VARCHAR(MAX)"),
            TypeRule::code(CHAR, "CHAR({N})"),
            TypeRule::code(DECIMAL, "DECIMAL({P},{S})"),
            TypeRule::named(OTHER, "UUID", "UNIQUEIDENTIFIER"),
        ])
    }

    #[test]
    fn test_size_substitution_and_ceiling() {
        let map = map();
        let small = column(JdbcTypeDesc::code(VARCHAR), Some(20), None, None);
        assert_eq!(map.type_name(&small).as_deref(), Some("VARCHAR(20)"));
        let large = column(JdbcTypeDesc::code(VARCHAR), Some(10_000), None, None);
        assert_eq!(map.type_name(&large).as_deref(), Some("VARCHAR(MAX)"));
    }

    #[test]
    fn test_missing_placeholder_drops_group() {
        let map = map();
        let r#unsized = column(JdbcTypeDesc::code(VARCHAR), None, None, None);
        assert_eq!(map.type_name(&r#unsized).as_deref(), Some("VARCHAR(MAX)"));
        let r#unsized = column(JdbcTypeDesc::code(CHAR), None, None, None);
        assert_eq!(map.type_name(&r#unsized).as_deref(), Some("CHAR"));
        let decimal = column(JdbcTypeDesc::code(DECIMAL), None, None, None);
        assert_eq!(map.type_name(&decimal).as_deref(), Some("DECIMAL"));
        let scaled = column(JdbcTypeDesc::code(DECIMAL), None, Some(12), None);
        assert_eq!(map.type_name(&scaled).as_deref(), Some("DECIMAL(12,0)"));
    }

    #[test]
    fn test_named_rule_and_other_passthrough() {
        let map = map();
        let uuid = column(JdbcTypeDesc::new(OTHER, "UUID"), None, None, None);
        assert_eq!(map.type_name(&uuid).as_deref(), Some("UNIQUEIDENTIFIER"));
        let geometry = column(JdbcTypeDesc::new(OTHER, "GEOMETRY"), None, None, None);
        assert_eq!(map.type_name(&geometry).as_deref(), Some("GEOMETRY"));
        let unmapped = column(JdbcTypeDesc::code(SQLXML), None, None, None);
        assert_eq!(map.type_name(&unmapped), None);
    }
}
