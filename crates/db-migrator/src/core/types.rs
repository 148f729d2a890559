//! Column type descriptors.
//!
//! Types are identified by a JDBC-style numeric type code paired with the
//! vendor type name reported by the source database. The code is the
//! vendor-neutral hub every dialect maps to and from; the name keeps enough
//! detail to resolve vendor specific formats (`(OTHER, "ANYDATA")`).

use std::fmt;

use serde::{Deserialize, Serialize};

/// JDBC type codes (values of `java.sql.Types`).
pub mod type_codes {
    pub const BIT: i32 = -7;
    pub const TINYINT: i32 = -6;
    pub const SMALLINT: i32 = 5;
    pub const INTEGER: i32 = 4;
    pub const BIGINT: i32 = -5;
    pub const FLOAT: i32 = 6;
    pub const REAL: i32 = 7;
    pub const DOUBLE: i32 = 8;
    pub const NUMERIC: i32 = 2;
    pub const DECIMAL: i32 = 3;
    pub const CHAR: i32 = 1;
    pub const VARCHAR: i32 = 12;
    pub const LONGVARCHAR: i32 = -1;
    pub const DATE: i32 = 91;
    pub const TIME: i32 = 92;
    pub const TIMESTAMP: i32 = 93;
    pub const BINARY: i32 = -2;
    pub const VARBINARY: i32 = -3;
    pub const LONGVARBINARY: i32 = -4;
    pub const NULL: i32 = 0;
    pub const OTHER: i32 = 1111;
    pub const BLOB: i32 = 2004;
    pub const CLOB: i32 = 2005;
    pub const BOOLEAN: i32 = 16;
    pub const NCHAR: i32 = -15;
    pub const NVARCHAR: i32 = -9;
    pub const LONGNVARCHAR: i32 = -16;
    pub const NCLOB: i32 = 2011;
    pub const SQLXML: i32 = 2009;
    pub const TIME_WITH_TIMEZONE: i32 = 2013;
    pub const TIMESTAMP_WITH_TIMEZONE: i32 = 2014;
}

use type_codes::*;

/// A `(type code, type name)` pair describing a column or result field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JdbcTypeDesc {
    pub type_code: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
}

impl JdbcTypeDesc {
    pub fn new(type_code: i32, type_name: impl Into<String>) -> Self {
        Self {
            type_code,
            type_name: Some(type_name.into()),
        }
    }

    /// Descriptor carrying only a type code.
    pub fn code(type_code: i32) -> Self {
        Self {
            type_code,
            type_name: None,
        }
    }

    /// Build a descriptor from a vendor type name, resolving its code.
    pub fn from_type_name(type_name: &str) -> Self {
        Self::new(code_for_type_name(type_name), type_name.to_uppercase())
    }

    /// Same code with the name dropped; used for code-only lookups.
    pub fn without_name(&self) -> Self {
        Self::code(self.type_code)
    }

    pub fn is_binary(&self) -> bool {
        matches!(self.type_code, BINARY | VARBINARY | LONGVARBINARY | BLOB)
    }

    pub fn is_character(&self) -> bool {
        matches!(
            self.type_code,
            CHAR | VARCHAR | LONGVARCHAR | CLOB | NCHAR | NVARCHAR | LONGNVARCHAR | NCLOB
        )
    }

    pub fn is_temporal(&self) -> bool {
        matches!(
            self.type_code,
            DATE | TIME | TIMESTAMP | TIME_WITH_TIMEZONE | TIMESTAMP_WITH_TIMEZONE
        )
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self.type_code,
            TINYINT | SMALLINT | INTEGER | BIGINT | FLOAT | REAL | DOUBLE | NUMERIC | DECIMAL
        )
    }
}

impl fmt::Display for JdbcTypeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.type_name {
            Some(name) => write!(f, "{}({})", name, self.type_code),
            None => write!(f, "{}", self.type_code),
        }
    }
}

/// Resolve a vendor type name to its JDBC code.
///
/// Size and modifier suffixes (`varchar(20)`, `int unsigned`) are ignored.
pub fn code_for_type_name(type_name: &str) -> i32 {
    let lower = type_name.trim().to_lowercase();
    let base = lower
        .split(|c: char| c == '(' || c == ' ')
        .next()
        .unwrap_or_default();
    let base = if lower.starts_with("timestamp") && lower.contains("with time zone") {
        "timestamptz"
    } else if lower.starts_with("time") && lower.contains("with time zone") {
        "timetz"
    } else if lower.starts_with("double precision") {
        "double"
    } else if lower.starts_with("character varying") {
        "varchar"
    } else {
        base
    };

    match base {
        "bit" => BIT,
        "bool" | "boolean" => BOOLEAN,
        "tinyint" => TINYINT,
        "smallint" | "int2" | "year" => SMALLINT,
        "mediumint" | "int" | "integer" | "int4" | "serial" => INTEGER,
        "bigint" | "int8" | "bigserial" => BIGINT,
        "float" | "float8" | "double" => DOUBLE,
        "real" | "float4" | "binary_float" => REAL,
        "binary_double" => DOUBLE,
        "decimal" | "dec" | "money" | "smallmoney" => DECIMAL,
        "numeric" | "number" => NUMERIC,
        "char" | "character" | "bpchar" => CHAR,
        "nchar" => NCHAR,
        "varchar" | "varchar2" | "enum" | "set" | "string" => VARCHAR,
        "nvarchar" | "nvarchar2" => NVARCHAR,
        "text" | "tinytext" | "mediumtext" | "longtext" | "ntext" | "long" => LONGVARCHAR,
        "clob" => CLOB,
        "nclob" => NCLOB,
        "date" => DATE,
        "time" => TIME,
        "timetz" => TIME_WITH_TIMEZONE,
        "datetime" | "datetime2" | "smalldatetime" | "timestamp" => TIMESTAMP,
        "timestamptz" | "datetimeoffset" => TIMESTAMP_WITH_TIMEZONE,
        "binary" | "raw" => BINARY,
        "varbinary" | "bytea" | "image" => VARBINARY,
        "tinyblob" | "mediumblob" | "longblob" => LONGVARBINARY,
        "blob" => BLOB,
        "xml" => SQLXML,
        _ => OTHER,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_for_type_name() {
        assert_eq!(code_for_type_name("VARCHAR(255)"), VARCHAR);
        assert_eq!(code_for_type_name("int unsigned"), INTEGER);
        assert_eq!(code_for_type_name("character varying"), VARCHAR);
        assert_eq!(code_for_type_name("timestamp with time zone"), TIMESTAMP_WITH_TIMEZONE);
        assert_eq!(code_for_type_name("timestamp without time zone"), TIMESTAMP);
        assert_eq!(code_for_type_name("double precision"), DOUBLE);
        assert_eq!(code_for_type_name("bit"), BIT);
        assert_eq!(code_for_type_name("uniqueidentifier"), OTHER);
    }

    #[test]
    fn test_desc_display() {
        assert_eq!(JdbcTypeDesc::new(VARCHAR, "VARCHAR").to_string(), "VARCHAR(12)");
        assert_eq!(JdbcTypeDesc::code(INTEGER).to_string(), "4");
    }

    #[test]
    fn test_from_type_name_uppercases() {
        let desc = JdbcTypeDesc::from_type_name("bytea");
        assert_eq!(desc.type_code, VARBINARY);
        assert_eq!(desc.type_name.as_deref(), Some("BYTEA"));
        assert!(desc.is_binary());
    }
}
