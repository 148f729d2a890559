//! SQL identifiers: normalized names, validation and quoting.
//!
//! An [`Identifier`] remembers whether it was written quoted. Unquoted
//! identifiers compare case-insensitively, the way every supported engine
//! folds them; as soon as one side is quoted the comparison is exact.
//!
//! Identifiers cannot be bound as statement parameters, so every name that
//! ends up in generated SQL goes through [`validate_identifier`] and a
//! dialect-specific quote function that escapes the closing delimiter.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{MigrateError, Result};

/// Maximum identifier length (conservative limit across databases).
/// - PostgreSQL: 63 bytes
/// - SQL Server: 128 characters
/// - MySQL: 64 characters
pub const MAX_IDENTIFIER_LENGTH: usize = 128;

/// A database object name.
///
/// Serialized as a plain string; quoted identifiers keep their double quotes.
#[derive(Debug, Clone, Default)]
pub struct Identifier {
    value: String,
    quoted: bool,
}

impl Identifier {
    /// Parse a name as it appears in SQL text.
    ///
    /// Names wrapped in `"..."`, `` `...` `` or `[...]` become quoted
    /// identifiers with the delimiters removed and doubled closers collapsed.
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        let mut chars = text.chars();
        let (first, last) = (chars.next(), chars.next_back());
        let close = match (first, last) {
            (Some('"'), Some('"')) => Some('"'),
            (Some('`'), Some('`')) => Some('`'),
            (Some('['), Some(']')) => Some(']'),
            _ => None,
        };
        match close {
            Some(close) => {
                let inner = &text[1..text.len() - 1];
                let doubled: String = [close, close].iter().collect();
                Self::quoted(inner.replace(&doubled, &close.to_string()))
            }
            None => Self::new(text),
        }
    }

    /// An unquoted (case-insensitive) identifier.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            quoted: false,
        }
    }

    /// A quoted (case-sensitive) identifier.
    pub fn quoted(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            quoted: true,
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn is_quoted(&self) -> bool {
        self.quoted
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// Build from an optional metadata string; empty strings count as absent.
    pub fn from_option(value: Option<&str>) -> Option<Self> {
        value.filter(|v| !v.is_empty()).map(Self::new)
    }
}

impl PartialEq for Identifier {
    fn eq(&self, other: &Self) -> bool {
        if self.quoted || other.quoted {
            self.value == other.value
        } else {
            self.value.eq_ignore_ascii_case(&other.value)
        }
    }
}

impl Eq for Identifier {}

impl Hash for Identifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.to_ascii_lowercase().hash(state);
    }
}

impl PartialOrd for Identifier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Identifier {
    fn cmp(&self, other: &Self) -> Ordering {
        let folded = self
            .value
            .to_ascii_lowercase()
            .cmp(&other.value.to_ascii_lowercase());
        if folded != Ordering::Equal || !(self.quoted || other.quoted) {
            return folded;
        }
        self.value.cmp(&other.value)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl Serialize for Identifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if self.quoted {
            serializer.serialize_str(&format!("\"{}\"", self.value.replace('"', "\"\"")))
        } else {
            serializer.serialize_str(&self.value)
        }
    }
}

impl<'de> Deserialize<'de> for Identifier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Ok(Identifier::parse(&text))
    }
}

impl From<&str> for Identifier {
    fn from(value: &str) -> Self {
        Identifier::new(value)
    }
}

impl From<String> for Identifier {
    fn from(value: String) -> Self {
        Identifier::new(value)
    }
}

/// Letter case style of a name, used when choosing generated-name prefixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseStyle {
    Lower,
    Upper,
    /// Every `delimiter` separated word starts upper case and continues lower case.
    Capitalized,
    Mixed,
}

impl CaseStyle {
    pub fn detect(text: &str, delimiter: char) -> Self {
        let letters = || text.chars().filter(|c| c.is_alphabetic());
        if letters().all(char::is_lowercase) {
            return CaseStyle::Lower;
        }
        if letters().all(char::is_uppercase) {
            return CaseStyle::Upper;
        }
        let capitalized = text.split(delimiter).filter(|w| !w.is_empty()).all(|word| {
            let mut chars = word.chars().filter(|c| c.is_alphabetic());
            match chars.next() {
                Some(first) => first.is_uppercase() && chars.all(char::is_lowercase),
                None => true,
            }
        });
        if capitalized {
            CaseStyle::Capitalized
        } else {
            CaseStyle::Mixed
        }
    }
}

/// Validate an identifier before it is embedded in SQL text.
///
/// Rejects empty names, names containing null bytes and names longer than
/// [`MAX_IDENTIFIER_LENGTH`] bytes.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(MigrateError::ScriptGenerator(
            "Identifier cannot be empty".to_string(),
        ));
    }

    if name.contains('\0') {
        return Err(MigrateError::ScriptGenerator(format!(
            "Identifier contains null byte: {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(MigrateError::ScriptGenerator(format!(
            "Identifier exceeds maximum length of {} bytes (got {} bytes): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// Wrap `name` in `open`/`close`, doubling any embedded `close`.
pub fn quote_with(name: &str, open: char, close: char) -> Result<String> {
    validate_identifier(name)?;
    let mut out = String::with_capacity(name.len() + 2);
    out.push(open);
    for c in name.chars() {
        if c == close {
            out.push(close);
        }
        out.push(c);
    }
    out.push(close);
    Ok(out)
}

/// ANSI double-quote quoting (PostgreSQL, Oracle, NuoDB).
pub fn quote_ansi(name: &str) -> Result<String> {
    quote_with(name, '"', '"')
}

/// MySQL backtick quoting.
pub fn quote_mysql(name: &str) -> Result<String> {
    quote_with(name, '`', '`')
}

/// SQL Server bracket quoting.
pub fn quote_mssql(name: &str) -> Result<String> {
    quote_with(name, '[', ']')
}

/// Reject check-constraint bodies that could smuggle extra statements into DDL.
///
/// Check clauses are copied from the source catalog verbatim, so they are
/// screened for statement separators, comments and procedure calls.
pub fn validate_check_clause(definition: &str) -> Result<()> {
    let reject = |what: &str| {
        Err(MigrateError::ScriptGenerator(format!(
            "Check clause contains {}: {:?}",
            what, definition
        )))
    };

    if definition.contains(';') {
        return reject("a statement separator");
    }
    if definition.contains("--") || definition.contains("/*") || definition.contains("*/") {
        return reject("comment markers");
    }

    let lower = definition.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty())
        .collect();
    if words.iter().any(|w| *w == "exec" || *w == "execute") {
        return reject("EXEC");
    }

    const PROCEDURES: &[&str] = &[
        "xp_cmdshell",
        "xp_regread",
        "xp_regwrite",
        "xp_dirtree",
        "sp_executesql",
        "sp_oacreate",
        "sp_oamethod",
        "sp_configure",
    ];
    if let Some(proc) = words.iter().find(|w| PROCEDURES.contains(w)) {
        return reject(&format!("procedure call '{}'", proc));
    }

    Ok(())
}
