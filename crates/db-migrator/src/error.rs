//! Error types for the migration library.

use thiserror::Error;

use crate::core::types::JdbcTypeDesc;

/// Exit code reserved for command line argument errors.
pub const EXIT_CLI_ERROR: u8 = 2;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A value could not be moved between its driver form and its canonical form.
    #[error("Access error for type {type_desc}: {message}")]
    Access {
        type_desc: JdbcTypeDesc,
        message: String,
    },

    /// Schema discovery failed
    #[error("Inspection of {object} failed: {message}")]
    Inspection { object: String, message: String },

    /// A literal or default value could not be translated for the target dialect
    #[error("Translator error: {0}")]
    Translator(String),

    /// DDL could not be rendered
    #[error("Script generator error: {0}")]
    ScriptGenerator(String),

    /// Work was submitted to a worker pool that no longer accepts it
    #[error("Rejected execution: {0}")]
    RejectedExecution(String),

    /// Encoding or decoding failed for a catalog entry
    #[error("Format error in entry {entry}: {message}")]
    Format { entry: String, message: String },

    /// Catalog manifest could not be read or written
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// Database connection or statement error with context
    #[error("Database error: {message}\n  Context: {context}")]
    Database { message: String, context: String },

    /// Dump or load failed for a specific entry
    #[error("Transfer failed for {entry}: {message}")]
    Transfer { entry: String, message: String },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// XML reader/writer error
    #[error("XML error: {0}")]
    Xml(String),

    /// Operation was cancelled (SIGINT, etc.)
    #[error("Operation cancelled")]
    Cancelled,
}

impl MigrateError {
    /// Create an Access error for the given type descriptor.
    pub fn access(type_desc: &JdbcTypeDesc, message: impl Into<String>) -> Self {
        MigrateError::Access {
            type_desc: type_desc.clone(),
            message: message.into(),
        }
    }

    /// Create an Inspection error naming the object being inspected.
    pub fn inspection(object: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Inspection {
            object: object.into(),
            message: message.into(),
        }
    }

    /// Create a Database error with context about where it occurred
    pub fn database(message: impl ToString, context: impl Into<String>) -> Self {
        MigrateError::Database {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Transfer error
    pub fn transfer(entry: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Transfer {
            entry: entry.into(),
            message: message.into(),
        }
    }

    /// Create a Format error
    pub fn format(entry: impl Into<String>, message: impl ToString) -> Self {
        MigrateError::Format {
            entry: entry.into(),
            message: message.to_string(),
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) => 1,
            MigrateError::Database { .. } | MigrateError::Inspection { .. } => 3,
            MigrateError::Transfer { .. } | MigrateError::RejectedExecution(_) => 4,
            MigrateError::Format { .. } | MigrateError::Catalog(_) | MigrateError::Xml(_) => 5,
            MigrateError::Cancelled => 6,
            MigrateError::Io(_) => 7,
            _ => 8,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

impl From<quick_xml::Error> for MigrateError {
    fn from(err: quick_xml::Error) -> Self {
        MigrateError::Xml(err.to_string())
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
