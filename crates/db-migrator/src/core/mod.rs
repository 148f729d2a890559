//! Core abstractions shared by every layer of the migrator.
//!
//! - [`identifier`]: object names with SQL case rules, validation and quoting
//! - [`types`]: JDBC type codes and `(code, name)` descriptors
//! - [`value`]: driver-native and canonical cell values
//! - [`session`]: the connection contract drivers implement
//! - [`logging`]: a statement-logging session decorator

pub mod identifier;
pub mod logging;
pub mod session;
pub mod types;
pub mod value;

pub use identifier::Identifier;
pub use logging::LoggingSession;
pub use session::{
    Cursor, CursorOptions, DatabaseInfo, DriverCapabilities, Field, IsolationLevel, Row, Session,
    StatementId,
};
pub use types::{type_codes, JdbcTypeDesc};
pub use value::{SqlNullType, SqlValue, Value, ValueType};
