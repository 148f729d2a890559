//! PostgreSQL driver over tokio-postgres.

mod params;
mod session;

pub use session::PostgresSession;
