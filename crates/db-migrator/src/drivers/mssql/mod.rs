//! Microsoft SQL Server driver over tiberius.

mod session;

pub use session::MssqlSession;
