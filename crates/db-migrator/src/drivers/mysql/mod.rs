//! MySQL/MariaDB driver over sqlx.
//!
//! Only built with the `mysql` feature. MariaDB reports itself as MySQL and
//! shares the dialect and inspector.

mod session;

pub use session::MySqlSession;
