//! Pieces every session driver needs.
//!
//! [`SslMode`] comes from each connection's configuration. The PostgreSQL
//! driver gets a rustls connector from [`TlsBuilder`]; MySQL and SQL Server
//! map the mode onto their own client options.

pub mod tls;

pub use tls::{SslMode, TlsBuilder};
