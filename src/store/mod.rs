//! Persistence layer: SQLite-backed storage for contacts, catalog, knowledge and logs.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{AuditEvent, AuditKind, Database, HistoryRole, HistoryTurn};
