//! Persistence layer: an async `Database` trait with a libSQL backend.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{
    Database, PendingHighRisk, ProcessingFailure, StepLog, StepStatus, StoredEmail,
    StoredEntities, StoredTriage, UnprocessedCounts,
};
