//! Error types for the claims triage pipeline.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Mail source error: {0}")]
    Source(#[from] SourceError),

    #[error("Notification error: {0}")]
    Notify(#[from] NotifyError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Configuration-related errors.
///
/// `InvalidPattern` is raised at configuration-load time so a broken regex
/// can never be mistaken for "no matches" at runtime.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Invalid pattern for entity {entity}: `{pattern}`: {reason}")]
    InvalidPattern {
        entity: String,
        pattern: String,
        reason: String,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Mail source errors (listing, fetching, and archiving claim documents).
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Failed to list documents in {source_name}: {reason}")]
    List {
        source_name: String,
        reason: String,
    },

    #[error("Failed to fetch document {name}: {reason}")]
    Fetch { name: String, reason: String },

    #[error("Document {name} is not a recognized claim email format: {reason}")]
    InvalidDocument { name: String, reason: String },

    #[error("Failed to archive document {name}: {reason}")]
    Archive { name: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Failed to open database: {0}")]
    Open(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Row not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Notification delivery errors.
///
/// Variants are distinguishable so callers can tell a retryable transport
/// failure from a permanent rejection.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Webhook request failed: {0}")]
    Request(String),

    #[error("Webhook rejected with HTTP status {status}")]
    Rejected { status: u16 },

    #[error("Failed to build notification message: {0}")]
    Message(String),

    #[error("SMTP delivery failed: {0}")]
    Smtp(String),
}

/// Pipeline-level errors for a single claim email.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Persistence failed: {0}")]
    Persist(#[from] DatabaseError),

    #[error("Source failed: {0}")]
    Source(#[from] SourceError),
}

/// Result type alias for the pipeline.
pub type Result<T> = std::result::Result<T, Error>;
