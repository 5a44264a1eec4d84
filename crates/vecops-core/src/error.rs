use thiserror::Error;

/// Error taxonomy shared across the workspace.
///
/// Recoverable conditions (per-document repair failures, degraded search)
/// are reported as values by the callers that encounter them; only the
/// variants below travel through `?`.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Cannot reach database: {0}")]
    Connectivity(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("No vector index covers {collection}.{field}")]
    IndexMissing { collection: String, field: String },

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Vector index creation failed on {collection}.{field}: {message}")]
    IndexCreation {
        collection: String,
        field: String,
        message: String,
    },

    #[error("operation failed: {0}")]
    Operation(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
