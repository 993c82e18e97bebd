//! Error types for rmsa-engine
//!
//! Only `FatalInput` (and the I/O failures around it) stops a run. Every other
//! problem found in the data is a `Warning` accumulated in `Diagnostics`.

use thiserror::Error;

/// Engine error type
#[derive(Debug, Error)]
pub enum EngineError {
    /// Top-level input cannot be parsed as structured data
    #[error("Fatal input error: {0}")]
    FatalInput(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV writer error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// rmsa-common error
    #[error("Common error: {0}")]
    Common(#[from] rmsa_common::Error),
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
