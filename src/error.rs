use thiserror::Error;

/// Errors raised at the I/O edges of the pipeline.
///
/// Row-level problems never surface here: the normalizer filters them and the
/// loader counts them in its report.
#[derive(Debug, Error)]
pub enum Error {
    /// Reading a source file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV reading or writing failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON parsing or serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The input path has an extension we cannot read.
    #[error("Unsupported input format: {path}")]
    UnsupportedFormat {
        /// Offending path.
        path: String,
    },

    /// A registry file was readable but its contents are unusable.
    #[error("Invalid zone registry: {message}")]
    InvalidRegistry {
        /// Description of what went wrong.
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
