use thiserror::Error;

/// Errors that can occur while exporting, moving or checking open data files.
///
/// Per-unit failures are converted into ledger error records by the executor;
/// only batch-level failures (claiming a batch, building a worker) surface
/// this type to the caller directly.
#[derive(Error, Debug)]
pub enum ExportError {
    /// An error occurred while executing an SQL query
    #[error("Error occured while query: {0}")]
    Sql(#[from] sqlx::Error),

    /// An error occurred while serializing or deserializing JSON data
    #[error("Error while serializing value: {0}")]
    Json(#[from] serde_json::Error),

    /// An object store call failed (put, copy, delete, head or ACL)
    #[error("Object store error: {0}")]
    Storage(String),

    /// The requested output format is not supported
    #[error("{0}")]
    UnsupportedFormat(String),

    /// The requested write location is not supported
    #[error("{0} is not a valid write location")]
    UnsupportedDestination(String),

    /// A local filesystem write failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV serialization failed
    #[error("CSV encode error: {0}")]
    Csv(#[from] csv::Error),

    /// Arrow record batch construction failed
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Parquet serialization failed
    #[error("Parquet encode error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// The dispatch request was malformed or missing required arguments
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// A Result type alias for ExportError.
pub type Result<T> = core::result::Result<T, ExportError>;
