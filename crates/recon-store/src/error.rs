use std::path::PathBuf;

use recon_core::DocumentError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("invalid data: {0}")]
    InvalidData(String),
    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {}: {message}", path.display())]
    Config { path: PathBuf, message: String },
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::InvalidData(e.to_string())
    }
}

/// Store failures surface through the `Document` trait as backend errors.
impl From<StoreError> for DocumentError {
    fn from(e: StoreError) -> Self {
        DocumentError::Backend(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
