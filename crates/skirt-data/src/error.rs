//! Errors for reading and writing pipeline data files.

use std::path::PathBuf;
use thiserror::Error;

/// Error raised by table, view-list, and metadata I/O.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{path}:{line}: expected a numeric field, found {value:?}")]
    BadNumber {
        path: PathBuf,
        line: usize,
        value: String,
    },
}

impl DataError {
    /// Wraps an I/O error with the path it occurred on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DataError::Io {
            path: path.into(),
            source,
        }
    }

    /// Wraps a JSON error with the path it occurred on.
    pub fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        DataError::Json {
            path: path.into(),
            source,
        }
    }
}
