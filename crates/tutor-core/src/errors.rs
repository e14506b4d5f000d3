//! Error types for the tutor core library.

use std::path::PathBuf;

/// Top-level error enum for the tutor core library.
#[derive(Debug, thiserror::Error)]
pub enum TutorError {
    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Cache backend error: {0}")]
    CacheBackend(String),

    #[error("Persistence error at {}: {source}", path.display())]
    PersistenceIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Analysis cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TutorError {
    pub(crate) fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TutorError::PersistenceIo {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        TutorError::Validation(msg.into())
    }

    /// True for failures caused by the request itself rather than the
    /// analyzed sources or the infrastructure.
    pub fn is_validation(&self) -> bool {
        matches!(self, TutorError::Validation(_))
    }
}

pub type TutorResult<T> = Result<T, TutorError>;
