use std::path::PathBuf;

use deltadesk_core::CoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DataError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid CSV in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("bad row in {path}: {detail}")]
    Row { path: PathBuf, detail: String },
}

impl DataError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.into(),
            source,
        }
    }
}

impl From<DataError> for CoreError {
    fn from(e: DataError) -> Self {
        match e {
            DataError::Io { .. } => Self::Storage(e.to_string()),
            DataError::Csv { .. } | DataError::Json { .. } | DataError::Row { .. } => {
                Self::MalformedSnapshot(e.to_string())
            }
        }
    }
}
