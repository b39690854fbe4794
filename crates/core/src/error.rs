use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("corpus root does not exist: {0:?}")]
    MissingRoot(PathBuf),
    #[error("io error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot decode vector cache {path:?}: {reason}")]
    Decode { path: PathBuf, reason: String },
    #[error("dimension mismatch in {path:?}: expected {expected}, found {found}")]
    DimensionMismatch {
        path: PathBuf,
        expected: usize,
        found: usize,
    },
    #[error("model mismatch in {path:?}: expected {expected}, found {found}")]
    ModelMismatch {
        path: PathBuf,
        expected: String,
        found: String,
    },
    #[error("encode error: {0}")]
    Encode(String),
    #[error("invalid page layout: {0}")]
    InvalidLayout(String),
}

pub type Result<T> = std::result::Result<T, RetrievalError>;

impl RetrievalError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn decode(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Decode {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Path the error refers to, when there is one.
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            Self::MissingRoot(path)
            | Self::Io { path, .. }
            | Self::Decode { path, .. }
            | Self::DimensionMismatch { path, .. }
            | Self::ModelMismatch { path, .. } => Some(path.as_path()),
            Self::Encode(_) | Self::InvalidLayout(_) => None,
        }
    }
}
