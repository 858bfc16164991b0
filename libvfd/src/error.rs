use thiserror::Error;

use crate::Fd;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failures reported by a capability backend.
///
/// `NotFound` and `TypeMismatch` are the structural conditions the descriptor
/// layer reacts to; everything else is passed through untouched.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("entry not found: {0}")]
    NotFound(String),

    #[error("entry {0} exists with a different kind")]
    TypeMismatch(String),

    #[error(transparent)]
    Io(std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => BackendError::NotFound(err.to_string()),
            std::io::ErrorKind::IsADirectory | std::io::ErrorKind::NotADirectory => {
                BackendError::TypeMismatch(err.to_string())
            }
            _ => BackendError::Io(err),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("bad file descriptor {0}")]
    BadDescriptor(Fd),

    #[error("is a directory")]
    IsDirectory,

    #[error("not a directory")]
    NotDirectory,

    #[error("entry already exists")]
    AlreadyExists,

    #[error("access denied")]
    Access,

    #[error("path escapes its capability root")]
    NotCapable,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("internal consistency error: {0}")]
    Internal(&'static str),

    #[error("no preopen covers path {0}")]
    NoPreopen(String),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl Error {
    /// WASI preview1 errno for this failure.
    pub fn errno(&self) -> u16 {
        match self {
            Error::BadDescriptor(_) => 8,
            Error::IsDirectory => 31,
            Error::NotDirectory => 54,
            Error::AlreadyExists => 20,
            Error::Access => 2,
            Error::NotCapable => 76,
            Error::InvalidArgument(_) => 28,
            Error::NoPreopen(_) => 44,
            Error::Internal(_) => 29,
            Error::Backend(BackendError::NotFound(_)) => 44,
            Error::Backend(BackendError::TypeMismatch(_)) => 54,
            Error::Backend(_) => 29,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Backend(BackendError::NotFound(_)))
    }
}
