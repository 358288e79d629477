use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DropCacheError>;

#[derive(Debug, Error)]
pub enum DropCacheError {
    #[error("no such file or directory: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("stale reference while resolving {0}")]
    StaleReference(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("file exists: {0}")]
    AlreadyExists(String),

    #[error("directory not empty: {0}")]
    NotEmpty(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("resource busy: {0}")]
    Busy(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl DropCacheError {
    /// Map an io error raised while handling `path` onto the matching variant.
    pub fn from_io(path: &str, err: io::Error) -> Self {
        if err.raw_os_error() == Some(libc::ESTALE) {
            return Self::StaleReference(path.to_string());
        }
        if err.raw_os_error() == Some(libc::ENOTDIR) {
            return Self::NotADirectory(path.to_string());
        }
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path.to_string()),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_string()),
            io::ErrorKind::AlreadyExists => Self::AlreadyExists(path.to_string()),
            _ => Self::Io(err),
        }
    }

    /// The errno a control write reports for this error.
    pub fn errno(&self) -> i32 {
        match self {
            Self::NotFound(_) => libc::ENOENT,
            Self::PermissionDenied(_) => libc::EACCES,
            Self::StaleReference(_) => libc::ESTALE,
            Self::NotADirectory(_) => libc::ENOTDIR,
            Self::AlreadyExists(_) => libc::EEXIST,
            Self::NotEmpty(_) => libc::ENOTEMPTY,
            Self::InvalidPath(_) => libc::EINVAL,
            Self::Busy(_) => libc::EBUSY,
            Self::Io(e) => e.raw_os_error().unwrap_or(libc::EIO),
        }
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, Self::StaleReference(_))
    }
}

impl From<DropCacheError> for io::Error {
    fn from(err: DropCacheError) -> Self {
        match err {
            DropCacheError::Io(e) => e,
            other => io::Error::from_raw_os_error(other.errno()),
        }
    }
}
