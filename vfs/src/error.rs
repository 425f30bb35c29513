use std::fmt;

/// Errors from virtual file system operations.
#[derive(Debug)]
pub enum VfsError {
    /// No file at the requested path.
    NotFound(String),
    /// Underlying IO failure.
    Io(std::io::Error),
    /// The path could not be normalized (empty, or escapes the root).
    InvalidPath(String),
    /// The path's first segment names no mounted source.
    NoSuchSource(String),
    /// The resolved provider does not support writes.
    ReadOnly,
}

impl fmt::Display for VfsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VfsError::NotFound(path) => write!(f, "file not found: {path}"),
            VfsError::Io(err) => write!(f, "io error: {err}"),
            VfsError::InvalidPath(reason) => write!(f, "invalid path: {reason}"),
            VfsError::NoSuchSource(name) => write!(f, "no mounted source named '{name}'"),
            VfsError::ReadOnly => write!(f, "source is read-only"),
        }
    }
}

impl std::error::Error for VfsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            VfsError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for VfsError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => VfsError::NotFound(err.to_string()),
            _ => VfsError::Io(err),
        }
    }
}
