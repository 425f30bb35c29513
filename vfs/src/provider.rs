use crate::VfsError;

/// Trait for virtual file system backends.
///
/// Paths arriving here have already been normalized by the [`Vfs`](crate::Vfs)
/// router — forward slashes, no leading/trailing separators, no `.` or `..`
/// segments — and are relative to the provider's root (the source prefix has
/// been stripped).
///
/// Read operations are required. Write operations default to
/// [`VfsError::ReadOnly`]; providers that support them override the methods
/// and report `false` from [`is_read_only`](VfsProvider::is_read_only).
pub trait VfsProvider: Send + Sync + 'static {
    // -- Read operations --

    /// Read the entire file at `path`.
    fn read(&self, path: &str) -> Result<Vec<u8>, VfsError>;

    /// Whether a file exists at `path`.
    fn exists(&self, path: &str) -> Result<bool, VfsError>;

    /// Names of the immediate children of a directory.
    ///
    /// A missing directory lists as empty.
    fn list_dir(&self, path: &str) -> Result<Vec<String>, VfsError>;

    // -- Write operations --

    /// Whether this provider rejects writes.
    fn is_read_only(&self) -> bool {
        true
    }

    /// Create or overwrite the file at `path`.
    fn write(&self, _path: &str, _data: &[u8]) -> Result<(), VfsError> {
        Err(VfsError::ReadOnly)
    }

    /// Delete the file at `path`.
    fn delete(&self, _path: &str) -> Result<(), VfsError> {
        Err(VfsError::ReadOnly)
    }
}
