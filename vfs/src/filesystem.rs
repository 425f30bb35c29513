use std::path::PathBuf;

use crate::provider::VfsProvider;
use crate::VfsError;

/// Provider over a directory tree on the native filesystem.
///
/// The provider root is joined with the (already normalized) VFS path to
/// form the on-disk path; normalization has rejected `..` segments before
/// they get here, so a path can never escape the root.
pub struct DirectoryProvider {
    root: PathBuf,
}

impl DirectoryProvider {
    /// A provider rooted at `root`. The directory may not exist yet; it is
    /// checked at access time.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }
}

impl VfsProvider for DirectoryProvider {
    fn read(&self, path: &str) -> Result<Vec<u8>, VfsError> {
        std::fs::read(self.resolve(path)).map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => VfsError::NotFound(path.to_owned()),
            _ => VfsError::Io(err),
        })
    }

    fn exists(&self, path: &str) -> Result<bool, VfsError> {
        Ok(self.resolve(path).is_file())
    }

    fn list_dir(&self, path: &str) -> Result<Vec<String>, VfsError> {
        let full = self.resolve(path);
        if !full.is_dir() {
            return Ok(Vec::new());
        }
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(full)? {
            let entry = entry?;
            match entry.file_name().into_string() {
                Ok(name) => entries.push(name),
                Err(name) => log::warn!("skipping non-UTF-8 entry {name:?}"),
            }
        }
        entries.sort();
        Ok(entries)
    }

    fn is_read_only(&self) -> bool {
        false
    }

    fn write(&self, path: &str, data: &[u8]) -> Result<(), VfsError> {
        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(full, data)?;
        Ok(())
    }

    fn delete(&self, path: &str) -> Result<(), VfsError> {
        std::fs::remove_file(self.resolve(path)).map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => VfsError::NotFound(path.to_owned()),
            _ => VfsError::Io(err),
        })
    }
}
