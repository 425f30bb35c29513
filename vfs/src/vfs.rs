use std::collections::HashMap;

use crate::error::VfsError;
use crate::path;
use crate::provider::VfsProvider;

/// Routes VFS paths to mounted providers.
///
/// Paths have the form `source/rest/of/path`: the first segment selects the
/// provider mounted under that name, the remainder is passed to it. When no
/// mount matches and a default source is set, the default provider receives
/// the full path.
///
/// # Example
///
/// ```ignore
/// let mut vfs = Vfs::new();
/// vfs.mount("data", DirectoryProvider::new("./data"));
/// vfs.mount("builtin", MemoryProvider::new());
///
/// let bytes = vfs.read("data/tracks/canyon.krdb")?;
/// ```
#[derive(Default)]
pub struct Vfs {
    sources: HashMap<String, Box<dyn VfsProvider>>,
    default_source: Option<String>,
}

impl Vfs {
    /// An empty router with no mounts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mount a provider under `name`, replacing any previous mount with the
    /// same name.
    pub fn mount(&mut self, name: impl Into<String>, provider: impl VfsProvider) {
        self.sources.insert(name.into(), Box::new(provider));
    }

    /// Name the source tried when a path's first segment matches no mount.
    pub fn set_default(&mut self, name: impl Into<String>) {
        self.default_source = Some(name.into());
    }

    /// Read the entire file at `raw_path`.
    pub fn read(&self, raw_path: &str) -> Result<Vec<u8>, VfsError> {
        let (provider, rest) = self.resolve(raw_path)?;
        provider.read(&rest)
    }

    /// Whether a file exists at `raw_path`.
    pub fn exists(&self, raw_path: &str) -> Result<bool, VfsError> {
        let (provider, rest) = self.resolve(raw_path)?;
        provider.exists(&rest)
    }

    /// Names of the immediate children of a directory.
    pub fn list_dir(&self, raw_path: &str) -> Result<Vec<String>, VfsError> {
        let (provider, rest) = self.resolve(raw_path)?;
        provider.list_dir(&rest)
    }

    /// Create or overwrite the file at `raw_path`.
    pub fn write(&self, raw_path: &str, data: &[u8]) -> Result<(), VfsError> {
        let (provider, rest) = self.resolve(raw_path)?;
        provider.write(&rest, data)
    }

    /// Delete the file at `raw_path`.
    pub fn delete(&self, raw_path: &str) -> Result<(), VfsError> {
        let (provider, rest) = self.resolve(raw_path)?;
        provider.delete(&rest)
    }

    /// Whether the provider behind `raw_path` rejects writes.
    pub fn is_read_only(&self, raw_path: &str) -> Result<bool, VfsError> {
        let (provider, _) = self.resolve(raw_path)?;
        Ok(provider.is_read_only())
    }

    fn resolve(&self, raw_path: &str) -> Result<(&dyn VfsProvider, String), VfsError> {
        let normalized = path::normalize(raw_path)?;
        let (source, rest) = path::split_source(&normalized);

        if let Some(provider) = self.sources.get(source) {
            return Ok((provider.as_ref(), rest.to_owned()));
        }
        if let Some(default) = &self.default_source {
            if let Some(provider) = self.sources.get(default) {
                return Ok((provider.as_ref(), normalized));
            }
        }
        Err(VfsError::NoSuchSource(source.to_owned()))
    }
}
