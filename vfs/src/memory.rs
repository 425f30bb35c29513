use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

use crate::provider::VfsProvider;
use crate::VfsError;

/// In-memory provider for tests and embedded data.
///
/// Directories are implicit: they exist whenever some file path contains
/// them as a prefix. Mutable after mounting; read-write.
#[derive(Default)]
pub struct MemoryProvider {
    files: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert (or overwrite) a file.
    pub fn insert(&self, path: impl Into<String>, data: Vec<u8>) {
        self.files
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(path.into(), data);
    }

    /// Run `f` over the file map, recovering from a poisoned lock — the map
    /// is plain data, a panicked writer cannot leave it inconsistent.
    fn with_files<R>(&self, f: impl FnOnce(&BTreeMap<String, Vec<u8>>) -> R) -> R {
        let files = self
            .files
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&files)
    }
}

impl VfsProvider for MemoryProvider {
    fn read(&self, path: &str) -> Result<Vec<u8>, VfsError> {
        self.with_files(|files| {
            files
                .get(path)
                .cloned()
                .ok_or_else(|| VfsError::NotFound(path.to_owned()))
        })
    }

    fn exists(&self, path: &str) -> Result<bool, VfsError> {
        self.with_files(|files| Ok(files.contains_key(path)))
    }

    fn list_dir(&self, path: &str) -> Result<Vec<String>, VfsError> {
        self.with_files(|files| {
            let prefix = if path.is_empty() {
                String::new()
            } else {
                format!("{path}/")
            };
            let mut entries = BTreeSet::new();
            for key in files.keys() {
                if let Some(rest) = key.strip_prefix(&prefix) {
                    let name = rest.split('/').next().unwrap_or(rest);
                    if !name.is_empty() {
                        entries.insert(name.to_owned());
                    }
                }
            }
            Ok(entries.into_iter().collect())
        })
    }

    fn is_read_only(&self) -> bool {
        false
    }

    fn write(&self, path: &str, data: &[u8]) -> Result<(), VfsError> {
        self.insert(path, data.to_vec());
        Ok(())
    }

    fn delete(&self, path: &str) -> Result<(), VfsError> {
        let removed = self
            .files
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(path);
        match removed {
            Some(_) => Ok(()),
            None => Err(VfsError::NotFound(path.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_write_delete() {
        let mem = MemoryProvider::new();
        mem.write("a/b.bin", &[1, 2, 3]).unwrap();
        assert!(mem.exists("a/b.bin").unwrap());
        assert_eq!(mem.read("a/b.bin").unwrap(), vec![1, 2, 3]);
        mem.delete("a/b.bin").unwrap();
        assert!(!mem.exists("a/b.bin").unwrap());
        assert!(matches!(mem.read("a/b.bin"), Err(VfsError::NotFound(_))));
    }

    #[test]
    fn list_dir_is_immediate_children_only() {
        let mem = MemoryProvider::new();
        mem.insert("top.bin", vec![]);
        mem.insert("dir/one.bin", vec![]);
        mem.insert("dir/sub/two.bin", vec![]);

        assert_eq!(mem.list_dir("").unwrap(), vec!["dir", "top.bin"]);
        assert_eq!(mem.list_dir("dir").unwrap(), vec!["one.bin", "sub"]);
        assert!(mem.list_dir("nope").unwrap().is_empty());
    }
}
