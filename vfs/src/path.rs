//! VFS path normalization.

use crate::VfsError;

/// Normalize a VFS path into `segment/segment/...` form.
///
/// Backslashes become forward slashes, empty and `.` segments disappear,
/// and leading/trailing separators are stripped. `..` segments are rejected
/// outright — a VFS path can never climb out of its provider root.
pub fn normalize(path: &str) -> Result<String, VfsError> {
    let mut out = String::with_capacity(path.len());
    for segment in path.split(['/', '\\']) {
        match segment {
            "" | "." => continue,
            ".." => {
                return Err(VfsError::InvalidPath(format!(
                    "'..' segment in '{path}'"
                )))
            }
            _ => {
                if !out.is_empty() {
                    out.push('/');
                }
                out.push_str(segment);
            }
        }
    }
    if out.is_empty() {
        return Err(VfsError::InvalidPath("empty path".into()));
    }
    Ok(out)
}

/// Split a normalized path into its source segment and the remainder.
pub(crate) fn split_source(path: &str) -> (&str, &str) {
    path.split_once('/').unwrap_or((path, ""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_separators_and_dots() {
        assert_eq!(normalize("a/b/c.bin").unwrap(), "a/b/c.bin");
        assert_eq!(normalize("/a//b/").unwrap(), "a/b");
        assert_eq!(normalize("a\\b\\c.bin").unwrap(), "a/b/c.bin");
        assert_eq!(normalize("a/./b").unwrap(), "a/b");
    }

    #[test]
    fn rejects_escapes_and_empties() {
        assert!(normalize("a/../b").is_err());
        assert!(normalize("..").is_err());
        assert!(normalize("").is_err());
        assert!(normalize("//").is_err());
        assert!(normalize("./.").is_err());
    }

    #[test]
    fn splits_source_segment() {
        assert_eq!(split_source("data/tracks/t1.krdb"), ("data", "tracks/t1.krdb"));
        assert_eq!(split_source("lonely"), ("lonely", ""));
    }
}
