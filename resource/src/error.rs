//! Error types for resource database loading.

use std::fmt;

/// Errors that can occur while loading a resource database or a typed
/// resource from one of its chunks.
///
/// These are the fatal conditions: a malformed container, or a structural
/// variant the loader cannot represent. Truncated or corrupt data *inside* a
/// chunk's blob is not an error — blob reads degrade to zero/default values
/// and array counts outside the sanity ceiling are dropped with a warning.
#[derive(Debug)]
pub enum ResourceError {
    /// The file header is not a resource database, or names an unknown
    /// platform.
    InvalidHeader(String),
    /// The container itself ends before a declared structure.
    Truncated {
        /// Byte offset at which the read started.
        offset: usize,
        /// Number of bytes the structure needed.
        needed: usize,
    },
    /// A collision section whose type tag is not the triangle-list kind.
    UnsupportedSection {
        /// Index of the section within its mesh.
        section: usize,
        /// The unrecognized type tag.
        tag: u32,
    },
    /// No chunk with the requested id exists in the database.
    MissingChunk(u32),
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidHeader(msg) => write!(f, "invalid database header: {msg}"),
            Self::Truncated { offset, needed } => {
                write!(f, "container truncated: {needed} bytes needed at offset {offset}")
            }
            Self::UnsupportedSection { section, tag } => {
                write!(
                    f,
                    "collision section {section} has unsupported type tag {tag:#x}"
                )
            }
            Self::MissingChunk(id) => write!(f, "no chunk with id {id:#010x}"),
        }
    }
}

impl std::error::Error for ResourceError {}
