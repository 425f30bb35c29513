//! Virtual file system abstraction for the Kestrel toolkit.
//!
//! Gives the resource tooling one byte-level API over multiple storage
//! backends through the [`VfsProvider`] trait and the [`Vfs`] router. The
//! serialization core is synchronous and single-threaded, so every
//! operation here is a plain blocking call returning `Result` — no futures,
//! no runtime.
//!
//! # Providers
//!
//! - [`MemoryProvider`] — in-memory storage for tests and embedded data
//!   (read-write)
//! - [`DirectoryProvider`] — a directory tree on the native filesystem
//!   (read-write)
//!
//! Archive formats (pack files and the like) plug in by implementing
//! [`VfsProvider`] over their table of contents; the router and the tooling
//! treat them purely as byte sources.
//!
//! # Read-Only vs Read-Write
//!
//! Read operations are required. Write operations default to
//! [`VfsError::ReadOnly`]; writable providers override them and return
//! `false` from [`VfsProvider::is_read_only`].

mod error;
mod filesystem;
mod memory;
pub mod path;
mod provider;
mod vfs;

pub use error::VfsError;
pub use filesystem::DirectoryProvider;
pub use memory::MemoryProvider;
pub use provider::VfsProvider;
pub use vfs::Vfs;
