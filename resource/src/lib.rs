//! # Kestrel resource databases
//!
//! Loader and saver for the binary resource databases of the Kestrel
//! toolkit's target engine. A database is a flat byte blob (plus an optional
//! GPU-resident blob) with an external relocation table; loading re-bases
//! the relocated pointer fields into live object references — deduplicating
//! shared records and resolving cycles — and saving allocates fresh
//! addresses in two bump-allocated address spaces while emitting the
//! relocation records back out.
//!
//! The core is platform-polymorphic: the same code reads and writes 32- and
//! 64-bit, little- and big-endian databases, selected by a [`Platform`]
//! descriptor.
//!
//! # Example
//!
//! ```ignore
//! use kestrel_resource::{ChunkKind, NavMesh, ResourceDatabase};
//!
//! let bytes = std::fs::read("track01.krdb")?;
//! let db = ResourceDatabase::from_bytes(&bytes)?;
//! for chunk in db.chunks() {
//!     println!("{} {:#010x} {}", chunk.kind, chunk.id, chunk.name);
//! }
//! let nav: NavMesh = db.load_resource(nav_chunk_id)?;
//! println!("{} waypoints", nav.waypoints.len());
//! ```

pub mod buffer;
mod chunk;
pub mod collision;
mod database;
mod error;
mod load;
pub mod navigation;
mod platform;
mod relocation;
mod save;
mod save_buffer;
mod scene;
mod serializable;
#[cfg(test)]
mod tests;

pub use chunk::{ChunkKind, ResourceChunk};
pub use collision::{BvhKind, BvhNode, CollisionMesh, CollisionSection};
pub use database::{ResourceDatabase, FORMAT_VERSION, MAGIC};
pub use error::ResourceError;
pub use load::{LoadContext, MAX_ARRAY_LEN};
pub use navigation::{NavLink, NavMesh, RacingLine, RacingSegment, Waypoint};
pub use platform::Platform;
pub use relocation::{Relocation, RelocationKind};
pub use save::{SaveContext, SaveOutput};
pub use save_buffer::SaveBuffer;
pub use scene::{uid_from_name, NodeKind, NodeRegistry, SceneNode, IDENTITY_MATRIX};
pub use serializable::ResourceSerializable;
