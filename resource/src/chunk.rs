//! Resource chunks.

use crate::relocation::Relocation;

/// Four-character chunk kind tag, stored verbatim in the container.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkKind(pub [u8; 4]);

impl ChunkKind {
    /// Scene graph nodes.
    pub const NODE: ChunkKind = ChunkKind(*b"NODE");
    /// Collision mesh.
    pub const COLLISION: ChunkKind = ChunkKind(*b"COLL");
    /// Navigation mesh.
    pub const NAVIGATION: ChunkKind = ChunkKind(*b"NAVM");
    /// Opaque CPU/GPU byte payload.
    pub const BUFFER: ChunkKind = ChunkKind(*b"BUFF");
}

impl std::fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for &byte in &self.0 {
            if byte.is_ascii_graphic() {
                write!(f, "{}", byte as char)?;
            } else {
                write!(f, "\\x{byte:02x}")?;
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for ChunkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}

/// One resource chunk: a typed, named blob pair with its relocation table.
///
/// The CPU blob carries the structured records; the GPU blob carries bulk
/// payloads (vertex data and the like). Relocation offsets refer to the CPU
/// blob; a GPU-flagged relocation means the field's target lives in the GPU
/// blob.
#[derive(Debug, Clone)]
pub struct ResourceChunk {
    /// Chunk kind tag.
    pub kind: ChunkKind,
    /// Chunk id, unique within a database.
    pub id: u32,
    /// Optional name (empty = unnamed).
    pub name: String,
    /// CPU-resident bytes.
    pub data: Vec<u8>,
    /// GPU-resident bytes.
    pub gpu_data: Vec<u8>,
    /// Pointer fields inside `data`.
    pub relocations: Vec<Relocation>,
}

impl ResourceChunk {
    /// An empty chunk of the given kind.
    pub fn new(kind: ChunkKind, id: u32, name: impl Into<String>) -> Self {
        Self {
            kind,
            id,
            name: name.into(),
            data: Vec::new(),
            gpu_data: Vec::new(),
            relocations: Vec::new(),
        }
    }
}
