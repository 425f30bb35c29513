//! The resource database and its on-disk container.
//!
//! A database file is a small header followed by a sequence of chunks, each
//! carrying its CPU blob, optional GPU blob, and relocation table. The
//! container itself is parsed strictly — a header or chunk table that ends
//! early is a fatal error — while corruption *inside* a chunk's blob
//! degrades gracefully through the load context.
//!
//! All multi-byte container fields follow the database's platform
//! endianness; the platform tag is a single byte at a fixed offset so it can
//! be decoded first.

use std::cell::RefCell;
use std::rc::Rc;

use crate::buffer;
use crate::chunk::{ChunkKind, ResourceChunk};
use crate::error::ResourceError;
use crate::load::LoadContext;
use crate::platform::Platform;
use crate::relocation::Relocation;
use crate::save::SaveContext;
use crate::scene::{self, NodeRegistry, SceneNode};
use crate::serializable::ResourceSerializable;

/// Container magic, first four bytes of every database file.
pub const MAGIC: [u8; 4] = *b"KRDB";

/// Current container/layout version.
pub const FORMAT_VERSION: u32 = 2;

const HEADER_SIZE: usize = 0x10;
const CHUNK_ALIGN: usize = 16;

// -- Strict container reader --

/// Cursor over the container bytes. Unlike blob reads, running past the end
/// here is fatal.
struct Reader<'a> {
    data: &'a [u8],
    position: usize,
    big_endian: bool,
}

impl<'a> Reader<'a> {
    fn bytes(&mut self, count: usize) -> Result<&'a [u8], ResourceError> {
        let Some(slice) = self.data.get(self.position..self.position + count) else {
            return Err(ResourceError::Truncated {
                offset: self.position,
                needed: count,
            });
        };
        self.position += count;
        Ok(slice)
    }

    fn u32(&mut self) -> Result<u32, ResourceError> {
        let offset = self.position;
        self.bytes(4)?;
        Ok(buffer::read_u32(self.data, offset, self.big_endian))
    }

    fn align(&mut self, align: usize) {
        self.position = self.position.div_ceil(align) * align;
    }
}

// -- Container writer --

struct Writer {
    data: Vec<u8>,
    big_endian: bool,
}

impl Writer {
    fn bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    fn u32(&mut self, value: u32) {
        let offset = self.data.len();
        buffer::write_u32(&mut self.data, offset, value, self.big_endian);
    }

    fn align(&mut self, align: usize) {
        let target = self.data.len().div_ceil(align) * align;
        self.data.resize(target, 0);
    }
}

/// A loaded resource database: the scene graph, the uid registry, and the
/// chunk list.
#[derive(Debug)]
pub struct ResourceDatabase {
    platform: Platform,
    version: u32,
    registry: Rc<RefCell<NodeRegistry>>,
    chunks: Vec<ResourceChunk>,
}

impl ResourceDatabase {
    /// An empty database for `platform` with a fresh `Scene` root.
    pub fn new(platform: Platform) -> Self {
        let mut registry = NodeRegistry::new();
        registry.set_root(Rc::new(RefCell::new(SceneNode::new("Scene"))));
        Self {
            platform,
            version: FORMAT_VERSION,
            registry: Rc::new(RefCell::new(registry)),
            chunks: Vec::new(),
        }
    }

    /// Parse a database file and materialize its scene graph.
    pub fn from_bytes(data: &[u8]) -> Result<Self, ResourceError> {
        if data.len() < HEADER_SIZE {
            return Err(ResourceError::Truncated {
                offset: 0,
                needed: HEADER_SIZE,
            });
        }
        if data[0..4] != MAGIC {
            return Err(ResourceError::InvalidHeader(format!(
                "bad magic {:02x?}",
                &data[0..4]
            )));
        }
        let platform = Platform::from_tag(data[4]).ok_or_else(|| {
            ResourceError::InvalidHeader(format!("unknown platform tag {}", data[4]))
        })?;

        let mut reader = Reader {
            data,
            position: 8,
            big_endian: platform.is_big_endian(),
        };
        let version = reader.u32()?;
        let chunk_count = reader.u32()?;

        let mut chunks = Vec::new();
        for _ in 0..chunk_count {
            chunks.push(read_chunk(&mut reader, version)?);
        }

        let registry = Rc::new(RefCell::new(NodeRegistry::new()));
        if let Some(node_chunk) = chunks.iter().find(|c| c.kind == ChunkKind::NODE) {
            scene::load_graph(
                &node_chunk.data,
                &node_chunk.relocations,
                platform,
                version,
                &registry,
            )?;
        }
        if registry.borrow().root().is_none() {
            registry
                .borrow_mut()
                .set_root(Rc::new(RefCell::new(SceneNode::new("Scene"))));
        }

        Ok(Self {
            platform,
            version,
            registry,
            chunks,
        })
    }

    /// Serialize the database back to container bytes.
    ///
    /// The scene graph is re-serialized into its `NODE` chunk (the first
    /// existing one keeps its id and name); every other chunk passes through
    /// verbatim, including kinds this build does not model.
    pub fn to_bytes(&self) -> Vec<u8> {
        let graph = scene::save_graph(&self.registry.borrow(), self.platform, self.version);
        let mut node_chunk = match self.chunks.iter().find(|c| c.kind == ChunkKind::NODE) {
            Some(existing) => ResourceChunk::new(ChunkKind::NODE, existing.id, &existing.name),
            None => ResourceChunk::new(ChunkKind::NODE, 1, "scene"),
        };
        node_chunk.data = graph.data;
        node_chunk.gpu_data = graph.gpu_data;
        node_chunk.relocations = graph.relocations;

        let mut ordered: Vec<&ResourceChunk> = Vec::with_capacity(self.chunks.len() + 1);
        ordered.push(&node_chunk);
        ordered.extend(self.chunks.iter().filter(|c| c.kind != ChunkKind::NODE));

        let mut writer = Writer {
            data: Vec::new(),
            big_endian: self.platform.is_big_endian(),
        };
        writer.bytes(&MAGIC);
        writer.bytes(&[self.platform.tag(), 0, 0, 0]);
        writer.u32(self.version);
        writer.u32(ordered.len() as u32);
        for chunk in ordered {
            write_chunk(&mut writer, chunk, self.version);
        }
        writer.data
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// The scene root node.
    pub fn root(&self) -> Option<Rc<RefCell<SceneNode>>> {
        self.registry.borrow().root()
    }

    /// The shared uid registry (load contexts borrow this).
    pub fn registry(&self) -> Rc<RefCell<NodeRegistry>> {
        Rc::clone(&self.registry)
    }

    /// Resolve a node by uid.
    pub fn find_node(&self, uid: u32) -> Option<Rc<RefCell<SceneNode>>> {
        self.registry.borrow().find(uid)
    }

    /// All chunks, in file order.
    pub fn chunks(&self) -> &[ResourceChunk] {
        &self.chunks
    }

    pub fn find_chunk_by_id(&self, id: u32) -> Option<&ResourceChunk> {
        self.chunks.iter().find(|c| c.id == id)
    }

    pub fn find_chunk_by_name(&self, name: &str) -> Option<&ResourceChunk> {
        self.chunks.iter().find(|c| c.name == name)
    }

    /// Register a node and attach it to its parent (by `parent_uid`, falling
    /// back to the root). Returns the shared handle.
    pub fn add_owned_node(&mut self, node: SceneNode) -> Rc<RefCell<SceneNode>> {
        let parent_uid = node.parent_uid;
        let node = Rc::new(RefCell::new(node));
        let registry = self.registry.borrow();
        let parent = if parent_uid != 0 {
            registry.find(parent_uid).or_else(|| registry.root())
        } else {
            registry.root()
        };
        drop(registry);
        if let Some(parent) = parent {
            SceneNode::link(&parent, &node);
        }
        self.registry.borrow_mut().register(Rc::clone(&node));
        node
    }

    /// Add a chunk, replacing any existing chunk with the same id.
    pub fn add_chunk(&mut self, chunk: ResourceChunk) {
        match self.chunks.iter_mut().find(|c| c.id == chunk.id) {
            Some(existing) => *existing = chunk,
            None => self.chunks.push(chunk),
        }
    }

    /// Materialize a typed resource from the chunk with the given id.
    pub fn load_resource<T: ResourceSerializable>(&self, id: u32) -> Result<T, ResourceError> {
        let chunk = self
            .find_chunk_by_id(id)
            .ok_or(ResourceError::MissingChunk(id))?;
        let mut ctx = LoadContext::new(&chunk.data, &chunk.relocations, self.platform, self.version)
            .with_gpu_data(&chunk.gpu_data)
            .with_registry(Rc::clone(&self.registry));
        ctx.load_unique_reference::<T>()
    }

    /// Serialize a typed resource into a chunk, replacing any chunk with the
    /// same id.
    pub fn save_resource<T: ResourceSerializable>(
        &mut self,
        kind: ChunkKind,
        id: u32,
        name: impl Into<String>,
        resource: &T,
    ) {
        let mut ctx = SaveContext::new(self.platform, self.version);
        let root = ctx.allocate(resource.serialized_size(), 16, false);
        resource.save(&mut ctx, &root);
        let output = ctx.finish();

        let mut chunk = ResourceChunk::new(kind, id, name);
        chunk.data = output.data;
        chunk.gpu_data = output.gpu_data;
        chunk.relocations = output.relocations;
        self.add_chunk(chunk);
    }
}

fn read_chunk(reader: &mut Reader<'_>, version: u32) -> Result<ResourceChunk, ResourceError> {
    reader.align(CHUNK_ALIGN);

    // The kind/id field order flipped at version 2.
    let (kind, id) = if version >= 2 {
        let kind = ChunkKind(reader.bytes(4)?.try_into().unwrap_or([0; 4]));
        let id = reader.u32()?;
        (kind, id)
    } else {
        let id = reader.u32()?;
        let kind = ChunkKind(reader.bytes(4)?.try_into().unwrap_or([0; 4]));
        (kind, id)
    };

    let name = if version >= 2 {
        let name_len = reader.u32()? as usize;
        let name_bytes = reader.bytes(name_len)?;
        let name = String::from_utf8_lossy(name_bytes).into_owned();
        reader.align(4);
        name
    } else {
        String::new()
    };

    let data_size = reader.u32()? as usize;
    let gpu_size = reader.u32()? as usize;
    let reloc_count = reader.u32()? as usize;

    let mut relocations = Vec::with_capacity(reloc_count.min(1024));
    for _ in 0..reloc_count {
        let offset = reader.u32()?;
        let value = reader.u32()?;
        relocations.push(Relocation { offset, value });
    }

    reader.align(CHUNK_ALIGN);
    let data = reader.bytes(data_size)?.to_vec();
    reader.align(CHUNK_ALIGN);
    let gpu_data = reader.bytes(gpu_size)?.to_vec();

    Ok(ResourceChunk {
        kind,
        id,
        name,
        data,
        gpu_data,
        relocations,
    })
}

fn write_chunk(writer: &mut Writer, chunk: &ResourceChunk, version: u32) {
    writer.align(CHUNK_ALIGN);

    if version >= 2 {
        writer.bytes(&chunk.kind.0);
        writer.u32(chunk.id);
        writer.u32(chunk.name.len() as u32);
        writer.bytes(chunk.name.as_bytes());
        writer.align(4);
    } else {
        writer.u32(chunk.id);
        writer.bytes(&chunk.kind.0);
        if !chunk.name.is_empty() {
            log::debug!("chunk {} name dropped by legacy container version", chunk.id);
        }
    }

    writer.u32(chunk.data.len() as u32);
    writer.u32(chunk.gpu_data.len() as u32);
    writer.u32(chunk.relocations.len() as u32);
    for relocation in &chunk.relocations {
        writer.u32(relocation.offset);
        writer.u32(relocation.value);
    }

    writer.align(CHUNK_ALIGN);
    writer.bytes(&chunk.data);
    writer.align(CHUNK_ALIGN);
    writer.bytes(&chunk.gpu_data);
}
