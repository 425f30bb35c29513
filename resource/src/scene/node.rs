//! Scene graph node records.
//!
//! Transforms are plain `[f32; 16]` row-major matrices rather than math
//! library types; the consumers that need real matrix math convert at the
//! boundary.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::error::ResourceError;
use crate::load::LoadContext;
use crate::save::SaveContext;
use crate::save_buffer::SaveBuffer;
use crate::serializable::ResourceSerializable;

/// Row-major identity matrix.
pub const IDENTITY_MATRIX: [f32; 16] = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];

/// Byte footprint of one node record in a `NODE` chunk.
///
/// The layout is fixed (a compiled structure layout, not a stream):
///
/// ```text
/// 0x00  uid          u32
/// 0x04  kind tag     u32
/// 0x08  name         pointer (8-byte slot)
/// 0x10  transform    16 × f32, row-major
/// 0x50  parent uid   u32
/// 0x54  payload a    u32
/// 0x58  payload b    u32
/// 0x5C  reserved     u32
/// ```
pub(crate) const NODE_RECORD_SIZE: usize = 0x60;

/// Stable identity for a node, derived from its name (FNV-1a).
///
/// Uid 0 is reserved for "no node".
pub fn uid_from_name(name: &str) -> u32 {
    let mut hash: u32 = 0x811C_9DC5;
    for byte in name.bytes() {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash.max(1)
}

/// What a node is, with its kind-specific payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A grouping node with no payload.
    Folder,
    /// A named point in space.
    Locator,
    /// A node whose geometry lives in a `BUFF` chunk.
    Mesh {
        /// Chunk id of the vertex payload.
        buffer_chunk: u32,
    },
    /// A numbered track marker.
    Marker {
        /// Marker index along the track.
        index: u32,
    },
    /// A kind this build does not model; payload carried through verbatim.
    Unknown {
        /// The on-disk kind tag.
        tag: u32,
        /// Raw payload words.
        payload: [u32; 2],
    },
}

impl NodeKind {
    fn from_parts(tag: u32, a: u32, b: u32) -> Self {
        match tag {
            0 => NodeKind::Folder,
            1 => NodeKind::Locator,
            2 => NodeKind::Mesh { buffer_chunk: a },
            3 => NodeKind::Marker { index: a },
            _ => NodeKind::Unknown {
                tag,
                payload: [a, b],
            },
        }
    }

    fn to_parts(self) -> (u32, u32, u32) {
        match self {
            NodeKind::Folder => (0, 0, 0),
            NodeKind::Locator => (1, 0, 0),
            NodeKind::Mesh { buffer_chunk } => (2, buffer_chunk, 0),
            NodeKind::Marker { index } => (3, index, 0),
            NodeKind::Unknown { tag, payload } => (tag, payload[0], payload[1]),
        }
    }
}

impl Default for NodeKind {
    fn default() -> Self {
        NodeKind::Folder
    }
}

/// One node in the scene graph.
///
/// Nodes are shared (`Rc<RefCell<SceneNode>>`): the registry, the parent's
/// child list, and any resource that references the node by uid all hold the
/// same object. Parent links are weak so a tree never forms an `Rc` cycle.
#[derive(Default)]
pub struct SceneNode {
    /// Stable identity; 0 means unregistered.
    pub uid: u32,
    /// Display name, also the usual uid source.
    pub name: String,
    /// Local transform, row-major.
    pub transform: [f32; 16],
    /// Uid of the parent node; 0 for top-level nodes.
    pub parent_uid: u32,
    /// Kind and payload.
    pub kind: NodeKind,

    parent: Weak<RefCell<SceneNode>>,
    children: Vec<Rc<RefCell<SceneNode>>>,
}

impl SceneNode {
    /// A node named `name`, with its uid derived from the name.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            uid: uid_from_name(&name),
            name,
            transform: IDENTITY_MATRIX,
            parent_uid: 0,
            kind: NodeKind::Folder,
            parent: Weak::new(),
            children: Vec::new(),
        }
    }

    /// Set the kind.
    #[must_use]
    pub fn with_kind(mut self, kind: NodeKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set the local transform.
    #[must_use]
    pub fn with_transform(mut self, transform: [f32; 16]) -> Self {
        self.transform = transform;
        self
    }

    /// The parent node, if it is still alive.
    pub fn parent(&self) -> Option<Rc<RefCell<SceneNode>>> {
        self.parent.upgrade()
    }

    /// Child nodes.
    pub fn children(&self) -> &[Rc<RefCell<SceneNode>>] {
        &self.children
    }

    /// Attach `child` under `parent`, keeping the uid link and the object
    /// links in step. A node cannot be its own parent.
    pub fn link(parent: &Rc<RefCell<SceneNode>>, child: &Rc<RefCell<SceneNode>>) {
        if Rc::ptr_eq(parent, child) {
            log::warn!("refusing to link a node under itself");
            return;
        }
        let parent_uid = parent.borrow().uid;
        {
            let mut child_ref = child.borrow_mut();
            child_ref.parent = Rc::downgrade(parent);
            child_ref.parent_uid = parent_uid;
        }
        let mut parent_ref = parent.borrow_mut();
        if !parent_ref.children.iter().any(|c| Rc::ptr_eq(c, child)) {
            parent_ref.children.push(Rc::clone(child));
        }
    }
}

impl ResourceSerializable for SceneNode {
    fn load(&mut self, ctx: &mut LoadContext<'_>) -> Result<(), ResourceError> {
        let base = ctx.position();
        self.uid = ctx.read_u32(base);
        let tag = ctx.read_u32(base + 0x04);
        self.name = ctx.read_string_pointer(base + 0x08);
        self.transform = ctx.read_matrix(base + 0x10);
        self.parent_uid = ctx.read_u32(base + 0x50);
        let a = ctx.read_u32(base + 0x54);
        let b = ctx.read_u32(base + 0x58);
        self.kind = NodeKind::from_parts(tag, a, b);
        Ok(())
    }

    fn save(&self, ctx: &mut SaveContext, buffer: &SaveBuffer) {
        let (tag, a, b) = self.kind.to_parts();
        ctx.write_u32(buffer, 0x00, self.uid);
        ctx.write_u32(buffer, 0x04, tag);
        ctx.write_string_pointer(buffer, &self.name, 0x08, false);
        ctx.write_matrix(buffer, 0x10, &self.transform);
        ctx.write_u32(buffer, 0x50, self.parent_uid);
        ctx.write_u32(buffer, 0x54, a);
        ctx.write_u32(buffer, 0x58, b);
    }

    fn serialized_size(&self) -> usize {
        NODE_RECORD_SIZE
    }
}

impl std::fmt::Debug for SceneNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneNode")
            .field("uid", &self.uid)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("children", &self.children.len())
            .finish()
    }
}
