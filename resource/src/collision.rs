//! Collision meshes.
//!
//! A `COLL` chunk is a list of sections, each carrying packed vertex and
//! triangle payloads in the GPU blob and a BVH over the triangles in the CPU
//! blob. Only the single-triangle-list section kind is supported; any other
//! type tag aborts the mesh load, since continuing would silently produce a
//! wrong mesh rather than an incomplete one.
//!
//! BVH subtrees can be shared between branches, so child pointers go through
//! the context's shared-reference machinery and the same leaf reachable from
//! two branches materializes once.

use std::cell::RefCell;
use std::rc::Rc;

use crate::buffer;
use crate::error::ResourceError;
use crate::load::LoadContext;
use crate::save::SaveContext;
use crate::save_buffer::SaveBuffer;
use crate::serializable::ResourceSerializable;

/// The one section kind this build understands.
pub const SECTION_TRIANGLE_LIST: u32 = 0;

const MESH_SIZE: usize = 0x10;
const SECTION_SIZE: usize = 0x40;
const BVH_NODE_SIZE: usize = 0x40;

/// A collision mesh: one or more triangle-list sections.
///
/// Record layout (16 bytes): section count at 0x00, pointer to the packed
/// section array at 0x08.
#[derive(Debug, Default)]
pub struct CollisionMesh {
    pub sections: Vec<CollisionSection>,
}

/// One triangle-list section.
///
/// Record layout (64 bytes):
///
/// ```text
/// 0x00  type tag         u32 (must be SECTION_TRIANGLE_LIST)
/// 0x04  vertex count     u32
/// 0x08  vertices         GPU pointer → packed [f32; 3] array
/// 0x10  triangle count   u32
/// 0x18  triangles        GPU pointer → packed [u16; 3] array
/// 0x20  bvh root         pointer → BvhNode (shared)
/// 0x28  bounds min       3 × f32
/// 0x34  bounds max       3 × f32
/// ```
#[derive(Debug, Default)]
pub struct CollisionSection {
    pub vertices: Vec<[f32; 3]>,
    pub triangles: Vec<[u16; 3]>,
    pub bvh: Option<Rc<RefCell<BvhNode>>>,
    pub bounds_min: [f32; 3],
    pub bounds_max: [f32; 3],
}

/// A node of the triangle BVH.
///
/// Record layout (64 bytes): leaf flag at 0x00, AABB at 0x08/0x14, then
/// either four child pointer slots (branch) or first-triangle index and
/// triangle count (leaf) from 0x20.
#[derive(Debug)]
pub struct BvhNode {
    pub min: [f32; 3],
    pub max: [f32; 3],
    pub kind: BvhKind,
}

/// Branch or leaf payload of a [`BvhNode`].
#[derive(Debug)]
pub enum BvhKind {
    /// Up to four children, possibly shared with sibling subtrees.
    Branch {
        children: Vec<Rc<RefCell<BvhNode>>>,
    },
    /// A run of triangles in the owning section.
    Leaf {
        first_triangle: u32,
        triangle_count: u32,
    },
}

impl Default for BvhNode {
    fn default() -> Self {
        Self {
            min: [0.0; 3],
            max: [0.0; 3],
            kind: BvhKind::Leaf {
                first_triangle: 0,
                triangle_count: 0,
            },
        }
    }
}

// -- Packed payload codecs --

/// Decode a packed `[f32; 3]` array from raw GPU bytes.
///
/// On a little-endian blob the bytes are reinterpreted in place when the
/// slice alignment allows it; otherwise (and always for big-endian blobs)
/// elements are read one float at a time.
fn decode_vec3s(bytes: &[u8], count: usize, big_endian: bool) -> Vec<[f32; 3]> {
    let count = count.min(bytes.len() / 12);
    if !big_endian && cfg!(target_endian = "little") {
        if let Ok(slice) = bytemuck::try_cast_slice::<u8, [f32; 3]>(&bytes[..count * 12]) {
            return slice.to_vec();
        }
    }
    (0..count)
        .map(|i| buffer::read_f32x3(bytes, i * 12, big_endian))
        .collect()
}

fn encode_vec3s(values: &[[f32; 3]], big_endian: bool) -> Vec<u8> {
    if !big_endian && cfg!(target_endian = "little") {
        return bytemuck::cast_slice(values).to_vec();
    }
    let mut bytes = Vec::with_capacity(values.len() * 12);
    for (i, value) in values.iter().enumerate() {
        buffer::write_f32x3(&mut bytes, i * 12, *value, big_endian);
    }
    bytes
}

/// Decode a packed `[u16; 3]` triangle index array from raw GPU bytes.
fn decode_triangles(bytes: &[u8], count: usize, big_endian: bool) -> Vec<[u16; 3]> {
    let count = count.min(bytes.len() / 6);
    if !big_endian && cfg!(target_endian = "little") {
        if let Ok(slice) = bytemuck::try_cast_slice::<u8, [u16; 3]>(&bytes[..count * 6]) {
            return slice.to_vec();
        }
    }
    (0..count)
        .map(|i| {
            [
                buffer::read_u16(bytes, i * 6, big_endian),
                buffer::read_u16(bytes, i * 6 + 2, big_endian),
                buffer::read_u16(bytes, i * 6 + 4, big_endian),
            ]
        })
        .collect()
}

fn encode_triangles(values: &[[u16; 3]], big_endian: bool) -> Vec<u8> {
    if !big_endian && cfg!(target_endian = "little") {
        return bytemuck::cast_slice(values).to_vec();
    }
    let mut bytes = Vec::with_capacity(values.len() * 6);
    for (i, triangle) in values.iter().enumerate() {
        for (j, &index) in triangle.iter().enumerate() {
            buffer::write_u16(&mut bytes, i * 6 + j * 2, index, big_endian);
        }
    }
    bytes
}

// -- Serialization --

impl ResourceSerializable for CollisionMesh {
    fn load(&mut self, ctx: &mut LoadContext<'_>) -> Result<(), ResourceError> {
        let base = ctx.position();
        let count = ctx.checked_count(ctx.read_u32(base) as usize);
        ctx.set_position(base + 0x08);

        let mut index = 0usize;
        let sections = ctx.load_array_pointer_with(count, |ctx| {
            let section = ctx.load_unique_reference::<CollisionSection>();
            // The section loader cannot know its own index; patch it into
            // the error here.
            let section = section.map_err(|err| match err {
                ResourceError::UnsupportedSection { tag, .. } => {
                    ResourceError::UnsupportedSection {
                        section: index,
                        tag,
                    }
                }
                other => other,
            });
            index += 1;
            section
        })?;
        self.sections = sections;
        Ok(())
    }

    fn save(&self, ctx: &mut SaveContext, buffer: &SaveBuffer) {
        ctx.write_u32(buffer, 0x00, self.sections.len() as u32);
        if self.sections.is_empty() {
            return;
        }
        let array =
            ctx.save_generic_pointer(buffer, 0x08, self.sections.len() * SECTION_SIZE, 16);
        for (i, section) in self.sections.iter().enumerate() {
            section.save(ctx, &array.at(i * SECTION_SIZE, SECTION_SIZE));
        }
    }

    fn serialized_size(&self) -> usize {
        MESH_SIZE
    }
}

impl ResourceSerializable for CollisionSection {
    fn load(&mut self, ctx: &mut LoadContext<'_>) -> Result<(), ResourceError> {
        let base = ctx.position();
        let tag = ctx.read_u32(base);
        if tag != SECTION_TRIANGLE_LIST {
            return Err(ResourceError::UnsupportedSection { section: 0, tag });
        }

        let vertex_count = ctx.checked_count(ctx.read_u32(base + 0x04) as usize);
        let (vertex_address, vertex_gpu) = ctx.read_pointer(base + 0x08);
        let triangle_count = ctx.checked_count(ctx.read_u32(base + 0x10) as usize);
        let (index_address, index_gpu) = ctx.read_pointer(base + 0x18);
        self.bvh = ctx.load_shared_pointer_at::<BvhNode>(base + 0x20)?;
        self.bounds_min = ctx.read_f32x3(base + 0x28);
        self.bounds_max = ctx.read_f32x3(base + 0x34);

        let big_endian = ctx.platform().is_big_endian();
        let vertex_bytes = ctx.load_buffer(vertex_address, vertex_count * 12, vertex_gpu);
        self.vertices = decode_vec3s(vertex_bytes, vertex_count, big_endian);
        let index_bytes = ctx.load_buffer(index_address, triangle_count * 6, index_gpu);
        self.triangles = decode_triangles(index_bytes, triangle_count, big_endian);
        Ok(())
    }

    fn save(&self, ctx: &mut SaveContext, buffer: &SaveBuffer) {
        let big_endian = ctx.platform().is_big_endian();
        ctx.write_u32(buffer, 0x00, SECTION_TRIANGLE_LIST);
        ctx.write_u32(buffer, 0x04, self.vertices.len() as u32);
        ctx.save_buffer_pointer(buffer, &encode_vec3s(&self.vertices, big_endian), 0x08, 16, true);
        ctx.write_u32(buffer, 0x10, self.triangles.len() as u32);
        ctx.save_buffer_pointer(
            buffer,
            &encode_triangles(&self.triangles, big_endian),
            0x18,
            16,
            true,
        );
        ctx.save_shared_pointer(buffer, self.bvh.as_ref(), 0x20, 16);
        ctx.write_f32x3(buffer, 0x28, self.bounds_min);
        ctx.write_f32x3(buffer, 0x34, self.bounds_max);
    }

    fn serialized_size(&self) -> usize {
        SECTION_SIZE
    }
}

impl ResourceSerializable for BvhNode {
    fn load(&mut self, ctx: &mut LoadContext<'_>) -> Result<(), ResourceError> {
        let base = ctx.position();
        let leaf = ctx.read_bool(base, true);
        self.min = ctx.read_f32x3(base + 0x08);
        self.max = ctx.read_f32x3(base + 0x14);
        self.kind = if leaf {
            BvhKind::Leaf {
                first_triangle: ctx.read_u32(base + 0x20),
                triangle_count: ctx.read_u32(base + 0x24),
            }
        } else {
            let mut children = Vec::new();
            for i in 0..4 {
                if let Some(child) = ctx.load_shared_pointer_at::<BvhNode>(base + 0x20 + i * 8)? {
                    children.push(child);
                }
            }
            BvhKind::Branch { children }
        };
        Ok(())
    }

    fn save(&self, ctx: &mut SaveContext, buffer: &SaveBuffer) {
        ctx.write_f32x3(buffer, 0x08, self.min);
        ctx.write_f32x3(buffer, 0x14, self.max);
        match &self.kind {
            BvhKind::Leaf {
                first_triangle,
                triangle_count,
            } => {
                ctx.write_bool(buffer, 0x00, true, true);
                ctx.write_u32(buffer, 0x20, *first_triangle);
                ctx.write_u32(buffer, 0x24, *triangle_count);
            }
            BvhKind::Branch { children } => {
                ctx.write_bool(buffer, 0x00, false, true);
                if children.len() > 4 {
                    log::warn!("bvh branch with {} children, writing the first 4", children.len());
                }
                for (i, child) in children.iter().take(4).enumerate() {
                    ctx.save_shared_pointer(buffer, Some(child), 0x20 + i * 8, 16);
                }
            }
        }
    }

    fn serialized_size(&self) -> usize {
        BVH_NODE_SIZE
    }
}
