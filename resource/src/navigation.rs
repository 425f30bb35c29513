//! Navigation meshes: waypoints, links, and racing lines.
//!
//! Waypoints and links form a cyclic graph — links point at waypoints and
//! waypoints point back at their links. The blob encodes both directions as
//! pointers into the same records, so the load path leans on the context's
//! eager dedup registration: whichever side is reached first becomes the one
//! materialized object and the back-reference resolves to it mid-load.
//!
//! In memory the mesh's own arrays hold the strong references; a waypoint's
//! link list is kept weak so the graph never forms an `Rc` cycle.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::database::FORMAT_VERSION;
use crate::error::ResourceError;
use crate::load::LoadContext;
use crate::save::SaveContext;
use crate::save_buffer::SaveBuffer;
use crate::scene::SceneNode;
use crate::serializable::ResourceSerializable;

const NAV_MESH_SIZE_V1: usize = 0x20;
const NAV_MESH_SIZE: usize = 0x30;
const WAYPOINT_SIZE: usize = 0x28;
const LINK_SIZE: usize = 0x20;
const RACING_LINE_SIZE: usize = 0x20;
const RACING_SEGMENT_SIZE: usize = 0x10;

/// A navigation mesh.
///
/// Record layout (48 bytes at the current version):
///
/// ```text
/// 0x00  waypoint count     u32
/// 0x04  link count         u32
/// 0x08  waypoints          pointer → array of waypoint pointers
/// 0x10  links              pointer → array of link pointers
/// 0x18  racing line count  u32            (version ≥ 2)
/// 0x20  racing lines       pointer → packed array (version ≥ 2)
/// ```
///
/// Version 1 records stop after the link array (32 bytes) — the layout
/// branch lives in `load`/`save`, not in a separate type.
#[derive(Debug)]
pub struct NavMesh {
    /// Layout version this mesh was read with (current for new meshes).
    pub version: u32,
    pub waypoints: Vec<Rc<RefCell<Waypoint>>>,
    pub links: Vec<Rc<RefCell<NavLink>>>,
    pub racing_lines: Vec<RacingLine>,
}

impl Default for NavMesh {
    fn default() -> Self {
        Self {
            version: FORMAT_VERSION,
            waypoints: Vec::new(),
            links: Vec::new(),
            racing_lines: Vec::new(),
        }
    }
}

/// A waypoint.
///
/// Record layout (40 bytes): name pointer at 0x00, position at 0x08, flag
/// bitset at 0x14, link count at 0x18, pointer to the link pointer array at
/// 0x20.
#[derive(Debug, Default)]
pub struct Waypoint {
    pub name: String,
    pub position: [f32; 3],
    /// Hardware-packed flag bits (bit-mirrored on big-endian targets).
    pub flags: u32,
    links: Vec<Weak<RefCell<NavLink>>>,
}

impl Waypoint {
    /// A waypoint at `position` named `name`.
    pub fn new(name: impl Into<String>, position: [f32; 3]) -> Self {
        Self {
            name: name.into(),
            position,
            flags: 0,
            links: Vec::new(),
        }
    }

    /// The links that depart from or arrive at this waypoint, skipping any
    /// whose owning mesh has dropped them.
    pub fn links(&self) -> Vec<Rc<RefCell<NavLink>>> {
        self.links.iter().filter_map(Weak::upgrade).collect()
    }

    /// Replace the link list (stored weakly; the mesh owns the strong refs).
    pub fn set_links(&mut self, links: &[Rc<RefCell<NavLink>>]) {
        self.links = links.iter().map(Rc::downgrade).collect();
    }
}

/// A traversable edge between two waypoints.
///
/// Record layout (32 bytes): from/to pointers at 0x00/0x08, width at 0x10,
/// one-way wide boolean at 0x14.
#[derive(Debug, Default)]
pub struct NavLink {
    pub from: Option<Rc<RefCell<Waypoint>>>,
    pub to: Option<Rc<RefCell<Waypoint>>>,
    pub width: f32,
    pub one_way: bool,
}

/// An AI racing line.
///
/// Record layout (32 bytes): lap flag (narrow boolean) at 0x00, segment
/// count at 0x04, marker node pointer at 0x08, pointer to the packed segment
/// array at 0x10.
#[derive(Debug, Default)]
pub struct RacingLine {
    /// Whether the line closes into a lap.
    pub lap: bool,
    /// The scene node marking this line, resolved through the database
    /// registry by uid.
    pub marker: Option<Rc<RefCell<SceneNode>>>,
    pub segments: Vec<RacingSegment>,
}

/// One step of a racing line.
///
/// Record layout (16 bytes): waypoint pointer at 0x00, entry speed at 0x08.
#[derive(Debug, Default)]
pub struct RacingSegment {
    pub waypoint: Option<Rc<RefCell<Waypoint>>>,
    pub speed: f32,
}

// -- Serialization --

impl ResourceSerializable for NavMesh {
    fn load(&mut self, ctx: &mut LoadContext<'_>) -> Result<(), ResourceError> {
        let base = ctx.position();
        self.version = ctx.version();
        let waypoint_count = ctx.read_u32(base) as usize;
        let link_count = ctx.read_u32(base + 0x04) as usize;

        // Pointer fields occupy fixed 8-byte slots regardless of the
        // platform's pointer width, so each array read re-seats the cursor.
        ctx.set_position(base + 0x08);
        self.waypoints = ctx.load_pointer_array::<Waypoint>(waypoint_count)?;
        ctx.set_position(base + 0x10);
        self.links = ctx.load_pointer_array::<NavLink>(link_count)?;

        if self.version >= 2 {
            let line_count = ctx.read_u32(base + 0x18) as usize;
            ctx.set_position(base + 0x20);
            self.racing_lines = ctx.load_array_pointer::<RacingLine>(line_count)?;
        }
        Ok(())
    }

    fn save(&self, ctx: &mut SaveContext, buffer: &SaveBuffer) {
        let pointer_size = ctx.platform().pointer_size();
        ctx.write_u32(buffer, 0x00, self.waypoints.len() as u32);
        ctx.write_u32(buffer, 0x04, self.links.len() as u32);

        if !self.waypoints.is_empty() {
            let array = ctx.save_generic_pointer(
                buffer,
                0x08,
                self.waypoints.len() * pointer_size,
                16,
            );
            for (i, waypoint) in self.waypoints.iter().enumerate() {
                ctx.save_shared_pointer(&array, Some(waypoint), i * pointer_size, 16);
            }
        }
        if !self.links.is_empty() {
            let array =
                ctx.save_generic_pointer(buffer, 0x10, self.links.len() * pointer_size, 16);
            for (i, link) in self.links.iter().enumerate() {
                ctx.save_shared_pointer(&array, Some(link), i * pointer_size, 16);
            }
        }

        if self.version >= 2 {
            ctx.write_u32(buffer, 0x18, self.racing_lines.len() as u32);
            if !self.racing_lines.is_empty() {
                let array = ctx.save_generic_pointer(
                    buffer,
                    0x20,
                    self.racing_lines.len() * RACING_LINE_SIZE,
                    16,
                );
                for (i, line) in self.racing_lines.iter().enumerate() {
                    line.save(ctx, &array.at(i * RACING_LINE_SIZE, RACING_LINE_SIZE));
                }
            }
        }
    }

    fn serialized_size(&self) -> usize {
        if self.version < 2 {
            NAV_MESH_SIZE_V1
        } else {
            NAV_MESH_SIZE
        }
    }
}

impl ResourceSerializable for Waypoint {
    fn load(&mut self, ctx: &mut LoadContext<'_>) -> Result<(), ResourceError> {
        let base = ctx.position();
        self.name = ctx.read_string_pointer(base);
        self.position = ctx.read_f32x3(base + 0x08);
        self.flags = ctx.read_bitset32(base + 0x14);
        let link_count = ctx.read_u32(base + 0x18) as usize;
        ctx.set_position(base + 0x20);
        let links = ctx.load_pointer_array::<NavLink>(link_count)?;
        self.links = links.iter().map(Rc::downgrade).collect();
        Ok(())
    }

    fn save(&self, ctx: &mut SaveContext, buffer: &SaveBuffer) {
        let pointer_size = ctx.platform().pointer_size();
        ctx.write_string_pointer(buffer, &self.name, 0x00, false);
        ctx.write_f32x3(buffer, 0x08, self.position);
        ctx.write_bitset32(buffer, 0x14, self.flags);
        let links = self.links();
        ctx.write_u32(buffer, 0x18, links.len() as u32);
        if !links.is_empty() {
            let array =
                ctx.save_generic_pointer(buffer, 0x20, links.len() * pointer_size, 16);
            for (i, link) in links.iter().enumerate() {
                ctx.save_shared_pointer(&array, Some(link), i * pointer_size, 16);
            }
        }
    }

    fn serialized_size(&self) -> usize {
        WAYPOINT_SIZE
    }
}

impl ResourceSerializable for NavLink {
    fn load(&mut self, ctx: &mut LoadContext<'_>) -> Result<(), ResourceError> {
        let base = ctx.position();
        self.from = ctx.load_shared_pointer_at::<Waypoint>(base)?;
        self.to = ctx.load_shared_pointer_at::<Waypoint>(base + 0x08)?;
        self.width = ctx.read_f32(base + 0x10);
        self.one_way = ctx.read_bool(base + 0x14, true);
        Ok(())
    }

    fn save(&self, ctx: &mut SaveContext, buffer: &SaveBuffer) {
        ctx.save_shared_pointer(buffer, self.from.as_ref(), 0x00, 16);
        ctx.save_shared_pointer(buffer, self.to.as_ref(), 0x08, 16);
        ctx.write_f32(buffer, 0x10, self.width);
        ctx.write_bool(buffer, 0x14, self.one_way, true);
    }

    fn serialized_size(&self) -> usize {
        LINK_SIZE
    }
}

impl ResourceSerializable for RacingLine {
    fn load(&mut self, ctx: &mut LoadContext<'_>) -> Result<(), ResourceError> {
        let base = ctx.position();
        self.lap = ctx.read_bool(base, false);
        let segment_count = ctx.read_u32(base + 0x04) as usize;
        self.marker = ctx.load_node_pointer_at(base + 0x08);
        ctx.set_position(base + 0x10);
        self.segments = ctx.load_array_pointer::<RacingSegment>(segment_count)?;
        Ok(())
    }

    fn save(&self, ctx: &mut SaveContext, buffer: &SaveBuffer) {
        ctx.write_bool(buffer, 0x00, self.lap, false);
        ctx.write_u32(buffer, 0x04, self.segments.len() as u32);
        ctx.write_node_pointer(buffer, self.marker.as_ref(), 0x08);
        if !self.segments.is_empty() {
            let array = ctx.save_generic_pointer(
                buffer,
                0x10,
                self.segments.len() * RACING_SEGMENT_SIZE,
                16,
            );
            for (i, segment) in self.segments.iter().enumerate() {
                segment.save(ctx, &array.at(i * RACING_SEGMENT_SIZE, RACING_SEGMENT_SIZE));
            }
        }
    }

    fn serialized_size(&self) -> usize {
        RACING_LINE_SIZE
    }
}

impl ResourceSerializable for RacingSegment {
    fn load(&mut self, ctx: &mut LoadContext<'_>) -> Result<(), ResourceError> {
        let base = ctx.position();
        self.waypoint = ctx.load_shared_pointer_at::<Waypoint>(base)?;
        self.speed = ctx.read_f32(base + 0x08);
        Ok(())
    }

    fn save(&self, ctx: &mut SaveContext, buffer: &SaveBuffer) {
        ctx.save_shared_pointer(buffer, self.waypoint.as_ref(), 0x00, 16);
        ctx.write_f32(buffer, 0x08, self.speed);
    }

    fn serialized_size(&self) -> usize {
        RACING_SEGMENT_SIZE
    }
}
