//! The load context.
//!
//! [`LoadContext`] walks one chunk's byte blob plus its relocation table and
//! materializes an object graph from it. It owns the read cursor, the
//! address biases, and the deduplication map that guarantees one source
//! address becomes exactly one in-memory object, including through cycles,
//! because a shared record is registered in the map *before* its `load`
//! runs, so a reference back to an address that is still mid-load resolves
//! to the in-progress object instead of recursing forever.
//!
//! Reads never fail: a range past the end of the blob yields zero/default
//! values, and array counts above [`MAX_ARRAY_LEN`] are dropped with a
//! warning. The only fatal conditions are structural (see
//! [`ResourceError`](crate::ResourceError)), raised by record `load`
//! implementations themselves.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::buffer;
use crate::error::ResourceError;
use crate::platform::Platform;
use crate::relocation::Relocation;
use crate::scene::{NodeRegistry, SceneNode};
use crate::serializable::ResourceSerializable;

/// Sanity ceiling for array counts read from a blob.
///
/// A count above this is treated as corruption: the load logs a warning and
/// produces an empty collection rather than attempting a huge allocation.
pub const MAX_ARRAY_LEN: usize = 0x0010_0000;

/// A shared record the context has already materialized, keyed by the source
/// address it was first seen at.
struct SharedEntry {
    object: Rc<dyn Any>,
    /// Byte footprint captured at registration, used to advance the cursor
    /// on a cache hit without touching the (possibly mid-load) object.
    size: usize,
}

/// State for one load pass over one blob.
pub struct LoadContext<'a> {
    data: &'a [u8],
    gpu_data: &'a [u8],
    relocations: &'a [Relocation],
    platform: Platform,
    version: u32,
    position: usize,
    base: usize,
    gpu_base: usize,
    registry: Option<Rc<RefCell<NodeRegistry>>>,
    shared: HashMap<usize, SharedEntry>,
}

impl<'a> LoadContext<'a> {
    /// Create a context over a CPU blob and its relocation table.
    pub fn new(
        data: &'a [u8],
        relocations: &'a [Relocation],
        platform: Platform,
        version: u32,
    ) -> Self {
        Self {
            data,
            gpu_data: &[],
            relocations,
            platform,
            version,
            position: 0,
            base: 0,
            gpu_base: 0,
            registry: None,
            shared: HashMap::new(),
        }
    }

    /// Attach the GPU-resident blob.
    #[must_use]
    pub fn with_gpu_data(mut self, gpu_data: &'a [u8]) -> Self {
        self.gpu_data = gpu_data;
        self
    }

    /// Bias resolved pointers by per-space base addresses.
    ///
    /// Used when several chunks are concatenated into one blob and pointers
    /// are chunk-relative.
    #[must_use]
    pub fn with_base(mut self, base: usize, gpu_base: usize) -> Self {
        self.base = base;
        self.gpu_base = gpu_base;
        self
    }

    /// Attach the node registry used to resolve node-uid pointers.
    #[must_use]
    pub fn with_registry(mut self, registry: Rc<RefCell<NodeRegistry>>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn set_position(&mut self, position: usize) {
        self.position = position;
    }

    fn big_endian(&self) -> bool {
        self.platform.is_big_endian()
    }

    /// Run `f` with the cursor moved to `address`, then restore it.
    fn at_address<R>(&mut self, address: usize, f: impl FnOnce(&mut Self) -> R) -> R {
        let saved = self.position;
        self.position = address;
        let result = f(self);
        self.position = saved;
        result
    }

    // -- Pure reads at explicit offsets --

    pub fn read_i8(&self, offset: usize) -> i8 {
        buffer::read_i8(self.data, offset)
    }

    pub fn read_u8(&self, offset: usize) -> u8 {
        buffer::read_u8(self.data, offset)
    }

    pub fn read_i16(&self, offset: usize) -> i16 {
        buffer::read_i16(self.data, offset, self.big_endian())
    }

    pub fn read_u16(&self, offset: usize) -> u16 {
        buffer::read_u16(self.data, offset, self.big_endian())
    }

    pub fn read_i32(&self, offset: usize) -> i32 {
        buffer::read_i32(self.data, offset, self.big_endian())
    }

    pub fn read_u32(&self, offset: usize) -> u32 {
        buffer::read_u32(self.data, offset, self.big_endian())
    }

    pub fn read_i64(&self, offset: usize) -> i64 {
        buffer::read_i64(self.data, offset, self.big_endian())
    }

    pub fn read_f32(&self, offset: usize) -> f32 {
        buffer::read_f32(self.data, offset, self.big_endian())
    }

    /// Read a 32-bit bitfield word.
    ///
    /// On big-endian targets the bit order is fully mirrored — a hardware
    /// bitfield-packing difference, distinct from the byte swap ordinary
    /// integers get.
    pub fn read_bitset32(&self, offset: usize) -> u32 {
        let value = buffer::read_u32(self.data, offset, self.big_endian());
        if self.big_endian() {
            value.reverse_bits()
        } else {
            value
        }
    }

    /// Read a boolean: one byte, or a full 32-bit word when `wide`.
    pub fn read_bool(&self, offset: usize, wide: bool) -> bool {
        if wide {
            self.read_i32(offset) != 0
        } else {
            self.read_u8(offset) != 0
        }
    }

    pub fn read_f32x2(&self, offset: usize) -> [f32; 2] {
        buffer::read_f32x2(self.data, offset, self.big_endian())
    }

    pub fn read_f32x3(&self, offset: usize) -> [f32; 3] {
        buffer::read_f32x3(self.data, offset, self.big_endian())
    }

    pub fn read_f32x4(&self, offset: usize) -> [f32; 4] {
        buffer::read_f32x4(self.data, offset, self.big_endian())
    }

    pub fn read_matrix(&self, offset: usize) -> [f32; 16] {
        buffer::read_matrix(self.data, offset, self.big_endian())
    }

    /// Read a pointer-width field at `offset` and resolve it through the
    /// relocation table.
    ///
    /// Returns the final address and whether it points into the GPU blob. A
    /// raw value of zero is always a null pointer (address 0) regardless of
    /// any relocation covering the field; a non-null value is biased by the
    /// matching address-space base.
    pub fn read_pointer(&self, offset: usize) -> (usize, bool) {
        let raw = if self.platform.is_64_bit() {
            buffer::read_u64(self.data, offset, self.big_endian()) as usize
        } else {
            buffer::read_u32(self.data, offset, self.big_endian()) as usize
        };
        let gpu = self
            .relocations
            .iter()
            .find(|r| r.offset as usize == offset)
            .is_some_and(|r| r.is_gpu_pointer());
        if raw == 0 {
            (0, gpu)
        } else if gpu {
            (raw + self.gpu_base, gpu)
        } else {
            (raw + self.base, gpu)
        }
    }

    /// Read a pointer at `offset` and, if non-null, the NUL-terminated
    /// string at its target. Null resolves to an empty string.
    pub fn read_string_pointer(&self, offset: usize) -> String {
        let (address, gpu) = self.read_pointer(offset);
        if address == 0 {
            return String::new();
        }
        let blob = if gpu { self.gpu_data } else { self.data };
        buffer::read_cstring(blob, address)
    }

    // -- Cursor-advancing reads --

    pub fn next_i8(&mut self) -> i8 {
        let value = self.read_i8(self.position);
        self.position += 1;
        value
    }

    pub fn next_u8(&mut self) -> u8 {
        let value = self.read_u8(self.position);
        self.position += 1;
        value
    }

    pub fn next_i16(&mut self) -> i16 {
        let value = self.read_i16(self.position);
        self.position += 2;
        value
    }

    pub fn next_u16(&mut self) -> u16 {
        let value = self.read_u16(self.position);
        self.position += 2;
        value
    }

    pub fn next_i32(&mut self) -> i32 {
        let value = self.read_i32(self.position);
        self.position += 4;
        value
    }

    pub fn next_u32(&mut self) -> u32 {
        let value = self.read_u32(self.position);
        self.position += 4;
        value
    }

    pub fn next_i64(&mut self) -> i64 {
        let value = self.read_i64(self.position);
        self.position += 8;
        value
    }

    pub fn next_f32(&mut self) -> f32 {
        let value = self.read_f32(self.position);
        self.position += 4;
        value
    }

    pub fn next_bitset32(&mut self) -> u32 {
        let value = self.read_bitset32(self.position);
        self.position += 4;
        value
    }

    pub fn next_bool(&mut self, wide: bool) -> bool {
        let value = self.read_bool(self.position, wide);
        self.position += if wide { 4 } else { 1 };
        value
    }

    pub fn next_f32x2(&mut self) -> [f32; 2] {
        let value = self.read_f32x2(self.position);
        self.position += 8;
        value
    }

    pub fn next_f32x3(&mut self) -> [f32; 3] {
        let value = self.read_f32x3(self.position);
        self.position += 12;
        value
    }

    pub fn next_f32x4(&mut self) -> [f32; 4] {
        let value = self.read_f32x4(self.position);
        self.position += 16;
        value
    }

    pub fn next_matrix(&mut self) -> [f32; 16] {
        let value = self.read_matrix(self.position);
        self.position += 64;
        value
    }

    pub fn next_pointer(&mut self) -> (usize, bool) {
        let value = self.read_pointer(self.position);
        self.position += self.platform.pointer_size();
        value
    }

    /// Skip `count` bytes (padding, reserved fields).
    pub fn skip(&mut self, count: usize) {
        self.position += count;
    }

    // -- Graph materialization --

    /// Materialize a shared record at the current position, deduplicated by
    /// source address.
    ///
    /// If this address has been materialized before, the cached object is
    /// returned without re-reading and the cursor advances by the size
    /// captured at registration. Otherwise a fresh default record is
    /// registered in the dedup map *before* `load` runs, so cycles back to
    /// this address resolve to the in-progress object; the cursor ends up at
    /// `start + serialized_size()`.
    pub fn load_shared_reference<T: ResourceSerializable>(
        &mut self,
    ) -> Result<Rc<RefCell<T>>, ResourceError> {
        let start = self.position;
        if let Some(entry) = self.shared.get(&start) {
            if let Ok(object) = Rc::clone(&entry.object).downcast::<RefCell<T>>() {
                self.position = start + entry.size;
                return Ok(object);
            }
            log::warn!("shared record at {start:#x} revisited as a different type");
        }

        let object: Rc<RefCell<T>> = Rc::new(RefCell::new(T::default()));
        let size = object.borrow().serialized_size();
        self.shared.insert(
            start,
            SharedEntry {
                object: Rc::clone(&object) as Rc<dyn Any>,
                size,
            },
        );
        object.borrow_mut().load(self)?;
        self.position = start + object.borrow().serialized_size();
        Ok(object)
    }

    /// Materialize an exclusively owned record at the current position.
    ///
    /// No dedup registration; callers use this when the record cannot be
    /// multiply referenced.
    pub fn load_unique_reference<T: ResourceSerializable>(&mut self) -> Result<T, ResourceError> {
        let start = self.position;
        let mut value = T::default();
        value.load(self)?;
        self.position = start + value.serialized_size();
        Ok(value)
    }

    /// Read a pointer at `offset` and materialize its unique target.
    pub fn load_pointer_at<T: ResourceSerializable>(
        &mut self,
        offset: usize,
    ) -> Result<Option<T>, ResourceError> {
        let (address, _) = self.read_pointer(offset);
        if address == 0 {
            return Ok(None);
        }
        self.at_address(address, |ctx| ctx.load_unique_reference::<T>())
            .map(Some)
    }

    /// Read a pointer at the cursor and materialize its unique target.
    pub fn load_pointer<T: ResourceSerializable>(&mut self) -> Result<Option<T>, ResourceError> {
        let offset = self.position;
        self.position += self.platform.pointer_size();
        self.load_pointer_at(offset)
    }

    /// Read a pointer at `offset` and materialize its shared target.
    pub fn load_shared_pointer_at<T: ResourceSerializable>(
        &mut self,
        offset: usize,
    ) -> Result<Option<Rc<RefCell<T>>>, ResourceError> {
        let (address, _) = self.read_pointer(offset);
        if address == 0 {
            return Ok(None);
        }
        self.at_address(address, |ctx| ctx.load_shared_reference::<T>())
            .map(Some)
    }

    /// Read a pointer at the cursor and materialize its shared target.
    pub fn load_shared_pointer<T: ResourceSerializable>(
        &mut self,
    ) -> Result<Option<Rc<RefCell<T>>>, ResourceError> {
        let offset = self.position;
        self.position += self.platform.pointer_size();
        self.load_shared_pointer_at(offset)
    }

    /// Clamp an untrusted count against [`MAX_ARRAY_LEN`].
    ///
    /// An out-of-range count is corruption: it is logged and becomes zero so
    /// the caller produces an empty collection.
    pub fn checked_count(&self, count: usize) -> usize {
        if count > MAX_ARRAY_LEN {
            log::warn!("array count {count} exceeds sanity ceiling {MAX_ARRAY_LEN}, dropping");
            0
        } else {
            count
        }
    }

    /// Read a pointer at the cursor to an array of `count` pointers, each
    /// materialized as a shared record. Null elements are skipped.
    pub fn load_pointer_array<T: ResourceSerializable>(
        &mut self,
        count: usize,
    ) -> Result<Vec<Rc<RefCell<T>>>, ResourceError> {
        let (base, _) = self.next_pointer();
        let count = self.checked_count(count);
        if base == 0 || count == 0 {
            return Ok(Vec::new());
        }
        self.at_address(base, |ctx| {
            let mut out = Vec::with_capacity(count);
            for _ in 0..count {
                if let Some(element) = ctx.load_shared_pointer::<T>()? {
                    out.push(element);
                }
            }
            Ok(out)
        })
    }

    /// Read a pointer at the cursor to a packed array of `count` records,
    /// each materialized as a shared record (consecutive in the blob).
    pub fn load_shared_array_pointer<T: ResourceSerializable>(
        &mut self,
        count: usize,
    ) -> Result<Vec<Rc<RefCell<T>>>, ResourceError> {
        let (base, _) = self.next_pointer();
        let count = self.checked_count(count);
        if base == 0 || count == 0 {
            return Ok(Vec::new());
        }
        self.at_address(base, |ctx| {
            let mut out = Vec::with_capacity(count);
            for _ in 0..count {
                out.push(ctx.load_shared_reference::<T>()?);
            }
            Ok(out)
        })
    }

    /// Read a pointer at the cursor to a packed array of `count` records,
    /// each materialized as an owned value.
    pub fn load_array_pointer<T: ResourceSerializable>(
        &mut self,
        count: usize,
    ) -> Result<Vec<T>, ResourceError> {
        self.load_array_pointer_with(count, |ctx| ctx.load_unique_reference::<T>())
    }

    /// Read a pointer at the cursor to a packed array of `count` elements,
    /// each produced by `reader`.
    pub fn load_array_pointer_with<T>(
        &mut self,
        count: usize,
        mut reader: impl FnMut(&mut LoadContext<'a>) -> Result<T, ResourceError>,
    ) -> Result<Vec<T>, ResourceError> {
        let (base, _) = self.next_pointer();
        let count = self.checked_count(count);
        if base == 0 || count == 0 {
            return Ok(Vec::new());
        }
        let saved = self.position;
        self.position = base;
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            match reader(self) {
                Ok(element) => out.push(element),
                Err(err) => {
                    self.position = saved;
                    return Err(err);
                }
            }
        }
        self.position = saved;
        Ok(out)
    }

    /// A read-only view of `size` bytes at `address`, clipped to the blob's
    /// actual bounds.
    pub fn load_buffer(&self, address: usize, size: usize, gpu: bool) -> &'a [u8] {
        let blob = if gpu { self.gpu_data } else { self.data };
        let start = address.min(blob.len());
        let end = address.saturating_add(size).min(blob.len());
        &blob[start..end]
    }

    /// Resolve a node uid through the owning database's registry.
    ///
    /// Uid 0, or a context without a registry, resolves to `None`.
    pub fn load_node(&self, uid: u32) -> Option<Rc<RefCell<SceneNode>>> {
        if uid == 0 {
            return None;
        }
        self.registry.as_ref()?.borrow().find(uid)
    }

    /// Read a pointer at `offset` to a node-uid cell and resolve the node.
    pub fn load_node_pointer_at(&self, offset: usize) -> Option<Rc<RefCell<SceneNode>>> {
        let (address, _) = self.read_pointer(offset);
        if address == 0 {
            return None;
        }
        let uid = buffer::read_u32(self.data, address, self.big_endian());
        self.load_node(uid)
    }

    /// Read a pointer at the cursor to a node-uid cell and resolve the node.
    pub fn load_node_pointer(&mut self) -> Option<Rc<RefCell<SceneNode>>> {
        let offset = self.position;
        self.position += self.platform.pointer_size();
        self.load_node_pointer_at(offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::save::SaveContext;
    use crate::save_buffer::SaveBuffer;
    use std::cell::Cell;

    thread_local! {
        static LOAD_CALLS: Cell<usize> = const { Cell::new(0) };
    }

    /// Eight-byte test record: a u32 value and a u32 pad.
    #[derive(Default)]
    struct Probe {
        value: u32,
    }

    impl ResourceSerializable for Probe {
        fn load(&mut self, ctx: &mut LoadContext<'_>) -> Result<(), ResourceError> {
            LOAD_CALLS.with(|calls| calls.set(calls.get() + 1));
            self.value = ctx.next_u32();
            ctx.skip(4);
            Ok(())
        }

        fn save(&self, ctx: &mut SaveContext, buffer: &SaveBuffer) {
            ctx.write_u32(buffer, 0, self.value);
        }

        fn serialized_size(&self) -> usize {
            8
        }
    }

    #[test]
    fn cursor_reads_advance() {
        let blob: [u8; 12] = [4, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0];
        let mut ctx = LoadContext::new(&blob, &[], Platform::Win32, 2);
        assert_eq!(ctx.next_i32(), 4);
        assert_eq!(ctx.next_i32(), 1);
        assert_eq!(ctx.next_i32(), 0);
        assert_eq!(ctx.position(), 12);
        // Past the end: defaults, cursor still advances.
        assert_eq!(ctx.next_i32(), 0);
        assert_eq!(ctx.position(), 16);
    }

    #[test]
    fn booleans_narrow_and_wide() {
        let blob: [u8; 8] = [0, 1, 0, 0, 2, 0, 0, 0];
        let ctx = LoadContext::new(&blob, &[], Platform::Win32, 2);
        assert!(!ctx.read_bool(0, false));
        assert!(ctx.read_bool(1, false));
        assert!(ctx.read_bool(4, true));
        // Wide read at 0 sees bytes [0, 1, 0, 0] — non-zero as an i32.
        assert!(ctx.read_bool(0, true));
    }

    #[test]
    fn bitset32_mirrors_on_big_endian() {
        // A big-endian blob stores the bit-mirrored word.
        let mut blob = Vec::new();
        buffer::write_u32(&mut blob, 0, 0x0000_0003u32.reverse_bits(), true);
        let ctx = LoadContext::new(&blob, &[], Platform::WiiU, 2);
        assert_eq!(ctx.read_bitset32(0), 0x0000_0003);
        // Distinct from a plain byte-swapped integer read.
        assert_eq!(ctx.read_u32(0), 0xC000_0000);

        // Little-endian blobs store the word as-is.
        let mut le_blob = Vec::new();
        buffer::write_u32(&mut le_blob, 0, 0x0000_0003, false);
        let ctx = LoadContext::new(&le_blob, &[], Platform::Win32, 2);
        assert_eq!(ctx.read_bitset32(0), 0x0000_0003);
    }

    #[test]
    fn pointer_resolution_null_and_base() {
        let mut blob = Vec::new();
        buffer::write_u32(&mut blob, 0, 0, false);
        buffer::write_u32(&mut blob, 4, 0x20, false);
        buffer::write_u32(&mut blob, 8, 0x20, false);
        let relocations = [Relocation::pointer(4), Relocation::gpu_pointer(8)];
        let ctx = LoadContext::new(&blob, &relocations, Platform::Win32, 2).with_base(0x100, 0x1000);

        // Zero raw value is null even under a relocation.
        assert_eq!(ctx.read_pointer(0), (0, false));
        assert_eq!(ctx.read_pointer(4), (0x120, false));
        assert_eq!(ctx.read_pointer(8), (0x1020, true));
    }

    #[test]
    fn pointer_width_follows_platform() {
        let mut blob = Vec::new();
        buffer::write_u64(&mut blob, 0, 0x40, false);
        let relocations = [Relocation::pointer(0)];
        let mut ctx64 = LoadContext::new(&blob, &relocations, Platform::Win64, 2);
        assert_eq!(ctx64.next_pointer(), (0x40, false));
        assert_eq!(ctx64.position(), 8);

        let mut ctx32 = LoadContext::new(&blob, &relocations, Platform::Win32, 2);
        assert_eq!(ctx32.next_pointer(), (0x40, false));
        assert_eq!(ctx32.position(), 4);
    }

    #[test]
    fn string_pointer_null_is_empty() {
        let mut blob = Vec::new();
        buffer::write_u32(&mut blob, 0, 0, false);
        buffer::write_u32(&mut blob, 4, 12, false);
        blob.extend_from_slice(&[0, 0, 0, 0]); // pad to 12
        blob.extend_from_slice(b"abc\0");
        let relocations = [Relocation::pointer(4)];
        let ctx = LoadContext::new(&blob, &relocations, Platform::Win32, 2);
        assert_eq!(ctx.read_string_pointer(0), "");
        assert_eq!(ctx.read_string_pointer(4), "abc");
    }

    #[test]
    fn shared_reference_dedup_loads_once() {
        // Two pointer fields, both targeting the record at 0x10.
        let mut blob = Vec::new();
        buffer::write_u32(&mut blob, 0, 0x10, false);
        buffer::write_u32(&mut blob, 4, 0x10, false);
        buffer::write_u32(&mut blob, 0x10, 77, false);
        buffer::write_u32(&mut blob, 0x14, 0, false);
        let relocations = [Relocation::pointer(0), Relocation::pointer(4)];
        let mut ctx = LoadContext::new(&blob, &relocations, Platform::Win32, 2);

        LOAD_CALLS.with(|calls| calls.set(0));
        let first = ctx.load_shared_pointer_at::<Probe>(0).unwrap().unwrap();
        let second = ctx.load_shared_pointer_at::<Probe>(4).unwrap().unwrap();
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(first.borrow().value, 77);
        assert_eq!(LOAD_CALLS.with(|calls| calls.get()), 1);
    }

    #[test]
    fn oversized_count_yields_empty() {
        let mut blob = Vec::new();
        buffer::write_u32(&mut blob, 0, 0x10, false);
        let relocations = [Relocation::pointer(0)];
        let mut ctx = LoadContext::new(&blob, &relocations, Platform::Win32, 2);
        let out = ctx.load_pointer_array::<Probe>(MAX_ARRAY_LEN + 1).unwrap();
        assert!(out.is_empty());
        // Cursor still advanced past the array pointer.
        assert_eq!(ctx.position(), 4);
    }

    #[test]
    fn packed_shared_array_advances_per_element() {
        let mut blob = Vec::new();
        buffer::write_u32(&mut blob, 0, 0x10, false);
        buffer::write_u32(&mut blob, 0x10, 1, false);
        buffer::write_u32(&mut blob, 0x18, 2, false);
        buffer::write_u32(&mut blob, 0x20, 3, false);
        let relocations = [Relocation::pointer(0)];
        let mut ctx = LoadContext::new(&blob, &relocations, Platform::Win32, 2);
        let records = ctx.load_shared_array_pointer::<Probe>(3).unwrap();
        let values: Vec<u32> = records.iter().map(|r| r.borrow().value).collect();
        assert_eq!(values, [1, 2, 3]);
    }

    #[test]
    fn load_buffer_clips_to_bounds() {
        let blob = [1u8, 2, 3, 4];
        let ctx = LoadContext::new(&blob, &[], Platform::Win32, 2);
        assert_eq!(ctx.load_buffer(2, 100, false), &[3, 4]);
        assert_eq!(ctx.load_buffer(100, 4, false), &[] as &[u8]);
    }
}
