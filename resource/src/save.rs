//! The save context.
//!
//! [`SaveContext`] is the inverse of the load context: it assigns fresh
//! addresses in two independent address spaces (CPU and GPU) with a pure
//! bump allocator, serializes typed values into [`SaveBuffer`] views, and
//! appends a [`Relocation`] record whenever a pointer-shaped field is
//! written. Null references write a zero field and emit no relocation —
//! zero always reads back as null.
//!
//! Shared records are deduplicated by object identity: the first save site
//! allocates and serializes the record, later sites point at the same
//! allocation. The address is registered *before* the record's `save` runs,
//! so reference cycles terminate.
//!
//! Addresses are assigned in call order, so two saves of the same graph need
//! not be byte-identical; the contract is that a reload reconstructs an
//! equivalent graph.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::buffer;
use crate::platform::Platform;
use crate::relocation::Relocation;
use crate::save_buffer::SaveBuffer;
use crate::scene::SceneNode;
use crate::serializable::ResourceSerializable;

/// The flat blobs and relocation table produced by one save pass.
pub struct SaveOutput {
    /// CPU-resident blob.
    pub data: Vec<u8>,
    /// GPU-resident blob.
    pub gpu_data: Vec<u8>,
    /// Relocations for pointer fields inside `data`.
    pub relocations: Vec<Relocation>,
}

/// State for one save pass.
pub struct SaveContext {
    platform: Platform,
    version: u32,
    cpu_size: usize,
    gpu_size: usize,
    relocations: Vec<Relocation>,
    allocations: Vec<SaveBuffer>,
    /// Shared-record identity (`Rc` pointer) → allocated blob address.
    saved_shared: HashMap<usize, usize>,
    /// Node uid → address of its uid cell.
    node_cells: HashMap<u32, usize>,
}

fn align_up(value: usize, align: usize) -> usize {
    if align <= 1 {
        value
    } else {
        value.div_ceil(align) * align
    }
}

impl SaveContext {
    pub fn new(platform: Platform, version: u32) -> Self {
        Self {
            platform,
            version,
            cpu_size: 0,
            gpu_size: 0,
            relocations: Vec::new(),
            allocations: Vec::new(),
            saved_shared: HashMap::new(),
            node_cells: HashMap::new(),
        }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Relocations emitted so far.
    pub fn relocations(&self) -> &[Relocation] {
        &self.relocations
    }

    fn big_endian(&self) -> bool {
        self.platform.is_big_endian()
    }

    // -- Allocation --

    /// Reserve `size` bytes at the next `align`-aligned address in the CPU
    /// or GPU space and return a fresh view over the reservation.
    ///
    /// Pure bump allocation: no reuse, no free; the cursor only moves
    /// forward for the lifetime of the pass.
    pub fn allocate(&mut self, size: usize, align: usize, gpu: bool) -> SaveBuffer {
        let cursor = if gpu {
            &mut self.gpu_size
        } else {
            &mut self.cpu_size
        };
        let address = align_up(*cursor, align);
        *cursor = address + size;
        let allocation = SaveBuffer::root(address, size, gpu);
        self.allocations.push(allocation.clone());
        allocation
    }

    // -- Pointer-emitting operations --

    fn write_pointer_value(&mut self, buffer: &SaveBuffer, offset: usize, address: usize) {
        let big_endian = self.big_endian();
        if self.platform.is_64_bit() {
            buffer.with_storage(|storage, base| {
                buffer::write_u64(storage, base + offset, address as u64, big_endian);
            });
        } else {
            buffer.with_storage(|storage, base| {
                buffer::write_u32(storage, base + offset, address as u32, big_endian);
            });
        }
    }

    fn emit_relocation(&mut self, buffer: &SaveBuffer, offset: usize, gpu: bool) {
        let field_address = (buffer.address() + offset) as u32;
        let relocation = if gpu {
            Relocation::gpu_pointer(field_address)
        } else {
            Relocation::pointer(field_address)
        };
        self.relocations.push(relocation);
    }

    /// Write a raw pointer value at `offset` within `buffer` and record a
    /// plain pointer relocation for the field.
    ///
    /// Used when the caller performed the pointed-to allocation itself.
    pub fn write_pointer_at_offset(&mut self, buffer: &SaveBuffer, offset: usize, address: usize) {
        self.write_pointer_value(buffer, offset, address);
        self.emit_relocation(buffer, offset, false);
    }

    /// Allocate `size` CPU bytes, point the field at `offset` within
    /// `buffer` at the allocation, and return the allocation for the caller
    /// to populate.
    pub fn save_generic_pointer(
        &mut self,
        buffer: &SaveBuffer,
        offset: usize,
        size: usize,
        align: usize,
    ) -> SaveBuffer {
        let allocation = self.allocate(size, align, false);
        self.write_pointer_at_offset(buffer, offset, allocation.address());
        allocation
    }

    /// Serialize an exclusively owned record behind a pointer field.
    ///
    /// An absent record leaves the field zero and emits no relocation.
    pub fn save_pointer<T: ResourceSerializable>(
        &mut self,
        buffer: &SaveBuffer,
        entity: Option<&T>,
        offset: usize,
        align: usize,
    ) {
        let Some(entity) = entity else {
            return;
        };
        let allocation = self.allocate(entity.serialized_size(), align, false);
        entity.save(self, &allocation);
        self.write_pointer_at_offset(buffer, offset, allocation.address());
    }

    /// Serialize a shared record behind a pointer field, deduplicated by
    /// `Rc` identity: the first site allocates and serializes, later sites
    /// reuse the address. Registration happens before the record's `save`
    /// runs so cycles terminate.
    pub fn save_shared_pointer<T: ResourceSerializable>(
        &mut self,
        buffer: &SaveBuffer,
        entity: Option<&Rc<RefCell<T>>>,
        offset: usize,
        align: usize,
    ) {
        let Some(entity) = entity else {
            return;
        };
        let key = Rc::as_ptr(entity) as usize;
        let address = match self.saved_shared.get(&key) {
            Some(&address) => address,
            None => {
                let record = entity.borrow();
                let allocation = self.allocate(record.serialized_size(), align, false);
                self.saved_shared.insert(key, allocation.address());
                record.save(self, &allocation);
                allocation.address()
            }
        };
        self.write_pointer_value(buffer, offset, address);
        self.emit_relocation(buffer, offset, false);
    }

    /// Write a raw byte payload behind a pointer field, into the CPU or GPU
    /// space. Empty payloads leave the field null.
    pub fn save_buffer_pointer(
        &mut self,
        buffer: &SaveBuffer,
        bytes: &[u8],
        offset: usize,
        align: usize,
        gpu: bool,
    ) {
        if bytes.is_empty() {
            return;
        }
        let allocation = self.allocate(bytes.len(), align, gpu);
        allocation.write_bytes(0, bytes);
        self.write_pointer_value(buffer, offset, allocation.address());
        self.emit_relocation(buffer, offset, gpu);
    }

    /// Write a NUL-terminated string behind a pointer field.
    ///
    /// Empty text with `allow_empty = false` leaves the field null; with
    /// `allow_empty = true` a lone terminator is written.
    pub fn write_string_pointer(
        &mut self,
        buffer: &SaveBuffer,
        text: &str,
        offset: usize,
        allow_empty: bool,
    ) {
        if text.is_empty() && !allow_empty {
            return;
        }
        let allocation = self.allocate(text.len() + 1, 1, false);
        allocation.write_bytes(0, text.as_bytes());
        allocation.write_bytes(text.len(), &[0]);
        self.write_pointer_at_offset(buffer, offset, allocation.address());
    }

    /// Write a node reference behind a pointer field.
    ///
    /// Nodes are referenced through a small cell holding the node's uid —
    /// uids resolve back to live nodes at load time through the database
    /// registry, so many save sites can reach one node without byte-level
    /// object identity. One cell is shared per uid. A null node leaves the
    /// field zero.
    pub fn write_node_pointer(
        &mut self,
        buffer: &SaveBuffer,
        node: Option<&Rc<RefCell<SceneNode>>>,
        offset: usize,
    ) {
        let Some(node) = node else {
            return;
        };
        let uid = node.borrow().uid;
        if uid == 0 {
            log::warn!("node pointer to an unregistered node (uid 0), writing null");
            return;
        }
        let address = match self.node_cells.get(&uid) {
            Some(&address) => address,
            None => {
                let cell = self.allocate(8, 4, false);
                self.write_u32(&cell, 0, uid);
                self.node_cells.insert(uid, cell.address());
                cell.address()
            }
        };
        self.write_pointer_at_offset(buffer, offset, address);
    }

    // -- Typed value writes --

    pub fn write_u8(&mut self, buffer: &SaveBuffer, offset: usize, value: u8) {
        buffer.with_storage(|storage, base| buffer::write_u8(storage, base + offset, value));
    }

    pub fn write_u16(&mut self, buffer: &SaveBuffer, offset: usize, value: u16) {
        let big_endian = self.big_endian();
        buffer.with_storage(|storage, base| {
            buffer::write_u16(storage, base + offset, value, big_endian);
        });
    }

    pub fn write_i32(&mut self, buffer: &SaveBuffer, offset: usize, value: i32) {
        let big_endian = self.big_endian();
        buffer.with_storage(|storage, base| {
            buffer::write_i32(storage, base + offset, value, big_endian);
        });
    }

    pub fn write_u32(&mut self, buffer: &SaveBuffer, offset: usize, value: u32) {
        let big_endian = self.big_endian();
        buffer.with_storage(|storage, base| {
            buffer::write_u32(storage, base + offset, value, big_endian);
        });
    }

    pub fn write_f32(&mut self, buffer: &SaveBuffer, offset: usize, value: f32) {
        let big_endian = self.big_endian();
        buffer.with_storage(|storage, base| {
            buffer::write_f32(storage, base + offset, value, big_endian);
        });
    }

    pub fn write_f32x2(&mut self, buffer: &SaveBuffer, offset: usize, value: [f32; 2]) {
        let big_endian = self.big_endian();
        buffer.with_storage(|storage, base| {
            buffer::write_f32x2(storage, base + offset, value, big_endian);
        });
    }

    pub fn write_f32x3(&mut self, buffer: &SaveBuffer, offset: usize, value: [f32; 3]) {
        let big_endian = self.big_endian();
        buffer.with_storage(|storage, base| {
            buffer::write_f32x3(storage, base + offset, value, big_endian);
        });
    }

    pub fn write_f32x4(&mut self, buffer: &SaveBuffer, offset: usize, value: [f32; 4]) {
        let big_endian = self.big_endian();
        buffer.with_storage(|storage, base| {
            buffer::write_f32x4(storage, base + offset, value, big_endian);
        });
    }

    pub fn write_matrix(&mut self, buffer: &SaveBuffer, offset: usize, value: &[f32; 16]) {
        let big_endian = self.big_endian();
        buffer.with_storage(|storage, base| {
            buffer::write_matrix(storage, base + offset, value, big_endian);
        });
    }

    /// Write a boolean: one byte, or a full 32-bit word when `wide`.
    pub fn write_bool(&mut self, buffer: &SaveBuffer, offset: usize, value: bool, wide: bool) {
        if wide {
            self.write_i32(buffer, offset, value as i32);
        } else {
            self.write_u8(buffer, offset, value as u8);
        }
    }

    /// Write a 32-bit bitfield word, mirroring the bit order on big-endian
    /// targets (inverse of `LoadContext::read_bitset32`).
    pub fn write_bitset32(&mut self, buffer: &SaveBuffer, offset: usize, value: u32) {
        let value = if self.big_endian() {
            value.reverse_bits()
        } else {
            value
        };
        self.write_u32(buffer, offset, value);
    }

    // -- Finalization --

    /// Compose every allocation into flat CPU and GPU blobs at its assigned
    /// address and hand back the relocation list.
    pub fn finish(self) -> SaveOutput {
        let mut data = vec![0u8; self.cpu_size];
        let mut gpu_data = vec![0u8; self.gpu_size];
        for allocation in &self.allocations {
            let bytes = allocation.to_vec();
            let target = if allocation.is_gpu() {
                &mut gpu_data
            } else {
                &mut data
            };
            let start = allocation.address();
            target[start..start + bytes.len()].copy_from_slice(&bytes);
        }
        SaveOutput {
            data,
            gpu_data,
            relocations: self.relocations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResourceError;
    use crate::load::LoadContext;
    use crate::relocation::RelocationKind;

    #[derive(Default)]
    struct Pair {
        left: u32,
        right: u32,
    }

    impl ResourceSerializable for Pair {
        fn load(&mut self, ctx: &mut LoadContext<'_>) -> Result<(), ResourceError> {
            self.left = ctx.next_u32();
            self.right = ctx.next_u32();
            Ok(())
        }

        fn save(&self, ctx: &mut SaveContext, buffer: &SaveBuffer) {
            ctx.write_u32(buffer, 0, self.left);
            ctx.write_u32(buffer, 4, self.right);
        }

        fn serialized_size(&self) -> usize {
            8
        }
    }

    #[test]
    fn bump_allocation_is_monotonic_and_aligned() {
        let mut ctx = SaveContext::new(Platform::Win32, 2);
        let a = ctx.allocate(3, 16, false);
        let b = ctx.allocate(4, 16, false);
        let g = ctx.allocate(8, 16, true);
        assert_eq!(a.address(), 0);
        assert_eq!(b.address(), 16);
        // GPU space has its own cursor.
        assert_eq!(g.address(), 0);
    }

    #[test]
    fn string_pointer_scenario() {
        let mut ctx = SaveContext::new(Platform::Win32, 2);
        let root = ctx.allocate(16, 4, false);
        ctx.write_string_pointer(&root, "abc", 0, false);

        assert_eq!(ctx.relocations().len(), 1);
        let reloc = ctx.relocations()[0];
        assert_eq!(reloc.kind(), RelocationKind::Pointer);
        assert_eq!(reloc.offset, 0);

        let output = ctx.finish();
        let text_address = buffer::read_u32(&output.data, 0, false) as usize;
        assert_eq!(&output.data[text_address..text_address + 4], b"abc\0");
    }

    #[test]
    fn empty_string_stays_null() {
        let mut ctx = SaveContext::new(Platform::Win32, 2);
        let root = ctx.allocate(16, 4, false);
        ctx.write_string_pointer(&root, "", 0, false);
        assert!(ctx.relocations().is_empty());

        ctx.write_string_pointer(&root, "", 4, true);
        assert_eq!(ctx.relocations().len(), 1);

        let output = ctx.finish();
        assert_eq!(buffer::read_u32(&output.data, 0, false), 0);
        let nul_address = buffer::read_u32(&output.data, 4, false) as usize;
        assert_eq!(output.data[nul_address], 0);
    }

    #[test]
    fn absent_records_emit_nothing() {
        let mut ctx = SaveContext::new(Platform::Win32, 2);
        let root = ctx.allocate(32, 4, false);
        ctx.save_pointer::<Pair>(&root, None, 0, 4);
        ctx.save_shared_pointer::<Pair>(&root, None, 8, 4);
        ctx.write_node_pointer(&root, None, 16);
        ctx.save_buffer_pointer(&root, &[], 24, 4, true);
        assert!(ctx.relocations().is_empty());
        let output = ctx.finish();
        assert!(output.data.iter().all(|&b| b == 0));
        assert!(output.gpu_data.is_empty());
    }

    #[test]
    fn shared_records_allocate_once() {
        let mut ctx = SaveContext::new(Platform::Win32, 2);
        let root = ctx.allocate(16, 4, false);
        let record = Rc::new(RefCell::new(Pair { left: 5, right: 6 }));
        ctx.save_shared_pointer(&root, Some(&record), 0, 4);
        ctx.save_shared_pointer(&root, Some(&record), 8, 4);

        assert_eq!(ctx.relocations().len(), 2);
        let output = ctx.finish();
        let first = buffer::read_u32(&output.data, 0, false);
        let second = buffer::read_u32(&output.data, 8, false);
        assert_eq!(first, second);
        // One 8-byte record after the 16-byte root.
        assert_eq!(output.data.len(), 24);
    }

    #[test]
    fn gpu_buffer_pointer_is_tagged() {
        let mut ctx = SaveContext::new(Platform::Win32, 2);
        let root = ctx.allocate(16, 4, false);
        ctx.save_buffer_pointer(&root, &[1, 2, 3, 4], 0, 16, true);
        assert_eq!(ctx.relocations().len(), 1);
        assert!(ctx.relocations()[0].is_gpu_pointer());
        let output = ctx.finish();
        assert_eq!(output.gpu_data, vec![1, 2, 3, 4]);
    }

    #[test]
    fn pointer_width_follows_platform() {
        let mut ctx = SaveContext::new(Platform::Win64, 2);
        let root = ctx.allocate(16, 8, false);
        let payload = ctx.save_generic_pointer(&root, 0, 8, 8);
        ctx.write_u32(&payload, 0, 42);
        let output = ctx.finish();
        assert_eq!(buffer::read_u64(&output.data, 0, false), 16);
        assert_eq!(buffer::read_u32(&output.data, 16, false), 42);
    }

    #[test]
    fn saved_record_reads_back() {
        let mut ctx = SaveContext::new(Platform::WiiU, 2);
        let root = ctx.allocate(8, 4, false);
        let record = Pair { left: 7, right: 9 };
        ctx.save_pointer(&root, Some(&record), 0, 4);
        let output = ctx.finish();

        let mut load = LoadContext::new(&output.data, &output.relocations, Platform::WiiU, 2);
        let reloaded = load.load_pointer_at::<Pair>(0).unwrap().unwrap();
        assert_eq!(reloaded.left, 7);
        assert_eq!(reloaded.right, 9);
    }
}
