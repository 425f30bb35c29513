//! The serialization capability contract.

use crate::error::ResourceError;
use crate::load::LoadContext;
use crate::save::SaveContext;
use crate::save_buffer::SaveBuffer;

/// Capability implemented by every record that lives inside a resource blob.
///
/// The load and save contexts are written entirely against this trait; they
/// never see concrete record types. Implementations may read either at an
/// explicit base captured on entry (`let base = ctx.position()` followed by
/// pure `read_*(base + field)` calls) or sequentially through the advancing
/// `next_*` reads — the context re-positions the cursor from
/// [`serialized_size`](ResourceSerializable::serialized_size) after `load`
/// returns, so both styles compose.
///
/// The one invariant that must hold for array and pointer walking to work:
/// `serialized_size()` equals the exact byte footprint the record occupies
/// in the blob, for every state the record can be in.
pub trait ResourceSerializable: Default + 'static {
    /// Populate `self` from the context's current position.
    fn load(&mut self, ctx: &mut LoadContext<'_>) -> Result<(), ResourceError>;

    /// Write `self` into `buffer`, using the same offsets `load` reads from.
    ///
    /// Nested allocations (pointed-to payloads, strings, child records) go
    /// through the context, which assigns their addresses and records the
    /// relocations.
    fn save(&self, ctx: &mut SaveContext, buffer: &SaveBuffer);

    /// Exact byte footprint of this record in a blob.
    fn serialized_size(&self) -> usize;
}
