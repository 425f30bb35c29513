//! Target platform descriptors.
//!
//! A resource database is built for one concrete target. The two properties
//! that matter to serialization are byte order and pointer width; everything
//! else about a target is irrelevant here.

/// A serialization target platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    /// Windows, 32-bit little-endian.
    Win32,
    /// Windows, 64-bit little-endian.
    Win64,
    /// Wii U, 32-bit big-endian.
    WiiU,
    /// PlayStation 3, 32-bit big-endian.
    Ps3,
}

impl Platform {
    /// Whether multi-byte primitives are stored big-endian on this target.
    pub fn is_big_endian(&self) -> bool {
        matches!(self, Platform::WiiU | Platform::Ps3)
    }

    /// Whether pointer-shaped fields are 8 bytes wide on this target.
    pub fn is_64_bit(&self) -> bool {
        matches!(self, Platform::Win64)
    }

    /// Width in bytes of a pointer-shaped field.
    pub fn pointer_size(&self) -> usize {
        if self.is_64_bit() {
            8
        } else {
            4
        }
    }

    /// The tag byte stored in a database file header.
    pub fn tag(&self) -> u8 {
        match self {
            Platform::Win32 => 0,
            Platform::Win64 => 1,
            Platform::WiiU => 2,
            Platform::Ps3 => 3,
        }
    }

    /// Decode a file header tag byte.
    pub fn from_tag(tag: u8) -> Option<Platform> {
        match tag {
            0 => Some(Platform::Win32),
            1 => Some(Platform::Win64),
            2 => Some(Platform::WiiU),
            3 => Some(Platform::Ps3),
            _ => None,
        }
    }
}
