//! FFI types shared with the bridge library
//!
//! All types use `#[repr(C)]` and their field order is part of the wire
//! contract with the consuming engine. Do not reorder fields.

use crate::error::{InteropError, Result};
use bytemuck::{Pod, Zeroable};
use std::ffi::c_void;
use std::fmt;

/// Capacity of a fixed-length wire string, including the NUL terminator
pub const INTEROP_STRING_CAPACITY: usize = 64;

/// Message type tag carrying an [`InteropComponentMessage`] payload
pub const RPC_COMPONENT_MESSAGE_ID: i32 = 255;

/// Fixed-length, NUL-terminated string
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct InteropString64 {
    pub buffer: [u8; INTEROP_STRING_CAPACITY],
}

impl InteropString64 {
    pub const EMPTY: Self = Self { buffer: [0; INTEROP_STRING_CAPACITY] };

    /// Encode a value, rejecting anything that does not fit
    pub fn new(value: &str) -> Result<Self> {
        let bytes = value.as_bytes();
        if bytes.contains(&0) {
            return Err(InteropError::InteriorNul(value.to_string()));
        }
        if bytes.len() >= INTEROP_STRING_CAPACITY {
            return Err(InteropError::StringTooLong {
                value: value.to_string(),
                len: bytes.len(),
                capacity: INTEROP_STRING_CAPACITY - 1,
            });
        }

        let mut buffer = [0u8; INTEROP_STRING_CAPACITY];
        buffer[..bytes.len()].copy_from_slice(bytes);
        Ok(Self { buffer })
    }

    /// Encode a value, cutting it at the last UTF-8 boundary that fits
    pub fn truncated(value: &str) -> Self {
        let value = value.split('\0').next().unwrap_or_default();
        let mut end = value.len().min(INTEROP_STRING_CAPACITY - 1);
        while !value.is_char_boundary(end) {
            end -= 1;
        }

        let mut buffer = [0u8; INTEROP_STRING_CAPACITY];
        buffer[..end].copy_from_slice(&value.as_bytes()[..end]);
        Self { buffer }
    }

    /// Check if the string is empty
    pub fn is_empty(&self) -> bool {
        self.buffer[0] == 0
    }

    /// Decode up to the first NUL
    pub fn as_str(&self) -> String {
        let end = self.buffer.iter().position(|b| *b == 0).unwrap_or(self.buffer.len());
        String::from_utf8_lossy(&self.buffer[..end]).into_owned()
    }

    /// Raw pointer for passing by reference across the boundary
    pub fn as_ptr(&self) -> *const c_void {
        self.buffer.as_ptr() as *const c_void
    }
}

impl Default for InteropString64 {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl fmt::Debug for InteropString64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InteropString64({:?})", self.as_str())
    }
}

/// Vector2 for FFI
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct InteropVector2 {
    pub x: f32,
    pub y: f32,
}

impl InteropVector2 {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Vector3 for FFI
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct InteropVector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl InteropVector3 {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0, z: 0.0 };
    pub const ONE: Self = Self { x: 1.0, y: 1.0, z: 1.0 };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Vector4 for FFI, also used for colors and the property vector payload
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct InteropVector4 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl InteropVector4 {
    pub fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.x, self.y, self.z, self.w]
    }
}

/// Quaternion for FFI
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct InteropQuaternion {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl InteropQuaternion {
    pub const IDENTITY: Self = Self { x: 0.0, y: 0.0, z: 0.0, w: 1.0 };

    pub fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }
}

impl Default for InteropQuaternion {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Object transform in engine space
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct InteropTransform {
    /// Name of the parent object, empty when unparented
    pub parent: InteropString64,
    pub position: InteropVector3,
    pub rotation: InteropQuaternion,
    pub scale: InteropVector3,
}

impl InteropTransform {
    pub fn identity() -> Self {
        Self {
            parent: InteropString64::EMPTY,
            position: InteropVector3::ZERO,
            rotation: InteropQuaternion::IDENTITY,
            scale: InteropVector3::ONE,
        }
    }
}

impl Default for InteropTransform {
    fn default() -> Self {
        Self::identity()
    }
}

/// Viewport camera in engine space
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct InteropCamera {
    pub width: i32,
    pub height: i32,
    pub is_perspective: i32,
    pub lens: f32,
    pub view_distance: f32,
    pub position: InteropVector3,
    pub forward: InteropVector3,
    pub up: InteropVector3,
}

/// Component instance as seen by the engine
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct InteropComponent {
    /// Component type name
    pub name: InteropString64,
    /// Target object name
    pub target: InteropString64,
    /// Mesh identity, empty when the component has no geometry
    pub mesh: InteropString64,
    /// Material identity, empty when unassigned
    pub material: InteropString64,
    pub enabled: i32,
}

/// Header of an inbound message
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct InteropMessageHeader {
    /// Message type tag, non-positive values are invalid
    pub kind: i32,
    pub index: i32,
    pub length: i32,
    pub count: i32,
}

/// Inbound message envelope returned by the bridge update pump
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct InteropMessage {
    pub header: InteropMessageHeader,
    pub target: InteropString64,
    pub data: *const u8,
}

impl InteropMessage {
    /// Check if this envelope carries no usable message
    pub fn invalid(&self) -> bool {
        self.header.kind < 1
    }
}

impl Default for InteropMessage {
    fn default() -> Self {
        Self {
            header: InteropMessageHeader::default(),
            target: InteropString64::EMPTY,
            data: std::ptr::null(),
        }
    }
}

/// Payload of a message with type [`RPC_COMPONENT_MESSAGE_ID`]
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct InteropComponentMessage {
    /// Target object name
    pub target: InteropString64,
    /// Message ID
    pub id: InteropString64,
    pub size: i32,
    pub data: *const u8,
}
