//! Typed component properties and their wire encoding
//!
//! Host-side values arrive as [`HostValue`] and are narrowed to a
//! [`PropertyValue`] before they are packed into an [`InteropProperty`].
//! Shapes without a wire representation fail with
//! [`InteropError::TypeConversion`] instead of being truncated.

use crate::error::{InteropError, Result};
use crate::ffi::{InteropString64, InteropVector4};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Property type tag written to the wire
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyKind {
    Bool = 1,
    Int = 2,
    Float = 3,
    String = 4,
    Enum = 5,
    Color = 6,
    Vec2 = 7,
    Vec3 = 8,
    Vec4 = 9,
}

impl PropertyKind {
    /// Decode a wire tag
    pub fn from_tag(tag: i32) -> Option<Self> {
        Some(match tag {
            1 => PropertyKind::Bool,
            2 => PropertyKind::Int,
            3 => PropertyKind::Float,
            4 => PropertyKind::String,
            5 => PropertyKind::Enum,
            6 => PropertyKind::Color,
            7 => PropertyKind::Vec2,
            8 => PropertyKind::Vec3,
            9 => PropertyKind::Vec4,
            _ => return None,
        })
    }

    /// Wire tag
    pub fn tag(self) -> i32 {
        self as i32
    }
}

/// A property value that can cross the bridge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    Bool(bool),
    Int(i32),
    Float(f32),
    String(String),
    /// Enum value, sent as its identifier string
    Enum(String),
    /// RGB color
    Color([f32; 3]),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
}

impl PropertyValue {
    /// Get the wire type of this value
    pub fn kind(&self) -> PropertyKind {
        match self {
            PropertyValue::Bool(_) => PropertyKind::Bool,
            PropertyValue::Int(_) => PropertyKind::Int,
            PropertyValue::Float(_) => PropertyKind::Float,
            PropertyValue::String(_) => PropertyKind::String,
            PropertyValue::Enum(_) => PropertyKind::Enum,
            PropertyValue::Color(_) => PropertyKind::Color,
            PropertyValue::Vec2(_) => PropertyKind::Vec2,
            PropertyValue::Vec3(_) => PropertyKind::Vec3,
            PropertyValue::Vec4(_) => PropertyKind::Vec4,
        }
    }

    /// Narrow a host value to a wire value
    pub fn from_host(property: &str, value: HostValue) -> Result<Self> {
        match value {
            HostValue::Bool(v) => Ok(PropertyValue::Bool(v)),
            HostValue::Int(v) => i32::try_from(v)
                .map(PropertyValue::Int)
                .map_err(|_| InteropError::type_conversion(property, format!("integer {} out of i32 range", v))),
            HostValue::Float(v) => Ok(PropertyValue::Float(v as f32)),
            HostValue::String(v) => Ok(PropertyValue::String(v)),
            HostValue::Enum(v) => Ok(PropertyValue::Enum(v)),
            HostValue::Color(values) => match values.as_slice() {
                [r, g, b] => Ok(PropertyValue::Color([*r, *g, *b])),
                other => Err(InteropError::type_conversion(
                    property,
                    format!("color with {} components, expected 3", other.len()),
                )),
            },
            HostValue::FloatVector(values) => match values.as_slice() {
                [x, y] => Ok(PropertyValue::Vec2([*x, *y])),
                [x, y, z] => Ok(PropertyValue::Vec3([*x, *y, *z])),
                [x, y, z, w] => Ok(PropertyValue::Vec4([*x, *y, *z, *w])),
                other => Err(InteropError::type_conversion(
                    property,
                    format!("float vector with {} components, expected 2 to 4", other.len()),
                )),
            },
            HostValue::Unsupported(type_name) => Err(InteropError::type_conversion(
                property,
                format!("unsupported value type '{}'", type_name),
            )),
        }
    }

    /// Default value for a property type
    pub fn default_for(kind: PropertyKind) -> Self {
        match kind {
            PropertyKind::Bool => PropertyValue::Bool(false),
            PropertyKind::Int => PropertyValue::Int(0),
            PropertyKind::Float => PropertyValue::Float(0.0),
            PropertyKind::String => PropertyValue::String(String::new()),
            PropertyKind::Enum => PropertyValue::Enum(String::new()),
            PropertyKind::Color => PropertyValue::Color([0.0; 3]),
            PropertyKind::Vec2 => PropertyValue::Vec2([0.0; 2]),
            PropertyKind::Vec3 => PropertyValue::Vec3([0.0; 3]),
            PropertyKind::Vec4 => PropertyValue::Vec4([0.0; 4]),
        }
    }
}

/// A raw value as reported by the host's property system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HostValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Enum(String),
    /// Float array with a color subtype
    Color(Vec<f32>),
    /// Float array of any length
    FloatVector(Vec<f32>),
    /// Any other host type, by name
    Unsupported(String),
}

impl From<bool> for HostValue {
    fn from(v: bool) -> Self {
        HostValue::Bool(v)
    }
}

impl From<i64> for HostValue {
    fn from(v: i64) -> Self {
        HostValue::Int(v)
    }
}

impl From<f64> for HostValue {
    fn from(v: f64) -> Self {
        HostValue::Float(v)
    }
}

impl From<&str> for HostValue {
    fn from(v: &str) -> Self {
        HostValue::String(v.to_string())
    }
}

impl From<PropertyValue> for HostValue {
    fn from(value: PropertyValue) -> Self {
        match value {
            PropertyValue::Bool(v) => HostValue::Bool(v),
            PropertyValue::Int(v) => HostValue::Int(v.into()),
            PropertyValue::Float(v) => HostValue::Float(v.into()),
            PropertyValue::String(v) => HostValue::String(v),
            PropertyValue::Enum(v) => HostValue::Enum(v),
            PropertyValue::Color(v) => HostValue::Color(v.to_vec()),
            PropertyValue::Vec2(v) => HostValue::FloatVector(v.to_vec()),
            PropertyValue::Vec3(v) => HostValue::FloatVector(v.to_vec()),
            PropertyValue::Vec4(v) => HostValue::FloatVector(v.to_vec()),
        }
    }
}

/// Payload slot of an [`InteropProperty`], selected by its type tag
#[repr(C)]
#[derive(Clone, Copy)]
pub union InteropPropertyPayload {
    pub int_value: i32,
    pub vector_value: InteropVector4,
    pub string_value: InteropString64,
}

/// Property update as sent to the engine
#[repr(C)]
#[derive(Clone, Copy)]
pub struct InteropProperty {
    pub name: InteropString64,
    pub kind: i32,
    pub payload: InteropPropertyPayload,
}

impl InteropProperty {
    /// Pack a named value
    pub fn new(name: &str, value: &PropertyValue) -> Result<Self> {
        let wire_name = InteropString64::new(name)
            .map_err(|e| InteropError::type_conversion(name, e.to_string()))?;

        // Start from the widest variant so every payload byte is initialized
        let mut payload = InteropPropertyPayload { string_value: InteropString64::EMPTY };
        match value {
            PropertyValue::Bool(v) => payload.int_value = i32::from(*v),
            PropertyValue::Int(v) => payload.int_value = *v,
            PropertyValue::Float(v) => payload.vector_value = InteropVector4::new(*v, 0.0, 0.0, 0.0),
            PropertyValue::String(v) | PropertyValue::Enum(v) => {
                payload.string_value = InteropString64::new(v)
                    .map_err(|e| InteropError::type_conversion(name, e.to_string()))?;
            }
            PropertyValue::Color([r, g, b]) => payload.vector_value = InteropVector4::new(*r, *g, *b, 0.0),
            PropertyValue::Vec2([x, y]) => payload.vector_value = InteropVector4::new(*x, *y, 0.0, 0.0),
            PropertyValue::Vec3([x, y, z]) => payload.vector_value = InteropVector4::new(*x, *y, *z, 0.0),
            PropertyValue::Vec4([x, y, z, w]) => payload.vector_value = InteropVector4::new(*x, *y, *z, *w),
        }

        Ok(Self {
            name: wire_name,
            kind: value.kind().tag(),
            payload,
        })
    }

    /// Property name
    pub fn name(&self) -> String {
        self.name.as_str()
    }

    /// Decode the value according to the type tag
    pub fn value(&self) -> Result<PropertyValue> {
        let kind = PropertyKind::from_tag(self.kind).ok_or(InteropError::UnknownPropertyKind(self.kind))?;

        // SAFETY: the payload is always fully initialized in `new` and every
        // variant is plain-old-data, so any bit pattern is a valid read.
        let (int_value, vector, string) = unsafe {
            (
                self.payload.int_value,
                self.payload.vector_value,
                self.payload.string_value,
            )
        };

        Ok(match kind {
            PropertyKind::Bool => PropertyValue::Bool(int_value != 0),
            PropertyKind::Int => PropertyValue::Int(int_value),
            PropertyKind::Float => PropertyValue::Float(vector.x),
            PropertyKind::String => PropertyValue::String(string.as_str()),
            PropertyKind::Enum => PropertyValue::Enum(string.as_str()),
            PropertyKind::Color => PropertyValue::Color([vector.x, vector.y, vector.z]),
            PropertyKind::Vec2 => PropertyValue::Vec2([vector.x, vector.y]),
            PropertyKind::Vec3 => PropertyValue::Vec3([vector.x, vector.y, vector.z]),
            PropertyKind::Vec4 => PropertyValue::Vec4(vector.to_array()),
        })
    }
}

impl fmt::Debug for InteropProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InteropProperty")
            .field("name", &self.name.as_str())
            .field("kind", &self.kind)
            .field("value", &self.value().ok())
            .finish()
    }
}
