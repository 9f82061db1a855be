//! The function table the sync engine depends on
//!
//! [`Transport`] mirrors the exports of the native bridge library one to one.
//! [`crate::native::NativeTransport`] forwards to a loaded library and
//! [`crate::recording::RecordingTransport`] captures calls for tests and
//! offline replay.

use crate::error::Result;
use crate::ffi::{
    InteropCamera, InteropComponent, InteropString64, InteropTransform, INTEROP_STRING_CAPACITY,
    RPC_COMPONENT_MESSAGE_ID,
};
use crate::mesh::MeshBuffers;
use crate::property::InteropProperty;
use std::fmt;

/// Scene object type tag sent with `add_object_to_scene`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Mesh,
    Metaball,
    /// Plugin defined type
    Custom(String),
}

impl ObjectKind {
    pub fn as_str(&self) -> &str {
        match self {
            ObjectKind::Mesh => "Mesh",
            ObjectKind::Metaball => "Metaball",
            ObjectKind::Custom(name) => name,
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a connection attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectStatus {
    /// Shared memory is open
    Connected,
    /// Nothing is listening yet, retry later
    Unavailable,
    /// The bridge reported an error code
    Failed(i32),
}

impl ConnectStatus {
    /// Map the native return code
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => ConnectStatus::Connected,
            c if c < 0 => ConnectStatus::Failed(c),
            _ => ConnectStatus::Unavailable,
        }
    }
}

/// Message addressed to a component instance on an object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentMessage {
    /// Target object name
    pub target: String,
    /// Message ID, also names the component type
    pub id: String,
    pub payload: Vec<u8>,
}

impl ComponentMessage {
    /// Pack as `target[64] id[64] payload` for transports without pointers
    pub fn encode(&self) -> Result<Vec<u8>> {
        let target = InteropString64::new(&self.target)?;
        let id = InteropString64::new(&self.id)?;

        let mut bytes = Vec::with_capacity(INTEROP_STRING_CAPACITY * 2 + self.payload.len());
        bytes.extend_from_slice(&target.buffer);
        bytes.extend_from_slice(&id.buffer);
        bytes.extend_from_slice(&self.payload);
        Ok(bytes)
    }

    /// Inverse of [`encode`](Self::encode)
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < INTEROP_STRING_CAPACITY * 2 {
            return None;
        }
        let (target, rest) = bytes.split_at(INTEROP_STRING_CAPACITY);
        let (id, payload) = rest.split_at(INTEROP_STRING_CAPACITY);

        let target: InteropString64 = *bytemuck::try_from_bytes(target).ok()?;
        let id: InteropString64 = *bytemuck::try_from_bytes(id).ok()?;
        Some(Self {
            target: target.as_str(),
            id: id.as_str(),
            payload: payload.to_vec(),
        })
    }
}

/// An inbound envelope before validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub kind: i32,
    pub index: i32,
    pub count: i32,
    pub target: String,
    pub payload: Vec<u8>,
}

/// A validated inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    Component(ComponentMessage),
    Other(RawMessage),
}

impl InboundMessage {
    /// Validate an envelope, dropping non-positive type tags
    pub fn from_raw(raw: RawMessage) -> Option<Self> {
        if raw.kind < 1 {
            return None;
        }
        if raw.kind == RPC_COMPONENT_MESSAGE_ID {
            let decoded = ComponentMessage::decode(&raw.payload);
            if decoded.is_none() {
                log::warn!("Dropping malformed component message ({} bytes)", raw.payload.len());
            }
            return decoded.map(InboundMessage::Component);
        }
        Some(InboundMessage::Other(raw))
    }
}

/// Calls exported by the bridge library
///
/// Identity arguments are validated as [`InteropString64`] and fail with
/// [`crate::InteropError::StringTooLong`] rather than being truncated.
pub trait Transport {
    /// Open or refresh the shared memory connection
    fn connect(&mut self, connection_name: &str, version: &str) -> ConnectStatus;

    fn disconnect(&mut self) -> Result<()>;

    /// Drop every object the engine knows about
    fn clear(&mut self) -> Result<()>;

    /// Check if an engine is attached on the other side
    fn is_connected(&self) -> bool;

    fn is_connected_to_shared_memory(&self) -> bool;

    /// Pump queued IO and return the next inbound message, if any
    fn update(&mut self) -> Option<InboundMessage>;

    fn add_viewport(&mut self, viewport: i32) -> Result<()>;

    fn remove_viewport(&mut self, viewport: i32) -> Result<()>;

    fn set_viewport_camera(&mut self, viewport: i32, camera: &InteropCamera) -> Result<()>;

    fn add_object_to_scene(
        &mut self,
        object: &str,
        kind: &ObjectKind,
        transform: &InteropTransform,
    ) -> Result<()>;

    fn remove_object_from_scene(&mut self, object: &str) -> Result<()>;

    fn set_object_transform(
        &mut self,
        object: &str,
        transform: &InteropTransform,
    ) -> Result<()>;

    /// Push display mode, mesh identity and material identity
    fn update_object_properties(
        &mut self,
        object: &str,
        display_mode: i32,
        mesh: Option<&str>,
        material: &str,
    ) -> Result<()>;

    /// Push evaluated geometry for a mesh identity
    fn copy_mesh_data(&mut self, mesh: &str, buffers: &MeshBuffers) -> Result<()>;

    fn add_component(&mut self, component: &InteropComponent) -> Result<()>;

    fn update_component(&mut self, component: &InteropComponent) -> Result<()>;

    fn destroy_component(&mut self, component: &InteropComponent) -> Result<()>;

    fn update_component_property(
        &mut self,
        component: &InteropComponent,
        property: &InteropProperty,
    ) -> Result<()>;
}
