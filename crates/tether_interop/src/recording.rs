//! In-process transport that records every call
//!
//! Cloning a [`RecordingTransport`] yields a handle onto the same call log, so
//! a test can hand one clone to the runtime and inspect the other.

use crate::error::{InteropError, Result};
use crate::ffi::{
    InteropCamera, InteropComponent, InteropString64, InteropTransform, RPC_COMPONENT_MESSAGE_ID,
};
use crate::mesh::MeshBuffers;
use crate::property::InteropProperty;
use crate::transport::{ComponentMessage, ConnectStatus, InboundMessage, ObjectKind, RawMessage, Transport};
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

/// A single recorded transport call
#[derive(Debug, Clone)]
pub enum TransportCall {
    Connect {
        connection_name: String,
        version: String,
    },
    Disconnect,
    Clear,
    AddViewport(i32),
    RemoveViewport(i32),
    SetViewportCamera {
        viewport: i32,
        camera: InteropCamera,
    },
    AddObjectToScene {
        object: String,
        kind: ObjectKind,
        transform: InteropTransform,
    },
    RemoveObjectFromScene(String),
    SetObjectTransform {
        object: String,
        transform: InteropTransform,
    },
    UpdateObjectProperties {
        object: String,
        display_mode: i32,
        mesh: Option<String>,
        material: String,
    },
    CopyMeshData {
        mesh: String,
        buffers: MeshBuffers,
    },
    AddComponent(InteropComponent),
    UpdateComponent(InteropComponent),
    DestroyComponent(InteropComponent),
    UpdateComponentProperty {
        component: InteropComponent,
        property: InteropProperty,
    },
}

impl TransportCall {
    /// Name of the bridge export this call maps to
    pub fn function(&self) -> &'static str {
        match self {
            TransportCall::Connect { .. } => "Connect",
            TransportCall::Disconnect => "Disconnect",
            TransportCall::Clear => "Clear",
            TransportCall::AddViewport(_) => "AddViewport",
            TransportCall::RemoveViewport(_) => "RemoveViewport",
            TransportCall::SetViewportCamera { .. } => "SetViewportCamera",
            TransportCall::AddObjectToScene { .. } => "AddObjectToScene",
            TransportCall::RemoveObjectFromScene(_) => "RemoveObjectFromScene",
            TransportCall::SetObjectTransform { .. } => "SetObjectTransform",
            TransportCall::UpdateObjectProperties { .. } => "UpdateObjectProperties",
            TransportCall::CopyMeshData { .. } => "CopyMeshDataNative",
            TransportCall::AddComponent(_) => "AddComponent",
            TransportCall::UpdateComponent(_) => "UpdateComponent",
            TransportCall::DestroyComponent(_) => "DestroyComponent",
            TransportCall::UpdateComponentProperty { .. } => "UpdateComponentProperty",
        }
    }
}

#[derive(Debug, Default)]
struct RecordingState {
    calls: Vec<TransportCall>,
    inbound: VecDeque<RawMessage>,
    /// Whether an engine is listening
    available: bool,
    shared_memory: bool,
    connected: bool,
    failing: HashSet<&'static str>,
}

/// [`Transport`] that keeps a log of calls instead of talking to an engine
#[derive(Debug, Clone, Default)]
pub struct RecordingTransport {
    state: Arc<Mutex<RecordingState>>,
}

impl RecordingTransport {
    /// Create a transport with no engine listening
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transport whose engine accepts the first connect attempt
    pub fn available() -> Self {
        let transport = Self::default();
        transport.set_available(true);
        transport
    }

    /// Control whether connect attempts succeed
    pub fn set_available(&self, available: bool) {
        self.state.lock().available = available;
    }

    /// Simulate the engine going away mid-session
    pub fn drop_connection(&self) {
        let mut state = self.state.lock();
        state.available = false;
        state.shared_memory = false;
        state.connected = false;
    }

    /// Make every call to `function` fail with status -1
    pub fn fail_function(&self, function: &'static str) {
        self.state.lock().failing.insert(function);
    }

    pub fn clear_failures(&self) {
        self.state.lock().failing.clear();
    }

    /// Queue a raw inbound envelope
    pub fn push_message(&self, message: RawMessage) {
        self.state.lock().inbound.push_back(message);
    }

    /// Queue a component message
    pub fn push_component_message(&self, message: &ComponentMessage) -> Result<()> {
        let payload = message.encode()?;
        self.push_message(RawMessage {
            kind: RPC_COMPONENT_MESSAGE_ID,
            index: 0,
            count: 1,
            target: message.target.clone(),
            payload,
        });
        Ok(())
    }

    /// Snapshot of every call made so far
    pub fn calls(&self) -> Vec<TransportCall> {
        self.state.lock().calls.clone()
    }

    /// Drain the call log
    pub fn take_calls(&self) -> Vec<TransportCall> {
        std::mem::take(&mut self.state.lock().calls)
    }

    /// Count calls to a bridge export
    pub fn count(&self, function: &str) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| call.function() == function)
            .count()
    }

    /// Mesh identities pushed, in call order
    pub fn mesh_pushes(&self) -> Vec<String> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                TransportCall::CopyMeshData { mesh, .. } => Some(mesh.clone()),
                _ => None,
            })
            .collect()
    }

    /// Object names added to the scene, in call order
    pub fn added_objects(&self) -> Vec<String> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                TransportCall::AddObjectToScene { object, .. } => Some(object.clone()),
                _ => None,
            })
            .collect()
    }

    /// Object names removed from the scene, in call order
    pub fn removed_objects(&self) -> Vec<String> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                TransportCall::RemoveObjectFromScene(object) => Some(object.clone()),
                _ => None,
            })
            .collect()
    }

    /// Object names that received a transform push, in call order
    pub fn transform_pushes(&self) -> Vec<String> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                TransportCall::SetObjectTransform { object, .. } => Some(object.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: TransportCall) -> Result<()> {
        let function = call.function();
        let mut state = self.state.lock();
        state.calls.push(call);
        if state.failing.contains(function) {
            return Err(InteropError::CallFailed {
                function,
                status: -1,
            });
        }
        Ok(())
    }
}

/// Validate an identity the way the native library would receive it
fn identity(value: &str) -> Result<String> {
    InteropString64::new(value)?;
    Ok(value.to_string())
}

impl Transport for RecordingTransport {
    fn connect(&mut self, connection_name: &str, version: &str) -> ConnectStatus {
        let _ = self.record(TransportCall::Connect {
            connection_name: connection_name.to_string(),
            version: version.to_string(),
        });

        let mut state = self.state.lock();
        if state.failing.contains("Connect") {
            return ConnectStatus::Failed(-1);
        }
        if state.available {
            state.shared_memory = true;
            ConnectStatus::Connected
        } else {
            ConnectStatus::Unavailable
        }
    }

    fn disconnect(&mut self) -> Result<()> {
        {
            let mut state = self.state.lock();
            state.shared_memory = false;
            state.connected = false;
        }
        self.record(TransportCall::Disconnect)
    }

    fn clear(&mut self) -> Result<()> {
        self.record(TransportCall::Clear)
    }

    fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    fn is_connected_to_shared_memory(&self) -> bool {
        self.state.lock().shared_memory
    }

    fn update(&mut self) -> Option<InboundMessage> {
        let mut state = self.state.lock();
        if state.shared_memory && state.available {
            state.connected = true;
        }
        if !state.connected {
            return None;
        }

        // Invalid envelopes are consumed and dropped
        while let Some(raw) = state.inbound.pop_front() {
            if let Some(message) = InboundMessage::from_raw(raw) {
                return Some(message);
            }
        }
        None
    }

    fn add_viewport(&mut self, viewport: i32) -> Result<()> {
        self.record(TransportCall::AddViewport(viewport))
    }

    fn remove_viewport(&mut self, viewport: i32) -> Result<()> {
        self.record(TransportCall::RemoveViewport(viewport))
    }

    fn set_viewport_camera(&mut self, viewport: i32, camera: &InteropCamera) -> Result<()> {
        self.record(TransportCall::SetViewportCamera {
            viewport,
            camera: *camera,
        })
    }

    fn add_object_to_scene(
        &mut self,
        object: &str,
        kind: &ObjectKind,
        transform: &InteropTransform,
    ) -> Result<()> {
        let object = identity(object)?;
        identity(kind.as_str())?;
        self.record(TransportCall::AddObjectToScene {
            object,
            kind: kind.clone(),
            transform: *transform,
        })
    }

    fn remove_object_from_scene(&mut self, object: &str) -> Result<()> {
        let object = identity(object)?;
        self.record(TransportCall::RemoveObjectFromScene(object))
    }

    fn set_object_transform(&mut self, object: &str, transform: &InteropTransform) -> Result<()> {
        let object = identity(object)?;
        self.record(TransportCall::SetObjectTransform {
            object,
            transform: *transform,
        })
    }

    fn update_object_properties(
        &mut self,
        object: &str,
        display_mode: i32,
        mesh: Option<&str>,
        material: &str,
    ) -> Result<()> {
        let object = identity(object)?;
        let mesh = mesh.map(identity).transpose()?;
        let material = identity(material)?;
        self.record(TransportCall::UpdateObjectProperties {
            object,
            display_mode,
            mesh,
            material,
        })
    }

    fn copy_mesh_data(&mut self, mesh: &str, buffers: &MeshBuffers) -> Result<()> {
        buffers.validate(mesh)?;
        let mesh = identity(mesh)?;
        self.record(TransportCall::CopyMeshData {
            mesh,
            buffers: buffers.clone(),
        })
    }

    fn add_component(&mut self, component: &InteropComponent) -> Result<()> {
        self.record(TransportCall::AddComponent(*component))
    }

    fn update_component(&mut self, component: &InteropComponent) -> Result<()> {
        self.record(TransportCall::UpdateComponent(*component))
    }

    fn destroy_component(&mut self, component: &InteropComponent) -> Result<()> {
        self.record(TransportCall::DestroyComponent(*component))
    }

    fn update_component_property(
        &mut self,
        component: &InteropComponent,
        property: &InteropProperty,
    ) -> Result<()> {
        self.record(TransportCall::UpdateComponentProperty {
            component: *component,
            property: *property,
        })
    }
}
