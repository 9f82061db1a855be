//! Transport backed by the native bridge library
//!
//! Resolves the full function table at load time so a missing export is
//! reported once, up front, instead of on first use.

use crate::error::{InteropError, Result};
use crate::ffi::{
    InteropCamera, InteropComponent, InteropComponentMessage, InteropMessage, InteropString64,
    InteropTransform, RPC_COMPONENT_MESSAGE_ID,
};
use crate::mesh::MeshBuffers;
use crate::property::InteropProperty;
use crate::transport::{ComponentMessage, ConnectStatus, InboundMessage, ObjectKind, RawMessage, Transport};
use libloading::Library;
use std::ffi::{c_int, c_uint, c_void};
use std::path::{Path, PathBuf};
use std::ptr;

type StatusFn = unsafe extern "C" fn() -> c_int;
type ConnectFn = unsafe extern "C" fn(*const c_void, *const c_void) -> c_int;
type UpdateFn = unsafe extern "C" fn() -> InteropMessage;
type ViewportFn = unsafe extern "C" fn(c_int) -> c_int;
type SetViewportCameraFn = unsafe extern "C" fn(c_int, InteropCamera) -> c_int;
type AddObjectFn = unsafe extern "C" fn(*const c_void, *const c_void, InteropTransform) -> c_int;
type RemoveObjectFn = unsafe extern "C" fn(*const c_void) -> c_int;
type SetTransformFn = unsafe extern "C" fn(*const c_void, InteropTransform) -> c_int;
type UpdatePropertiesFn =
    unsafe extern "C" fn(*const c_void, c_int, *const c_void, *const c_void) -> c_int;
type CopyMeshFn = unsafe extern "C" fn(
    *const c_void, // name
    *const c_void, // loops
    c_uint,
    *const c_void, // triangles
    c_uint,
    *const c_void, // vertices
    c_uint,
    *const c_void, // colors
    *const c_void, // uv0
    *const c_void, // uv1
    *const c_void, // uv2
    *const c_void, // uv3
) -> c_int;
type ComponentFn = unsafe extern "C" fn(InteropComponent) -> c_int;
type ComponentPropertyFn = unsafe extern "C" fn(InteropComponent, InteropProperty) -> c_int;

/// Resolved exports of the bridge library
struct BridgeFunctions {
    connect: ConnectFn,
    disconnect: StatusFn,
    clear: StatusFn,
    is_connected: StatusFn,
    is_connected_to_shared_memory: StatusFn,
    update: UpdateFn,
    add_viewport: ViewportFn,
    remove_viewport: ViewportFn,
    set_viewport_camera: SetViewportCameraFn,
    add_object_to_scene: AddObjectFn,
    remove_object_from_scene: RemoveObjectFn,
    set_object_transform: SetTransformFn,
    update_object_properties: UpdatePropertiesFn,
    copy_mesh_data: CopyMeshFn,
    add_component: ComponentFn,
    update_component: ComponentFn,
    destroy_component: ComponentFn,
    update_component_property: ComponentPropertyFn,
}

/// Resolve a single export and detach it from the symbol lifetime
///
/// # Safety
/// `T` must match the signature of the export.
unsafe fn resolve<T: Copy>(library: &Library, path: &Path, name: &str) -> Result<T> {
    let mut symbol = name.as_bytes().to_vec();
    symbol.push(0);
    library
        .get::<T>(&symbol)
        .map(|s| *s)
        .map_err(|_| InteropError::symbol_not_found(path.display().to_string(), name))
}

/// [`Transport`] that forwards every call to a loaded bridge library
pub struct NativeTransport {
    path: PathBuf,
    functions: BridgeFunctions,
    /// Keeps the resolved function pointers alive
    _library: Library,
}

impl NativeTransport {
    /// Load the bridge library and resolve its function table
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let library = unsafe {
            Library::new(path).map_err(|e| InteropError::load_error(path, e.to_string()))?
        };

        // SAFETY: signatures mirror the bridge's exported C API
        let functions = unsafe {
            BridgeFunctions {
                connect: resolve(&library, path, "Connect")?,
                disconnect: resolve(&library, path, "Disconnect")?,
                clear: resolve(&library, path, "Clear")?,
                is_connected: resolve(&library, path, "IsConnectedToUnity")?,
                is_connected_to_shared_memory: resolve(&library, path, "IsConnectedToSharedMemory")?,
                update: resolve(&library, path, "Update")?,
                add_viewport: resolve(&library, path, "AddViewport")?,
                remove_viewport: resolve(&library, path, "RemoveViewport")?,
                set_viewport_camera: resolve(&library, path, "SetViewportCamera")?,
                add_object_to_scene: resolve(&library, path, "AddObjectToScene")?,
                remove_object_from_scene: resolve(&library, path, "RemoveObjectFromScene")?,
                set_object_transform: resolve(&library, path, "SetObjectTransform")?,
                update_object_properties: resolve(&library, path, "UpdateObjectProperties")?,
                copy_mesh_data: resolve(&library, path, "CopyMeshDataNative")?,
                add_component: resolve(&library, path, "AddComponent")?,
                update_component: resolve(&library, path, "UpdateComponent")?,
                destroy_component: resolve(&library, path, "DestroyComponent")?,
                update_component_property: resolve(&library, path, "UpdateComponentProperty")?,
            }
        };

        log::info!("Loaded bridge library '{}'", path.display());

        Ok(Self {
            path: path.to_path_buf(),
            functions,
            _library: library,
        })
    }

    /// Path the library was loaded from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy an inbound envelope out of bridge-owned memory
    ///
    /// # Safety
    /// `message.data` must be null or point to a payload matching its header.
    unsafe fn read_message(message: &InteropMessage) -> Option<InboundMessage> {
        if message.invalid() {
            return None;
        }

        if message.header.kind == RPC_COMPONENT_MESSAGE_ID {
            if message.data.is_null() {
                return None;
            }
            let payload = &*(message.data as *const InteropComponentMessage);
            return Some(InboundMessage::Component(ComponentMessage {
                target: payload.target.as_str(),
                id: payload.id.as_str(),
                payload: copy_bytes(payload.data, payload.size),
            }));
        }

        InboundMessage::from_raw(RawMessage {
            kind: message.header.kind,
            index: message.header.index,
            count: message.header.count,
            target: message.target.as_str(),
            payload: copy_bytes(message.data, message.header.length),
        })
    }
}

/// # Safety
/// `data` must be null or valid for `len` bytes.
unsafe fn copy_bytes(data: *const u8, len: i32) -> Vec<u8> {
    if data.is_null() || len <= 0 {
        return Vec::new();
    }
    std::slice::from_raw_parts(data, len as usize).to_vec()
}

fn optional_ptr<T>(stream: Option<&Vec<T>>) -> *const c_void {
    stream.map_or(ptr::null(), |s| s.as_ptr() as *const c_void)
}

impl Transport for NativeTransport {
    fn connect(&mut self, connection_name: &str, version: &str) -> ConnectStatus {
        let name = InteropString64::truncated(connection_name);
        let version = InteropString64::truncated(version);
        let code = unsafe { (self.functions.connect)(name.as_ptr(), version.as_ptr()) };
        ConnectStatus::from_code(code)
    }

    fn disconnect(&mut self) -> Result<()> {
        InteropError::check_status("Disconnect", unsafe { (self.functions.disconnect)() })
    }

    fn clear(&mut self) -> Result<()> {
        InteropError::check_status("Clear", unsafe { (self.functions.clear)() })
    }

    fn is_connected(&self) -> bool {
        unsafe { (self.functions.is_connected)() != 0 }
    }

    fn is_connected_to_shared_memory(&self) -> bool {
        unsafe { (self.functions.is_connected_to_shared_memory)() != 0 }
    }

    fn update(&mut self) -> Option<InboundMessage> {
        unsafe {
            let message = (self.functions.update)();
            Self::read_message(&message)
        }
    }

    fn add_viewport(&mut self, viewport: i32) -> Result<()> {
        InteropError::check_status("AddViewport", unsafe { (self.functions.add_viewport)(viewport) })
    }

    fn remove_viewport(&mut self, viewport: i32) -> Result<()> {
        InteropError::check_status("RemoveViewport", unsafe {
            (self.functions.remove_viewport)(viewport)
        })
    }

    fn set_viewport_camera(&mut self, viewport: i32, camera: &InteropCamera) -> Result<()> {
        InteropError::check_status("SetViewportCamera", unsafe {
            (self.functions.set_viewport_camera)(viewport, *camera)
        })
    }

    fn add_object_to_scene(
        &mut self,
        object: &str,
        kind: &ObjectKind,
        transform: &InteropTransform,
    ) -> Result<()> {
        let object = InteropString64::new(object)?;
        let kind = InteropString64::new(kind.as_str())?;
        InteropError::check_status("AddObjectToScene", unsafe {
            (self.functions.add_object_to_scene)(object.as_ptr(), kind.as_ptr(), *transform)
        })
    }

    fn remove_object_from_scene(&mut self, object: &str) -> Result<()> {
        let object = InteropString64::new(object)?;
        InteropError::check_status("RemoveObjectFromScene", unsafe {
            (self.functions.remove_object_from_scene)(object.as_ptr())
        })
    }

    fn set_object_transform(&mut self, object: &str, transform: &InteropTransform) -> Result<()> {
        let object = InteropString64::new(object)?;
        InteropError::check_status("SetObjectTransform", unsafe {
            (self.functions.set_object_transform)(object.as_ptr(), *transform)
        })
    }

    fn update_object_properties(
        &mut self,
        object: &str,
        display_mode: i32,
        mesh: Option<&str>,
        material: &str,
    ) -> Result<()> {
        let object = InteropString64::new(object)?;
        let mesh = mesh.map(InteropString64::new).transpose()?;
        let material = InteropString64::new(material)?;
        let mesh_ptr = mesh.as_ref().map_or(ptr::null(), InteropString64::as_ptr);

        InteropError::check_status("UpdateObjectProperties", unsafe {
            (self.functions.update_object_properties)(
                object.as_ptr(),
                display_mode,
                mesh_ptr,
                material.as_ptr(),
            )
        })
    }

    fn copy_mesh_data(&mut self, mesh: &str, buffers: &MeshBuffers) -> Result<()> {
        buffers.validate(mesh)?;
        let name = InteropString64::new(mesh)?;

        InteropError::check_status("CopyMeshDataNative", unsafe {
            (self.functions.copy_mesh_data)(
                name.as_ptr(),
                buffers.loops.as_ptr() as *const c_void,
                buffers.loops.len() as c_uint,
                buffers.triangles.as_ptr() as *const c_void,
                buffers.triangles.len() as c_uint,
                buffers.vertices.as_ptr() as *const c_void,
                buffers.vertices.len() as c_uint,
                optional_ptr(buffers.colors.as_ref()),
                optional_ptr(buffers.uvs[0].as_ref()),
                optional_ptr(buffers.uvs[1].as_ref()),
                optional_ptr(buffers.uvs[2].as_ref()),
                optional_ptr(buffers.uvs[3].as_ref()),
            )
        })
    }

    fn add_component(&mut self, component: &InteropComponent) -> Result<()> {
        InteropError::check_status("AddComponent", unsafe { (self.functions.add_component)(*component) })
    }

    fn update_component(&mut self, component: &InteropComponent) -> Result<()> {
        InteropError::check_status("UpdateComponent", unsafe {
            (self.functions.update_component)(*component)
        })
    }

    fn destroy_component(&mut self, component: &InteropComponent) -> Result<()> {
        InteropError::check_status("DestroyComponent", unsafe {
            (self.functions.destroy_component)(*component)
        })
    }

    fn update_component_property(
        &mut self,
        component: &InteropComponent,
        property: &InteropProperty,
    ) -> Result<()> {
        InteropError::check_status("UpdateComponentProperty", unsafe {
            (self.functions.update_component_property)(*component, *property)
        })
    }
}
