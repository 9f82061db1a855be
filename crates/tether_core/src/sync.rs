//! Coordinator-owned sync state
//!
//! [`SyncCore`] owns everything the diff loop mutates: the transport, the
//! tracked scene objects, the tracked host object names and the per-batch
//! dirty geometry. Plugins and components reach it only through the
//! narrow operations below.

use crate::collection::SceneObjectCollection;
use crate::dirty::{DirtyGeometrySet, GeometrySource};
use crate::error::{Result, SyncError};
use crate::host::{HostObject, HostScene};
use crate::mesh::MeshMarshaler;
use crate::object::SceneObject;
use crate::report::BatchReport;
use std::collections::HashSet;
use tether_interop::{convert, InteropTransform, ObjectKind, Transport};

/// Engine object type for host objects synced through their components
pub const COMPONENT_OBJECT_KIND: &str = "Component";

/// A destroyed scene object awaiting end-of-batch removal
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Invalidated {
    pub plugin: String,
    pub name: String,
    pub instance_id: u64,
}

pub struct SyncCore {
    transport: Box<dyn Transport>,
    marshaler: MeshMarshaler,
    objects: SceneObjectCollection,
    /// Host object names seen by the last diff, in scene order
    tracked_names: Vec<String>,
    dirty: DirtyGeometrySet,
    invalidated: Vec<Invalidated>,
    /// Mesh identities the engine already holds
    synced_meshes: HashSet<String>,
    /// Engine objects currently added to the scene
    presented: HashSet<String>,
    /// Host objects presented because they carry components
    component_objects: HashSet<String>,
    report: BatchReport,
    running: bool,
    /// Engine seen as attached by the last tick
    connected: bool,
    next_instance_id: u64,
}

impl SyncCore {
    pub(crate) fn new(transport: Box<dyn Transport>, marshaler: MeshMarshaler) -> Self {
        Self {
            transport,
            marshaler,
            objects: SceneObjectCollection::new(),
            tracked_names: Vec::new(),
            dirty: DirtyGeometrySet::new(),
            invalidated: Vec::new(),
            synced_meshes: HashSet::new(),
            presented: HashSet::new(),
            component_objects: HashSet::new(),
            report: BatchReport::new(),
            running: false,
            connected: false,
            next_instance_id: 1,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Running with an engine attached
    pub fn is_connected(&self) -> bool {
        self.running && self.connected
    }

    /// Every tracked scene object, across plugins
    pub fn objects(&self) -> &SceneObjectCollection {
        &self.objects
    }

    pub fn tracked_names(&self) -> &[String] {
        &self.tracked_names
    }

    /// Check if the engine already holds geometry for a mesh identity
    pub fn is_mesh_synced(&self, identity: &str) -> bool {
        self.synced_meshes.contains(identity)
    }

    pub(crate) fn transport(&mut self) -> &mut dyn Transport {
        self.transport.as_mut()
    }

    pub(crate) fn transport_ref(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    pub(crate) fn set_running(&mut self, running: bool) {
        self.running = running;
    }

    pub(crate) fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    pub(crate) fn set_tracked_names(&mut self, names: Vec<String>) {
        self.tracked_names = names;
    }

    pub(crate) fn next_instance_id(&mut self) -> u64 {
        let id = self.next_instance_id;
        self.next_instance_id += 1;
        id
    }

    // ========== Failure collection ==========

    pub(crate) fn report(&mut self, error: SyncError) {
        self.report.push(error);
    }

    pub(crate) fn record<T>(&mut self, result: Result<T>) -> Option<T> {
        self.report.record(result)
    }

    pub(crate) fn take_report(&mut self) -> BatchReport {
        self.report.take()
    }

    // ========== Scene objects ==========

    /// Track a new scene object and push its initial state
    ///
    /// Only a name collision fails the call. Transport failures past that
    /// point are collected into the batch report.
    pub(crate) fn add_object(&mut self, host: &dyn HostScene, object: SceneObject) -> Result<()> {
        self.objects.append(object.clone())?;
        log::debug!(
            "Adding {} object '{}' for plugin '{}'",
            object.kind(),
            object.name(),
            object.plugin()
        );

        let host_object = object.host_name().and_then(|name| host.object(name));
        let transform = match &host_object {
            Some(host_object) => host_transform(host_object),
            None => Ok(InteropTransform::identity()),
        };
        let result = transform.and_then(|t| self.present(object.name(), object.kind(), &t));
        self.record(result);

        // A rename arrives as remove + add and nothing else tells the
        // children their parent name changed
        if let Some(host_object) = &host_object {
            self.propagate_to_children(host, host_object);
        }

        self.push_properties(host, &object);

        // Only datablock geometry can already be held by the engine
        let reusable = host_object.as_ref().is_some_and(HostObject::shares_mesh_datablock);
        if let Some(identity) = object.mesh_identity(host) {
            if !reusable || !self.synced_meshes.contains(&identity) {
                self.dirty
                    .insert(identity, GeometrySource::Object(object.name().to_string()));
            }
        }
        Ok(())
    }

    /// Invalidate a scene object and withdraw it from the engine
    ///
    /// Returns false if the object was already destroyed. The object stays in
    /// its collections until the end of the batch.
    pub(crate) fn destroy_object(&mut self, object: &SceneObject) -> bool {
        if !object.is_valid() {
            return false;
        }
        object.invalidate();
        log::debug!("Destroying object '{}'", object.name());

        if !self.component_objects.contains(object.name()) {
            let result = self.withdraw(object.name());
            self.record(result);
        }
        self.invalidated.push(Invalidated {
            plugin: object.plugin().to_string(),
            name: object.name().to_string(),
            instance_id: object.instance_id(),
        });
        true
    }

    /// Push the transform of a scene object's host object
    pub(crate) fn update_transform(&mut self, host: &dyn HostScene, object: &SceneObject) {
        if !object.is_valid() {
            return;
        }
        if let Some(host_name) = object.host_name() {
            self.push_host_transform(host, object.name(), host_name);
        }
    }

    /// Push display mode, mesh identity and material identity
    pub(crate) fn push_properties(&mut self, host: &dyn HostScene, object: &SceneObject) {
        let Some(host_object) = object.host_name().and_then(|name| host.object(name)) else {
            return;
        };
        let mesh = object.mesh_identity(host);
        let material = object.material_identity(host);

        let result = self.transport.update_object_properties(
            object.name(),
            host_object.display_mode,
            mesh.as_deref(),
            &material,
        );
        self.record(result.map_err(SyncError::from));
    }

    /// Push `host_name`'s current transform under `engine_name`
    pub(crate) fn push_host_transform(&mut self, host: &dyn HostScene, engine_name: &str, host_name: &str) {
        let Some(host_object) = host.object(host_name) else {
            return;
        };
        let result = host_transform(&host_object).and_then(|transform| {
            self.transport
                .set_object_transform(engine_name, &transform)
                .map_err(SyncError::from)
        });
        self.record(result);
    }

    fn propagate_to_children(&mut self, host: &dyn HostScene, parent: &HostObject) {
        for child in &parent.children {
            let target = self
                .objects
                .find_live_by_host_name(child)
                .map(|object| object.name().to_string())
                .or_else(|| self.component_objects.contains(child).then(|| child.clone()));

            if let Some(target) = target {
                self.push_host_transform(host, &target, child);
            }
        }
    }

    // ========== Engine presence ==========

    fn present(&mut self, name: &str, kind: &ObjectKind, transform: &InteropTransform) -> Result<()> {
        if self.presented.contains(name) {
            self.transport.set_object_transform(name, transform)?;
            return Ok(());
        }
        self.transport.add_object_to_scene(name, kind, transform)?;
        self.presented.insert(name.to_string());
        Ok(())
    }

    fn withdraw(&mut self, name: &str) -> Result<()> {
        if !self.presented.remove(name) {
            return Ok(());
        }
        self.transport.remove_object_from_scene(name)?;
        Ok(())
    }

    /// Start syncing a host object for its first component
    pub(crate) fn present_component_object(&mut self, host: &dyn HostScene, object: &HostObject) {
        self.component_objects.insert(object.name.clone());
        let kind = ObjectKind::Custom(COMPONENT_OBJECT_KIND.to_string());
        let result = host_transform(object).and_then(|t| self.present(&object.name, &kind, &t));
        self.record(result);
        self.propagate_to_children(host, object);
    }

    /// Stop syncing a host object whose last component went away
    pub(crate) fn withdraw_component_object(&mut self, name: &str) {
        if !self.component_objects.remove(name) {
            return;
        }
        let held_by_scene_object = self.objects.find(name).map_or(false, SceneObject::is_valid);
        if !held_by_scene_object {
            let result = self.withdraw(name);
            self.record(result);
        }
    }

    pub fn is_component_object(&self, name: &str) -> bool {
        self.component_objects.contains(name)
    }

    // ========== Geometry ==========

    /// Queue a mesh identity for evaluation this batch
    pub(crate) fn mark_geometry_dirty(&mut self, identity: impl Into<String>, source: GeometrySource) -> bool {
        self.dirty.insert(identity, source)
    }

    /// Evaluate and push every pending mesh identity once
    pub(crate) fn flush_geometry(&mut self, host: &mut dyn HostScene) {
        for (identity, source) in self.dirty.drain() {
            let host_name = match source {
                GeometrySource::Object(name) => self
                    .objects
                    .find(&name)
                    .filter(|object| object.is_valid())
                    .and_then(|object| object.host_name().map(str::to_string)),
                GeometrySource::Component { object, .. } => Some(object),
            };
            let Some(host_name) = host_name else {
                log::debug!("Skipping mesh '{}', its object is gone", identity);
                continue;
            };

            match self
                .marshaler
                .update_mesh(self.transport.as_mut(), host, &host_name, &identity)
            {
                Ok(()) => {
                    self.synced_meshes.insert(identity);
                }
                Err(error) => self.report.push(error),
            }
        }
    }

    // ========== Batch lifecycle ==========

    /// Remove destroyed objects from the coordinator's collection
    pub(crate) fn remove_invalidated(&mut self) -> Vec<Invalidated> {
        let invalidated = std::mem::take(&mut self.invalidated);
        for entry in &invalidated {
            self.objects.remove_instance(&entry.name, entry.instance_id);
        }
        invalidated
    }

    pub(crate) fn clear_dirty(&mut self) {
        self.dirty.clear();
    }

    /// Forget all tracked state and clear the engine scene
    pub(crate) fn reset(&mut self) {
        self.connected = false;
        self.tracked_names.clear();
        self.objects.clear();
        self.invalidated.clear();
        self.dirty.clear();
        self.synced_meshes.clear();
        self.presented.clear();
        self.component_objects.clear();

        let result = self.transport.clear();
        self.record(result.map_err(SyncError::from));
    }
}

/// Convert a host object's transform for the engine
pub(crate) fn host_transform(object: &HostObject) -> Result<InteropTransform> {
    Ok(convert::transform(
        object.parent.as_deref(),
        object.world,
        object.scale,
    )?)
}
