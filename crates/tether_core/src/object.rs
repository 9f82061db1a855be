//! Scene objects
//!
//! A [`SceneObject`] is a stable proxy key for something synced to the
//! engine. It never caches host data: mesh and material identities are
//! computed from a fresh host lookup each time they are needed.

use crate::error::Result;
use crate::host::HostScene;
use std::cell::Cell;
use std::rc::Rc;
use tether_interop::ObjectKind;

/// Material identity reported when an object has no active material
pub const DEFAULT_MATERIAL: &str = "Default";

/// Bytes of the object name kept in a per-object mesh identity
const MESH_IDENTITY_PREFIX: usize = 40;

/// Lifecycle hooks attached to a scene object at instantiation
pub trait ObjectHooks {
    /// Runs after the object has been added and synced
    fn on_create(&mut self, _object: &SceneObject) -> Result<()> {
        Ok(())
    }

    /// Runs once after the object has been removed from the engine
    fn on_destroy(&mut self, _object: &SceneObject) -> Result<()> {
        Ok(())
    }
}

/// A synced entity
///
/// Clones share the validity flag, so a handle kept by a plugin observes
/// destruction performed by the runtime.
#[derive(Debug, Clone)]
pub struct SceneObject {
    name: String,
    host_name: Option<String>,
    kind: ObjectKind,
    plugin: String,
    instance_id: u64,
    valid: Rc<Cell<bool>>,
}

impl SceneObject {
    pub(crate) fn new(
        name: impl Into<String>,
        host_name: Option<String>,
        kind: ObjectKind,
        plugin: impl Into<String>,
        instance_id: u64,
    ) -> Self {
        Self {
            name: name.into(),
            host_name,
            kind,
            plugin: plugin.into(),
            instance_id,
            valid: Rc::new(Cell::new(true)),
        }
    }

    /// Unique synchronization key
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Backing host object, `None` for pure data channels
    pub fn host_name(&self) -> Option<&str> {
        self.host_name.as_deref()
    }

    pub fn kind(&self) -> &ObjectKind {
        &self.kind
    }

    /// Name of the owning plugin
    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    /// Discriminator assigned at creation, unique within a runtime
    pub fn instance_id(&self) -> u64 {
        self.instance_id
    }

    pub fn is_valid(&self) -> bool {
        self.valid.get()
    }

    pub(crate) fn invalidate(&self) {
        self.valid.set(false);
    }

    /// Key deciding which objects share evaluated geometry
    ///
    /// Unmodified meshes share their datablock name. Every other mesh-like
    /// object gets a name prefix plus its instance discriminator, which is
    /// unique even when two objects share a long common prefix and changes
    /// when a host object is deleted and recreated under the same name.
    pub fn mesh_identity(&self, host: &dyn HostScene) -> Option<String> {
        let host_name = self.host_name.as_deref()?;

        if self.kind == ObjectKind::Metaball {
            return Some(self.name.clone());
        }

        let object = host.object(host_name)?;
        if object.shares_mesh_datablock() {
            return object.mesh;
        }
        object.object_type.is_mesh_like().then(|| self.instance_identity())
    }

    fn instance_identity(&self) -> String {
        format!(
            "{}@{:x}",
            name_prefix(&self.name, MESH_IDENTITY_PREFIX),
            self.instance_id
        )
    }

    /// Active material name, or [`DEFAULT_MATERIAL`]
    pub fn material_identity(&self, host: &dyn HostScene) -> String {
        self.host_name
            .as_deref()
            .and_then(|name| host.object(name))
            .and_then(|object| object.active_material)
            .unwrap_or_else(|| DEFAULT_MATERIAL.to_string())
    }
}

/// Longest prefix of at most `max` bytes ending on a char boundary
fn name_prefix(name: &str, max: usize) -> &str {
    let mut end = name.len().min(max);
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}
