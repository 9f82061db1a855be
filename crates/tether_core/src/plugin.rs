//! Plugin runtime
//!
//! Plugins are the top-level extension point. Each one owns a disjoint
//! [`SceneObjectCollection`] and moves through
//! `registered -> enabled <-> disabled -> unregistered`.
//!
//! Callbacks receive a [`PluginContext`] scoped to the plugin: it can only
//! create, update and destroy objects the plugin owns.

use crate::collection::SceneObjectCollection;
use crate::dirty::GeometrySource;
use crate::error::{Result, SyncError};
use crate::host::{HostObject, HostScene, UpdateBatch};
use crate::object::{ObjectHooks, SceneObject};
use crate::sync::{Invalidated, SyncCore};
use std::collections::HashMap;
use tether_interop::{ObjectKind, RawMessage};

/// Current state of a registered plugin
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PluginStatus {
    /// Registered but never enabled
    Registered,
    /// Enabled and allowed to instantiate objects
    Enabled,
    /// Disabled, owns no live objects
    Disabled,
}

/// Context provided to plugins during lifecycle events
pub struct PluginContext<'a> {
    plugin: &'a str,
    enabled: bool,
    core: &'a mut SyncCore,
    host: &'a dyn HostScene,
    objects: &'a mut SceneObjectCollection,
    hooks: &'a mut HashMap<u64, Box<dyn ObjectHooks>>,
}

impl<'a> PluginContext<'a> {
    pub fn plugin_name(&self) -> &str {
        self.plugin
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_connected(&self) -> bool {
        self.core.is_connected()
    }

    /// Read access to the host scene
    pub fn host(&self) -> &dyn HostScene {
        self.host
    }

    /// Create a scene object owned by this plugin
    pub fn instantiate(
        &mut self,
        kind: ObjectKind,
        name: &str,
        host_name: Option<&str>,
    ) -> Result<SceneObject> {
        self.create(kind, name, host_name, None)
    }

    /// Create a scene object with lifecycle hooks
    ///
    /// `on_create` runs once the object is synced; `on_destroy` runs exactly
    /// once when the object is destroyed for any reason.
    pub fn instantiate_with_hooks(
        &mut self,
        kind: ObjectKind,
        name: &str,
        host_name: Option<&str>,
        hooks: Box<dyn ObjectHooks>,
    ) -> Result<SceneObject> {
        self.create(kind, name, host_name, Some(hooks))
    }

    fn create(
        &mut self,
        kind: ObjectKind,
        name: &str,
        host_name: Option<&str>,
        hooks: Option<Box<dyn ObjectHooks>>,
    ) -> Result<SceneObject> {
        if !self.enabled {
            return Err(SyncError::PluginDisabled(self.plugin.to_string()));
        }
        if let Some(host_name) = host_name {
            if self.host.object(host_name).is_none() {
                return Err(SyncError::ObjectNotFound(host_name.to_string()));
            }
        }

        let instance_id = self.core.next_instance_id();
        let object = SceneObject::new(
            name,
            host_name.map(str::to_string),
            kind,
            self.plugin,
            instance_id,
        );

        self.objects.append(object.clone())?;
        if let Err(e) = self.core.add_object(self.host, object.clone()) {
            self.objects.remove_instance(name, instance_id);
            return Err(e);
        }

        if let Some(mut hooks) = hooks {
            if let Err(e) = hooks.on_create(&object) {
                self.core
                    .report(SyncError::plugin_callback(self.plugin, "on_create", Some(name), &e));
            }
            self.hooks.insert(instance_id, hooks);
        }
        Ok(object)
    }

    /// Live objects owned by this plugin
    pub fn objects(&self) -> Vec<SceneObject> {
        self.objects.iter().filter(|o| o.is_valid()).cloned().collect()
    }

    /// Find a live object owned by this plugin
    pub fn find_object(&self, name: &str) -> Option<SceneObject> {
        self.objects.find(name).filter(|o| o.is_valid()).cloned()
    }

    /// Destroy an owned object, returning false if it was not live
    pub fn destroy_object(&mut self, name: &str) -> bool {
        destroy_owned(self.core, self.objects, self.hooks, self.plugin, name)
    }

    pub fn update_transform(&mut self, object: &SceneObject) {
        self.core.update_transform(self.host, object);
    }

    /// Re-push display mode, mesh and material identities
    pub fn update_properties(&mut self, object: &SceneObject) {
        if object.is_valid() {
            self.core.push_properties(self.host, object);
        }
    }

    /// Queue the object's geometry for evaluation this batch
    ///
    /// Returns false if the object has no geometry or its mesh is already
    /// queued.
    pub fn update_mesh(&mut self, object: &SceneObject) -> bool {
        if !object.is_valid() {
            return false;
        }
        match object.mesh_identity(self.host) {
            Some(identity) => self
                .core
                .mark_geometry_dirty(identity, GeometrySource::Object(object.name().to_string())),
            None => false,
        }
    }
}

fn destroy_owned(
    core: &mut SyncCore,
    objects: &SceneObjectCollection,
    hooks: &mut HashMap<u64, Box<dyn ObjectHooks>>,
    plugin: &str,
    name: &str,
) -> bool {
    let Some(object) = objects.find(name).cloned() else {
        return false;
    };
    if !core.destroy_object(&object) {
        return false;
    }

    if let Some(mut hooks) = hooks.remove(&object.instance_id()) {
        if let Err(e) = hooks.on_destroy(&object) {
            core.report(SyncError::plugin_callback(plugin, "on_destroy", Some(name), &e));
        }
    }
    true
}

/// The plugin trait
///
/// Every callback defaults to a no-op. An error returned from a callback is
/// attributed to the plugin and collected into the batch report; other
/// plugins still receive the same event.
pub trait Plugin {
    /// Unique plugin name
    fn name(&self) -> &str;

    fn on_registered(&mut self, _ctx: &mut PluginContext) -> Result<()> {
        Ok(())
    }

    fn on_unregistered(&mut self, _ctx: &mut PluginContext) -> Result<()> {
        Ok(())
    }

    fn on_enable(&mut self, _ctx: &mut PluginContext) -> Result<()> {
        Ok(())
    }

    /// Called after every owned object has been destroyed
    fn on_disable(&mut self, _ctx: &mut PluginContext) -> Result<()> {
        Ok(())
    }

    fn on_connected(&mut self, _ctx: &mut PluginContext) -> Result<()> {
        Ok(())
    }

    fn on_disconnected(&mut self, _ctx: &mut PluginContext) -> Result<()> {
        Ok(())
    }

    /// A host object appeared in the scene
    fn on_add_host_object(&mut self, _ctx: &mut PluginContext, _object: &HostObject) -> Result<()> {
        Ok(())
    }

    /// A host object left the scene, after its scene object was destroyed
    fn on_remove_host_object(&mut self, _ctx: &mut PluginContext, _name: &str) -> Result<()> {
        Ok(())
    }

    /// The raw update batch, after geometry has been flushed
    fn on_scene_update(&mut self, _ctx: &mut PluginContext, _batch: &UpdateBatch) -> Result<()> {
        Ok(())
    }

    /// An inbound message not addressed to a component
    fn on_message(&mut self, _ctx: &mut PluginContext, _message: &RawMessage) -> Result<()> {
        Ok(())
    }
}

struct PluginSlot {
    name: String,
    plugin: Box<dyn Plugin>,
    status: PluginStatus,
    objects: SceneObjectCollection,
    hooks: HashMap<u64, Box<dyn ObjectHooks>>,
}

impl PluginSlot {
    fn dispatch<F>(
        &mut self,
        core: &mut SyncCore,
        host: &dyn HostScene,
        callback: &'static str,
        object: Option<&str>,
        f: F,
    ) where
        F: FnOnce(&mut dyn Plugin, &mut PluginContext) -> Result<()>,
    {
        let PluginSlot {
            name,
            plugin,
            status,
            objects,
            hooks,
        } = self;

        let mut ctx = PluginContext {
            plugin: name.as_str(),
            enabled: *status == PluginStatus::Enabled,
            core,
            host,
            objects,
            hooks,
        };
        if let Err(e) = f(plugin.as_mut(), &mut ctx) {
            ctx.core
                .report(SyncError::plugin_callback(name.as_str(), callback, object, &e));
        }
    }
}

/// Registered plugins in registration order
#[derive(Default)]
pub(crate) struct PluginRegistry {
    slots: Vec<PluginSlot>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, plugin: Box<dyn Plugin>) -> Result<()> {
        let name = plugin.name().to_string();
        if self.contains(&name) {
            return Err(SyncError::duplicate("plugins", name));
        }

        self.slots.push(PluginSlot {
            name,
            plugin,
            status: PluginStatus::Registered,
            objects: SceneObjectCollection::new(),
            hooks: HashMap::new(),
        });
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Option<Box<dyn Plugin>> {
        let index = self.slots.iter().position(|s| s.name == name)?;
        Some(self.slots.remove(index).plugin)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.slots.iter().any(|s| s.name == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.slots.iter().map(|s| s.name.clone()).collect()
    }

    pub fn status(&self, name: &str) -> Option<PluginStatus> {
        self.slot(name).map(|s| s.status)
    }

    /// Live objects owned by a plugin
    pub fn objects(&self, name: &str) -> Vec<SceneObject> {
        self.slot(name)
            .map(|s| s.objects.iter().filter(|o| o.is_valid()).cloned().collect())
            .unwrap_or_default()
    }

    fn slot(&self, name: &str) -> Option<&PluginSlot> {
        self.slots.iter().find(|s| s.name == name)
    }

    fn slot_mut(&mut self, name: &str) -> Option<&mut PluginSlot> {
        self.slots.iter_mut().find(|s| s.name == name)
    }

    /// Run a callback on one plugin regardless of its status
    pub fn dispatch<F>(
        &mut self,
        name: &str,
        core: &mut SyncCore,
        host: &dyn HostScene,
        callback: &'static str,
        f: F,
    ) -> bool
    where
        F: FnOnce(&mut dyn Plugin, &mut PluginContext) -> Result<()>,
    {
        match self.slot_mut(name) {
            Some(slot) => {
                slot.dispatch(core, host, callback, None, f);
                true
            }
            None => false,
        }
    }

    /// Run a callback on every enabled plugin
    pub fn broadcast<F>(
        &mut self,
        core: &mut SyncCore,
        host: &dyn HostScene,
        callback: &'static str,
        object: Option<&str>,
        mut f: F,
    ) where
        F: FnMut(&mut dyn Plugin, &mut PluginContext) -> Result<()>,
    {
        for slot in self.slots.iter_mut() {
            if slot.status == PluginStatus::Enabled {
                slot.dispatch(core, host, callback, object, &mut f);
            }
        }
    }

    /// Enable a plugin, returning false if it already was
    pub fn enable(&mut self, name: &str, core: &mut SyncCore, host: &dyn HostScene) -> Result<bool> {
        let slot = self
            .slot_mut(name)
            .ok_or_else(|| SyncError::PluginNotFound(name.to_string()))?;
        if slot.status == PluginStatus::Enabled {
            return Ok(false);
        }

        slot.status = PluginStatus::Enabled;
        slot.dispatch(core, host, "on_enable", None, |p, ctx| p.on_enable(ctx));
        log::info!("Enabled plugin '{}'", name);
        Ok(true)
    }

    /// Destroy every object a plugin owns, then disable it
    pub fn disable(&mut self, name: &str, core: &mut SyncCore, host: &dyn HostScene) -> Result<bool> {
        let slot = self
            .slot_mut(name)
            .ok_or_else(|| SyncError::PluginNotFound(name.to_string()))?;
        if slot.status != PluginStatus::Enabled {
            return Ok(false);
        }

        let owned: Vec<String> = slot
            .objects
            .iter()
            .filter(|o| o.is_valid())
            .map(|o| o.name().to_string())
            .collect();
        for object in &owned {
            destroy_owned(core, &slot.objects, &mut slot.hooks, &slot.name, object);
        }

        slot.status = PluginStatus::Disabled;
        slot.dispatch(core, host, "on_disable", None, |p, ctx| p.on_disable(ctx));
        log::info!("Disabled plugin '{}' ({} objects destroyed)", name, owned.len());
        Ok(true)
    }

    /// Destroy one object on behalf of its owning plugin
    pub fn destroy_object(&mut self, core: &mut SyncCore, plugin: &str, name: &str) -> bool {
        match self.slot_mut(plugin) {
            Some(slot) => destroy_owned(core, &slot.objects, &mut slot.hooks, &slot.name, name),
            None => false,
        }
    }

    /// Drop destroyed objects from their owners' collections
    pub fn remove_invalidated(&mut self, invalidated: &[Invalidated]) {
        for entry in invalidated {
            if let Some(slot) = self.slot_mut(&entry.plugin) {
                slot.objects.remove_instance(&entry.name, entry.instance_id);
            }
        }
    }
}
