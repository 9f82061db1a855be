//! Runtime coordinator
//!
//! One [`Runtime`] per host session. It is the single authority for the
//! running and connected state, owns the tracked host object names, the
//! plugin and component runtimes and the viewport registry, and drives the
//! per-batch diff:
//!
//! 1. diff host object names against the tracked set, notifying plugins and
//!    components of additions and removals
//! 2. classify every update as transform, geometry or material and queue
//!    geometry by mesh identity
//! 3. flush queued geometry through the mesh marshaler
//! 4. hand the raw batch to every enabled plugin
//! 5. drop destroyed objects and per-batch state, then log the batch report
//!
//! The host drives [`Runtime::on_tick`] from a timer and reschedules it with
//! the returned interval.

use crate::component::ComponentType;
use crate::components::ComponentRuntime;
use crate::config::RuntimeConfig;
use crate::dirty::GeometrySource;
use crate::error::{Result, SyncError};
use crate::host::{HostScene, SceneUpdate, UpdateBatch, UpdatedId};
use crate::mesh::MeshMarshaler;
use crate::object::SceneObject;
use crate::plugin::{Plugin, PluginRegistry, PluginStatus};
use crate::plugins::{MeshPlugin, MetaballsPlugin};
use crate::report::BatchReport;
use crate::sync::SyncCore;
use crate::viewport::{Viewport, ViewportRegistry};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tether_interop::{convert, ConnectStatus, HostValue, InboundMessage, PropertyValue, Transport};

pub struct Runtime {
    config: RuntimeConfig,
    core: SyncCore,
    plugins: PluginRegistry,
    components: ComponentRuntime,
    viewports: ViewportRegistry,
    last_report: BatchReport,
}

impl Runtime {
    pub fn new(config: RuntimeConfig, transport: Box<dyn Transport>) -> Self {
        let marshaler = MeshMarshaler::new(config.max_uv_layers);
        Self {
            config,
            core: SyncCore::new(transport, marshaler),
            plugins: PluginRegistry::new(),
            components: ComponentRuntime::new(),
            viewports: ViewportRegistry::new(),
            last_report: BatchReport::new(),
        }
    }

    /// Register the mesh and metaballs plugins
    pub fn register_builtin_plugins(&mut self, host: &mut dyn HostScene) -> Result<()> {
        self.register_plugin(host, MeshPlugin)?;
        self.register_plugin(host, MetaballsPlugin::new())?;
        Ok(())
    }

    // ========== State ==========

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.core.is_running()
    }

    pub fn is_connected(&self) -> bool {
        self.core.is_connected()
    }

    /// Every tracked scene object
    pub fn objects(&self) -> Vec<SceneObject> {
        self.core.objects().iter().cloned().collect()
    }

    pub fn find_object(&self, name: &str) -> Option<SceneObject> {
        self.core.objects().find(name).cloned()
    }

    pub fn tracked_names(&self) -> &[String] {
        self.core.tracked_names()
    }

    /// Failures collected during the most recent batch
    pub fn last_report(&self) -> &BatchReport {
        &self.last_report
    }

    // ========== Lifecycle ==========

    /// Start syncing, no-op if already running
    pub fn start(&mut self, host: &mut dyn HostScene) {
        if self.core.is_running() {
            return;
        }
        log::info!(
            "Starting runtime on '{}' (host {})",
            self.config.connection_name,
            self.config.host_version
        );
        self.core.set_running(true);
        self.connect();

        for viewport in self.viewports.live() {
            let result = self.core.transport().add_viewport(viewport.id());
            self.core.record(result.map_err(SyncError::from));
        }

        for name in self.plugins.names() {
            let result = self.enable_and_replay(host, &name);
            self.core.record(result);
        }

        self.sync_tracked_objects(host);
        self.components.start(&mut self.core, &*host);
        self.viewports.tag_redraw();
        self.finish_batch(host);
    }

    /// Stop syncing and drop all tracked state, no-op if not running
    pub fn stop(&mut self, host: &mut dyn HostScene) {
        if !self.core.is_running() {
            return;
        }
        log::info!("Stopping runtime");

        if self.core.is_connected() {
            self.notify_disconnected(host);
        }
        let result = self.core.transport().disconnect();
        self.core.record(result.map_err(SyncError::from));

        for name in self.plugins.names() {
            let result = self.plugins.disable(&name, &mut self.core, &*host);
            self.core.record(result);
        }
        self.components.stop(&mut self.core, &*host);

        self.core.clear_dirty();
        self.remove_invalidated();
        self.core.reset();
        self.end_batch();

        self.core.set_running(false);
        self.viewports.tag_redraw();
    }

    /// The host is about to replace the whole document
    pub fn on_load_pre(&mut self, host: &mut dyn HostScene) {
        self.stop(host);
    }

    // ========== Update batches ==========

    /// Apply one host update batch
    pub fn on_scene_update(&mut self, host: &mut dyn HostScene, batch: &UpdateBatch) {
        if !self.core.is_running() {
            return;
        }

        self.sync_tracked_objects(host);

        for update in &batch.updates {
            match &update.id {
                UpdatedId::Object(name) => self.update_object(&*host, update, name),
                UpdatedId::Material(material) => self.update_material(&*host, material),
                UpdatedId::Other(_) => {}
            }
        }

        self.core.flush_geometry(host);
        self.components.after_updates(&mut self.core, &*host);
        self.plugins
            .broadcast(&mut self.core, &*host, "on_scene_update", None, |p, ctx| {
                p.on_scene_update(ctx, batch)
            });
        self.finish_batch(host);
    }

    /// Diff host object names against the tracked set
    fn sync_tracked_objects(&mut self, host: &mut dyn HostScene) {
        let current = host.object_names();
        let previous = self.core.tracked_names().to_vec();

        let removed: Vec<String> = {
            let current: HashSet<&str> = current.iter().map(String::as_str).collect();
            previous
                .iter()
                .filter(|name| !current.contains(name.as_str()))
                .cloned()
                .collect()
        };
        let added: Vec<String> = {
            let previous: HashSet<&str> = previous.iter().map(String::as_str).collect();
            current
                .iter()
                .filter(|name| !previous.contains(name.as_str()))
                .cloned()
                .collect()
        };
        self.core.set_tracked_names(current);

        // Removals first so a rename re-adds onto a clean slate
        for name in &removed {
            self.remove_host_object(host, name);
        }
        for name in &added {
            self.add_host_object(host, name);
        }
    }

    fn add_host_object(&mut self, host: &mut dyn HostScene, name: &str) {
        let Some(object) = host.object(name) else {
            return;
        };
        self.plugins
            .broadcast(&mut self.core, &*host, "on_add_host_object", Some(name), |p, ctx| {
                p.on_add_host_object(ctx, &object)
            });
        self.components.on_new_object(&mut self.core, host, &object);
    }

    fn remove_host_object(&mut self, host: &mut dyn HostScene, name: &str) {
        if let Some(object) = self.core.objects().find_live_by_host_name(name).cloned() {
            self.plugins
                .destroy_object(&mut self.core, object.plugin(), object.name());
        }
        self.components.destroy_object(&mut self.core, &*host, name);
        self.plugins
            .broadcast(&mut self.core, &*host, "on_remove_host_object", Some(name), |p, ctx| {
                p.on_remove_host_object(ctx, name)
            });
    }

    fn update_object(&mut self, host: &dyn HostScene, update: &SceneUpdate, name: &str) {
        if let Some(object) = self.core.objects().find_live_by_host_name(name).cloned() {
            if update.transform {
                self.core.update_transform(host, &object);
            }
            if update.geometry {
                if let Some(identity) = object.mesh_identity(host) {
                    self.core.mark_geometry_dirty(
                        identity,
                        GeometrySource::Object(object.name().to_string()),
                    );
                }
            }
            // Material, display mode or mesh identity may have changed
            self.core.push_properties(host, &object);
        }
        self.components.on_object_update(&mut self.core, host, update);
    }

    fn update_material(&mut self, host: &dyn HostScene, material: &str) {
        let users: Vec<SceneObject> = self
            .core
            .objects()
            .iter()
            .filter(|o| o.is_valid())
            .filter(|o| {
                o.host_name()
                    .and_then(|name| host.object(name))
                    .and_then(|object| object.active_material)
                    .as_deref()
                    == Some(material)
            })
            .cloned()
            .collect();
        for object in &users {
            self.core.push_properties(host, object);
        }
        self.components.on_material_update(&mut self.core, host, material);
    }

    /// Flush geometry queued outside a batch, then end it
    fn finish_batch(&mut self, host: &mut dyn HostScene) {
        self.core.flush_geometry(host);
        self.end_batch();
    }

    fn end_batch(&mut self) {
        self.remove_invalidated();
        self.core.clear_dirty();

        let report = self.core.take_report();
        report.log();
        self.last_report = report;
    }

    fn remove_invalidated(&mut self) {
        let invalidated = self.core.remove_invalidated();
        self.plugins.remove_invalidated(&invalidated);
    }

    // ========== Connection ==========

    /// Run one pump step, returning when to tick again
    ///
    /// Returns `None` once the runtime is stopped.
    pub fn on_tick(&mut self, host: &mut dyn HostScene) -> Option<Duration> {
        if !self.core.is_running() {
            return None;
        }

        for id in self.viewports.prune() {
            let result = self.core.transport().remove_viewport(id);
            self.core.record(result.map_err(SyncError::from));
        }

        let interval = if self.core.is_connected() {
            self.pump(host);
            if self.core.transport_ref().is_connected() {
                self.push_cameras();
                self.viewports.tag_redraw();
                self.config.connected_interval()
            } else {
                self.notify_disconnected(host);
                self.config.connect_interval()
            }
        } else {
            self.connect();
            let message = self.core.transport().update();
            if self.core.transport_ref().is_connected() {
                self.notify_connected(host);
                if let Some(message) = message {
                    self.handle_message(host, message);
                }
                self.config.connected_interval()
            } else {
                self.config.connect_interval()
            }
        };

        self.finish_batch(host);
        Some(interval)
    }

    /// Open shared memory if it is not open yet
    fn connect(&mut self) {
        if self.core.transport_ref().is_connected_to_shared_memory() {
            return;
        }
        let status = self
            .core
            .transport()
            .connect(&self.config.connection_name, &self.config.host_version);
        match status {
            ConnectStatus::Connected => {
                log::info!("Opened shared memory '{}'", self.config.connection_name)
            }
            ConnectStatus::Unavailable => {
                log::debug!("Shared memory '{}' not available yet", self.config.connection_name)
            }
            ConnectStatus::Failed(status) => self.core.report(SyncError::TransportUnavailable {
                connection: self.config.connection_name.clone(),
                status,
            }),
        }
    }

    fn pump(&mut self, host: &mut dyn HostScene) {
        for _ in 0..self.config.max_messages_per_tick {
            let Some(message) = self.core.transport().update() else {
                break;
            };
            self.handle_message(host, message);
            if !self.core.transport_ref().is_connected() {
                break;
            }
        }
    }

    fn handle_message(&mut self, host: &mut dyn HostScene, message: InboundMessage) {
        match message {
            InboundMessage::Component(message) => {
                let result = self
                    .components
                    .dispatch_message(&mut self.core, &*host, &message);
                self.core.record(result);
            }
            InboundMessage::Other(raw) => {
                self.plugins
                    .broadcast(&mut self.core, &*host, "on_message", None, |p, ctx| {
                        p.on_message(ctx, &raw)
                    });
            }
        }
    }

    fn notify_connected(&mut self, host: &mut dyn HostScene) {
        log::info!("Engine connected on '{}'", self.config.connection_name);
        self.core.set_connected(true);
        self.plugins
            .broadcast(&mut self.core, &*host, "on_connected", None, |p, ctx| p.on_connected(ctx));
        self.components.connected(&mut self.core, &*host);
        self.viewports.tag_redraw();
    }

    fn notify_disconnected(&mut self, host: &mut dyn HostScene) {
        log::info!("Engine disconnected from '{}'", self.config.connection_name);
        self.core.set_connected(false);
        self.plugins
            .broadcast(&mut self.core, &*host, "on_disconnected", None, |p, ctx| {
                p.on_disconnected(ctx)
            });
        self.components.disconnected(&mut self.core, &*host);
        self.viewports.tag_redraw();
    }

    // ========== Plugins ==========

    /// Register a plugin, enabling and connecting it to match the runtime
    pub fn register_plugin<P: Plugin + 'static>(&mut self, host: &mut dyn HostScene, plugin: P) -> Result<()> {
        let name = plugin.name().to_string();
        self.plugins.insert(Box::new(plugin))?;
        log::info!("Registered plugin '{}'", name);

        self.plugins
            .dispatch(&name, &mut self.core, &*host, "on_registered", |p, ctx| p.on_registered(ctx));
        if self.core.is_running() {
            let result = self.enable_and_replay(host, &name);
            self.core.record(result);
        }
        if self.core.is_connected() {
            self.plugins
                .dispatch(&name, &mut self.core, &*host, "on_connected", |p, ctx| p.on_connected(ctx));
        }
        self.finish_batch(host);
        Ok(())
    }

    /// Disconnect, disable and remove a plugin
    pub fn unregister_plugin(&mut self, host: &mut dyn HostScene, name: &str) -> Result<()> {
        if !self.plugins.contains(name) {
            return Err(SyncError::PluginNotFound(name.to_string()));
        }

        if self.core.is_connected() {
            self.plugins.dispatch(name, &mut self.core, &*host, "on_disconnected", |p, ctx| {
                p.on_disconnected(ctx)
            });
        }
        if self.core.is_running() {
            self.plugins.disable(name, &mut self.core, &*host)?;
        }
        self.plugins
            .dispatch(name, &mut self.core, &*host, "on_unregistered", |p, ctx| p.on_unregistered(ctx));

        self.finish_batch(host);
        self.plugins.remove(name);
        log::info!("Unregistered plugin '{}'", name);
        Ok(())
    }

    /// Enable a plugin, only while running
    pub fn enable_plugin(&mut self, host: &mut dyn HostScene, name: &str) -> Result<()> {
        if !self.core.is_running() {
            return Err(SyncError::NotRunning);
        }
        self.enable_and_replay(host, name)?;
        self.finish_batch(host);
        Ok(())
    }

    /// Enable a plugin and announce every tracked host object to it
    fn enable_and_replay(&mut self, host: &mut dyn HostScene, name: &str) -> Result<()> {
        if !self.plugins.enable(name, &mut self.core, &*host)? {
            return Ok(());
        }
        for object_name in self.core.tracked_names().to_vec() {
            let Some(object) = host.object(&object_name) else {
                continue;
            };
            self.plugins
                .dispatch(name, &mut self.core, &*host, "on_add_host_object", |p, ctx| {
                    p.on_add_host_object(ctx, &object)
                });
        }
        Ok(())
    }

    /// Destroy a plugin's objects and disable it
    pub fn disable_plugin(&mut self, host: &mut dyn HostScene, name: &str) -> Result<()> {
        self.plugins.disable(name, &mut self.core, &*host)?;
        self.finish_batch(host);
        Ok(())
    }

    pub fn plugin_status(&self, name: &str) -> Option<PluginStatus> {
        self.plugins.status(name)
    }

    pub fn plugin_names(&self) -> Vec<String> {
        self.plugins.names()
    }

    /// Live objects owned by a plugin
    pub fn plugin_objects(&self, name: &str) -> Vec<SceneObject> {
        self.plugins.objects(name)
    }

    // ========== Components ==========

    pub fn register_component(&mut self, host: &mut dyn HostScene, ty: ComponentType) -> Result<()> {
        self.components.register(&mut self.core, host, ty)?;
        self.finish_batch(host);
        Ok(())
    }

    pub fn unregister_component(&mut self, host: &mut dyn HostScene, name: &str) -> Result<()> {
        self.components.unregister(&mut self.core, host, name)?;
        self.finish_batch(host);
        Ok(())
    }

    /// Attach a component to a host object, no-op if already attached
    pub fn add_component(&mut self, host: &mut dyn HostScene, object: &str, component: &str) -> Result<()> {
        self.require_running()?;
        self.components.add(&mut self.core, host, object, component)?;
        self.finish_batch(host);
        Ok(())
    }

    pub fn destroy_component(&mut self, host: &mut dyn HostScene, object: &str, component: &str) -> Result<()> {
        self.require_running()?;
        self.components.destroy(&mut self.core, host, object, component)?;
        self.finish_batch(host);
        Ok(())
    }

    pub fn set_component_enabled(
        &mut self,
        host: &mut dyn HostScene,
        object: &str,
        component: &str,
        enabled: bool,
    ) -> Result<()> {
        self.require_running()?;
        let result = self
            .components
            .set_enabled(&mut self.core, host, object, component, enabled);
        self.finish_batch(host);
        result
    }

    /// Set a component property from a host value
    ///
    /// Values without a wire representation fail with a type conversion
    /// error and nothing is pushed.
    pub fn set_component_property(
        &mut self,
        host: &mut dyn HostScene,
        object: &str,
        component: &str,
        property: &str,
        value: impl Into<HostValue>,
    ) -> Result<()> {
        self.require_running()?;
        let value = PropertyValue::from_host(property, value.into())?;
        let result = self
            .components
            .set_property(&mut self.core, host, object, component, property, value);
        self.finish_batch(host);
        result
    }

    pub fn component_property(&self, object: &str, component: &str, property: &str) -> Option<PropertyValue> {
        self.components.property(object, component, property)
    }

    pub fn is_component_enabled(&self, object: &str, component: &str) -> Option<bool> {
        self.components.is_enabled(object, component)
    }

    pub fn is_component_registered(&self, name: &str) -> bool {
        self.components.is_registered(name)
    }

    /// Registered component types that can still be added to an object
    pub fn available_components(&self, host: &dyn HostScene, object: &str) -> Vec<String> {
        self.components.available(host, object)
    }

    pub fn components_on(&self, object: &str) -> Vec<String> {
        self.components.components_on(object)
    }

    fn require_running(&self) -> Result<()> {
        if self.core.is_running() {
            Ok(())
        } else {
            Err(SyncError::NotRunning)
        }
    }

    // ========== Viewports ==========

    /// Track a viewport, announcing it to the engine while running
    pub fn add_viewport(&mut self, viewport: &Arc<dyn Viewport>) -> Result<()> {
        let id = self.viewports.insert(viewport);
        if self.core.is_running() {
            self.core.transport().add_viewport(id)?;
        }
        Ok(())
    }

    pub fn remove_viewport(&mut self, id: i32) -> Result<()> {
        if self.viewports.remove(id) && self.core.is_running() {
            self.core.transport().remove_viewport(id)?;
        }
        Ok(())
    }

    /// Push a viewport's current camera
    pub fn update_viewport_camera(&mut self, id: i32) -> Result<()> {
        let Some(view) = self.viewports.get(id).and_then(|viewport| viewport.camera()) else {
            return Ok(());
        };
        self.core
            .transport()
            .set_viewport_camera(id, &convert::camera(&view))?;
        Ok(())
    }

    pub fn viewport_ids(&self) -> Vec<i32> {
        self.viewports.ids()
    }

    fn push_cameras(&mut self) {
        for viewport in self.viewports.live() {
            if let Some(view) = viewport.camera() {
                let result = self
                    .core
                    .transport()
                    .set_viewport_camera(viewport.id(), &convert::camera(&view));
                self.core.record(result.map_err(SyncError::from));
            }
        }
    }
}
