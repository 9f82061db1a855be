//! Component runtime
//!
//! Attaches [`ComponentType`] instances to host objects, keeps their
//! persisted [`ComponentMeta`] in step, syncs declared properties and fans
//! lifecycle events out to every instance.
//!
//! A host object is presented to the engine while it carries at least one
//! component, independently of any plugin-owned scene object.

use crate::component::{ComponentBehavior, ComponentContext, ComponentType};
use crate::dirty::GeometrySource;
use crate::error::{Result, SyncError};
use crate::host::{ComponentMeta, HostObject, HostScene, SceneUpdate};
use crate::sync::SyncCore;
use std::collections::BTreeMap;
use tether_interop::{
    ComponentMessage, InteropComponent, InteropError, InteropProperty, InteropString64,
    PropertyKind, PropertyValue,
};

struct ComponentInstance {
    component: String,
    enabled: bool,
    properties: Vec<(String, PropertyValue)>,
    behavior: Box<dyn ComponentBehavior>,
}

impl ComponentInstance {
    fn set_property(&mut self, name: &str, value: PropertyValue) {
        match self.properties.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => *existing = value,
            None => self.properties.push((name.to_string(), value)),
        }
    }
}

#[derive(Default)]
pub(crate) struct ComponentRuntime {
    types: Vec<ComponentType>,
    /// Host object name to attached instances, in attach order
    attached: BTreeMap<String, Vec<ComponentInstance>>,
}

// ========== Helpers ==========

fn invoke<F>(
    core: &mut SyncCore,
    host: &dyn HostScene,
    object: &str,
    instance: &mut ComponentInstance,
    callback: &'static str,
    f: F,
) where
    F: FnOnce(&mut dyn ComponentBehavior, &ComponentContext) -> Result<()>,
{
    let ctx = ComponentContext {
        object,
        component: &instance.component,
        host,
        properties: &instance.properties,
    };
    if let Err(e) = f(instance.behavior.as_mut(), &ctx) {
        core.report(SyncError::component_callback(
            instance.component.as_str(),
            object,
            callback,
            &e,
        ));
    }
}

/// Flip the enabled flag, running on_enable/on_disable on a change
fn switch_enabled(
    core: &mut SyncCore,
    host: &dyn HostScene,
    object: &str,
    instance: &mut ComponentInstance,
    enabled: bool,
) -> bool {
    if instance.enabled == enabled {
        return false;
    }
    instance.enabled = enabled;
    if enabled {
        invoke(core, host, object, instance, "on_enable", |b, ctx| b.on_enable(ctx));
    } else {
        invoke(core, host, object, instance, "on_disable", |b, ctx| b.on_disable(ctx));
    }
    true
}

/// Build the wire form of an instance
fn interop(
    ty: &ComponentType,
    host: &dyn HostScene,
    object: &str,
    enabled: bool,
) -> Result<InteropComponent> {
    let mesh = ty.mesh_identity(host, object).unwrap_or_default();
    let material = host
        .object(object)
        .and_then(|o| o.active_material)
        .unwrap_or_default();

    Ok(InteropComponent {
        name: InteropString64::new(ty.name())?,
        target: InteropString64::new(object)?,
        mesh: InteropString64::new(&mesh)?,
        material: InteropString64::new(&material)?,
        enabled: i32::from(enabled),
    })
}

fn push_property(
    core: &mut SyncCore,
    component: &InteropComponent,
    name: &str,
    value: &PropertyValue,
) -> Result<()> {
    let property = InteropProperty::new(name, value)?;
    core.transport().update_component_property(component, &property)?;
    Ok(())
}

/// Fit a value to a declared property type
fn coerce(property: &str, kind: PropertyKind, value: PropertyValue) -> Result<PropertyValue> {
    match (kind, value) {
        (kind, value) if value.kind() == kind => Ok(value),
        (PropertyKind::Color, PropertyValue::Vec3(v)) => Ok(PropertyValue::Color(v)),
        (PropertyKind::Vec3, PropertyValue::Color(v)) => Ok(PropertyValue::Vec3(v)),
        (PropertyKind::Enum, PropertyValue::String(v)) => Ok(PropertyValue::Enum(v)),
        (PropertyKind::String, PropertyValue::Enum(v)) => Ok(PropertyValue::String(v)),
        (PropertyKind::Float, PropertyValue::Int(v)) => Ok(PropertyValue::Float(v as f32)),
        (kind, value) => Err(InteropError::type_conversion(
            property,
            format!("expected {:?}, got {:?}", kind, value.kind()),
        )
        .into()),
    }
}

fn find_meta(host: &dyn HostScene, object: &str, component: &str) -> Option<ComponentMeta> {
    host.component_meta(object)
        .into_iter()
        .find(|meta| meta.name == component)
}

fn find_or_create_meta(host: &mut dyn HostScene, object: &str, component: &str) -> ComponentMeta {
    match find_meta(host, object, component) {
        Some(meta) => meta,
        None => {
            let meta = ComponentMeta::new(component, true);
            host.set_component_meta(object, meta.clone());
            meta
        }
    }
}

impl ComponentRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    fn type_index(&self, name: &str) -> Option<usize> {
        self.types.iter().position(|ty| ty.name() == name)
    }

    fn component_type(&self, name: &str) -> Result<&ComponentType> {
        self.types
            .iter()
            .find(|ty| ty.name() == name)
            .ok_or_else(|| SyncError::ComponentNotFound(name.to_string()))
    }

    fn instance_mut(&mut self, object: &str, component: &str) -> Result<&mut ComponentInstance> {
        self.attached
            .get_mut(object)
            .and_then(|instances| instances.iter_mut().find(|i| i.component == component))
            .ok_or_else(|| SyncError::ComponentNotAttached {
                component: component.to_string(),
                object: object.to_string(),
            })
    }

    // ========== Registration ==========

    /// Register a component type and attach it where it belongs
    ///
    /// Objects with persisted metadata for the type get their attachment
    /// restored; autobind types are polled against every other tracked
    /// object.
    pub fn register(&mut self, core: &mut SyncCore, host: &mut dyn HostScene, ty: ComponentType) -> Result<()> {
        if self.type_index(ty.name()).is_some() {
            return Err(SyncError::duplicate("component types", ty.name()));
        }
        let name = ty.name().to_string();
        log::info!("Registered component type '{}'", name);
        self.types.push(ty);
        let index = self.types.len() - 1;

        if !core.is_running() {
            return Ok(());
        }
        for object_name in core.tracked_names().to_vec() {
            let Some(object) = host.object(&object_name) else {
                continue;
            };
            let persisted = find_meta(&*host, &object_name, &name).is_some();
            if persisted || self.types[index].polls(&object) {
                let result = self.attach(core, host, &object, index);
                core.record(result);
            }
        }
        Ok(())
    }

    /// Destroy every instance of a type, then forget the type
    ///
    /// Persisted metadata is kept so a later registration restores the
    /// attachments.
    pub fn unregister(&mut self, core: &mut SyncCore, host: &mut dyn HostScene, name: &str) -> Result<()> {
        self.component_type(name)?;

        let objects: Vec<String> = self
            .attached
            .iter()
            .filter(|(_, instances)| instances.iter().any(|i| i.component == name))
            .map(|(object, _)| object.clone())
            .collect();
        for object in objects {
            let result = self.detach(core, host, &object, name, false);
            core.record(result);
        }

        self.types.retain(|ty| ty.name() != name);
        log::info!("Unregistered component type '{}'", name);
        Ok(())
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.type_index(name).is_some()
    }

    // ========== Attachment ==========

    /// Attach a registered type to a host object, no-op if already attached
    pub fn add(&mut self, core: &mut SyncCore, host: &mut dyn HostScene, object: &str, component: &str) -> Result<bool> {
        let index = self
            .type_index(component)
            .ok_or_else(|| SyncError::ComponentNotFound(component.to_string()))?;
        let host_object = host
            .object(object)
            .ok_or_else(|| SyncError::ObjectNotFound(object.to_string()))?;
        self.attach(core, host, &host_object, index)
    }

    fn attach(
        &mut self,
        core: &mut SyncCore,
        host: &mut dyn HostScene,
        object: &HostObject,
        index: usize,
    ) -> Result<bool> {
        let ty = &self.types[index];
        if self
            .attached
            .get(&object.name)
            .map_or(false, |instances| instances.iter().any(|i| i.component == ty.name()))
        {
            return Ok(false);
        }

        // Nothing is persisted for an instance the engine cannot represent
        let enabled = find_meta(&*host, &object.name, ty.name()).map_or(true, |meta| meta.enabled);
        let component = interop(ty, &*host, &object.name, enabled)?;
        let meta = find_or_create_meta(host, &object.name, ty.name());

        let mut properties = ty.default_values();
        for (name, value) in properties.iter_mut() {
            if let Some(saved) = meta.property(name) {
                if saved.kind() == value.kind() {
                    *value = saved.clone();
                }
            }
        }

        let instances = self.attached.entry(object.name.clone()).or_default();
        if instances.is_empty() {
            core.present_component_object(&*host, object);
        }

        let result = core.transport().add_component(&component);
        core.record(result.map_err(SyncError::from));
        for (name, value) in &properties {
            let result = push_property(core, &component, name, value);
            core.record(result);
        }

        let mut instance = ComponentInstance {
            component: ty.name().to_string(),
            enabled: false,
            properties,
            behavior: ty.create(),
        };
        switch_enabled(core, &*host, &object.name, &mut instance, meta.enabled);
        invoke(core, &*host, &object.name, &mut instance, "on_create", |b, ctx| b.on_create(ctx));

        if let Some(identity) = ty.mesh_identity(&*host, &object.name) {
            core.mark_geometry_dirty(
                identity,
                GeometrySource::Component {
                    object: object.name.clone(),
                    component: ty.name().to_string(),
                },
            );
        }

        log::debug!("Attached component '{}' to '{}'", ty.name(), object.name);
        instances.push(instance);
        Ok(true)
    }

    /// Disable and destroy an instance
    pub fn destroy(&mut self, core: &mut SyncCore, host: &mut dyn HostScene, object: &str, component: &str) -> Result<()> {
        self.detach(core, host, object, component, true)
    }

    fn detach(
        &mut self,
        core: &mut SyncCore,
        host: &mut dyn HostScene,
        object: &str,
        component: &str,
        forget_meta: bool,
    ) -> Result<()> {
        let ty = self.component_type(component)?;
        let wire = interop(ty, &*host, object, false);

        let not_attached = || SyncError::ComponentNotAttached {
            component: component.to_string(),
            object: object.to_string(),
        };
        let instances = self.attached.get_mut(object).ok_or_else(not_attached)?;
        let position = instances
            .iter()
            .position(|i| i.component == component)
            .ok_or_else(not_attached)?;
        let mut instance = instances.remove(position);
        let last = instances.is_empty();
        if last {
            self.attached.remove(object);
        }

        switch_enabled(core, &*host, object, &mut instance, false);
        invoke(core, &*host, object, &mut instance, "on_destroy", |b, ctx| b.on_destroy(ctx));

        let result = wire.and_then(|wire| {
            core.transport()
                .destroy_component(&wire)
                .map_err(SyncError::from)
        });
        core.record(result);

        if forget_meta {
            host.remove_component_meta(object, component);
        }
        if last {
            core.withdraw_component_object(object);
        }
        log::debug!("Detached component '{}' from '{}'", component, object);
        Ok(())
    }

    // ========== Host object lifecycle ==========

    /// Restore persisted attachments and poll autobind types
    pub fn on_new_object(&mut self, core: &mut SyncCore, host: &mut dyn HostScene, object: &HostObject) {
        for meta in host.component_meta(&object.name) {
            match self.type_index(&meta.name) {
                Some(index) => {
                    let result = self.attach(core, host, object, index);
                    core.record(result);
                }
                None => log::debug!(
                    "Object '{}' has metadata for unregistered component '{}'",
                    object.name,
                    meta.name
                ),
            }
        }

        for index in 0..self.types.len() {
            if self.types[index].polls(object) {
                let result = self.attach(core, host, object, index);
                core.record(result);
            }
        }
    }

    /// The host object is gone; persisted metadata went with it
    pub fn destroy_object(&mut self, core: &mut SyncCore, host: &dyn HostScene, object: &str) {
        let Some(mut instances) = self.attached.remove(object) else {
            return;
        };
        for instance in instances.iter_mut() {
            switch_enabled(core, host, object, instance, false);
            invoke(core, host, object, instance, "on_destroy", |b, ctx| b.on_destroy(ctx));
        }
        core.withdraw_component_object(object);
    }

    /// Forward one batch entry to the instances on its object
    pub fn on_object_update(&mut self, core: &mut SyncCore, host: &dyn HostScene, update: &SceneUpdate) {
        let Some(object) = update.object() else {
            return;
        };
        let Some(instances) = self.attached.get_mut(object) else {
            return;
        };

        // A plugin-owned scene object on the same host object pushes its own
        if update.transform && core.objects().find_live_by_host_name(object).is_none() {
            core.push_host_transform(host, object, object);
        }

        for instance in instances.iter_mut() {
            invoke(core, host, object, instance, "on_update", |b, ctx| b.on_update(ctx, update));

            if update.geometry {
                let identity = self
                    .types
                    .iter()
                    .find(|ty| ty.name() == instance.component)
                    .and_then(|ty| ty.mesh_identity(host, object));
                if let Some(identity) = identity {
                    core.mark_geometry_dirty(
                        identity,
                        GeometrySource::Component {
                            object: object.to_string(),
                            component: instance.component.clone(),
                        },
                    );
                }
            }
        }
    }

    /// Re-push components whose object uses `material`
    pub fn on_material_update(&mut self, core: &mut SyncCore, host: &dyn HostScene, material: &str) {
        for (object, instances) in &self.attached {
            let uses_material = host
                .object(object)
                .map_or(false, |o| o.active_material.as_deref() == Some(material));
            if !uses_material {
                continue;
            }
            for instance in instances {
                let Some(ty) = self.types.iter().find(|ty| ty.name() == instance.component) else {
                    continue;
                };
                let result = interop(ty, host, object, instance.enabled)
                    .and_then(|wire| {
                        core.transport()
                            .update_component(&wire)
                            .map_err(SyncError::from)
                    });
                core.record(result);
            }
        }
    }

    // ========== Fan-out ==========

    fn fan_out<F>(&mut self, core: &mut SyncCore, host: &dyn HostScene, callback: &'static str, mut f: F)
    where
        F: FnMut(&mut dyn ComponentBehavior, &ComponentContext) -> Result<()>,
    {
        for (object, instances) in self.attached.iter_mut() {
            for instance in instances.iter_mut() {
                invoke(core, host, object, instance, callback, &mut f);
            }
        }
    }

    pub fn after_updates(&mut self, core: &mut SyncCore, host: &dyn HostScene) {
        self.fan_out(core, host, "on_after_updates", |b, ctx| b.on_after_updates(ctx));
    }

    pub fn start(&mut self, core: &mut SyncCore, host: &dyn HostScene) {
        self.fan_out(core, host, "on_start", |b, ctx| b.on_start(ctx));
    }

    pub fn connected(&mut self, core: &mut SyncCore, host: &dyn HostScene) {
        self.fan_out(core, host, "on_connected", |b, ctx| b.on_connected(ctx));
    }

    pub fn disconnected(&mut self, core: &mut SyncCore, host: &dyn HostScene) {
        self.fan_out(core, host, "on_disconnected", |b, ctx| b.on_disconnected(ctx));
    }

    /// Stop every instance and drop it, keeping persisted metadata
    pub fn stop(&mut self, core: &mut SyncCore, host: &dyn HostScene) {
        self.fan_out(core, host, "on_stop", |b, ctx| b.on_stop(ctx));

        for (object, mut instances) in std::mem::take(&mut self.attached) {
            for instance in instances.iter_mut() {
                switch_enabled(core, host, &object, instance, false);
                invoke(core, host, &object, instance, "on_destroy", |b, ctx| b.on_destroy(ctx));
            }
        }
    }

    // ========== Properties and messages ==========

    pub fn set_enabled(
        &mut self,
        core: &mut SyncCore,
        host: &mut dyn HostScene,
        object: &str,
        component: &str,
        enabled: bool,
    ) -> Result<()> {
        let index = self
            .type_index(component)
            .ok_or_else(|| SyncError::ComponentNotFound(component.to_string()))?;
        let instance = self.instance_mut(object, component)?;
        if !switch_enabled(core, &*host, object, instance, enabled) {
            return Ok(());
        }

        let mut meta = find_or_create_meta(host, object, component);
        meta.enabled = enabled;
        host.set_component_meta(object, meta);

        let wire = interop(&self.types[index], &*host, object, enabled)?;
        core.transport().update_component(&wire)?;
        Ok(())
    }

    /// Push, store and persist a property value
    pub fn set_property(
        &mut self,
        core: &mut SyncCore,
        host: &mut dyn HostScene,
        object: &str,
        component: &str,
        property: &str,
        value: PropertyValue,
    ) -> Result<()> {
        let index = self
            .type_index(component)
            .ok_or_else(|| SyncError::ComponentNotFound(component.to_string()))?;
        let decl = self.types[index]
            .property(property)
            .ok_or_else(|| SyncError::PropertyNotFound {
                component: component.to_string(),
                property: property.to_string(),
            })?;
        let value = coerce(property, decl.kind, value)?;

        let enabled = self.instance_mut(object, component)?.enabled;
        let wire = interop(&self.types[index], &*host, object, enabled)?;
        push_property(core, &wire, property, &value)?;

        let mut meta = find_or_create_meta(host, object, component);
        meta.set_property(property, value.clone());
        host.set_component_meta(object, meta);

        let instance = self.instance_mut(object, component)?;
        instance.set_property(property, value.clone());
        invoke(core, &*host, object, instance, "on_property_changed", |b, ctx| {
            b.on_property_changed(ctx, property, &value)
        });
        Ok(())
    }

    /// Route an inbound message to the named component on its target
    pub fn dispatch_message(&mut self, core: &mut SyncCore, host: &dyn HostScene, message: &ComponentMessage) -> Result<()> {
        let instance = self.instance_mut(&message.target, &message.id)?;
        invoke(core, host, &message.target, instance, "on_message", |b, ctx| {
            b.on_message(ctx, &message.payload)
        });
        Ok(())
    }

    // ========== Queries ==========

    /// Registered types neither attached to nor persisted on an object
    pub fn available(&self, host: &dyn HostScene, object: &str) -> Vec<String> {
        let persisted = host.component_meta(object);
        let attached = self.components_on(object);
        self.types
            .iter()
            .map(|ty| ty.name())
            .filter(|name| !attached.iter().any(|a| a == *name))
            .filter(|name| !persisted.iter().any(|m| m.name == *name))
            .map(str::to_string)
            .collect()
    }

    /// Component types attached to an object, in attach order
    pub fn components_on(&self, object: &str) -> Vec<String> {
        self.attached
            .get(object)
            .map(|instances| instances.iter().map(|i| i.component.clone()).collect())
            .unwrap_or_default()
    }

    pub fn property(&self, object: &str, component: &str, property: &str) -> Option<PropertyValue> {
        self.attached
            .get(object)?
            .iter()
            .find(|i| i.component == component)?
            .properties
            .iter()
            .find(|(name, _)| name == property)
            .map(|(_, value)| value.clone())
    }

    pub fn is_enabled(&self, object: &str, component: &str) -> Option<bool> {
        self.attached
            .get(object)?
            .iter()
            .find(|i| i.component == component)
            .map(|i| i.enabled)
    }
}
