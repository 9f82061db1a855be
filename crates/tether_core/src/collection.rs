//! Indexed store of scene objects
//!
//! Objects are indexed by name and by host object name. Both indices are
//! updated together on every mutation; neither lookup can return an object
//! the other no longer knows about.

use crate::error::{Result, SyncError};
use crate::object::SceneObject;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct SceneObjectCollection {
    /// Names in insertion order
    order: Vec<String>,
    by_name: HashMap<String, SceneObject>,
    /// Host object name to object name
    by_host: HashMap<String, String>,
}

impl SceneObjectCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an object
    ///
    /// Fails if either key is held by a live object. An invalidated object
    /// still awaiting end-of-batch removal is evicted instead.
    pub fn append(&mut self, object: SceneObject) -> Result<()> {
        if let Some(existing) = self.by_name.get(object.name()) {
            if existing.is_valid() {
                return Err(SyncError::duplicate("scene objects", object.name()));
            }
        }
        if let Some(host_name) = object.host_name() {
            if let Some(existing) = self.find_by_host_name(host_name) {
                if existing.is_valid() {
                    return Err(SyncError::duplicate("host objects", host_name));
                }
            }
        }

        // Evict stale entries holding either key
        let stale_host_owner = object
            .host_name()
            .and_then(|h| self.by_host.get(h))
            .cloned();
        self.remove(object.name());
        if let Some(owner) = stale_host_owner {
            self.remove(&owner);
        }

        if let Some(host_name) = object.host_name() {
            self.by_host.insert(host_name.to_string(), object.name().to_string());
        }
        self.order.push(object.name().to_string());
        self.by_name.insert(object.name().to_string(), object);
        Ok(())
    }

    pub fn find(&self, name: &str) -> Option<&SceneObject> {
        self.by_name.get(name)
    }

    pub fn find_by_host_name(&self, host_name: &str) -> Option<&SceneObject> {
        self.by_host.get(host_name).and_then(|name| self.by_name.get(name))
    }

    /// Live object backed by a host object
    pub fn find_live_by_host_name(&self, host_name: &str) -> Option<&SceneObject> {
        self.find_by_host_name(host_name).filter(|o| o.is_valid())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Remove an object from both indices without running any callbacks
    pub fn remove(&mut self, name: &str) -> Option<SceneObject> {
        let object = self.by_name.remove(name)?;
        if let Some(host_name) = object.host_name() {
            if self.by_host.get(host_name).map(String::as_str) == Some(name) {
                self.by_host.remove(host_name);
            }
        }
        self.order.retain(|n| n != name);
        Some(object)
    }

    /// Remove only if the entry under `name` is the given instance
    pub fn remove_instance(&mut self, name: &str, instance_id: u64) -> Option<SceneObject> {
        match self.by_name.get(name) {
            Some(object) if object.instance_id() == instance_id => self.remove(name),
            _ => None,
        }
    }

    /// Remove every object without running any callbacks
    pub fn clear(&mut self) {
        self.order.clear();
        self.by_name.clear();
        self.by_host.clear();
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Objects in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &SceneObject> {
        self.order.iter().filter_map(|name| self.by_name.get(name))
    }

    pub fn names(&self) -> Vec<String> {
        self.order.clone()
    }
}
