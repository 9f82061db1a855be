//! Per-batch set of meshes awaiting evaluation

use std::collections::{HashMap, HashSet};

/// Who asked for a mesh to be evaluated
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeometrySource {
    /// A scene object, by name
    Object(String),
    /// A component instance on a host object
    Component { object: String, component: String },
}

/// Mesh identity to representative source, evaluated at most once per batch
///
/// The first source registered for an identity is the one evaluated. Once an
/// identity has been flushed it is not accepted again until the batch ends.
#[derive(Debug, Default)]
pub struct DirtyGeometrySet {
    order: Vec<String>,
    entries: HashMap<String, GeometrySource>,
    flushed: HashSet<String>,
}

impl DirtyGeometrySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a mesh identity, returning false if it is already pending or
    /// was already evaluated this batch
    pub fn insert(&mut self, identity: impl Into<String>, source: GeometrySource) -> bool {
        let identity = identity.into();
        if self.flushed.contains(&identity) || self.entries.contains_key(&identity) {
            return false;
        }
        self.order.push(identity.clone());
        self.entries.insert(identity, source);
        true
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.entries.contains_key(identity)
    }

    /// Take pending entries in registration order, marking them evaluated
    pub fn drain(&mut self) -> Vec<(String, GeometrySource)> {
        let order = std::mem::take(&mut self.order);
        order
            .into_iter()
            .filter_map(|identity| {
                let source = self.entries.remove(&identity)?;
                self.flushed.insert(identity.clone());
                Some((identity, source))
            })
            .collect()
    }

    /// Forget everything, ready for the next batch
    pub fn clear(&mut self) {
        self.order.clear();
        self.entries.clear();
        self.flushed.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
