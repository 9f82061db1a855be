//! In-memory host scene
//!
//! A small [`HostScene`] used by the replay tool and tests. Mesh objects
//! reference shared mesh datablocks, modifiers are simple translations and
//! metaball objects evaluate to one cube per element.

use crate::host::{ComponentMeta, EvaluatedMesh, HostObject, HostObjectType, HostScene};
use glam::{Mat4, Vec3};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Default)]
pub struct InMemoryScene {
    /// Objects in scene order
    objects: Vec<HostObject>,
    meshes: HashMap<String, EvaluatedMesh>,
    /// Per-object translate modifiers
    modifiers: HashMap<String, Vec<Vec3>>,
    meta: HashMap<String, Vec<ComponentMeta>>,
    evaluations: HashMap<String, usize>,
    failing: HashSet<String>,
    last_preserve_flag: Option<bool>,
}

impl InMemoryScene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a mesh datablock
    pub fn add_mesh(&mut self, name: impl Into<String>, mesh: EvaluatedMesh) {
        self.meshes.insert(name.into(), mesh);
    }

    /// Add an object, linking it under its parent
    pub fn add_object(&mut self, mut object: HostObject) {
        self.remove_object(&object.name);

        if let Some(parent) = object.parent.as_deref() {
            if let Some(parent) = self.find_mut(parent) {
                parent.children.push(object.name.clone());
            }
        }
        for existing in &self.objects {
            if existing.parent.as_deref() == Some(object.name.as_str())
                && !object.children.contains(&existing.name)
            {
                object.children.push(existing.name.clone());
            }
        }
        self.objects.push(object);
    }

    /// Remove an object, unparenting its children
    pub fn remove_object(&mut self, name: &str) -> Option<HostObject> {
        let index = self.objects.iter().position(|o| o.name == name)?;
        let removed = self.objects.remove(index);

        for object in &mut self.objects {
            object.children.retain(|child| child != name);
            if object.parent.as_deref() == Some(name) {
                object.parent = None;
            }
        }
        self.modifiers.remove(name);
        Some(removed)
    }

    /// Rename an object, keeping children and component metadata attached
    pub fn rename_object(&mut self, from: &str, to: &str) -> bool {
        if self.find(to).is_some() {
            return false;
        }
        let Some(object) = self.find_mut(from) else {
            return false;
        };
        object.name = to.to_string();

        for object in &mut self.objects {
            if object.parent.as_deref() == Some(from) {
                object.parent = Some(to.to_string());
            }
            for child in &mut object.children {
                if child == from {
                    *child = to.to_string();
                }
            }
        }

        if let Some(modifiers) = self.modifiers.remove(from) {
            self.modifiers.insert(to.to_string(), modifiers);
        }
        if let Some(meta) = self.meta.remove(from) {
            self.meta.insert(to.to_string(), meta);
        }
        true
    }

    pub fn set_location(&mut self, name: &str, location: Vec3) -> bool {
        match self.find_mut(name) {
            Some(object) => {
                object.world = Mat4::from_translation(location);
                true
            }
            None => false,
        }
    }

    pub fn set_material(&mut self, name: &str, material: Option<&str>) -> bool {
        match self.find_mut(name) {
            Some(object) => {
                object.active_material = material.map(str::to_string);
                true
            }
            None => false,
        }
    }

    /// Point an object at a different mesh datablock
    pub fn set_mesh(&mut self, name: &str, mesh: &str) -> bool {
        match self.find_mut(name) {
            Some(object) => {
                object.mesh = Some(mesh.to_string());
                true
            }
            None => false,
        }
    }

    /// Append a translate modifier to an object's stack
    pub fn add_modifier(&mut self, name: &str, offset: Vec3) -> bool {
        match self.find_mut(name) {
            Some(object) => {
                object.modifier_count += 1;
                self.modifiers.entry(name.to_string()).or_default().push(offset);
                true
            }
            None => false,
        }
    }

    pub fn clear_modifiers(&mut self, name: &str) {
        if let Some(object) = self.find_mut(name) {
            object.modifier_count = 0;
        }
        self.modifiers.remove(name);
    }

    /// Make evaluation of an object fail until cleared
    pub fn fail_evaluation(&mut self, name: &str) {
        self.failing.insert(name.to_string());
    }

    pub fn clear_failures(&mut self) {
        self.failing.clear();
    }

    /// Number of evaluations performed for an object
    pub fn evaluation_count(&self, name: &str) -> usize {
        self.evaluations.get(name).copied().unwrap_or(0)
    }

    pub fn total_evaluations(&self) -> usize {
        self.evaluations.values().sum()
    }

    /// `preserve_all_data_layers` flag of the most recent evaluation
    pub fn last_preserve_flag(&self) -> Option<bool> {
        self.last_preserve_flag
    }

    fn find(&self, name: &str) -> Option<&HostObject> {
        self.objects.iter().find(|o| o.name == name)
    }

    fn find_mut(&mut self, name: &str) -> Option<&mut HostObject> {
        self.objects.iter_mut().find(|o| o.name == name)
    }

    fn base_mesh(&self, object: &HostObject) -> Result<EvaluatedMesh, String> {
        match object.object_type {
            HostObjectType::Meta => Ok(self.metaball_mesh()),
            t if t.is_mesh_like() => {
                let datablock = object
                    .mesh
                    .as_deref()
                    .ok_or_else(|| format!("object '{}' has no geometry", object.name))?;
                self.meshes
                    .get(datablock)
                    .cloned()
                    .ok_or_else(|| format!("mesh '{}' does not exist", datablock))
            }
            other => Err(format!("{:?} objects have no geometry", other)),
        }
    }

    /// One cube per metaball element, in the root's space
    fn metaball_mesh(&self) -> EvaluatedMesh {
        let mut combined = EvaluatedMesh::default();
        for element in self.objects.iter().filter(|o| o.object_type == HostObjectType::Meta) {
            let mut cube = EvaluatedMesh::cube();
            let offset = element.location();
            for vertex in &mut cube.vertices {
                vertex.co = vertex.co * 0.5 + offset;
            }

            let vertex_base = combined.vertices.len() as u32;
            let loop_base = combined.loops.len() as u32;
            combined.vertices.extend(cube.vertices);
            combined.loops.extend(cube.loops.into_iter().map(|mut l| {
                l.vertex += vertex_base;
                l
            }));
            combined.polygons.extend(cube.polygons.into_iter().map(|mut p| {
                p.loop_start += loop_base;
                p
            }));
        }
        combined
    }
}

impl HostScene for InMemoryScene {
    fn object_names(&self) -> Vec<String> {
        self.objects.iter().map(|o| o.name.clone()).collect()
    }

    fn object(&self, name: &str) -> Option<HostObject> {
        self.find(name).cloned()
    }

    fn evaluate_mesh(&mut self, name: &str, preserve_all_data_layers: bool) -> Result<EvaluatedMesh, String> {
        self.last_preserve_flag = Some(preserve_all_data_layers);
        *self.evaluations.entry(name.to_string()).or_default() += 1;

        if self.failing.contains(name) {
            return Err(format!("evaluation of '{}' failed", name));
        }

        let object = self
            .find(name)
            .ok_or_else(|| format!("object '{}' does not exist", name))?;
        let mut mesh = self.base_mesh(object)?;

        if let Some(offsets) = self.modifiers.get(name) {
            let offset = offsets.iter().fold(Vec3::ZERO, |acc, o| acc + *o);
            for vertex in &mut mesh.vertices {
                vertex.co += offset;
            }
        }

        if !preserve_all_data_layers && object.modifier_count > 0 {
            mesh.color_layers.clear();
        }

        Ok(mesh)
    }

    fn component_meta(&self, name: &str) -> Vec<ComponentMeta> {
        self.meta.get(name).cloned().unwrap_or_default()
    }

    fn set_component_meta(&mut self, name: &str, meta: ComponentMeta) {
        let entries = self.meta.entry(name.to_string()).or_default();
        match entries.iter_mut().find(|m| m.name == meta.name) {
            Some(existing) => *existing = meta,
            None => entries.push(meta),
        }
    }

    fn remove_component_meta(&mut self, name: &str, component: &str) {
        if let Some(entries) = self.meta.get_mut(name) {
            entries.retain(|m| m.name != component);
        }
    }
}
