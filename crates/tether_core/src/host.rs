//! Host scene abstraction
//!
//! The host scene is the single source of truth. Nothing here hands out
//! long-lived handles: every access is a fresh lookup by name, and a lookup
//! for an object that has since been removed or renamed simply fails.

use glam::{Mat4, Vec2, Vec3};
use serde::{Deserialize, Serialize};
use tether_interop::PropertyValue;

/// Type of a host scene object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostObjectType {
    Mesh,
    Curve,
    Surface,
    Font,
    Meta,
    Empty,
    Camera,
    Light,
    Other,
}

impl HostObjectType {
    /// Types whose evaluated form is a triangle mesh
    pub fn is_mesh_like(self) -> bool {
        matches!(
            self,
            HostObjectType::Mesh | HostObjectType::Curve | HostObjectType::Surface | HostObjectType::Font
        )
    }
}

/// Snapshot of a host object at lookup time
#[derive(Debug, Clone, PartialEq)]
pub struct HostObject {
    pub name: String,
    pub object_type: HostObjectType,
    /// Parent object name, only when parented directly to another object
    pub parent: Option<String>,
    pub children: Vec<String>,
    /// World matrix in host space
    pub world: Mat4,
    /// Local scale, kept apart from `world` since a matrix loses its sign
    pub scale: Vec3,
    /// Mesh datablock name
    pub mesh: Option<String>,
    pub modifier_count: usize,
    pub active_material: Option<String>,
    pub display_mode: i32,
}

impl HostObject {
    pub fn new(name: impl Into<String>, object_type: HostObjectType) -> Self {
        Self {
            name: name.into(),
            object_type,
            parent: None,
            children: Vec::new(),
            world: Mat4::IDENTITY,
            scale: Vec3::ONE,
            mesh: None,
            modifier_count: 0,
            active_material: None,
            display_mode: 0,
        }
    }

    /// Create a mesh object referencing a mesh datablock
    pub fn mesh(name: impl Into<String>, mesh: impl Into<String>) -> Self {
        let mut object = Self::new(name, HostObjectType::Mesh);
        object.mesh = Some(mesh.into());
        object
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_location(mut self, location: Vec3) -> Self {
        self.world = Mat4::from_translation(location);
        self
    }

    pub fn with_material(mut self, material: impl Into<String>) -> Self {
        self.active_material = Some(material.into());
        self
    }

    /// Unmodified mesh objects share geometry through their datablock
    pub fn shares_mesh_datablock(&self) -> bool {
        self.object_type == HostObjectType::Mesh && self.modifier_count == 0 && self.mesh.is_some()
    }

    pub fn location(&self) -> Vec3 {
        self.world.w_axis.truncate()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MeshVertex {
    pub co: Vec3,
    pub normal: Vec3,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MeshLoop {
    pub vertex: u32,
    pub edge: u32,
}

/// N-gon as a run of loops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MeshPolygon {
    pub loop_start: u32,
    pub loop_total: u32,
}

/// Per-loop color layer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColorLayer {
    pub name: String,
    pub colors: Vec<[f32; 4]>,
}

/// Per-loop UV layer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UvLayer {
    pub name: String,
    pub uvs: Vec<Vec2>,
}

/// Mesh after the full modifier stack
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluatedMesh {
    pub vertices: Vec<MeshVertex>,
    pub loops: Vec<MeshLoop>,
    pub polygons: Vec<MeshPolygon>,
    pub color_layers: Vec<ColorLayer>,
    pub uv_layers: Vec<UvLayer>,
}

impl EvaluatedMesh {
    /// Unit cube with one UV layer
    pub fn cube() -> Self {
        let corners = [
            Vec3::new(-1.0, -1.0, -1.0),
            Vec3::new(1.0, -1.0, -1.0),
            Vec3::new(1.0, 1.0, -1.0),
            Vec3::new(-1.0, 1.0, -1.0),
            Vec3::new(-1.0, -1.0, 1.0),
            Vec3::new(1.0, -1.0, 1.0),
            Vec3::new(1.0, 1.0, 1.0),
            Vec3::new(-1.0, 1.0, 1.0),
        ];
        let faces: [[u32; 4]; 6] = [
            [0, 3, 2, 1],
            [4, 5, 6, 7],
            [0, 1, 5, 4],
            [1, 2, 6, 5],
            [2, 3, 7, 6],
            [3, 0, 4, 7],
        ];

        let vertices = corners
            .iter()
            .map(|co| MeshVertex {
                co: *co,
                normal: co.normalize(),
            })
            .collect();

        let mut loops = Vec::with_capacity(24);
        let mut polygons = Vec::with_capacity(6);
        let mut uvs = Vec::with_capacity(24);
        let corner_uvs = [Vec2::ZERO, Vec2::X, Vec2::ONE, Vec2::Y];
        for (face_index, face) in faces.iter().enumerate() {
            polygons.push(MeshPolygon {
                loop_start: loops.len() as u32,
                loop_total: 4,
            });
            for (corner, vertex) in face.iter().enumerate() {
                loops.push(MeshLoop {
                    vertex: *vertex,
                    edge: (face_index * 4 + corner) as u32,
                });
                uvs.push(corner_uvs[corner]);
            }
        }

        Self {
            vertices,
            loops,
            polygons,
            color_layers: Vec::new(),
            uv_layers: vec![UvLayer {
                name: "UVMap".to_string(),
                uvs,
            }],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.polygons.is_empty()
    }
}

/// Persisted attachment of a component to a host object
///
/// Survives undo, copy and reload so attachments can be restored instead of
/// re-derived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentMeta {
    pub name: String,
    pub enabled: bool,
    /// Last value set for each property
    #[serde(default)]
    pub properties: Vec<(String, PropertyValue)>,
}

impl ComponentMeta {
    pub fn new(name: impl Into<String>, enabled: bool) -> Self {
        Self {
            name: name.into(),
            enabled,
            properties: Vec::new(),
        }
    }

    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, value)| value)
    }

    pub fn set_property(&mut self, name: &str, value: PropertyValue) {
        match self.properties.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => *existing = value,
            None => self.properties.push((name.to_string(), value)),
        }
    }
}

/// Access to the host application's scene graph
pub trait HostScene {
    /// Names of every object in the active scene, in scene order
    fn object_names(&self) -> Vec<String>;

    /// Fresh snapshot of an object, `None` once it no longer exists
    fn object(&self, name: &str) -> Option<HostObject>;

    /// Evaluate an object's geometry through its modifier stack
    ///
    /// `preserve_all_data_layers` keeps layers the modifiers don't use so
    /// instances sharing a base mesh evaluate identically.
    fn evaluate_mesh(
        &mut self,
        name: &str,
        preserve_all_data_layers: bool,
    ) -> std::result::Result<EvaluatedMesh, String>;

    /// Persisted component attachments of an object
    fn component_meta(&self, name: &str) -> Vec<ComponentMeta>;

    /// Insert or replace the persisted attachment for `meta.name`
    fn set_component_meta(&mut self, name: &str, meta: ComponentMeta);

    fn remove_component_meta(&mut self, name: &str, component: &str);
}

/// Identifier of an updated datablock
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UpdatedId {
    Object(String),
    Material(String),
    Other(String),
}

/// One entry of a host scene update batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneUpdate {
    pub id: UpdatedId,
    pub transform: bool,
    pub geometry: bool,
}

impl SceneUpdate {
    pub fn transform(object: impl Into<String>) -> Self {
        Self {
            id: UpdatedId::Object(object.into()),
            transform: true,
            geometry: false,
        }
    }

    pub fn geometry(object: impl Into<String>) -> Self {
        Self {
            id: UpdatedId::Object(object.into()),
            transform: false,
            geometry: true,
        }
    }

    /// Object update without transform or geometry changes
    pub fn properties(object: impl Into<String>) -> Self {
        Self {
            id: UpdatedId::Object(object.into()),
            transform: false,
            geometry: false,
        }
    }

    pub fn material(material: impl Into<String>) -> Self {
        Self {
            id: UpdatedId::Material(material.into()),
            transform: false,
            geometry: false,
        }
    }

    /// Object name, when this update targets an object
    pub fn object(&self) -> Option<&str> {
        match &self.id {
            UpdatedId::Object(name) => Some(name),
            _ => None,
        }
    }
}

/// Change notifications delivered after one host evaluation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateBatch {
    pub updates: Vec<SceneUpdate>,
}

impl UpdateBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, update: SceneUpdate) -> Self {
        self.updates.push(update);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cube_topology() {
        let cube = EvaluatedMesh::cube();
        assert_eq!(cube.vertices.len(), 8);
        assert_eq!(cube.loops.len(), 24);
        assert_eq!(cube.polygons.len(), 6);
        assert_eq!(cube.uv_layers[0].uvs.len(), 24);
    }

    #[test]
    fn test_mesh_like_types() {
        assert!(HostObjectType::Font.is_mesh_like());
        assert!(!HostObjectType::Meta.is_mesh_like());
        assert!(!HostObjectType::Empty.is_mesh_like());
    }

    #[test]
    fn test_meta_properties_upsert() {
        let mut meta = ComponentMeta::new("Spinner", true);
        meta.set_property("speed", PropertyValue::Float(1.0));
        meta.set_property("speed", PropertyValue::Float(2.0));
        assert_eq!(meta.properties.len(), 1);
        assert_eq!(meta.property("speed"), Some(&PropertyValue::Float(2.0)));
    }

    #[test]
    fn test_location() {
        let object = HostObject::new("Empty", HostObjectType::Empty).with_location(Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(object.location(), Vec3::new(1.0, 2.0, 3.0));
    }
}
