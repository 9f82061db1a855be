//! Replay scripts
//!
//! A script describes a starting host scene, the component types to register
//! and the steps to play against the runtime. Scene edits are followed by the
//! update batch a host would have sent for them.
//!
//! # Example Script
//!
//! ```toml
//! [[meshes]]
//! name = "CubeMesh"
//!
//! [[objects]]
//! name = "Cube"
//! mesh = "CubeMesh"
//!
//! [[objects]]
//! name = "Lamp"
//! type = "light"
//! location = [0.0, 0.0, 4.0]
//!
//! [[components]]
//! name = "Spotlight"
//! autobind = "light"
//! properties = [{ name = "intensity", default = { Float = 1.0 } }]
//!
//! [[steps]]
//! action = "start"
//!
//! [[steps]]
//! action = "tick"
//! count = 2
//!
//! [[steps]]
//! action = "set_property"
//! object = "Lamp"
//! component = "Spotlight"
//! property = "intensity"
//! value = { Float = 2.5 }
//! ```

use glam::Vec3;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tether_core::{
    AutobindPredicate, ComponentBehavior, ComponentContext, ComponentType, EvaluatedMesh, HostObject,
    HostObjectType, InMemoryScene, SyncError,
};
use tether_interop::{HostValue, InteropError, PropertyValue};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("Failed to read script '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid script: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Object '{object}' references unknown mesh '{mesh}'")]
    UnknownMesh { object: String, mesh: String },

    #[error("Duplicate {what} '{name}'")]
    Duplicate { what: &'static str, name: String },

    #[error("Step {index} ({action}) failed: {source}")]
    Step {
        index: usize,
        action: &'static str,
        #[source]
        source: SyncError,
    },

    #[error("Step {index} ({action}) needs the recording transport")]
    NeedsRecording { index: usize, action: &'static str },

    #[error("Runtime setup failed: {0}")]
    Setup(#[from] SyncError),

    #[error("Interop error: {0}")]
    Interop(#[from] InteropError),
}

pub type Result<T> = std::result::Result<T, ScriptError>;

// ========== Scene ==========

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeshShape {
    #[default]
    Cube,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MeshSpec {
    pub name: String,
    #[serde(default)]
    pub shape: MeshShape,
    #[serde(default = "default_size")]
    pub size: f32,
}

impl MeshSpec {
    pub fn build(&self) -> EvaluatedMesh {
        let mut mesh = match self.shape {
            MeshShape::Cube => EvaluatedMesh::cube(),
        };
        for vertex in &mut mesh.vertices {
            vertex.co *= self.size;
        }
        mesh
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObjectSpec {
    pub name: String,
    #[serde(rename = "type", default = "default_object_type")]
    pub object_type: HostObjectType,
    pub mesh: Option<String>,
    pub parent: Option<String>,
    #[serde(default)]
    pub location: [f32; 3],
    pub material: Option<String>,
    /// Offsets of displacement modifiers, in stack order
    #[serde(default)]
    pub modifiers: Vec<[f32; 3]>,
}

impl ObjectSpec {
    pub fn to_host_object(&self) -> HostObject {
        let mut object = HostObject::new(self.name.clone(), self.object_type)
            .with_location(Vec3::from(self.location));
        object.mesh = self.mesh.clone();
        if let Some(parent) = &self.parent {
            object = object.with_parent(parent.clone());
        }
        if let Some(material) = &self.material {
            object = object.with_material(material.clone());
        }
        object
    }

    /// Add the object and its modifier stack to the scene
    pub fn insert_into(&self, scene: &mut InMemoryScene) {
        scene.add_object(self.to_host_object());
        for offset in &self.modifiers {
            scene.add_modifier(&self.name, Vec3::from(*offset));
        }
    }
}

// ========== Components ==========

#[derive(Debug, Clone, Deserialize)]
pub struct PropertySpec {
    pub name: String,
    pub default: PropertyValue,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ComponentSpec {
    pub name: String,
    /// Attach automatically to every object of this type
    pub autobind: Option<HostObjectType>,
    #[serde(default)]
    pub properties: Vec<PropertySpec>,
}

impl ComponentSpec {
    pub fn component_type(&self) -> ComponentType {
        let mut ty = ComponentType::new(self.name.clone(), || Echo);
        if let Some(object_type) = self.autobind {
            ty = ty.with_poll(autobind_predicate(object_type));
        }
        for property in &self.properties {
            ty = ty.with_property(property.name.clone(), property.default.clone());
        }
        ty
    }
}

fn autobind_predicate(object_type: HostObjectType) -> AutobindPredicate {
    match object_type {
        HostObjectType::Mesh => |o| o.object_type == HostObjectType::Mesh,
        HostObjectType::Curve => |o| o.object_type == HostObjectType::Curve,
        HostObjectType::Surface => |o| o.object_type == HostObjectType::Surface,
        HostObjectType::Font => |o| o.object_type == HostObjectType::Font,
        HostObjectType::Meta => |o| o.object_type == HostObjectType::Meta,
        HostObjectType::Empty => |o| o.object_type == HostObjectType::Empty,
        HostObjectType::Camera => |o| o.object_type == HostObjectType::Camera,
        HostObjectType::Light => |o| o.object_type == HostObjectType::Light,
        HostObjectType::Other => |o| o.object_type == HostObjectType::Other,
    }
}

/// Behavior for scripted components: logs what the engine sends
struct Echo;

impl ComponentBehavior for Echo {
    fn on_message(&mut self, ctx: &ComponentContext, payload: &[u8]) -> tether_core::Result<()> {
        log::info!(
            "{} on '{}' received: {}",
            ctx.component,
            ctx.object,
            String::from_utf8_lossy(payload)
        );
        Ok(())
    }

    fn on_property_changed(
        &mut self,
        ctx: &ComponentContext,
        name: &str,
        value: &PropertyValue,
    ) -> tether_core::Result<()> {
        log::info!("{} on '{}': {} = {:?}", ctx.component, ctx.object, name, value);
        Ok(())
    }
}

// ========== Steps ==========

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    Start,
    Stop,
    LoadPre,
    Tick {
        #[serde(default = "default_count")]
        count: usize,
    },
    /// Make the recording engine reachable or not
    EngineAvailable {
        available: bool,
    },
    DropConnection,
    AddObject {
        object: ObjectSpec,
    },
    RemoveObject {
        name: String,
    },
    Rename {
        from: String,
        to: String,
    },
    Move {
        name: String,
        location: [f32; 3],
    },
    AddModifier {
        name: String,
        offset: [f32; 3],
    },
    ClearModifiers {
        name: String,
    },
    SetMaterial {
        name: String,
        material: Option<String>,
    },
    /// Edit a material datablock in place
    EditMaterial {
        material: String,
    },
    AddComponent {
        object: String,
        component: String,
    },
    DestroyComponent {
        object: String,
        component: String,
    },
    EnableComponent {
        object: String,
        component: String,
        enabled: bool,
    },
    SetProperty {
        object: String,
        component: String,
        property: String,
        value: HostValue,
    },
    /// Queue a component message from the engine
    Message {
        object: String,
        component: String,
        #[serde(default)]
        payload: String,
    },
}

impl Step {
    pub fn action(&self) -> &'static str {
        match self {
            Step::Start => "start",
            Step::Stop => "stop",
            Step::LoadPre => "load_pre",
            Step::Tick { .. } => "tick",
            Step::EngineAvailable { .. } => "engine_available",
            Step::DropConnection => "drop_connection",
            Step::AddObject { .. } => "add_object",
            Step::RemoveObject { .. } => "remove_object",
            Step::Rename { .. } => "rename",
            Step::Move { .. } => "move",
            Step::AddModifier { .. } => "add_modifier",
            Step::ClearModifiers { .. } => "clear_modifiers",
            Step::SetMaterial { .. } => "set_material",
            Step::EditMaterial { .. } => "edit_material",
            Step::AddComponent { .. } => "add_component",
            Step::DestroyComponent { .. } => "destroy_component",
            Step::EnableComponent { .. } => "enable_component",
            Step::SetProperty { .. } => "set_property",
            Step::Message { .. } => "message",
        }
    }

    /// Steps that drive the recording transport directly
    pub fn needs_recording(&self) -> bool {
        matches!(
            self,
            Step::EngineAvailable { .. } | Step::DropConnection | Step::Message { .. }
        )
    }
}

// ========== Script ==========

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Script {
    pub meshes: Vec<MeshSpec>,
    pub objects: Vec<ObjectSpec>,
    pub components: Vec<ComponentSpec>,
    pub steps: Vec<Step>,
}

impl Script {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let script: Script = toml::from_str(source)?;
        script.validate()?;
        Ok(script)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path).map_err(|source| ScriptError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let script = Self::from_toml_str(&source)?;
        log::info!(
            "Loaded script '{}': {} objects, {} steps",
            path.display(),
            script.objects.len(),
            script.steps.len()
        );
        Ok(script)
    }

    fn validate(&self) -> Result<()> {
        let mut meshes = HashSet::new();
        for mesh in &self.meshes {
            if !meshes.insert(mesh.name.as_str()) {
                return Err(ScriptError::Duplicate {
                    what: "mesh",
                    name: mesh.name.clone(),
                });
            }
        }

        let mut components = HashSet::new();
        for component in &self.components {
            if !components.insert(component.name.as_str()) {
                return Err(ScriptError::Duplicate {
                    what: "component",
                    name: component.name.clone(),
                });
            }
        }

        let added = self.steps.iter().filter_map(|step| match step {
            Step::AddObject { object } => Some(object),
            _ => None,
        });
        for object in self.objects.iter().chain(added) {
            if let Some(mesh) = &object.mesh {
                if !meshes.contains(mesh.as_str()) {
                    return Err(ScriptError::UnknownMesh {
                        object: object.name.clone(),
                        mesh: mesh.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Build the starting host scene
    pub fn build_scene(&self) -> InMemoryScene {
        let mut scene = InMemoryScene::new();
        for mesh in &self.meshes {
            scene.add_mesh(mesh.name.clone(), mesh.build());
        }
        for object in &self.objects {
            object.insert_into(&mut scene);
        }
        scene
    }

    pub fn component_types(&self) -> Vec<ComponentType> {
        self.components.iter().map(ComponentSpec::component_type).collect()
    }
}

fn default_size() -> f32 {
    1.0
}

fn default_object_type() -> HostObjectType {
    HostObjectType::Mesh
}

fn default_count() -> usize {
    1
}
