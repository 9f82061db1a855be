//! # tether_core - Scene Synchronization Engine
//!
//! Mirrors a host application's scene graph into an external engine and
//! keeps the two in sync as the scene changes.
//!
//! ## Overview
//!
//! The host owns the scene. The [`Runtime`] receives its update batches,
//! diffs the set of host objects, classifies each change and pushes the
//! resulting state through a [`tether_interop::Transport`]. Geometry is
//! deduplicated by mesh identity so objects sharing an unmodified mesh are
//! evaluated once per batch.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐
//! │   HostScene     │────▶│     Runtime     │
//! │ (update batch)  │     │  (coordinator)  │
//! └─────────────────┘     └────────┬────────┘
//!                                  │
//!          ┌───────────────────────┼───────────────────────┐
//!          ▼                       ▼                       ▼
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │ PluginRegistry  │     │ComponentRuntime │     │ViewportRegistry │
//! │ (owned objects) │     │ (per object)    │     │ (weak refs)     │
//! └────────┬────────┘     └────────┬────────┘     └─────────────────┘
//!          │                       │
//!          ▼                       ▼
//! ┌─────────────────────────────────────────┐
//! │                SyncCore                 │
//! │ objects · dirty geometry · batch report │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │  MeshMarshaler  │────▶│    Transport    │ ──▶ engine
//! └─────────────────┘     └─────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use tether_core::prelude::*;
//!
//! let mut scene = InMemoryScene::new();
//! let mut runtime = Runtime::new(RuntimeConfig::default(), Box::new(RecordingTransport::new()));
//! runtime.register_builtin_plugins(&mut scene)?;
//! runtime.start(&mut scene);
//!
//! // From the host's timer
//! while let Some(interval) = runtime.on_tick(&mut scene) {
//!     std::thread::sleep(interval);
//! }
//! ```

mod collection;
mod component;
mod components;
mod config;
mod dirty;
mod error;
mod host;
mod memory;
mod mesh;
mod object;
mod plugin;
mod report;
mod runtime;
mod sync;
mod viewport;

pub mod plugins;

pub use collection::SceneObjectCollection;
pub use component::{
    AutobindPredicate, ComponentBehavior, ComponentContext, ComponentType, MeshIdentityFn,
    NoBehavior, PropertyDecl,
};
pub use config::RuntimeConfig;
pub use dirty::{DirtyGeometrySet, GeometrySource};
pub use error::{ConfigError, Result, SyncError};
pub use host::{
    ColorLayer, ComponentMeta, EvaluatedMesh, HostObject, HostObjectType, HostScene, MeshLoop,
    MeshPolygon, MeshVertex, SceneUpdate, UpdateBatch, UpdatedId, UvLayer,
};
pub use memory::InMemoryScene;
pub use mesh::MeshMarshaler;
pub use object::{ObjectHooks, SceneObject, DEFAULT_MATERIAL};
pub use plugin::{Plugin, PluginContext, PluginStatus};
pub use report::BatchReport;
pub use runtime::Runtime;
pub use sync::COMPONENT_OBJECT_KIND;
pub use viewport::{Viewport, ViewportRegistry};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::component::{ComponentBehavior, ComponentContext, ComponentType, NoBehavior};
    pub use crate::config::RuntimeConfig;
    pub use crate::error::{Result, SyncError};
    pub use crate::host::{HostObject, HostObjectType, HostScene, SceneUpdate, UpdateBatch};
    pub use crate::memory::InMemoryScene;
    pub use crate::object::{ObjectHooks, SceneObject};
    pub use crate::plugin::{Plugin, PluginContext, PluginStatus};
    pub use crate::runtime::Runtime;
    pub use crate::viewport::Viewport;
    pub use tether_interop::{ObjectKind, PropertyValue, RecordingTransport};
}
