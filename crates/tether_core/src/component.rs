//! Component type descriptors and the behavior trait
//!
//! A [`ComponentType`] is a static descriptor: a name, a factory for
//! instances, an optional autobind predicate and a fixed list of property
//! declarations. Nothing is generated at runtime; the component runtime
//! dispatches on these descriptors by name.

use crate::error::Result;
use crate::host::{HostObject, HostScene, SceneUpdate};
use tether_interop::{PropertyKind, PropertyValue};

/// Selects host objects an autobind component attaches to
pub type AutobindPredicate = fn(&HostObject) -> bool;

/// Computes the mesh identity a component contributes for an object
pub type MeshIdentityFn = fn(&dyn HostScene, &str) -> Option<String>;

/// Builds a fresh behavior for each attachment
pub type BehaviorFactory = Box<dyn Fn() -> Box<dyn ComponentBehavior>>;

/// A declared, syncable property
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDecl {
    pub name: String,
    pub kind: PropertyKind,
    pub default: PropertyValue,
}

/// Registration descriptor for a component type
pub struct ComponentType {
    name: String,
    factory: BehaviorFactory,
    poll: Option<AutobindPredicate>,
    mesh_identity: Option<MeshIdentityFn>,
    properties: Vec<PropertyDecl>,
}

impl ComponentType {
    pub fn new<F, B>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> B + 'static,
        B: ComponentBehavior + 'static,
    {
        Self {
            name: name.into(),
            factory: Box::new(move || Box::new(factory()) as Box<dyn ComponentBehavior>),
            poll: None,
            mesh_identity: None,
            properties: Vec::new(),
        }
    }

    /// Attach automatically to every host object matching `poll`
    pub fn with_poll(mut self, poll: AutobindPredicate) -> Self {
        self.poll = Some(poll);
        self
    }

    /// Contribute geometry under the identity computed by `mesh_identity`
    pub fn with_mesh_identity(mut self, mesh_identity: MeshIdentityFn) -> Self {
        self.mesh_identity = Some(mesh_identity);
        self
    }

    /// Declare a property, its type taken from the default
    pub fn with_property(mut self, name: impl Into<String>, default: PropertyValue) -> Self {
        let name = name.into();
        self.properties.retain(|p| p.name != name);
        self.properties.push(PropertyDecl {
            name,
            kind: default.kind(),
            default,
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_autobind(&self) -> bool {
        self.poll.is_some()
    }

    /// Check the autobind predicate, false for non-autobind types
    pub fn polls(&self, object: &HostObject) -> bool {
        self.poll.map_or(false, |poll| poll(object))
    }

    pub fn mesh_identity(&self, host: &dyn HostScene, object: &str) -> Option<String> {
        self.mesh_identity.and_then(|f| f(host, object))
    }

    pub fn properties(&self) -> &[PropertyDecl] {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&PropertyDecl> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub(crate) fn create(&self) -> Box<dyn ComponentBehavior> {
        (self.factory)()
    }

    pub(crate) fn default_values(&self) -> Vec<(String, PropertyValue)> {
        self.properties
            .iter()
            .map(|p| (p.name.clone(), p.default.clone()))
            .collect()
    }
}

impl std::fmt::Debug for ComponentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentType")
            .field("name", &self.name)
            .field("autobind", &self.is_autobind())
            .field("properties", &self.properties)
            .finish()
    }
}

/// View handed to component callbacks
pub struct ComponentContext<'a> {
    /// Host object the component is attached to
    pub object: &'a str,
    /// Component type name
    pub component: &'a str,
    pub host: &'a dyn HostScene,
    pub properties: &'a [(String, PropertyValue)],
}

impl<'a> ComponentContext<'a> {
    /// Current value of a declared property
    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, value)| value)
    }

    /// Fresh snapshot of the attached host object
    pub fn host_object(&self) -> Option<HostObject> {
        self.host.object(self.object)
    }
}

/// Per-instance component callbacks
///
/// Every callback defaults to a no-op. Errors are attributed to the
/// component and object and collected into the batch report.
pub trait ComponentBehavior {
    /// After the component has been attached and synced
    fn on_create(&mut self, _ctx: &ComponentContext) -> Result<()> {
        Ok(())
    }

    /// After the component was removed or its object left the scene
    fn on_destroy(&mut self, _ctx: &ComponentContext) -> Result<()> {
        Ok(())
    }

    fn on_enable(&mut self, _ctx: &ComponentContext) -> Result<()> {
        Ok(())
    }

    fn on_disable(&mut self, _ctx: &ComponentContext) -> Result<()> {
        Ok(())
    }

    /// Runtime started, followed by `on_connected` once an engine attaches
    fn on_start(&mut self, _ctx: &ComponentContext) -> Result<()> {
        Ok(())
    }

    /// Runtime stopping, preceded by `on_disconnected` when connected
    fn on_stop(&mut self, _ctx: &ComponentContext) -> Result<()> {
        Ok(())
    }

    fn on_connected(&mut self, _ctx: &ComponentContext) -> Result<()> {
        Ok(())
    }

    fn on_disconnected(&mut self, _ctx: &ComponentContext) -> Result<()> {
        Ok(())
    }

    /// A batch entry targeting the attached object
    fn on_update(&mut self, _ctx: &ComponentContext, _update: &SceneUpdate) -> Result<()> {
        Ok(())
    }

    /// After every entry of a batch has been handled
    fn on_after_updates(&mut self, _ctx: &ComponentContext) -> Result<()> {
        Ok(())
    }

    /// Inbound message addressed to this component on its object
    fn on_message(&mut self, _ctx: &ComponentContext, _payload: &[u8]) -> Result<()> {
        Ok(())
    }

    /// A declared property changed and has been pushed to the engine
    fn on_property_changed(
        &mut self,
        _ctx: &ComponentContext,
        _name: &str,
        _value: &PropertyValue,
    ) -> Result<()> {
        Ok(())
    }
}

/// Behavior with no callbacks, for data-only components
#[derive(Debug, Default, Clone, Copy)]
pub struct NoBehavior;

impl ComponentBehavior for NoBehavior {}
