//! Metaballs plugin
//!
//! The host evaluates every metaball element of a scene into one surface,
//! owned by the first Meta object in scene order. A single scene object
//! tracks that root and is re-rooted when the root goes away.

use crate::error::Result;
use crate::host::{HostObject, HostObjectType, HostScene, UpdateBatch};
use crate::object::SceneObject;
use crate::plugin::{Plugin, PluginContext};
use tether_interop::ObjectKind;

pub const METABALLS_PLUGIN: &str = "MetaballsPlugin";

/// Engine name of the combined metaball surface
pub const METABALLS_OBJECT: &str = "__METABALLS";

#[derive(Debug, Default)]
pub struct MetaballsPlugin {
    root: Option<SceneObject>,
}

impl MetaballsPlugin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Host object currently backing the combined surface
    pub fn root_host_name(&self) -> Option<&str> {
        self.root
            .as_ref()
            .filter(|root| root.is_valid())
            .and_then(SceneObject::host_name)
    }

    fn live_root(&self) -> Option<SceneObject> {
        self.root.clone().filter(SceneObject::is_valid)
    }

    /// Drop the current root and pick the first Meta object in the scene
    fn recalculate_root(&mut self, ctx: &mut PluginContext) -> Result<()> {
        if let Some(root) = self.root.take() {
            ctx.destroy_object(root.name());
        }

        let host = ctx.host();
        let first = host
            .object_names()
            .into_iter()
            .find(|name| is_meta(host, name));

        if let Some(name) = first {
            log::debug!("Metaballs rooted on '{}'", name);
            let root = ctx.instantiate(ObjectKind::Metaball, METABALLS_OBJECT, Some(&name))?;
            self.update_metaballs(ctx, &root);
            self.root = Some(root);
        }
        Ok(())
    }

    fn update_metaballs(&self, ctx: &mut PluginContext, root: &SceneObject) {
        ctx.update_transform(root);
        ctx.update_mesh(root);
    }
}

fn is_meta(host: &dyn HostScene, name: &str) -> bool {
    host.object(name)
        .map_or(false, |object| object.object_type == HostObjectType::Meta)
}

impl Plugin for MetaballsPlugin {
    fn name(&self) -> &str {
        METABALLS_PLUGIN
    }

    fn on_enable(&mut self, ctx: &mut PluginContext) -> Result<()> {
        self.recalculate_root(ctx)
    }

    fn on_disable(&mut self, _ctx: &mut PluginContext) -> Result<()> {
        self.root = None;
        Ok(())
    }

    fn on_add_host_object(&mut self, ctx: &mut PluginContext, object: &HostObject) -> Result<()> {
        if object.object_type != HostObjectType::Meta {
            return Ok(());
        }
        match self.live_root() {
            Some(root) => {
                ctx.update_mesh(&root);
                Ok(())
            }
            None => self.recalculate_root(ctx),
        }
    }

    fn on_remove_host_object(&mut self, ctx: &mut PluginContext, name: &str) -> Result<()> {
        let was_root = self.root.as_ref().and_then(SceneObject::host_name) == Some(name);
        if was_root || self.live_root().is_none() {
            return self.recalculate_root(ctx);
        }
        Ok(())
    }

    fn on_scene_update(&mut self, ctx: &mut PluginContext, batch: &UpdateBatch) -> Result<()> {
        let host = ctx.host();
        let touched = batch
            .updates
            .iter()
            .filter_map(|update| update.object())
            .any(|name| is_meta(host, name));
        if !touched {
            return Ok(());
        }

        match self.live_root() {
            Some(root) => {
                self.update_metaballs(ctx, &root);
                Ok(())
            }
            None => self.recalculate_root(ctx),
        }
    }
}
