use crate::error::Result;
use crate::host::HostObject;
use crate::plugin::{Plugin, PluginContext};
use tether_interop::ObjectKind;

pub const MESH_PLUGIN: &str = "MeshPlugin";

/// Syncs every host object that evaluates to a triangle mesh
#[derive(Debug, Default)]
pub struct MeshPlugin;

impl Plugin for MeshPlugin {
    fn name(&self) -> &str {
        MESH_PLUGIN
    }

    fn on_add_host_object(&mut self, ctx: &mut PluginContext, object: &HostObject) -> Result<()> {
        if object.object_type.is_mesh_like() {
            ctx.instantiate(ObjectKind::Mesh, &object.name, Some(&object.name))?;
        }
        Ok(())
    }
}
