//! Mesh marshaling
//!
//! Evaluates a host object through its modifier stack, triangulates it and
//! packs the result into [`MeshBuffers`] in engine space.

use crate::error::{Result, SyncError};
use crate::host::{EvaluatedMesh, HostScene};
use tether_interop::{convert, InteropLoop, InteropLoopColor, MeshBuffers, Transport, MAX_UV_LAYERS};

#[derive(Debug, Clone)]
pub struct MeshMarshaler {
    max_uv_layers: usize,
}

impl Default for MeshMarshaler {
    fn default() -> Self {
        Self::new(MAX_UV_LAYERS)
    }
}

impl MeshMarshaler {
    pub fn new(max_uv_layers: usize) -> Self {
        Self {
            max_uv_layers: max_uv_layers.min(MAX_UV_LAYERS),
        }
    }

    /// Evaluate `host_object` and push its geometry under `identity`
    pub fn update_mesh(
        &self,
        transport: &mut dyn Transport,
        host: &mut dyn HostScene,
        host_object: &str,
        identity: &str,
    ) -> Result<()> {
        // Instances sharing a base mesh must keep every layer or their
        // evaluations diverge
        let mesh = host
            .evaluate_mesh(host_object, true)
            .map_err(|reason| SyncError::evaluation(host_object, identity, reason))?;

        let buffers = self.marshal(host_object, identity, &mesh)?;
        log::debug!(
            "Pushing mesh '{}' from '{}': {} vertices, {} triangles",
            identity,
            host_object,
            buffers.vertices.len(),
            buffers.triangles.len()
        );
        transport.copy_mesh_data(identity, &buffers)?;
        Ok(())
    }

    /// Triangulate and convert an evaluated mesh
    pub fn marshal(&self, object: &str, identity: &str, mesh: &EvaluatedMesh) -> Result<MeshBuffers> {
        if mesh.is_empty() {
            return Err(SyncError::evaluation(object, identity, "evaluated mesh is empty"));
        }

        let vertices = mesh
            .vertices
            .iter()
            .map(|v| convert::vertex(v.co, v.normal))
            .collect();

        let loops = mesh
            .loops
            .iter()
            .map(|l| InteropLoop {
                vertex: l.vertex,
                edge: l.edge,
            })
            .collect();

        // Fan triangulation, convex n-gons only
        let mut triangles = Vec::new();
        for (index, polygon) in mesh.polygons.iter().enumerate() {
            let start = polygon.loop_start;
            if start.checked_add(polygon.loop_total).is_none() {
                return Err(SyncError::evaluation(
                    object,
                    identity,
                    format!("polygon {} loop range overflows", index),
                ));
            }
            for i in 1..polygon.loop_total.saturating_sub(1) {
                triangles.push(convert::triangle([start, start + i, start + i + 1], index as u32));
            }
        }
        if triangles.is_empty() {
            return Err(SyncError::evaluation(object, identity, "mesh has no faces"));
        }

        // First layer only
        let colors = mesh
            .color_layers
            .first()
            .filter(|layer| !layer.colors.is_empty())
            .map(|layer| layer.colors.iter().map(|c| InteropLoopColor::from_floats(*c)).collect());

        let mut uvs: [Option<Vec<_>>; MAX_UV_LAYERS] = Default::default();
        for (slot, layer) in uvs
            .iter_mut()
            .zip(mesh.uv_layers.iter())
            .take(self.max_uv_layers)
        {
            if !layer.uvs.is_empty() {
                *slot = Some(layer.uvs.iter().map(|uv| convert::vector2(*uv)).collect());
            }
        }

        Ok(MeshBuffers {
            loops,
            triangles,
            vertices,
            colors,
            uvs,
        })
    }
}
