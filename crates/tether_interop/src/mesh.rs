//! Mesh buffer types pushed through `copy_mesh_data`

use crate::error::{InteropError, Result};
use crate::ffi::{InteropVector2, InteropVector3};
use bytemuck::{Pod, Zeroable};

/// Maximum number of UV layers carried per mesh
pub const MAX_UV_LAYERS: usize = 4;

/// Vertex position and normal
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct InteropVertex {
    pub co: InteropVector3,
    pub normal: InteropVector3,
}

/// Face corner referencing a vertex and an edge
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct InteropLoop {
    pub vertex: u32,
    pub edge: u32,
}

/// Triangle made of three loop indices, with the source polygon
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct InteropLoopTriangle {
    pub loops: [u32; 3],
    pub polygon: u32,
}

/// Per-loop 8-bit vertex color
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct InteropLoopColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl InteropLoopColor {
    /// Quantize a linear [0, 1] color
    pub fn from_floats(rgba: [f32; 4]) -> Self {
        let q = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        Self {
            r: q(rgba[0]),
            g: q(rgba[1]),
            b: q(rgba[2]),
            a: q(rgba[3]),
        }
    }
}

/// Fully marshaled mesh, already in engine axis convention
///
/// Color and UV streams are parallel to `loops` when present. A missing
/// layer is `None` and crosses the boundary as a null pointer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshBuffers {
    pub loops: Vec<InteropLoop>,
    pub triangles: Vec<InteropLoopTriangle>,
    pub vertices: Vec<InteropVertex>,
    pub colors: Option<Vec<InteropLoopColor>>,
    pub uvs: [Option<Vec<InteropVector2>>; MAX_UV_LAYERS],
}

impl MeshBuffers {
    /// Check if there is nothing to draw
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.triangles.is_empty()
    }

    /// Number of UV layers present
    pub fn uv_layer_count(&self) -> usize {
        self.uvs.iter().filter(|layer| layer.is_some()).count()
    }

    /// Check stream lengths and index ranges before crossing the boundary
    pub fn validate(&self, mesh: &str) -> Result<()> {
        let invalid = |reason: String| InteropError::InvalidMesh {
            mesh: mesh.to_string(),
            reason,
        };

        let loop_count = self.loops.len();
        if let Some(colors) = &self.colors {
            if colors.len() != loop_count {
                return Err(invalid(format!(
                    "{} colors for {} loops",
                    colors.len(),
                    loop_count
                )));
            }
        }
        for (index, layer) in self.uvs.iter().enumerate() {
            if let Some(uvs) = layer {
                if uvs.len() != loop_count {
                    return Err(invalid(format!(
                        "UV layer {} has {} entries for {} loops",
                        index,
                        uvs.len(),
                        loop_count
                    )));
                }
            }
        }

        let vertex_count = self.vertices.len() as u32;
        if let Some(bad) = self.loops.iter().find(|l| l.vertex >= vertex_count) {
            return Err(invalid(format!(
                "loop references vertex {} of {}",
                bad.vertex, vertex_count
            )));
        }
        if let Some(bad) = self
            .triangles
            .iter()
            .flat_map(|t| t.loops.iter())
            .find(|l| **l as usize >= loop_count)
        {
            return Err(invalid(format!(
                "triangle references loop {} of {}",
                bad, loop_count
            )));
        }

        Ok(())
    }
}
