//! Built-in plugins

mod mesh;
mod metaballs;

pub use mesh::{MeshPlugin, MESH_PLUGIN};
pub use metaballs::{MetaballsPlugin, METABALLS_OBJECT, METABALLS_PLUGIN};
