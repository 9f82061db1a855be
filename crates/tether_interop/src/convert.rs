//! Host to engine space conversion
//!
//! The host is right-handed Z-up, the engine is left-handed Y-up. Every value
//! crossing the bridge goes through one of these functions exactly once;
//! nothing upstream of the marshaling boundary converts axes.

use crate::error::Result;
use crate::ffi::{
    InteropCamera, InteropQuaternion, InteropString64, InteropTransform, InteropVector2,
    InteropVector3,
};
use crate::mesh::{InteropLoopTriangle, InteropVertex};
use glam::{Mat4, Quat, Vec2, Vec3};

/// Swap Y and Z of a position, direction or scale
pub fn vector3(v: Vec3) -> InteropVector3 {
    InteropVector3::new(v.x, v.z, v.y)
}

/// Swap the Y/Z axes of a rotation and flip handedness
pub fn quaternion(q: Quat) -> InteropQuaternion {
    InteropQuaternion::new(q.x, q.z, q.y, -q.w)
}

pub fn vector2(v: Vec2) -> InteropVector2 {
    InteropVector2::new(v.x, v.y)
}

/// Build a wire transform from a world matrix
///
/// `scale` comes from the object rather than the matrix since a decomposed
/// matrix cannot represent negative scale.
pub fn transform(parent: Option<&str>, world: Mat4, scale: Vec3) -> Result<InteropTransform> {
    let (_, rotation, translation) = world.to_scale_rotation_translation();
    let parent = match parent {
        Some(name) => InteropString64::new(name)?,
        None => InteropString64::EMPTY,
    };

    Ok(InteropTransform {
        parent,
        position: vector3(translation),
        rotation: quaternion(rotation),
        scale: vector3(scale),
    })
}

/// Convert a vertex position and normal
pub fn vertex(co: Vec3, normal: Vec3) -> InteropVertex {
    InteropVertex {
        co: vector3(co),
        normal: vector3(normal),
    }
}

/// Reverse the winding of a triangle
///
/// Swapping two axes mirrors the mesh, so faces would point inward without it.
pub fn triangle(loops: [u32; 3], polygon: u32) -> InteropLoopTriangle {
    InteropLoopTriangle {
        loops: [loops[0], loops[2], loops[1]],
        polygon,
    }
}

/// Viewport camera parameters in host space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraView {
    pub width: i32,
    pub height: i32,
    pub perspective: bool,
    pub lens: f32,
    pub view_distance: f32,
    pub position: Vec3,
    pub forward: Vec3,
    pub up: Vec3,
}

/// Convert a viewport camera
pub fn camera(view: &CameraView) -> InteropCamera {
    InteropCamera {
        width: view.width,
        height: view.height,
        is_perspective: i32::from(view.perspective),
        lens: view.lens,
        view_distance: view.view_distance,
        position: vector3(view.position),
        forward: vector3(view.forward),
        up: vector3(view.up),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_swizzle() {
        assert_eq!(vector3(Vec3::new(1.0, 2.0, 3.0)), InteropVector3::new(1.0, 3.0, 2.0));
    }

    #[test]
    fn test_identity_rotation_flips_w() {
        let q = quaternion(Quat::IDENTITY);
        assert_eq!(q, InteropQuaternion::new(0.0, 0.0, 0.0, -1.0));
    }

    #[test]
    fn test_transform_from_matrix() {
        let world = Mat4::from_scale_rotation_translation(
            Vec3::ONE,
            Quat::from_rotation_z(std::f32::consts::FRAC_PI_2),
            Vec3::new(1.0, 2.0, 3.0),
        );
        let t = transform(Some("Parent"), world, Vec3::new(-1.0, 1.0, 2.0)).unwrap();

        assert_eq!(t.parent.as_str(), "Parent");
        assert!((t.position.x - 1.0).abs() < 1e-6);
        assert!((t.position.y - 3.0).abs() < 1e-6);
        assert!((t.position.z - 2.0).abs() < 1e-6);
        // Scale bypasses the matrix and keeps its sign
        assert_eq!(t.scale, InteropVector3::new(-1.0, 2.0, 1.0));
        // Rotation about host Z becomes rotation about engine Y
        let half = std::f32::consts::FRAC_PI_4;
        assert!(t.rotation.x.abs() < 1e-6);
        assert!((t.rotation.y - half.sin()).abs() < 1e-6);
        assert!(t.rotation.z.abs() < 1e-6);
        assert!((t.rotation.w + half.cos()).abs() < 1e-6);
    }

    #[test]
    fn test_unparented_transform() {
        let t = transform(None, Mat4::IDENTITY, Vec3::ONE).unwrap();
        assert!(t.parent.is_empty());
    }

    #[test]
    fn test_winding_reversed() {
        let t = triangle([4, 5, 6], 2);
        assert_eq!(t.loops, [4, 6, 5]);
        assert_eq!(t.polygon, 2);
    }
}
