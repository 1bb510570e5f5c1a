//! Math utilities and types
//!
//! nalgebra aliases plus the clip-space correction every projection in the
//! engine goes through before it reaches a shader.

pub use nalgebra::{Matrix3, Matrix4, Quaternion, Unit, Vector2, Vector3, Vector4};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// Quaternion type for rotations
pub type Quat = Unit<Quaternion<f32>>;

/// Maps OpenGL-convention clip space (Y up, depth -1..1) to Vulkan's (Y down, depth 0..1)
#[rustfmt::skip]
pub fn vulkan_clip_correction() -> Mat4 {
    Mat4::new(
        1.0,  0.0, 0.0, 0.0,
        0.0, -1.0, 0.0, 0.0,
        0.0,  0.0, 0.5, 0.5,
        0.0,  0.0, 0.0, 1.0,
    )
}

/// Column-major array layout expected by GLSL `mat4`
pub fn to_columns(matrix: &Mat4) -> [[f32; 4]; 4] {
    (*matrix).into()
}

/// Transform representing position, rotation, and scale
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    /// Position in 3D space
    pub position: Vec3,

    /// Rotation quaternion
    pub rotation: Quat,

    /// Scale factors
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            rotation: Quat::identity(),
            scale: Vec3::new(1.0, 1.0, 1.0),
        }
    }
}

impl Transform {
    /// Create a transform with only position
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Set a uniform scale
    #[must_use]
    pub fn with_uniform_scale(mut self, scale: f32) -> Self {
        self.scale = Vec3::new(scale, scale, scale);
        self
    }

    /// Set rotation from an axis and angle in radians
    #[must_use]
    pub fn with_rotation(mut self, axis: Vec3, angle: f32) -> Self {
        self.rotation = Quat::from_axis_angle(&Unit::new_normalize(axis), angle);
        self
    }

    /// Convert to a transformation matrix (scale, then rotate, then translate)
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::new_translation(&self.position)
            * self.rotation.to_homogeneous()
            * Mat4::new_nonuniform_scaling(&self.scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_clip_correction_flips_y_and_halves_depth() {
        let corrected = vulkan_clip_correction() * Vec4::new(0.5, 0.5, -1.0, 1.0);
        assert_relative_eq!(corrected, Vec4::new(0.5, -0.5, 0.0, 1.0));

        let far = vulkan_clip_correction() * Vec4::new(0.0, 0.0, 1.0, 1.0);
        assert_relative_eq!(far.z, 1.0);
    }

    #[test]
    fn test_transform_order_is_scale_rotate_translate() {
        let transform = Transform::from_position(Vec3::new(1.0, 0.0, 0.0))
            .with_uniform_scale(2.0)
            .with_rotation(Vec3::y(), std::f32::consts::FRAC_PI_2);

        let moved = transform.to_matrix().transform_point(&Point3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(moved, Point3::new(1.0, 0.0, -2.0), epsilon = 1e-5);
    }

    #[test]
    fn test_columns_are_column_major() {
        let m = Mat4::new_translation(&Vec3::new(3.0, 4.0, 5.0));
        let cols = to_columns(&m);
        assert_eq!(cols[3], [3.0, 4.0, 5.0, 1.0]);
    }
}
