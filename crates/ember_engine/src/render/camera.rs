//! Camera
//!
//! Right-handed, Y-up view space. Projections are built with nalgebra's
//! OpenGL-convention constructors and then pass through
//! [`vulkan_clip_correction`], so shaders receive Vulkan clip space.

use crate::foundation::math::{vulkan_clip_correction, Mat4, Point3, Vec3};

/// Projection model of a camera
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    /// Perspective projection
    Perspective {
        /// Vertical field of view in radians
        fov_y: f32,
        /// Near plane distance
        near: f32,
        /// Far plane distance
        far: f32,
    },
    /// Orthographic projection
    Orthographic {
        /// Half the visible height in world units
        half_height: f32,
        /// Near plane distance
        near: f32,
        /// Far plane distance
        far: f32,
    },
}

/// Viewpoint supplied to every frame
///
/// `target` doubles as the reference point the shadow map is centered on.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    /// Eye position in world space
    pub position: Point3,
    /// Point the camera looks at
    pub target: Point3,
    /// Up direction
    pub up: Vec3,
    /// Projection model
    pub projection: Projection,
    /// Width over height
    pub aspect: f32,
}

impl Camera {
    /// Perspective camera with a 60 degree vertical field of view
    pub fn perspective(position: Point3, target: Point3) -> Self {
        Self {
            position,
            target,
            up: Vec3::y(),
            projection: Projection::Perspective {
                fov_y: 60f32.to_radians(),
                near: 0.1,
                far: 100.0,
            },
            aspect: 16.0 / 9.0,
        }
    }

    /// Orthographic camera showing `half_height` units above and below the target
    pub fn orthographic(position: Point3, target: Point3, half_height: f32) -> Self {
        Self {
            projection: Projection::Orthographic {
                half_height,
                near: 0.1,
                far: 100.0,
            },
            ..Self::perspective(position, target)
        }
    }

    /// Update the aspect ratio from a framebuffer size; zero sizes are ignored
    pub fn set_aspect(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.aspect = width as f32 / height as f32;
        }
    }

    /// World to view transform
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(&self.position, &self.target, &self.up)
    }

    /// View to Vulkan clip transform
    pub fn projection_matrix(&self) -> Mat4 {
        let projection = match self.projection {
            Projection::Perspective { fov_y, near, far } => Mat4::new_perspective(self.aspect, fov_y, near, far),
            Projection::Orthographic { half_height, near, far } => {
                let half_width = half_height * self.aspect;
                Mat4::new_orthographic(-half_width, half_width, -half_height, half_height, near, far)
            }
        };
        vulkan_clip_correction() * projection
    }

    /// Projection times view
    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// View-projection with the translation removed, for drawing the skybox around the eye
    pub fn sky_view_projection(&self) -> Mat4 {
        let mut view = self.view_matrix();
        view[(0, 3)] = 0.0;
        view[(1, 3)] = 0.0;
        view[(2, 3)] = 0.0;
        self.projection_matrix() * view
    }

    /// Whether the projection is perspective
    pub const fn is_perspective(&self) -> bool {
        matches!(self.projection, Projection::Perspective { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec4;
    use approx::assert_relative_eq;

    #[test]
    fn test_target_projects_to_screen_center() {
        let camera = Camera::perspective(Point3::new(0.0, 2.0, 5.0), Point3::origin());
        let clip = camera.view_projection() * Vec4::new(0.0, 0.0, 0.0, 1.0);
        let ndc = clip / clip.w;

        assert_relative_eq!(ndc.x, 0.0, epsilon = 1e-5);
        assert_relative_eq!(ndc.y, 0.0, epsilon = 1e-5);
        assert!(ndc.z > 0.0 && ndc.z < 1.0);
    }

    #[test]
    fn test_world_up_maps_to_negative_y() {
        let camera = Camera::perspective(Point3::new(0.0, 0.0, 5.0), Point3::origin());
        let clip = camera.view_projection() * Vec4::new(0.0, 1.0, 0.0, 1.0);
        assert!(clip.y / clip.w < 0.0);
    }

    #[test]
    fn test_sky_view_ignores_position() {
        let near = Camera::perspective(Point3::new(0.0, 0.0, 1.0), Point3::new(0.0, 0.0, 0.0));
        let far = Camera::perspective(Point3::new(0.0, 0.0, 50.0), Point3::new(0.0, 0.0, 49.0));
        assert_relative_eq!(near.sky_view_projection(), far.sky_view_projection(), epsilon = 1e-5);
    }

    #[test]
    fn test_aspect_ignores_zero_size() {
        let mut camera = Camera::orthographic(Point3::new(0.0, 0.0, 5.0), Point3::origin(), 4.0);
        camera.set_aspect(800, 400);
        assert_relative_eq!(camera.aspect, 2.0);
        camera.set_aspect(0, 400);
        assert_relative_eq!(camera.aspect, 2.0);
        assert!(!camera.is_perspective());
    }
}
