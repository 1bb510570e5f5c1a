//! Directional light and its shadow projection

use crate::core::config::ShadowConfig;
use crate::foundation::math::{to_columns, vulkan_clip_correction, Mat4, Point3, Vec3};

/// Sun-style light shining along `direction`
#[derive(Debug, Clone, PartialEq)]
pub struct DirectionalLight {
    /// Direction the light travels, need not be normalized
    pub direction: Vec3,
    /// Linear RGB color
    pub color: Vec3,
    /// Scale applied to `color`
    pub intensity: f32,
    /// Constant ambient term
    pub ambient: f32,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            direction: Vec3::new(-0.4, -1.0, -0.3),
            color: Vec3::new(1.0, 0.96, 0.9),
            intensity: 1.0,
            ambient: 0.15,
        }
    }
}

/// Unit travel direction; a degenerate direction shines straight down
fn travel_direction(direction: &Vec3) -> Vec3 {
    direction.try_normalize(f32::EPSILON).unwrap_or_else(|| -Vec3::y())
}

/// Scene light block shared by the main-pass shaders
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightUniform {
    /// World to shadow-map clip transform
    pub light_space: [[f32; 4]; 4],
    /// Normalized direction toward the light, w unused
    pub direction: [f32; 4],
    /// Color times intensity in rgb, ambient in w
    pub color: [f32; 4],
}

impl LightUniform {
    /// Pack a light and its light-space transform
    pub fn new(light: &DirectionalLight, light_space: &Mat4) -> Self {
        let toward = -travel_direction(&light.direction);
        let color = light.color * light.intensity;
        Self {
            light_space: to_columns(light_space),
            direction: [toward.x, toward.y, toward.z, 0.0],
            color: [color.x, color.y, color.z, light.ambient],
        }
    }
}

/// World to shadow-map clip transform
///
/// An orthographic box of `half_extent` around `target`, viewed from
/// `target - direction * light_distance`.
pub fn light_space_matrix(direction: &Vec3, target: &Point3, config: &ShadowConfig) -> Mat4 {
    let direction = travel_direction(direction);
    let eye = target - direction * config.light_distance;

    let up = if direction.dot(&Vec3::y()).abs() > 0.99 {
        Vec3::z()
    } else {
        Vec3::y()
    };

    let view = Mat4::look_at_rh(&eye, target, &up);
    let h = config.half_extent;
    let projection = Mat4::new_orthographic(-h, h, -h, h, config.near, config.far);
    vulkan_clip_correction() * projection * view
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec4;
    use approx::assert_relative_eq;

    fn project(matrix: &Mat4, point: &Point3) -> Vec4 {
        let clip = matrix * point.to_homogeneous();
        clip / clip.w
    }

    #[test]
    fn test_target_lands_at_center_with_expected_depth() {
        let config = ShadowConfig::default();
        let target = Point3::new(3.0, 0.5, -2.0);
        let matrix = light_space_matrix(&Vec3::new(-0.4, -1.0, -0.3), &target, &config);

        let ndc = project(&matrix, &target);
        assert_relative_eq!(ndc.x, 0.0, epsilon = 1e-4);
        assert_relative_eq!(ndc.y, 0.0, epsilon = 1e-4);

        let expected = (config.light_distance - config.near) / (config.far - config.near);
        assert_relative_eq!(ndc.z, expected, epsilon = 1e-4);
    }

    #[test]
    fn test_straight_down_light_is_well_formed() {
        let config = ShadowConfig::default();
        let matrix = light_space_matrix(&Vec3::new(0.0, -1.0, 0.0), &Point3::origin(), &config);
        assert!(matrix.iter().all(|v| v.is_finite()));

        let ndc = project(&matrix, &Point3::origin());
        assert_relative_eq!(ndc.x, 0.0, epsilon = 1e-4);
        assert_relative_eq!(ndc.y, 0.0, epsilon = 1e-4);
    }

    #[test]
    fn test_points_toward_light_are_nearer() {
        let config = ShadowConfig::default();
        let direction = Vec3::new(0.0, -1.0, -1.0);
        let matrix = light_space_matrix(&direction, &Point3::origin(), &config);

        let raised = Point3::origin() - direction.normalize();
        assert!(project(&matrix, &raised).z < project(&matrix, &Point3::origin()).z);
    }

    #[test]
    fn test_uniform_packs_direction_toward_light() {
        let light = DirectionalLight {
            direction: Vec3::new(0.0, -2.0, 0.0),
            ..DirectionalLight::default()
        };
        let uniform = LightUniform::new(&light, &Mat4::identity());
        assert_relative_eq!(uniform.direction[1], 1.0);
        assert_relative_eq!(uniform.color[3], light.ambient);
    }

    #[test]
    fn test_zero_direction_falls_back_to_overhead_light() {
        let light = DirectionalLight {
            direction: Vec3::zeros(),
            ..DirectionalLight::default()
        };
        let uniform = LightUniform::new(&light, &Mat4::identity());
        assert!(uniform.direction.iter().all(|c| c.is_finite()));
        assert_relative_eq!(uniform.direction[0], 0.0);
        assert_relative_eq!(uniform.direction[1], 1.0);
        assert_relative_eq!(uniform.direction[2], 0.0);

        let config = ShadowConfig::default();
        let degenerate = light_space_matrix(&Vec3::zeros(), &Point3::origin(), &config);
        let overhead = light_space_matrix(&-Vec3::y(), &Point3::origin(), &config);
        assert_relative_eq!(degenerate, overhead);
    }
}
