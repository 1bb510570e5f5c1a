//! Renderables
//!
//! A renderable owns its GPU mesh, its per-frame object uniform and the
//! descriptor owner handle for its pipeline's pool. Descriptor sets are not
//! held here; they are looked up by owner handle every frame because a pool
//! resize replaces them.

use crate::foundation::math::{to_columns, Mat4, Transform};
use crate::render::backends::vulkan::{GpuMesh, OwnerKey, PipelineKey, UniformBinding, Vertex};
use crate::render::material::MaterialSpec;

slotmap::new_key_type! {
    /// Handle to a renderable owned by the render context
    pub struct RenderableKey;
}

/// Transform with a cached model matrix
#[derive(Debug, Clone)]
pub struct TransformState {
    transform: Transform,
    model: Mat4,
    dirty: bool,
    recomputes: u64,
}

impl TransformState {
    /// Start dirty so the first frame computes the matrix
    pub fn new(transform: Transform) -> Self {
        Self {
            transform,
            model: Mat4::identity(),
            dirty: true,
            recomputes: 0,
        }
    }

    /// Replace the transform and mark the matrix dirty
    pub fn set(&mut self, transform: Transform) {
        self.transform = transform;
        self.dirty = true;
    }

    /// Model matrix, recomputed only when dirty
    pub fn model(&mut self) -> &Mat4 {
        if self.dirty {
            self.model = self.transform.to_matrix();
            self.dirty = false;
            self.recomputes += 1;
        }
        &self.model
    }

    /// Current transform
    pub const fn transform(&self) -> &Transform {
        &self.transform
    }

    /// Whether the next `model()` call recomputes
    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// How many times the matrix was rebuilt
    pub const fn recomputes(&self) -> u64 {
        self.recomputes
    }
}

/// CPU-side mesh
#[derive(Debug, Clone, Default)]
pub struct MeshData {
    /// Vertices
    pub vertices: Vec<Vertex>,
    /// Triangle list indices
    pub indices: Vec<u32>,
}

/// Everything needed to add a renderable
#[derive(Debug, Clone)]
pub struct RenderableDesc {
    /// Pipeline to draw with; must match the material kind's slot table
    pub pipeline: PipelineKey,
    /// Material and its textures
    pub material: MaterialSpec,
    /// Geometry
    pub mesh: MeshData,
    /// Initial transform
    pub transform: Transform,
    /// Drawn into the shadow map
    pub casts_shadow: bool,
}

/// Per-object uniform block
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ObjectUniform {
    /// Object to world
    pub model: [[f32; 4]; 4],
    /// World to clip
    pub view_projection: [[f32; 4]; 4],
}

impl ObjectUniform {
    /// Pack both matrices column-major
    pub fn new(model: &Mat4, view_projection: &Mat4) -> Self {
        Self {
            model: to_columns(model),
            view_projection: to_columns(view_projection),
        }
    }
}

/// Model matrix pushed to the shadow pipeline
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ShadowPush {
    /// Object to world
    pub model: [[f32; 4]; 4],
}

/// A drawable object resident on the GPU
pub struct Renderable {
    pub(crate) uniform: UniformBinding,
    pub(crate) mesh: GpuMesh,
    pub(crate) transform: TransformState,
    pub(crate) pipeline: PipelineKey,
    pub(crate) owner: OwnerKey,
    pub(crate) casts_shadow: bool,
}

impl Renderable {
    /// Pipeline the renderable is drawn with
    pub const fn pipeline(&self) -> PipelineKey {
        self.pipeline
    }

    /// Descriptor owner in the pipeline's pool
    pub const fn owner(&self) -> OwnerKey {
        self.owner
    }

    /// Whether it is drawn into the shadow map
    pub const fn casts_shadow(&self) -> bool {
        self.casts_shadow
    }

    /// Current transform
    pub const fn transform(&self) -> &Transform {
        self.transform.transform()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;
    use approx::assert_relative_eq;

    #[test]
    fn test_model_recomputed_only_when_dirty() {
        let mut state = TransformState::new(Transform::from_position(Vec3::new(1.0, 2.0, 3.0)));
        assert!(state.is_dirty());

        assert_relative_eq!(state.model()[(0, 3)], 1.0);
        state.model();
        state.model();
        assert_eq!(state.recomputes(), 1);

        state.set(Transform::from_position(Vec3::new(4.0, 0.0, 0.0)));
        assert!(state.is_dirty());
        assert_relative_eq!(state.model()[(0, 3)], 4.0);
        assert_eq!(state.recomputes(), 2);
    }

    #[test]
    fn test_object_uniform_is_column_major() {
        let model = Transform::from_position(Vec3::new(5.0, 6.0, 7.0)).to_matrix();
        let uniform = ObjectUniform::new(&model, &Mat4::identity());
        assert_eq!(uniform.model[3][..3], [5.0, 6.0, 7.0]);
        assert_eq!(std::mem::size_of::<ObjectUniform>(), 128);
    }
}
