//! Materials
//!
//! A closed set of material kinds. Each kind has a fixed, ordered list of
//! resource slots, and that order is the descriptor binding order of the
//! matching shaders.

use crate::render::backends::vulkan::{BoundResource, TextureKey, VulkanError, VulkanResult};

/// What a uniform slot holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformSlot {
    /// Per-object model and view-projection matrices
    Object,
    /// Scene light and light-space matrix
    Light,
    /// Light-space matrix alone
    LightSpace,
}

/// What a texture slot holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureSlot {
    /// Surface color
    Albedo,
    /// Shadow map depth
    ShadowMap,
}

/// One entry of a material's resource list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceSlot {
    /// Uniform buffer
    Uniform(UniformSlot),
    /// 2D texture
    Texture(TextureSlot),
    /// Cubemap texture
    CubeMap,
}

impl ResourceSlot {
    fn accepts(self, resource: &BoundResource) -> bool {
        matches!(
            (self, resource),
            (Self::Uniform(_), BoundResource::Uniform(_))
                | (Self::Texture(_), BoundResource::Texture(_))
                | (Self::CubeMap, BoundResource::CubeMap(_))
        )
    }
}

/// Closed set of material kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaterialKind {
    /// Lit, untextured, shadowed
    Default,
    /// Lit, albedo-textured, shadowed
    Textured,
    /// Depth-only shadow caster
    Shadow,
    /// Skybox sampled from a cubemap
    CubeMap,
}

impl MaterialKind {
    /// Ordered resource slots; position n is binding n
    pub const fn resource_slots(self) -> &'static [ResourceSlot] {
        match self {
            Self::Default => &[
                ResourceSlot::Uniform(UniformSlot::Object),
                ResourceSlot::Uniform(UniformSlot::Light),
                ResourceSlot::Texture(TextureSlot::ShadowMap),
            ],
            Self::Textured => &[
                ResourceSlot::Uniform(UniformSlot::Object),
                ResourceSlot::Uniform(UniformSlot::Light),
                ResourceSlot::Texture(TextureSlot::Albedo),
                ResourceSlot::Texture(TextureSlot::ShadowMap),
            ],
            Self::Shadow => &[ResourceSlot::Uniform(UniformSlot::LightSpace)],
            Self::CubeMap => &[ResourceSlot::Uniform(UniformSlot::Object), ResourceSlot::CubeMap],
        }
    }

    /// Name of the pipeline registered for this kind by default
    pub const fn pipeline_name(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Textured => "textured",
            Self::Shadow => "shadow",
            Self::CubeMap => "skybox",
        }
    }
}

/// Material choice for a renderable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterialSpec {
    /// Untextured
    Default,
    /// Textured with an albedo map
    Textured {
        /// Albedo texture
        albedo: TextureKey,
    },
    /// Skybox
    CubeMap {
        /// Cubemap texture
        sky: TextureKey,
    },
}

impl MaterialSpec {
    /// Kind this choice instantiates
    pub const fn kind(&self) -> MaterialKind {
        match self {
            Self::Default => MaterialKind::Default,
            Self::Textured { .. } => MaterialKind::Textured,
            Self::CubeMap { .. } => MaterialKind::CubeMap,
        }
    }
}

/// A material kind with resources matching its slot table
#[derive(Debug, Clone)]
pub struct Material {
    kind: MaterialKind,
    resources: Vec<BoundResource>,
}

impl Material {
    /// Check `resources` against the kind's slot table, position by position
    pub fn new(kind: MaterialKind, resources: Vec<BoundResource>) -> VulkanResult<Self> {
        let slots = kind.resource_slots();
        if slots.len() != resources.len() {
            return Err(VulkanError::Logic(format!(
                "{kind:?} material takes {} resources, got {}",
                slots.len(),
                resources.len()
            )));
        }

        if let Some(position) = slots.iter().zip(&resources).position(|(slot, resource)| !slot.accepts(resource)) {
            return Err(VulkanError::Logic(format!(
                "{kind:?} material expects {:?} at binding {position}",
                slots[position]
            )));
        }

        Ok(Self { kind, resources })
    }

    /// Material kind
    pub const fn kind(&self) -> MaterialKind {
        self.kind
    }

    /// Resources in binding order
    pub fn resources(&self) -> &[BoundResource] {
        &self.resources
    }

    /// Give up the resource list, e.g. to register it with a descriptor pool
    pub fn into_resources(self) -> Vec<BoundResource> {
        self.resources
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk;

    fn uniform() -> BoundResource {
        BoundResource::Uniform(vec![vk::DescriptorBufferInfo::default(); 2])
    }

    fn texture() -> BoundResource {
        BoundResource::Texture(vk::DescriptorImageInfo::default())
    }

    fn cubemap() -> BoundResource {
        BoundResource::CubeMap(vk::DescriptorImageInfo::default())
    }

    #[test]
    fn test_slot_tables() {
        assert_eq!(MaterialKind::Default.resource_slots().len(), 3);
        assert_eq!(MaterialKind::Textured.resource_slots().len(), 4);
        assert_eq!(MaterialKind::Shadow.resource_slots(), &[ResourceSlot::Uniform(UniformSlot::LightSpace)]);
        assert_eq!(MaterialKind::CubeMap.resource_slots()[1], ResourceSlot::CubeMap);
    }

    #[test]
    fn test_valid_materials() {
        assert!(Material::new(MaterialKind::Default, vec![uniform(), uniform(), texture()]).is_ok());
        assert!(Material::new(MaterialKind::Textured, vec![uniform(), uniform(), texture(), texture()]).is_ok());
        assert!(Material::new(MaterialKind::Shadow, vec![uniform()]).is_ok());
        assert!(Material::new(MaterialKind::CubeMap, vec![uniform(), cubemap()]).is_ok());
    }

    #[test]
    fn test_mismatched_resources_are_rejected() {
        assert!(Material::new(MaterialKind::Default, vec![uniform(), uniform()]).is_err());
        assert!(Material::new(MaterialKind::CubeMap, vec![uniform(), texture()]).is_err());
        assert!(Material::new(MaterialKind::Shadow, vec![texture()]).is_err());
    }
}
