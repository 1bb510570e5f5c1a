//! Vertex format and its Vulkan input description

use ash::vk;

/// Interleaved vertex: position, normal, texture coordinate
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    /// Object-space position
    pub position: [f32; 3],
    /// Object-space normal
    pub normal: [f32; 3],
    /// Texture coordinate
    pub uv: [f32; 2],
}

impl Vertex {
    /// Create a vertex
    pub const fn new(position: [f32; 3], normal: [f32; 3], uv: [f32; 2]) -> Self {
        Self { position, normal, uv }
    }

    /// Single per-vertex binding at index 0
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: std::mem::size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    /// Attributes at locations 0 (position), 1 (normal), 2 (uv)
    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 3] {
        [
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: 0,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 1,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: 12,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 2,
                format: vk::Format::R32G32_SFLOAT,
                offset: 24,
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_matches_struct() {
        assert_eq!(Vertex::binding_description().stride, 32);

        let probe = Vertex::default();
        let base = std::ptr::addr_of!(probe) as usize;
        let offsets = [
            std::ptr::addr_of!(probe.position) as usize - base,
            std::ptr::addr_of!(probe.normal) as usize - base,
            std::ptr::addr_of!(probe.uv) as usize - base,
        ];

        for (attribute, offset) in Vertex::attribute_descriptions().iter().zip(offsets) {
            assert_eq!(attribute.offset as usize, offset);
        }
    }
}
