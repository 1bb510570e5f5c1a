//! Vulkan descriptor set and resource binding management
//!
//! Layouts come from reflection, never from hand-written binding lists.
//! Resources are written positionally: the n-th entry of an owner's resource
//! list lands in binding n, for every frame slot. Names play no part in
//! binding order.

use ash::{vk, Device};

use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// One entry of an owner's ordered resource list
#[derive(Debug, Clone)]
pub enum BoundResource {
    /// Uniform buffer, one region per frame slot
    Uniform(Vec<vk::DescriptorBufferInfo>),
    /// 2D sampled texture
    Texture(vk::DescriptorImageInfo),
    /// Cubemap sampled texture
    CubeMap(vk::DescriptorImageInfo),
}

impl BoundResource {
    /// Descriptor type this resource is written as
    pub const fn descriptor_type(&self) -> vk::DescriptorType {
        match self {
            Self::Uniform(_) => vk::DescriptorType::UNIFORM_BUFFER,
            Self::Texture(_) | Self::CubeMap(_) => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        }
    }
}

/// A write resolved for one frame slot
#[derive(Debug, Clone, Copy)]
pub enum PlannedWrite {
    /// Uniform buffer region at `binding`
    Buffer {
        /// Binding index
        binding: u32,
        /// Buffer region
        info: vk::DescriptorBufferInfo,
    },
    /// Combined image sampler at `binding`
    Image {
        /// Binding index
        binding: u32,
        /// Image view, sampler and layout
        info: vk::DescriptorImageInfo,
    },
}

impl PlannedWrite {
    /// Binding index
    pub const fn binding(&self) -> u32 {
        match self {
            Self::Buffer { binding, .. } | Self::Image { binding, .. } => *binding,
        }
    }
}

/// Check a resource list against the layout's binding types, position by position
pub fn validate_resources(expected: &[vk::DescriptorType], resources: &[BoundResource]) -> VulkanResult<()> {
    if expected.len() != resources.len() {
        return Err(VulkanError::Logic(format!(
            "Layout has {} bindings but {} resources were supplied",
            expected.len(),
            resources.len()
        )));
    }

    for (binding, (ty, resource)) in expected.iter().zip(resources).enumerate() {
        if *ty != resource.descriptor_type() {
            return Err(VulkanError::Logic(format!(
                "Binding {binding} expects {ty:?} but resource is {:?}",
                resource.descriptor_type()
            )));
        }
    }

    Ok(())
}

/// Resolve the writes for one frame slot; binding indices ascend from 0 in list order
pub fn plan_writes(resources: &[BoundResource], frame: usize) -> VulkanResult<Vec<PlannedWrite>> {
    resources
        .iter()
        .enumerate()
        .map(|(index, resource)| {
            let binding = index as u32;
            match resource {
                BoundResource::Uniform(per_frame) => per_frame
                    .get(frame)
                    .map(|info| PlannedWrite::Buffer { binding, info: *info })
                    .ok_or_else(|| {
                        VulkanError::Logic(format!("Uniform at binding {binding} has no buffer for frame slot {frame}"))
                    }),
                BoundResource::Texture(info) | BoundResource::CubeMap(info) => {
                    Ok(PlannedWrite::Image { binding, info: *info })
                }
            }
        })
        .collect()
}

/// Apply planned writes to `set`
pub fn write_set(device: &Device, set: vk::DescriptorSet, writes: &[PlannedWrite]) {
    // Each write points into `writes`, which outlives the update call.
    let descriptor_writes: Vec<vk::WriteDescriptorSet> = writes
        .iter()
        .map(|write| match write {
            PlannedWrite::Buffer { binding, info } => vk::WriteDescriptorSet::builder()
                .dst_set(set)
                .dst_binding(*binding)
                .dst_array_element(0)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .buffer_info(std::slice::from_ref(info))
                .build(),
            PlannedWrite::Image { binding, info } => vk::WriteDescriptorSet::builder()
                .dst_set(set)
                .dst_binding(*binding)
                .dst_array_element(0)
                .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .image_info(std::slice::from_ref(info))
                .build(),
        })
        .collect();

    unsafe {
        device.update_descriptor_sets(&descriptor_writes, &[]);
    }
}

/// Descriptor set layout wrapper with automatic cleanup
pub struct DescriptorSetLayout {
    layout: vk::DescriptorSetLayout,
    device: Device,
    bindings: Vec<vk::DescriptorSetLayoutBinding>,
}

impl DescriptorSetLayout {
    /// Create a layout from reflected bindings
    pub fn from_bindings(device: &Device, bindings: Vec<vk::DescriptorSetLayoutBinding>) -> VulkanResult<Self> {
        let layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&bindings);

        let layout = unsafe { device.create_descriptor_set_layout(&layout_info, None) }
            .map_err(VulkanError::Api)?;

        Ok(Self {
            layout,
            device: device.clone(),
            bindings,
        })
    }

    /// Get the Vulkan descriptor set layout handle
    pub const fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    /// Get the bindings used in this layout
    pub fn bindings(&self) -> &[vk::DescriptorSetLayoutBinding] {
        &self.bindings
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

/// Descriptor pool sized exactly from a histogram
pub struct RawDescriptorPool {
    pool: vk::DescriptorPool,
    device: Device,
}

impl RawDescriptorPool {
    /// Create a pool that allows freeing individual sets
    pub fn new(device: Device, max_sets: u32, pool_sizes: &[vk::DescriptorPoolSize]) -> VulkanResult<Self> {
        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
            .max_sets(max_sets)
            .pool_sizes(pool_sizes);

        let pool = unsafe { device.create_descriptor_pool(&pool_info, None) }
            .map_err(VulkanError::Api)?;

        Ok(Self { pool, device })
    }

    /// Allocate sets, returning the raw result so exhaustion can be told apart
    pub fn allocate(&self, layouts: &[vk::DescriptorSetLayout]) -> Result<Vec<vk::DescriptorSet>, vk::Result> {
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.pool)
            .set_layouts(layouts);

        unsafe { self.device.allocate_descriptor_sets(&alloc_info) }
    }

    /// Return sets to the pool
    pub fn free(&self, sets: &[vk::DescriptorSet]) -> VulkanResult<()> {
        if sets.is_empty() {
            return Ok(());
        }
        unsafe { self.device.free_descriptor_sets(self.pool, sets) }.map_err(VulkanError::Api)
    }

    /// Get the pool handle
    pub const fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }
}

impl Drop for RawDescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_pool(self.pool, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn uniform(frames: usize) -> BoundResource {
        BoundResource::Uniform(
            (0..frames)
                .map(|i| vk::DescriptorBufferInfo {
                    buffer: vk::Buffer::from_raw(100 + i as u64),
                    offset: 0,
                    range: 64,
                })
                .collect(),
        )
    }

    fn texture(id: u64) -> BoundResource {
        BoundResource::Texture(vk::DescriptorImageInfo {
            sampler: vk::Sampler::from_raw(id),
            image_view: vk::ImageView::from_raw(id),
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        })
    }

    #[test]
    fn test_writes_are_positional_for_every_frame() {
        let frames = 3;
        let resources = vec![uniform(frames), uniform(frames), texture(7), texture(8)];

        for frame in 0..frames {
            let writes = plan_writes(&resources, frame).unwrap();
            let bindings: Vec<u32> = writes.iter().map(PlannedWrite::binding).collect();
            assert_eq!(bindings, vec![0, 1, 2, 3]);

            match writes[0] {
                PlannedWrite::Buffer { info, .. } => assert_eq!(info.buffer.as_raw(), 100 + frame as u64),
                PlannedWrite::Image { .. } => panic!("binding 0 should be a buffer"),
            }
            match writes[3] {
                PlannedWrite::Image { info, .. } => assert_eq!(info.image_view.as_raw(), 8),
                PlannedWrite::Buffer { .. } => panic!("binding 3 should be an image"),
            }
        }
    }

    #[test]
    fn test_uniform_missing_frame_is_rejected() {
        let resources = vec![uniform(1)];
        assert!(plan_writes(&resources, 0).is_ok());
        assert!(matches!(plan_writes(&resources, 1), Err(VulkanError::Logic(_))));
    }

    #[test]
    fn test_validation_matches_positions() {
        let expected = [
            vk::DescriptorType::UNIFORM_BUFFER,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        ];
        assert!(validate_resources(&expected, &[uniform(2), texture(1)]).is_ok());
        assert!(validate_resources(&expected, &[texture(1), uniform(2)]).is_err());
        assert!(validate_resources(&expected, &[uniform(2)]).is_err());
    }
}
