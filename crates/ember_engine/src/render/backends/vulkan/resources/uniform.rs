//! Per-frame uniform buffers
//!
//! One host-visible buffer per frame slot, so the CPU can write slot N
//! while the GPU still reads slot N-1. The byte size is fixed at creation.

use ash::vk;

use super::buffer::Buffer;
use crate::render::backends::vulkan::{VulkanContext, VulkanError, VulkanResult};

/// Uniform data replicated across frame slots
pub struct UniformBinding {
    buffers: Vec<Buffer>,
    size: vk::DeviceSize,
}

impl UniformBinding {
    /// Allocate `frame_count` buffers of `size` bytes
    pub fn new(context: &VulkanContext, size: usize, frame_count: usize) -> VulkanResult<Self> {
        if size == 0 {
            return Err(VulkanError::InvalidOperation {
                reason: "Uniform binding size must be nonzero".to_string(),
            });
        }

        let size = size as vk::DeviceSize;
        let buffers = (0..frame_count)
            .map(|_| Buffer::host_visible(context, size, vk::BufferUsageFlags::UNIFORM_BUFFER))
            .collect::<VulkanResult<Vec<_>>>()?;

        Ok(Self { buffers, size })
    }

    /// Write `bytes` into the slot's buffer
    pub fn write(&self, frame: usize, bytes: &[u8]) -> VulkanResult<()> {
        self.buffer(frame)?.write(bytes)
    }

    /// Write a plain-old-data value into the slot's buffer
    pub fn write_pod<T: bytemuck::Pod>(&self, frame: usize, value: &T) -> VulkanResult<()> {
        self.write(frame, bytemuck::bytes_of(value))
    }

    fn buffer(&self, frame: usize) -> VulkanResult<&Buffer> {
        self.buffers.get(frame).ok_or_else(|| VulkanError::InvalidOperation {
            reason: format!("Uniform has no buffer for frame slot {frame}"),
        })
    }

    /// Descriptor info for every slot, in slot order
    pub fn descriptor_infos(&self) -> Vec<vk::DescriptorBufferInfo> {
        self.buffers
            .iter()
            .map(|buffer| vk::DescriptorBufferInfo {
                buffer: buffer.handle(),
                offset: 0,
                range: self.size,
            })
            .collect()
    }

    /// Size in bytes of each slot's buffer
    pub const fn size(&self) -> vk::DeviceSize {
        self.size
    }
}
