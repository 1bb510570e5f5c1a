//! GPU buffers
//!
//! Host-visible buffers are written through a map/copy/unmap; device-local
//! buffers are filled once through a staging copy on a single-use command
//! buffer.

use ash::{vk, Device};

use crate::render::backends::vulkan::{CommandPool, Vertex, VulkanContext, VulkanError, VulkanResult};

/// Buffer with its dedicated memory allocation
pub struct Buffer {
    device: Device,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
}

impl Buffer {
    /// Create a buffer and bind freshly allocated memory with `properties`
    pub fn new(
        context: &VulkanContext,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<Self> {
        let device = context.raw_device();

        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size.max(1))
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe {
            device.create_buffer(&buffer_info, None)
                .map_err(VulkanError::Api)?
        };

        let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };
        let memory_type = match context.find_memory_type(requirements.memory_type_bits, properties) {
            Ok(index) => index,
            Err(e) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type);

        let memory = match unsafe { device.allocate_memory(&alloc_info, None) } {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(VulkanError::Api(e));
            }
        };

        let buffer = Self { device, buffer, memory, size };
        unsafe {
            buffer.device.bind_buffer_memory(buffer.buffer, buffer.memory, 0)
                .map_err(VulkanError::Api)?;
        }

        Ok(buffer)
    }

    /// Host-visible, host-coherent buffer
    pub fn host_visible(context: &VulkanContext, size: vk::DeviceSize, usage: vk::BufferUsageFlags) -> VulkanResult<Self> {
        Self::new(
            context,
            size,
            usage,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )
    }

    /// Device-local buffer filled from `bytes` through a staging copy
    pub fn device_local_with_data(
        context: &VulkanContext,
        commands: &CommandPool,
        usage: vk::BufferUsageFlags,
        bytes: &[u8],
    ) -> VulkanResult<Self> {
        let size = bytes.len() as vk::DeviceSize;
        let staging = Self::host_visible(context, size, vk::BufferUsageFlags::TRANSFER_SRC)?;
        staging.write(bytes)?;

        let buffer = Self::new(
            context,
            size,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        let upload = commands.begin_single_use()?;
        let region = vk::BufferCopy { src_offset: 0, dst_offset: 0, size };
        unsafe {
            context
                .device()
                .cmd_copy_buffer(upload.handle(), staging.handle(), buffer.handle(), &[region]);
        }
        upload.submit_and_wait(context.graphics_queue())?;

        Ok(buffer)
    }

    /// Copy `bytes` to the start of a host-visible buffer
    pub fn write(&self, bytes: &[u8]) -> VulkanResult<()> {
        if bytes.len() as vk::DeviceSize > self.size {
            return Err(VulkanError::Logic(format!(
                "Write of {} bytes into a {} byte buffer",
                bytes.len(),
                self.size
            )));
        }

        unsafe {
            let mapped = self
                .device
                .map_memory(self.memory, 0, self.size, vk::MemoryMapFlags::empty())
                .map_err(VulkanError::Api)?;
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), mapped.cast::<u8>(), bytes.len());
            self.device.unmap_memory(self.memory);
        }

        Ok(())
    }

    /// Get the buffer handle
    pub const fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Size in bytes
    pub const fn size(&self) -> vk::DeviceSize {
        self.size
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

/// Indexed triangle mesh resident on the GPU
pub struct GpuMesh {
    vertices: Buffer,
    indices: Buffer,
    index_count: u32,
}

impl GpuMesh {
    /// Upload vertex and index data
    pub fn upload(
        context: &VulkanContext,
        commands: &CommandPool,
        vertices: &[Vertex],
        indices: &[u32],
    ) -> VulkanResult<Self> {
        if vertices.is_empty() || indices.is_empty() {
            return Err(VulkanError::InvalidOperation {
                reason: "Mesh needs at least one vertex and one index".to_string(),
            });
        }

        let vertex_buffer = Buffer::device_local_with_data(
            context,
            commands,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            bytemuck::cast_slice(vertices),
        )?;
        let index_buffer = Buffer::device_local_with_data(
            context,
            commands,
            vk::BufferUsageFlags::INDEX_BUFFER,
            bytemuck::cast_slice(indices),
        )?;

        log::debug!("Uploaded mesh: {} vertices, {} indices", vertices.len(), indices.len());

        Ok(Self {
            vertices: vertex_buffer,
            indices: index_buffer,
            index_count: indices.len() as u32,
        })
    }

    /// Vertex buffer handle
    pub const fn vertex_buffer(&self) -> vk::Buffer {
        self.vertices.handle()
    }

    /// Index buffer handle (`u32` indices)
    pub const fn index_buffer(&self) -> vk::Buffer {
        self.indices.handle()
    }

    /// Number of indices
    pub const fn index_count(&self) -> u32 {
        self.index_count
    }
}
