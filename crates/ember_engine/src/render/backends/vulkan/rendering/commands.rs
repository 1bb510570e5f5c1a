//! Command buffer management
//!
//! One pool on the graphics family hands out the per-slot primary buffers and
//! short-lived single-use buffers for uploads and layout transitions.
//! [`CommandRecorder`] wraps a primary buffer while a frame is recorded and
//! rejects out-of-order calls (drawing outside a pass, ending twice).

use ash::{vk, Device};

use crate::render::backends::vulkan::{GpuMesh, VulkanError, VulkanResult};

/// Command pool wrapper with RAII cleanup
pub struct CommandPool {
    device: Device,
    command_pool: vk::CommandPool,
}

impl CommandPool {
    /// Create a pool whose buffers can be reset individually
    pub fn new(device: Device, queue_family_index: u32) -> VulkanResult<Self> {
        let pool_create_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(queue_family_index);

        let command_pool = unsafe {
            device.create_command_pool(&pool_create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self { device, command_pool })
    }

    /// Allocate primary command buffers
    pub fn allocate_command_buffers(&self, count: u32) -> VulkanResult<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        unsafe {
            self.device.allocate_command_buffers(&alloc_info)
                .map_err(VulkanError::Api)
        }
    }

    /// Get the command pool handle
    pub const fn handle(&self) -> vk::CommandPool {
        self.command_pool
    }

    /// Allocate and begin a one-off command buffer
    pub fn begin_single_use(&self) -> VulkanResult<SingleUseCommands> {
        let command_buffer = self
            .allocate_command_buffers(1)?
            .into_iter()
            .next()
            .ok_or_else(|| VulkanError::Logic("Command buffer allocation returned nothing".to_string()))?;

        let commands = SingleUseCommands {
            device: self.device.clone(),
            pool: self.command_pool,
            command_buffer,
        };

        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        unsafe {
            self.device.begin_command_buffer(command_buffer, &begin_info)
                .map_err(VulkanError::Api)?;
        }

        Ok(commands)
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_command_pool(self.command_pool, None);
        }
    }
}

/// Command buffer recorded once, submitted, and freed
///
/// The buffer returns to its pool on drop, whether or not it was submitted.
pub struct SingleUseCommands {
    device: Device,
    pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,
}

impl SingleUseCommands {
    /// Buffer to record into
    pub const fn handle(&self) -> vk::CommandBuffer {
        self.command_buffer
    }

    /// End recording, submit to `queue` and wait for the queue to drain
    pub fn submit_and_wait(self, queue: vk::Queue) -> VulkanResult<()> {
        let command_buffers = [self.command_buffer];
        let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers).build();

        unsafe {
            self.device.end_command_buffer(self.command_buffer)
                .map_err(VulkanError::Api)?;
            self.device
                .queue_submit(queue, &[submit_info], vk::Fence::null())
                .map_err(VulkanError::from_vk)?;
            self.device.queue_wait_idle(queue)
                .map_err(VulkanError::from_vk)
        }
    }
}

impl Drop for SingleUseCommands {
    fn drop(&mut self) {
        unsafe {
            self.device.free_command_buffers(self.pool, &[self.command_buffer]);
        }
    }
}

/// Frame command recorder
pub struct CommandRecorder {
    device: Device,
    command_buffer: vk::CommandBuffer,
    recording: bool,
    in_render_pass: bool,
    draw_calls: u32,
}

impl CommandRecorder {
    /// Wrap a primary command buffer
    pub const fn new(device: Device, command_buffer: vk::CommandBuffer) -> Self {
        Self {
            device,
            command_buffer,
            recording: false,
            in_render_pass: false,
            draw_calls: 0,
        }
    }

    /// Get the command buffer handle
    pub const fn handle(&self) -> vk::CommandBuffer {
        self.command_buffer
    }

    /// Device the buffer belongs to
    pub const fn device(&self) -> &Device {
        &self.device
    }

    /// Draws recorded since `begin`
    pub const fn draw_calls(&self) -> u32 {
        self.draw_calls
    }

    fn require(&self, recording: bool, in_pass: bool, what: &str) -> VulkanResult<()> {
        if self.recording != recording || self.in_render_pass != in_pass {
            return Err(VulkanError::InvalidOperation {
                reason: format!(
                    "{what} with recording={} in_render_pass={}",
                    self.recording, self.in_render_pass
                ),
            });
        }
        Ok(())
    }

    /// Reset and begin recording
    pub fn begin(&mut self) -> VulkanResult<()> {
        self.require(false, false, "begin")?;

        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        unsafe {
            self.device
                .reset_command_buffer(self.command_buffer, vk::CommandBufferResetFlags::empty())
                .map_err(VulkanError::Api)?;
            self.device.begin_command_buffer(self.command_buffer, &begin_info)
                .map_err(VulkanError::Api)?;
        }

        self.recording = true;
        self.draw_calls = 0;
        Ok(())
    }

    /// Begin a render pass covering `extent`
    pub fn begin_render_pass(
        &mut self,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
        clear_values: &[vk::ClearValue],
    ) -> VulkanResult<()> {
        self.require(true, false, "begin_render_pass")?;

        let begin_info = vk::RenderPassBeginInfo::builder()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            })
            .clear_values(clear_values);

        unsafe {
            self.device
                .cmd_begin_render_pass(self.command_buffer, &begin_info, vk::SubpassContents::INLINE);
        }

        self.in_render_pass = true;
        Ok(())
    }

    /// End the current render pass
    pub fn end_render_pass(&mut self) -> VulkanResult<()> {
        self.require(true, true, "end_render_pass")?;
        unsafe {
            self.device.cmd_end_render_pass(self.command_buffer);
        }
        self.in_render_pass = false;
        Ok(())
    }

    /// Set the dynamic viewport and scissor to cover `extent`
    pub fn set_viewport_and_scissor(&mut self, extent: vk::Extent2D) {
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };

        unsafe {
            self.device.cmd_set_viewport(self.command_buffer, 0, &[viewport]);
            self.device.cmd_set_scissor(self.command_buffer, 0, &[scissor]);
        }
    }

    /// Bind a graphics pipeline
    pub fn bind_pipeline(&mut self, pipeline: vk::Pipeline) {
        unsafe {
            self.device
                .cmd_bind_pipeline(self.command_buffer, vk::PipelineBindPoint::GRAPHICS, pipeline);
        }
    }

    /// Bind one descriptor set at set index 0
    pub fn bind_descriptor_set(&mut self, layout: vk::PipelineLayout, set: vk::DescriptorSet) {
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                self.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                0,
                &[set],
                &[],
            );
        }
    }

    /// Push constants at offset 0
    pub fn push_constants(&mut self, layout: vk::PipelineLayout, stages: vk::ShaderStageFlags, bytes: &[u8]) {
        unsafe {
            self.device
                .cmd_push_constants(self.command_buffer, layout, stages, 0, bytes);
        }
    }

    /// Bind the mesh's vertex and index buffers and draw it
    pub fn draw_mesh(&mut self, mesh: &GpuMesh) -> VulkanResult<()> {
        self.require(true, true, "draw_mesh")?;
        unsafe {
            self.device
                .cmd_bind_vertex_buffers(self.command_buffer, 0, &[mesh.vertex_buffer()], &[0]);
            self.device
                .cmd_bind_index_buffer(self.command_buffer, mesh.index_buffer(), 0, vk::IndexType::UINT32);
            self.device
                .cmd_draw_indexed(self.command_buffer, mesh.index_count(), 1, 0, 0, 0);
        }
        self.draw_calls += 1;
        Ok(())
    }

    /// End recording
    pub fn end(&mut self) -> VulkanResult<vk::CommandBuffer> {
        self.require(true, false, "end")?;

        unsafe {
            self.device.end_command_buffer(self.command_buffer)
                .map_err(VulkanError::Api)?;
        }

        self.recording = false;
        Ok(self.command_buffer)
    }
}
