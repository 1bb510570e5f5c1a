//! Shadow map target
//!
//! Fixed-size depth texture with its own depth-only render pass,
//! framebuffer, comparison-free sampler and the per-frame light-space
//! uniform read by the shadow pipeline. Independent of the swapchain, so it
//! survives recreation untouched.

use ash::vk;

use super::framebuffer::Framebuffer;
use crate::core::config::ShadowConfig;
use crate::foundation::math::{to_columns, Mat4};
use crate::render::backends::vulkan::{Image, RenderPass, Sampler, UniformBinding, VulkanContext, VulkanResult};

/// Depth-only shadow target and its light-space uniform
pub struct ShadowMap {
    light_space: UniformBinding,
    framebuffer: Framebuffer,
    sampler: Sampler,
    depth: Image,
    render_pass: RenderPass,
    size: u32,
}

impl ShadowMap {
    /// Create the shadow target for `frame_count` frame slots
    pub fn new(context: &VulkanContext, config: &ShadowConfig, frame_count: usize) -> VulkanResult<Self> {
        let size = config.map_size;
        let render_pass = RenderPass::new_shadow_pass(context.raw_device(), context.depth_format())?;
        let depth = Image::shadow_depth(context, size)?;
        let extent = vk::Extent2D { width: size, height: size };
        let framebuffer = Framebuffer::new(context.raw_device(), render_pass.handle(), &[depth.view()], extent)?;
        let sampler = Sampler::shadow(context)?;
        let light_space = UniformBinding::new(context, std::mem::size_of::<[[f32; 4]; 4]>(), frame_count)?;

        log::info!("Shadow map ready: {}x{}", size, size);
        Ok(Self {
            light_space,
            framebuffer,
            sampler,
            depth,
            render_pass,
            size,
        })
    }

    /// Store this frame's light-space matrix
    pub fn write_light_space(&self, frame: usize, matrix: &Mat4) -> VulkanResult<()> {
        self.light_space.write_pod(frame, &to_columns(matrix))
    }

    /// Sampled-image descriptor for main-pass materials
    pub fn image_info(&self) -> vk::DescriptorImageInfo {
        vk::DescriptorImageInfo {
            sampler: self.sampler.handle(),
            image_view: self.depth.view(),
            image_layout: vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
        }
    }

    /// Per-frame light-space uniform
    pub const fn light_space(&self) -> &UniformBinding {
        &self.light_space
    }

    /// Depth-only render pass
    pub const fn render_pass(&self) -> &RenderPass {
        &self.render_pass
    }

    /// Framebuffer handle
    pub const fn framebuffer(&self) -> vk::Framebuffer {
        self.framebuffer.handle()
    }

    /// Square extent of the map
    pub const fn extent(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.size,
            height: self.size,
        }
    }
}
