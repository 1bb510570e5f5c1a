//! Images, views and samplers
//!
//! Render targets (multisampled color, depth, shadow depth) and sampled
//! textures share one [`Image`] type; the constructors differ only in usage,
//! sample count and layer count.

use ash::{vk, Device};

use crate::render::backends::vulkan::{VulkanContext, VulkanError, VulkanResult};

/// Access masks and pipeline stages for one layout transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionMasks {
    /// Accesses that must complete before the transition
    pub src_access: vk::AccessFlags,
    /// Accesses that wait for the transition
    pub dst_access: vk::AccessFlags,
    /// Stage producing the source accesses
    pub src_stage: vk::PipelineStageFlags,
    /// Stage consuming the destination accesses
    pub dst_stage: vk::PipelineStageFlags,
}

/// Barrier masks for the layout transitions the upload path performs
///
/// Only `UNDEFINED -> TRANSFER_DST_OPTIMAL` and
/// `TRANSFER_DST_OPTIMAL -> SHADER_READ_ONLY_OPTIMAL` are supported.
pub fn transition_masks(old: vk::ImageLayout, new: vk::ImageLayout) -> VulkanResult<TransitionMasks> {
    match (old, new) {
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => Ok(TransitionMasks {
            src_access: vk::AccessFlags::empty(),
            dst_access: vk::AccessFlags::TRANSFER_WRITE,
            src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
            dst_stage: vk::PipelineStageFlags::TRANSFER,
        }),
        (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => Ok(TransitionMasks {
            src_access: vk::AccessFlags::TRANSFER_WRITE,
            dst_access: vk::AccessFlags::SHADER_READ,
            src_stage: vk::PipelineStageFlags::TRANSFER,
            dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
        }),
        _ => Err(VulkanError::Logic(format!("Unsupported layout transition {old:?} -> {new:?}"))),
    }
}

/// Parameters for [`Image::new`]
#[derive(Debug, Clone, Copy)]
pub struct ImageDesc {
    /// Width and height
    pub extent: vk::Extent2D,
    /// Texel format
    pub format: vk::Format,
    /// Usage flags
    pub usage: vk::ImageUsageFlags,
    /// Samples per texel
    pub samples: vk::SampleCountFlags,
    /// Aspect of the view
    pub aspect: vk::ImageAspectFlags,
    /// Array layers (6 for cubemaps)
    pub layers: u32,
    /// Create as a cube-compatible image with a cube view
    pub cube: bool,
}

/// Image with its memory and a single view
pub struct Image {
    device: Device,
    image: vk::Image,
    memory: vk::DeviceMemory,
    view: vk::ImageView,
    desc: ImageDesc,
}

impl Image {
    /// Create a device-local image and its view
    pub fn new(context: &VulkanContext, desc: ImageDesc) -> VulkanResult<Self> {
        let device = context.raw_device();

        let flags = if desc.cube {
            vk::ImageCreateFlags::CUBE_COMPATIBLE
        } else {
            vk::ImageCreateFlags::empty()
        };

        let image_info = vk::ImageCreateInfo::builder()
            .flags(flags)
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: desc.extent.width,
                height: desc.extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(desc.layers)
            .format(desc.format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(desc.usage)
            .samples(desc.samples)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let image = unsafe {
            device.create_image(&image_info, None)
                .map_err(VulkanError::Api)?
        };

        let requirements = unsafe { device.get_image_memory_requirements(image) };
        let memory_type = match context.find_memory_type(requirements.memory_type_bits, vk::MemoryPropertyFlags::DEVICE_LOCAL) {
            Ok(index) => index,
            Err(e) => {
                unsafe { device.destroy_image(image, None) };
                return Err(e);
            }
        };

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type);

        let memory = match unsafe { device.allocate_memory(&alloc_info, None) } {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.destroy_image(image, None) };
                return Err(VulkanError::Api(e));
            }
        };

        let view_result = unsafe {
            device.bind_image_memory(image, memory, 0).and_then(|()| {
                let view_info = vk::ImageViewCreateInfo::builder()
                    .image(image)
                    .view_type(if desc.cube { vk::ImageViewType::CUBE } else { vk::ImageViewType::TYPE_2D })
                    .format(desc.format)
                    .subresource_range(Self::full_range(desc.aspect, desc.layers));
                device.create_image_view(&view_info, None)
            })
        };

        let view = match view_result {
            Ok(view) => view,
            Err(e) => {
                unsafe {
                    device.destroy_image(image, None);
                    device.free_memory(memory, None);
                }
                return Err(VulkanError::Api(e));
            }
        };

        Ok(Self {
            device,
            image,
            memory,
            view,
            desc,
        })
    }

    /// Transient multisampled color target resolved into the swapchain image
    pub fn color_target(
        context: &VulkanContext,
        extent: vk::Extent2D,
        format: vk::Format,
        samples: vk::SampleCountFlags,
    ) -> VulkanResult<Self> {
        Self::new(
            context,
            ImageDesc {
                extent,
                format,
                usage: vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSIENT_ATTACHMENT,
                samples,
                aspect: vk::ImageAspectFlags::COLOR,
                layers: 1,
                cube: false,
            },
        )
    }

    /// Depth target of the main pass
    pub fn depth_target(
        context: &VulkanContext,
        extent: vk::Extent2D,
        samples: vk::SampleCountFlags,
    ) -> VulkanResult<Self> {
        Self::new(
            context,
            ImageDesc {
                extent,
                format: context.depth_format(),
                usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
                samples,
                aspect: vk::ImageAspectFlags::DEPTH,
                layers: 1,
                cube: false,
            },
        )
    }

    /// Depth texture rendered by the shadow pass and sampled by the main pass
    pub fn shadow_depth(context: &VulkanContext, size: u32) -> VulkanResult<Self> {
        Self::new(
            context,
            ImageDesc {
                extent: vk::Extent2D { width: size, height: size },
                format: context.depth_format(),
                usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
                samples: vk::SampleCountFlags::TYPE_1,
                aspect: vk::ImageAspectFlags::DEPTH,
                layers: 1,
                cube: false,
            },
        )
    }

    /// Sampled color image filled by a transfer
    pub fn sampled(context: &VulkanContext, extent: vk::Extent2D, format: vk::Format, cube: bool) -> VulkanResult<Self> {
        Self::new(
            context,
            ImageDesc {
                extent,
                format,
                usage: vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
                samples: vk::SampleCountFlags::TYPE_1,
                aspect: vk::ImageAspectFlags::COLOR,
                layers: if cube { 6 } else { 1 },
                cube,
            },
        )
    }

    const fn full_range(aspect: vk::ImageAspectFlags, layers: u32) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask: aspect,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: layers,
        }
    }

    /// Record a layout transition barrier covering every layer
    pub fn record_transition(
        &self,
        command_buffer: vk::CommandBuffer,
        old: vk::ImageLayout,
        new: vk::ImageLayout,
    ) -> VulkanResult<()> {
        let masks = transition_masks(old, new)?;

        let barrier = vk::ImageMemoryBarrier::builder()
            .old_layout(old)
            .new_layout(new)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(self.image)
            .subresource_range(Self::full_range(self.desc.aspect, self.desc.layers))
            .src_access_mask(masks.src_access)
            .dst_access_mask(masks.dst_access)
            .build();

        unsafe {
            self.device.cmd_pipeline_barrier(
                command_buffer,
                masks.src_stage,
                masks.dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            );
        }

        Ok(())
    }

    /// Image handle
    pub const fn handle(&self) -> vk::Image {
        self.image
    }

    /// View handle
    pub const fn view(&self) -> vk::ImageView {
        self.view
    }

    /// Creation parameters
    pub const fn desc(&self) -> &ImageDesc {
        &self.desc
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_image_view(self.view, None);
            self.device.destroy_image(self.image, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

/// Sampler wrapper with RAII cleanup
pub struct Sampler {
    device: Device,
    sampler: vk::Sampler,
}

impl Sampler {
    /// Linear filtering with the given addressing
    pub fn linear(context: &VulkanContext, address_mode: vk::SamplerAddressMode) -> VulkanResult<Self> {
        let anisotropy = context.physical_device().features.sampler_anisotropy == vk::TRUE;
        let max_anisotropy = context.physical_device().properties.limits.max_sampler_anisotropy.min(8.0);

        let info = vk::SamplerCreateInfo::builder()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .address_mode_u(address_mode)
            .address_mode_v(address_mode)
            .address_mode_w(address_mode)
            .anisotropy_enable(anisotropy)
            .max_anisotropy(if anisotropy { max_anisotropy } else { 1.0 })
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR);

        Self::from_info(context.raw_device(), &info)
    }

    /// Clamp-to-white-border sampler for the shadow map, so texels outside the light volume read as lit
    pub fn shadow(context: &VulkanContext) -> VulkanResult<Self> {
        let info = vk::SamplerCreateInfo::builder()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::CLAMP_TO_BORDER)
            .address_mode_v(vk::SamplerAddressMode::CLAMP_TO_BORDER)
            .address_mode_w(vk::SamplerAddressMode::CLAMP_TO_BORDER)
            .border_color(vk::BorderColor::FLOAT_OPAQUE_WHITE)
            .mipmap_mode(vk::SamplerMipmapMode::NEAREST)
            .max_anisotropy(1.0);

        Self::from_info(context.raw_device(), &info)
    }

    fn from_info(device: Device, info: &vk::SamplerCreateInfo) -> VulkanResult<Self> {
        let sampler = unsafe {
            device.create_sampler(info, None)
                .map_err(VulkanError::Api)?
        };
        Ok(Self { device, sampler })
    }

    /// Sampler handle
    pub const fn handle(&self) -> vk::Sampler {
        self.sampler
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_sampler(self.sampler, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_transitions() {
        let to_transfer = transition_masks(vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL).unwrap();
        assert_eq!(to_transfer.dst_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(to_transfer.src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);

        let to_shader = transition_masks(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .unwrap();
        assert_eq!(to_shader.src_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(to_shader.dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
    }

    #[test]
    fn test_unsupported_transition_is_logic_error() {
        let result = transition_masks(vk::ImageLayout::UNDEFINED, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        assert!(matches!(result, Err(VulkanError::Logic(_))));

        let result = transition_masks(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
        assert!(matches!(result, Err(VulkanError::Logic(_))));
    }
}
