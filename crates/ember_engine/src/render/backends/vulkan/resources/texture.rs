//! Sampled textures
//!
//! RGBA8 pixel data goes through a staging buffer, a copy on a single-use
//! command buffer, and two layout transitions before it can be sampled.

use ash::vk;

use super::buffer::Buffer;
use super::image::{Image, Sampler};
use crate::render::backends::vulkan::{CommandPool, VulkanContext, VulkanError, VulkanResult};

slotmap::new_key_type! {
    /// Handle to a texture owned by the render context
    pub struct TextureKey;
}

/// Number of faces in a cubemap, in +X, -X, +Y, -Y, +Z, -Z order
pub const CUBE_FACES: usize = 6;

/// Sampled image with its sampler
pub struct Texture {
    sampler: Sampler,
    image: Image,
    cube: bool,
}

impl Texture {
    /// Upload a 2D sRGB texture from tightly packed RGBA8 pixels
    pub fn from_rgba(
        context: &VulkanContext,
        commands: &CommandPool,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> VulkanResult<Self> {
        check_pixels(pixels.len(), width, height, 1)?;
        let extent = vk::Extent2D { width, height };
        let image = Image::sampled(context, extent, vk::Format::R8G8B8A8_SRGB, false)?;
        upload_layers(context, commands, &image, pixels, extent, 1)?;

        log::debug!("Uploaded texture {}x{}", width, height);
        Ok(Self {
            sampler: Sampler::linear(context, vk::SamplerAddressMode::REPEAT)?,
            image,
            cube: false,
        })
    }

    /// Upload a cubemap from six square RGBA8 faces
    pub fn cubemap(
        context: &VulkanContext,
        commands: &CommandPool,
        faces: &[&[u8]; CUBE_FACES],
        size: u32,
    ) -> VulkanResult<Self> {
        let mut pixels = Vec::with_capacity(faces.iter().map(|f| f.len()).sum());
        for face in faces {
            check_pixels(face.len(), size, size, 1)?;
            pixels.extend_from_slice(face);
        }

        let extent = vk::Extent2D { width: size, height: size };
        let image = Image::sampled(context, extent, vk::Format::R8G8B8A8_SRGB, true)?;
        upload_layers(context, commands, &image, &pixels, extent, CUBE_FACES as u32)?;

        log::debug!("Uploaded cubemap {}x{}", size, size);
        Ok(Self {
            sampler: Sampler::linear(context, vk::SamplerAddressMode::CLAMP_TO_EDGE)?,
            image,
            cube: true,
        })
    }

    /// Descriptor info for a combined image sampler binding
    pub fn descriptor_info(&self) -> vk::DescriptorImageInfo {
        vk::DescriptorImageInfo {
            sampler: self.sampler.handle(),
            image_view: self.image.view(),
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }
    }

    /// Whether this is a cubemap
    pub const fn is_cubemap(&self) -> bool {
        self.cube
    }
}

fn check_pixels(len: usize, width: u32, height: u32, layers: u32) -> VulkanResult<()> {
    let expected = width as usize * height as usize * 4 * layers as usize;
    if width == 0 || height == 0 || len != expected {
        return Err(VulkanError::InvalidOperation {
            reason: format!("Expected {expected} bytes of RGBA8 data for {width}x{height}, got {len}"),
        });
    }
    Ok(())
}

fn upload_layers(
    context: &VulkanContext,
    commands: &CommandPool,
    image: &Image,
    pixels: &[u8],
    extent: vk::Extent2D,
    layers: u32,
) -> VulkanResult<()> {
    let staging = Buffer::host_visible(context, pixels.len() as vk::DeviceSize, vk::BufferUsageFlags::TRANSFER_SRC)?;
    staging.write(pixels)?;

    let upload = commands.begin_single_use()?;
    image.record_transition(upload.handle(), vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL)?;

    let region = vk::BufferImageCopy::builder()
        .buffer_offset(0)
        .buffer_row_length(0)
        .buffer_image_height(0)
        .image_subresource(vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: 0,
            base_array_layer: 0,
            layer_count: layers,
        })
        .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
        .image_extent(vk::Extent3D {
            width: extent.width,
            height: extent.height,
            depth: 1,
        })
        .build();

    unsafe {
        context.device().cmd_copy_buffer_to_image(
            upload.handle(),
            staging.handle(),
            image.handle(),
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[region],
        );
    }

    image.record_transition(
        upload.handle(),
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    )?;
    upload.submit_and_wait(context.graphics_queue())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_size_check() {
        assert!(check_pixels(2 * 2 * 4, 2, 2, 1).is_ok());
        assert!(check_pixels(2 * 2 * 4 * 6, 2, 2, 6).is_ok());
        assert!(check_pixels(15, 2, 2, 1).is_err());
        assert!(check_pixels(0, 0, 0, 1).is_err());
    }
}
