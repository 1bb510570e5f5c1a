//! Vulkan swapchain
//!
//! Surface format, present mode, extent and image count are chosen by the
//! pure `choose_*` functions below; [`Swapchain::new`] only queries the
//! surface and applies them. Recreation passes the previous handle in.

use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::{vk, Device};

use crate::render::backends::vulkan::{VulkanContext, VulkanError, VulkanResult};

/// Prefer `B8G8R8A8_SRGB` with sRGB non-linear color space, else the first reported format
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> VulkanResult<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|sf| sf.format == vk::Format::B8G8R8A8_SRGB && sf.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
        .or_else(|| formats.first())
        .copied()
        .ok_or_else(|| VulkanError::InitializationFailed("Surface reports no formats".to_string()))
}

/// Prefer `MAILBOX`, else `FIFO` (always available)
pub fn choose_present_mode(modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    modes
        .iter()
        .copied()
        .find(|&mode| mode == vk::PresentModeKHR::MAILBOX)
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// Use the surface's current extent, or the window size clamped to the surface limits
///
/// Drivers have reported a minimum above the maximum; the maximum wins.
pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, window_extent: vk::Extent2D) -> vk::Extent2D {
    if caps.current_extent.width == u32::MAX {
        vk::Extent2D {
            width: window_extent
                .width
                .max(caps.min_image_extent.width)
                .min(caps.max_image_extent.width),
            height: window_extent
                .height
                .max(caps.min_image_extent.height)
                .min(caps.max_image_extent.height),
        }
    } else {
        caps.current_extent
    }
}

/// One more than the minimum, capped at the maximum when the surface has one
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let desired = caps.min_image_count + 1;
    if caps.max_image_count > 0 {
        desired.min(caps.max_image_count)
    } else {
        desired
    }
}

/// Swapchain with its image views
pub struct Swapchain {
    device: Device,
    loader: SwapchainLoader,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
}

impl Swapchain {
    /// Create a swapchain, retiring `old_swapchain` when it is not null
    pub fn new(
        context: &VulkanContext,
        window_extent: vk::Extent2D,
        old_swapchain: vk::SwapchainKHR,
    ) -> VulkanResult<Self> {
        let physical = context.physical_device().device;
        let surface = context.surface();
        let surface_loader = context.surface_loader();

        let (caps, formats, modes) = unsafe {
            (
                surface_loader
                    .get_physical_device_surface_capabilities(physical, surface)
                    .map_err(VulkanError::Api)?,
                surface_loader
                    .get_physical_device_surface_formats(physical, surface)
                    .map_err(VulkanError::Api)?,
                surface_loader
                    .get_physical_device_surface_present_modes(physical, surface)
                    .map_err(VulkanError::Api)?,
            )
        };

        let format = choose_surface_format(&formats)?;
        let present_mode = choose_present_mode(&modes);
        let extent = choose_extent(&caps, window_extent);
        let image_count = choose_image_count(&caps);

        let physical_info = context.physical_device();
        let queue_families = [physical_info.graphics_family, physical_info.present_family];
        let concurrent = physical_info.graphics_family != physical_info.present_family;

        let mut create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        create_info = if concurrent {
            create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&queue_families)
        } else {
            create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        };

        let loader = context.swapchain_loader().clone();
        let swapchain = unsafe {
            loader.create_swapchain(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        let images = unsafe {
            loader.get_swapchain_images(swapchain)
                .map_err(VulkanError::Api)?
        };

        let device = context.raw_device();
        let image_views = images
            .iter()
            .map(|&image| {
                let create_info = vk::ImageViewCreateInfo::builder()
                    .image(image)
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(format.format)
                    .components(vk::ComponentMapping::default())
                    .subresource_range(vk::ImageSubresourceRange {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        base_mip_level: 0,
                        level_count: 1,
                        base_array_layer: 0,
                        layer_count: 1,
                    });

                unsafe { device.create_image_view(&create_info, None) }
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(VulkanError::Api)?;

        log::info!(
            "Swapchain {}x{}, {} images, {:?} / {:?}",
            extent.width,
            extent.height,
            images.len(),
            format.format,
            present_mode
        );

        Ok(Self {
            device,
            loader,
            swapchain,
            images,
            image_views,
            format,
            extent,
        })
    }

    /// Get the swapchain handle
    pub const fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// Views of the presentable images, in image-index order
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    /// Number of presentable images
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Surface format of the images
    pub const fn format(&self) -> vk::SurfaceFormatKHR {
        self.format
    }

    /// Image extent
    pub const fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &view in &self.image_views {
                self.device.destroy_image_view(view, None);
            }
            self.loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            current_extent: vk::Extent2D { width: u32::MAX, height: u32::MAX },
            min_image_extent: vk::Extent2D { width: 64, height: 64 },
            max_image_extent: vk::Extent2D { width: 4096, height: 2160 },
            ..Default::default()
        }
    }

    #[test]
    fn test_surface_format_preference() {
        let unorm = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        let srgb = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };

        assert_eq!(choose_surface_format(&[unorm, srgb]).unwrap().format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(choose_surface_format(&[unorm]).unwrap().format, vk::Format::B8G8R8A8_UNORM);
        assert!(choose_surface_format(&[]).is_err());
    }

    #[test]
    fn test_present_mode_falls_back_to_fifo() {
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX]),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO]),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn test_extent_follows_surface_or_clamps_window() {
        let mut surface = caps(2, 3);
        let window = vk::Extent2D { width: 8000, height: 10 };
        assert_eq!(choose_extent(&surface, window), vk::Extent2D { width: 4096, height: 64 });

        surface.current_extent = vk::Extent2D { width: 800, height: 600 };
        assert_eq!(choose_extent(&surface, window), vk::Extent2D { width: 800, height: 600 });
    }

    #[test]
    fn test_extent_with_inverted_limits_takes_maximum() {
        let mut surface = caps(2, 3);
        surface.min_image_extent = vk::Extent2D { width: 1024, height: 768 };
        surface.max_image_extent = vk::Extent2D { width: 800, height: 600 };

        let window = vk::Extent2D { width: 300, height: 2000 };
        assert_eq!(choose_extent(&surface, window), vk::Extent2D { width: 800, height: 600 });
    }

    #[test]
    fn test_image_count() {
        assert_eq!(choose_image_count(&caps(2, 3)), 3);
        assert_eq!(choose_image_count(&caps(3, 3)), 3);
        assert_eq!(choose_image_count(&caps(2, 0)), 3);
    }
}
