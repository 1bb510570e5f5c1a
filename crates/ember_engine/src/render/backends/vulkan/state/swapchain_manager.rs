//! Swapchain and framebuffer management
//!
//! Owns the swapchain together with everything sized from it: the optional
//! multisampled color target, the depth target and one framebuffer per
//! swapchain image. All of it is torn down and rebuilt on recreate, and the
//! generation counter tells dependents a rebuild happened.

use ash::vk;

use super::framebuffer::Framebuffer;
use super::swapchain::Swapchain;
use crate::render::backends::vulkan::{Image, RenderPass, VulkanContext, VulkanError, VulkanResult};
use crate::render::window::FramebufferSource;

/// Block on window events until the framebuffer has a nonzero size
pub fn wait_for_nonzero_extent(window: &mut dyn FramebufferSource) -> vk::Extent2D {
    let (mut width, mut height) = window.framebuffer_size();
    while width == 0 || height == 0 {
        log::debug!("Framebuffer is {}x{}, waiting for events", width, height);
        window.wait_events();
        (width, height) = window.framebuffer_size();
    }
    vk::Extent2D { width, height }
}

/// Attachment order matching the main render pass
pub fn framebuffer_attachments(
    color: Option<vk::ImageView>,
    depth: vk::ImageView,
    present: vk::ImageView,
) -> Vec<vk::ImageView> {
    match color {
        Some(color) => vec![color, depth, present],
        None => vec![present, depth],
    }
}

/// One attachment list per swapchain image, in image order
pub fn framebuffer_plan(
    color: Option<vk::ImageView>,
    depth: vk::ImageView,
    present: &[vk::ImageView],
) -> Vec<Vec<vk::ImageView>> {
    present
        .iter()
        .map(|view| framebuffer_attachments(color, depth, *view))
        .collect()
}

/// Swapchain plus its dependent attachments and framebuffers
pub struct SwapchainManager {
    framebuffers: Vec<Framebuffer>,
    color: Option<Image>,
    depth: Image,
    swapchain: Swapchain,
    generation: u64,
}

impl SwapchainManager {
    /// Build attachments and framebuffers for an existing swapchain
    pub fn new(context: &VulkanContext, swapchain: Swapchain, render_pass: &RenderPass) -> VulkanResult<Self> {
        log::debug!("Creating SwapchainManager...");
        let (color, depth, framebuffers) = Self::build_targets(context, &swapchain, render_pass)?;

        log::debug!("SwapchainManager created with {} framebuffers", framebuffers.len());
        Ok(Self {
            framebuffers,
            color,
            depth,
            swapchain,
            generation: 0,
        })
    }

    fn build_targets(
        context: &VulkanContext,
        swapchain: &Swapchain,
        render_pass: &RenderPass,
    ) -> VulkanResult<(Option<Image>, Image, Vec<Framebuffer>)> {
        let extent = swapchain.extent();
        let samples = render_pass.samples();

        let color = if samples == vk::SampleCountFlags::TYPE_1 {
            None
        } else {
            Some(Image::color_target(context, extent, swapchain.format().format, samples)?)
        };
        let depth = Image::depth_target(context, extent, samples)?;

        let framebuffers = framebuffer_plan(color.as_ref().map(Image::view), depth.view(), swapchain.image_views())
            .iter()
            .map(|attachments| Framebuffer::new(context.raw_device(), render_pass.handle(), attachments, extent))
            .collect::<VulkanResult<Vec<_>>>()?;

        Ok((color, depth, framebuffers))
    }

    /// Rebuild the swapchain and everything derived from it
    ///
    /// Waits for the device to go idle and, while the window is minimized,
    /// for a nonzero framebuffer size.
    pub fn recreate(
        &mut self,
        context: &VulkanContext,
        render_pass: &RenderPass,
        window: &mut dyn FramebufferSource,
    ) -> VulkanResult<()> {
        context.wait_idle()?;
        self.framebuffers.clear();
        self.color = None;

        let extent = wait_for_nonzero_extent(window);
        let swapchain = Swapchain::new(context, extent, self.swapchain.handle())?;

        let (old, new) = (self.swapchain.format(), swapchain.format());
        if old.format != new.format || old.color_space != new.color_space {
            return Err(VulkanError::Logic(format!(
                "Surface format changed from {:?} to {:?} across a swapchain rebuild",
                old.format, new.format
            )));
        }

        self.swapchain = swapchain;
        let (color, depth, framebuffers) = Self::build_targets(context, &self.swapchain, render_pass)?;
        self.color = color;
        self.depth = depth;
        self.framebuffers = framebuffers;
        self.generation += 1;

        log::info!(
            "Swapchain recreated: {}x{}, {} images, generation {}",
            self.swapchain.extent().width,
            self.swapchain.extent().height,
            self.swapchain.image_count(),
            self.generation
        );
        Ok(())
    }

    /// Swapchain handle
    pub const fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain.handle()
    }

    /// Current extent
    pub const fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    /// Surface format
    pub const fn format(&self) -> vk::SurfaceFormatKHR {
        self.swapchain.format()
    }

    /// Recreate counter
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Framebuffer for a swapchain image
    pub fn framebuffer(&self, image_index: u32) -> VulkanResult<vk::Framebuffer> {
        self.framebuffers
            .get(image_index as usize)
            .map(Framebuffer::handle)
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: format!("No framebuffer for swapchain image {image_index}"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::vulkan::state::swapchain::{choose_extent, choose_image_count};
    use ash::vk::Handle;

    struct MinimizedWindow {
        sizes: Vec<(u32, u32)>,
        waits: usize,
    }

    impl FramebufferSource for MinimizedWindow {
        fn framebuffer_size(&self) -> (u32, u32) {
            self.sizes[self.waits.min(self.sizes.len() - 1)]
        }

        fn take_resized(&mut self) -> bool {
            false
        }

        fn wait_events(&mut self) {
            self.waits += 1;
        }
    }

    #[test]
    fn test_waits_while_minimized() {
        let mut window = MinimizedWindow {
            sizes: vec![(0, 0), (800, 0), (800, 600)],
            waits: 0,
        };
        let extent = wait_for_nonzero_extent(&mut window);
        assert_eq!((extent.width, extent.height), (800, 600));
        assert_eq!(window.waits, 2);
    }

    #[test]
    fn test_no_wait_when_visible() {
        let mut window = MinimizedWindow {
            sizes: vec![(1280, 720)],
            waits: 0,
        };
        wait_for_nonzero_extent(&mut window);
        assert_eq!(window.waits, 0);
    }

    #[test]
    fn test_attachment_order() {
        let color = vk::ImageView::from_raw(1);
        let depth = vk::ImageView::from_raw(2);
        let present = vk::ImageView::from_raw(3);

        assert_eq!(framebuffer_attachments(Some(color), depth, present), vec![color, depth, present]);
        assert_eq!(framebuffer_attachments(None, depth, present), vec![present, depth]);
    }

    #[test]
    fn test_resize_sequence_yields_one_framebuffer_per_image() {
        let caps = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            current_extent: vk::Extent2D { width: u32::MAX, height: u32::MAX },
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D { width: 4096, height: 4096 },
            ..Default::default()
        };
        let image_count = choose_image_count(&caps) as usize;
        let present: Vec<vk::ImageView> = (0..image_count as u64).map(|i| vk::ImageView::from_raw(10 + i)).collect();
        let depth = vk::ImageView::from_raw(2);

        let resizes = [
            vec![(1280, 720)],
            vec![(640, 480)],
            vec![(0, 0), (0, 0), (1024, 768)],
            vec![(1920, 1080)],
        ];
        for sizes in resizes {
            let expected = *sizes.last().unwrap();
            let mut window = MinimizedWindow { sizes, waits: 0 };

            let extent = choose_extent(&caps, wait_for_nonzero_extent(&mut window));
            assert_eq!((extent.width, extent.height), expected);

            for color in [None, Some(vk::ImageView::from_raw(1))] {
                let plan = framebuffer_plan(color, depth, &present);
                assert_eq!(plan.len(), image_count);
                for (attachments, view) in plan.iter().zip(&present) {
                    assert_eq!(attachments, &framebuffer_attachments(color, depth, *view));
                }
            }
        }
    }
}
