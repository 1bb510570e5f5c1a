//! Per-slot acquire, submit and present
//!
//! Owns one [`FrameSync`] per frame slot. Out-of-date or suboptimal
//! swapchains come back as `Stale` outcomes; only real failures are errors.

use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::prelude::VkResult;
use ash::{vk, Device};

use super::sync::FrameSync;
use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// Result of acquiring the next swapchain image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// An image is ready; `suboptimal` still allows drawing this frame
    Acquired {
        /// Swapchain image to render into
        image_index: u32,
        /// Surface no longer matches exactly; recreate after presenting
        suboptimal: bool,
    },
    /// Swapchain is out of date; nothing was acquired
    Stale,
}

/// Result of queueing a present
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    /// Presented against a matching swapchain
    Presented,
    /// Presented (or dropped) against an out-of-date or suboptimal swapchain
    Stale,
}

/// Map the raw acquire result onto an outcome
pub fn classify_acquire(result: VkResult<(u32, bool)>) -> VulkanResult<AcquireOutcome> {
    match result {
        Ok((image_index, suboptimal)) => Ok(AcquireOutcome::Acquired { image_index, suboptimal }),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::Stale),
        Err(e) => Err(VulkanError::from_vk(e)),
    }
}

/// Map the raw present result onto an outcome
pub fn classify_present(result: VkResult<bool>) -> VulkanResult<PresentOutcome> {
    match result {
        Ok(false) => Ok(PresentOutcome::Presented),
        Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR | vk::Result::SUBOPTIMAL_KHR) => Ok(PresentOutcome::Stale),
        Err(e) => Err(VulkanError::from_vk(e)),
    }
}

/// Synchronization objects for every frame slot
pub struct SyncManager {
    device: Device,
    frames: Vec<FrameSync>,
}

impl SyncManager {
    /// Create `frame_count` slots with signaled fences
    pub fn new(device: Device, frame_count: usize) -> VulkanResult<Self> {
        let frames = (0..frame_count)
            .map(|_| FrameSync::new(&device))
            .collect::<VulkanResult<Vec<_>>>()?;

        log::debug!("Created synchronization objects for {} frame slots", frame_count);
        Ok(Self { device, frames })
    }

    /// Number of frame slots
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    fn frame(&self, slot: usize) -> VulkanResult<&FrameSync> {
        self.frames.get(slot).ok_or_else(|| VulkanError::InvalidOperation {
            reason: format!("Frame slot {slot} out of range ({} slots)", self.frames.len()),
        })
    }

    /// Block until the slot's previous submission has finished
    pub fn wait_for_slot(&self, slot: usize) -> VulkanResult<()> {
        self.frame(slot)?.in_flight.wait(u64::MAX).map_err(|e| {
            log::error!("Waiting on frame slot {} failed: {}", slot, e);
            e
        })
    }

    /// Acquire the next image, signaling the slot's image-available semaphore
    pub fn acquire_image(
        &self,
        loader: &SwapchainLoader,
        swapchain: vk::SwapchainKHR,
        slot: usize,
    ) -> VulkanResult<AcquireOutcome> {
        let frame = self.frame(slot)?;
        let result = unsafe {
            loader.acquire_next_image(swapchain, u64::MAX, frame.image_available.handle(), vk::Fence::null())
        };
        classify_acquire(result)
    }

    /// Reset the slot fence and submit `command_buffer`
    pub fn submit(&self, queue: vk::Queue, slot: usize, command_buffer: vk::CommandBuffer) -> VulkanResult<()> {
        let frame = self.frame(slot)?;
        frame.in_flight.reset()?;

        let wait_semaphores = [frame.image_available.handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [frame.render_finished.handle()];
        let command_buffers = [command_buffer];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .build();

        unsafe {
            self.device
                .queue_submit(queue, &[submit_info], frame.in_flight.handle())
                .map_err(VulkanError::from_vk)
        }
    }

    /// Present `image_index`, waiting on the slot's render-finished semaphore
    pub fn present(
        &self,
        loader: &SwapchainLoader,
        queue: vk::Queue,
        swapchain: vk::SwapchainKHR,
        slot: usize,
        image_index: u32,
    ) -> VulkanResult<PresentOutcome> {
        let frame = self.frame(slot)?;
        let wait_semaphores = [frame.render_finished.handle()];
        let swapchains = [swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        classify_present(unsafe { loader.queue_present(queue, &present_info) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_classification() {
        assert_eq!(
            classify_acquire(Ok((2, false))).unwrap(),
            AcquireOutcome::Acquired { image_index: 2, suboptimal: false }
        );
        assert_eq!(
            classify_acquire(Ok((0, true))).unwrap(),
            AcquireOutcome::Acquired { image_index: 0, suboptimal: true }
        );
        assert_eq!(classify_acquire(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(), AcquireOutcome::Stale);
        assert!(matches!(
            classify_acquire(Err(vk::Result::ERROR_DEVICE_LOST)),
            Err(VulkanError::DeviceLost)
        ));
        assert!(matches!(
            classify_acquire(Err(vk::Result::ERROR_SURFACE_LOST_KHR)),
            Err(VulkanError::Api(vk::Result::ERROR_SURFACE_LOST_KHR))
        ));
    }

    #[test]
    fn test_present_classification() {
        assert_eq!(classify_present(Ok(false)).unwrap(), PresentOutcome::Presented);
        assert_eq!(classify_present(Ok(true)).unwrap(), PresentOutcome::Stale);
        assert_eq!(classify_present(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(), PresentOutcome::Stale);
        assert!(classify_present(Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY)).is_err());
    }
}
