//! Per-frame loop
//!
//! [`FrameDriver`] owns the slot cursor and decides when to wait, skip and
//! recreate. The GPU work sits behind [`FrameTimeline`], so the control flow
//! runs unchanged against a mock in tests.

use crate::render::backends::vulkan::state::frame_slots::FrameCursor;
use crate::render::backends::vulkan::{AcquireOutcome, PresentOutcome, VulkanResult};

/// GPU side of one frame
pub trait FrameTimeline {
    /// Block until the slot's previous submission finished
    fn wait_for_slot(&mut self, slot: usize) -> VulkanResult<()>;

    /// Acquire the next swapchain image for the slot
    fn acquire_image(&mut self, slot: usize) -> VulkanResult<AcquireOutcome>;

    /// Record the slot's command buffer for the acquired image
    fn record_frame(&mut self, slot: usize, image_index: u32) -> VulkanResult<()>;

    /// Submit the slot's command buffer
    fn submit(&mut self, slot: usize) -> VulkanResult<()>;

    /// Present the image rendered by the slot
    fn present(&mut self, slot: usize, image_index: u32) -> VulkanResult<PresentOutcome>;

    /// Rebuild the swapchain and its dependents
    fn recreate_swapchain(&mut self) -> VulkanResult<()>;
}

/// What happened during one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// A frame was submitted and presented
    Presented {
        /// Frame slot used
        slot: usize,
        /// Swapchain image presented
        image_index: u32,
    },
    /// The swapchain was stale; nothing was drawn
    Skipped,
}

/// Frame slot cursor plus loop counters
#[derive(Debug, Clone)]
pub struct FrameDriver {
    cursor: FrameCursor,
    frame_number: u64,
    recreations: u64,
}

impl FrameDriver {
    /// Driver over `frame_count` slots
    pub fn new(frame_count: usize) -> Self {
        Self {
            cursor: FrameCursor::new(frame_count),
            frame_number: 0,
            recreations: 0,
        }
    }

    /// Run one frame
    ///
    /// Order: wait slot, acquire, record, submit, present. A stale acquire
    /// recreates and skips. A stale present, a suboptimal acquire or a
    /// window resize recreates once after presenting.
    pub fn tick<T: FrameTimeline + ?Sized>(&mut self, timeline: &mut T, resized: bool) -> VulkanResult<FrameOutcome> {
        let slot = self.cursor.current();
        if self.cursor.needs_wait() {
            timeline.wait_for_slot(slot)?;
            self.cursor.mark_waited();
        }

        let (image_index, suboptimal) = match timeline.acquire_image(slot)? {
            AcquireOutcome::Acquired { image_index, suboptimal } => (image_index, suboptimal),
            AcquireOutcome::Stale => {
                log::warn!("Swapchain out of date at acquire, skipping frame {}", self.frame_number);
                self.recreate(timeline)?;
                return Ok(FrameOutcome::Skipped);
            }
        };

        self.cursor.begin_recording()?;
        timeline.record_frame(slot, image_index)?;
        timeline.submit(slot)?;
        self.cursor.mark_submitted()?;
        self.frame_number += 1;

        let presented = timeline.present(slot, image_index)?;
        if presented == PresentOutcome::Stale || suboptimal || resized {
            log::debug!(
                "Recreating swapchain after present (stale: {}, suboptimal: {}, resized: {})",
                presented == PresentOutcome::Stale,
                suboptimal,
                resized
            );
            self.recreate(timeline)?;
        }

        Ok(FrameOutcome::Presented { slot, image_index })
    }

    fn recreate<T: FrameTimeline + ?Sized>(&mut self, timeline: &mut T) -> VulkanResult<()> {
        timeline.recreate_swapchain()?;
        self.recreations += 1;
        Ok(())
    }

    /// Frames submitted so far
    pub const fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Swapchain recreations triggered by the loop
    pub const fn recreations(&self) -> u64 {
        self.recreations
    }

    /// Slot the next frame will use
    pub const fn current_slot(&self) -> usize {
        self.cursor.current()
    }

    /// Number of frame slots
    pub fn frame_count(&self) -> usize {
        self.cursor.frame_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::vulkan::VulkanError;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Event {
        Wait(usize),
        Acquire(usize),
        Record(usize),
        Submit(usize),
        Present(usize),
        Recreate,
    }

    #[derive(Default)]
    struct MockTimeline {
        events: Vec<Event>,
        acquires: usize,
        stale_acquire_on: Option<usize>,
        stale_present_on: Option<usize>,
        suboptimal_on: Option<usize>,
        images: u32,
        next_image: u32,
    }

    impl MockTimeline {
        fn new() -> Self {
            Self {
                images: 3,
                ..Self::default()
            }
        }

        fn count(&self, event: Event) -> usize {
            self.events.iter().filter(|e| **e == event).count()
        }

        fn submitted_slots(&self) -> Vec<usize> {
            self.events
                .iter()
                .filter_map(|e| match e {
                    Event::Submit(slot) => Some(*slot),
                    _ => None,
                })
                .collect()
        }
    }

    impl FrameTimeline for MockTimeline {
        fn wait_for_slot(&mut self, slot: usize) -> VulkanResult<()> {
            self.events.push(Event::Wait(slot));
            Ok(())
        }

        fn acquire_image(&mut self, slot: usize) -> VulkanResult<AcquireOutcome> {
            self.acquires += 1;
            self.events.push(Event::Acquire(slot));
            if self.stale_acquire_on == Some(self.acquires) {
                return Ok(AcquireOutcome::Stale);
            }
            let image_index = self.next_image;
            self.next_image = (self.next_image + 1) % self.images;
            Ok(AcquireOutcome::Acquired {
                image_index,
                suboptimal: self.suboptimal_on == Some(self.acquires),
            })
        }

        fn record_frame(&mut self, slot: usize, _image_index: u32) -> VulkanResult<()> {
            self.events.push(Event::Record(slot));
            Ok(())
        }

        fn submit(&mut self, slot: usize) -> VulkanResult<()> {
            self.events.push(Event::Submit(slot));
            Ok(())
        }

        fn present(&mut self, slot: usize, _image_index: u32) -> VulkanResult<PresentOutcome> {
            self.events.push(Event::Present(slot));
            if self.stale_present_on == Some(self.acquires) {
                Ok(PresentOutcome::Stale)
            } else {
                Ok(PresentOutcome::Presented)
            }
        }

        fn recreate_swapchain(&mut self) -> VulkanResult<()> {
            self.events.push(Event::Recreate);
            Ok(())
        }
    }

    #[test]
    fn test_stale_acquire_skips_and_recreates_once() {
        let mut driver = FrameDriver::new(2);
        let mut timeline = MockTimeline::new();
        timeline.stale_acquire_on = Some(5);

        let outcomes: Vec<FrameOutcome> = (0..8).map(|_| driver.tick(&mut timeline, false).unwrap()).collect();

        assert_eq!(outcomes[4], FrameOutcome::Skipped);
        assert!(outcomes.iter().enumerate().all(|(i, o)| i == 4 || *o != FrameOutcome::Skipped));
        assert_eq!(timeline.count(Event::Recreate), 1);
        assert_eq!(driver.recreations(), 1);

        // The skipped tick did not consume a slot.
        assert_eq!(timeline.submitted_slots(), vec![0, 1, 0, 1, 0, 1, 0]);
        assert_eq!(outcomes[5], FrameOutcome::Presented { slot: 0, image_index: 1 });
        assert_eq!(driver.frame_number(), 7);
    }

    #[test]
    fn test_fence_waited_once_per_submission() {
        let mut driver = FrameDriver::new(2);
        let mut timeline = MockTimeline::new();
        timeline.stale_acquire_on = Some(3);
        timeline.stale_present_on = Some(6);

        for _ in 0..10 {
            driver.tick(&mut timeline, false).unwrap();
        }

        // Between two submits on a slot there is exactly one wait on it, and
        // no slot is ever waited without a preceding submit.
        for slot in 0..2 {
            let mut outstanding = false;
            for event in &timeline.events {
                match *event {
                    Event::Submit(s) if s == slot => {
                        assert!(!outstanding, "slot {slot} resubmitted without a wait");
                        outstanding = true;
                    }
                    Event::Wait(s) if s == slot => {
                        assert!(outstanding, "slot {slot} waited twice");
                        outstanding = false;
                    }
                    _ => {}
                }
            }
        }
    }

    #[test]
    fn test_recreate_after_present_triggers() {
        let mut driver = FrameDriver::new(2);
        let mut timeline = MockTimeline::new();
        timeline.suboptimal_on = Some(1);
        timeline.stale_present_on = Some(2);

        assert!(matches!(driver.tick(&mut timeline, false).unwrap(), FrameOutcome::Presented { .. }));
        assert!(matches!(driver.tick(&mut timeline, false).unwrap(), FrameOutcome::Presented { .. }));
        assert!(matches!(driver.tick(&mut timeline, true).unwrap(), FrameOutcome::Presented { .. }));
        driver.tick(&mut timeline, false).unwrap();

        assert_eq!(timeline.count(Event::Recreate), 3);

        // Recreation always follows the present of the same tick.
        let first_recreate = timeline.events.iter().position(|e| *e == Event::Recreate).unwrap();
        assert_eq!(timeline.events[first_recreate - 1], Event::Present(0));
    }

    #[test]
    fn test_errors_propagate() {
        struct Lost;
        impl FrameTimeline for Lost {
            fn wait_for_slot(&mut self, _: usize) -> VulkanResult<()> {
                Err(VulkanError::DeviceLost)
            }
            fn acquire_image(&mut self, _: usize) -> VulkanResult<AcquireOutcome> {
                Ok(AcquireOutcome::Acquired { image_index: 0, suboptimal: false })
            }
            fn record_frame(&mut self, _: usize, _: u32) -> VulkanResult<()> {
                Ok(())
            }
            fn submit(&mut self, _: usize) -> VulkanResult<()> {
                Ok(())
            }
            fn present(&mut self, _: usize, _: u32) -> VulkanResult<PresentOutcome> {
                Ok(PresentOutcome::Presented)
            }
            fn recreate_swapchain(&mut self) -> VulkanResult<()> {
                Ok(())
            }
        }

        let mut driver = FrameDriver::new(1);
        // First tick never waits; the second reuses slot 0.
        driver.tick(&mut Lost, false).unwrap();
        assert!(matches!(driver.tick(&mut Lost, false), Err(VulkanError::DeviceLost)));
    }
}
