//! Diagnostic overlay hook
//!
//! Recorded at the end of the main pass with a snapshot of frame stats.

use crate::render::backends::vulkan::{CommandRecorder, VulkanResult};

/// Numbers describing the frame being recorded
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameStats {
    /// Frames submitted before this one
    pub frame_number: u64,
    /// Last frame duration in milliseconds
    pub frame_time_ms: f32,
    /// Averaged frames per second
    pub fps: f32,
    /// Swapchain recreate counter
    pub swapchain_generation: u64,
    /// Descriptor pool resizes across all pipelines
    pub pool_resizes: u32,
    /// Draw calls recorded before the overlay
    pub draw_calls: u32,
}

/// Something drawn or reported on top of the scene each frame
pub trait DiagnosticOverlay {
    /// Record into the main pass; `recorder` is inside the pass
    fn record(&mut self, recorder: &mut CommandRecorder, stats: &FrameStats) -> VulkanResult<()>;
}

/// Overlay that does nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NullOverlay;

impl DiagnosticOverlay for NullOverlay {
    fn record(&mut self, _recorder: &mut CommandRecorder, _stats: &FrameStats) -> VulkanResult<()> {
        Ok(())
    }
}

/// Overlay that logs stats every `interval` frames
#[derive(Debug, Clone, Copy)]
pub struct StatsLogOverlay {
    interval: u64,
}

impl StatsLogOverlay {
    /// Log once every `interval` frames (at least 1)
    pub fn new(interval: u64) -> Self {
        Self {
            interval: interval.max(1),
        }
    }

    /// Whether `frame_number` is a reporting frame
    pub const fn should_report(&self, frame_number: u64) -> bool {
        frame_number % self.interval == 0
    }
}

impl Default for StatsLogOverlay {
    fn default() -> Self {
        Self::new(300)
    }
}

impl DiagnosticOverlay for StatsLogOverlay {
    fn record(&mut self, _recorder: &mut CommandRecorder, stats: &FrameStats) -> VulkanResult<()> {
        if self.should_report(stats.frame_number) {
            log::info!(
                "frame {}: {:.2} ms ({:.1} fps), {} draws, swapchain gen {}, {} pool resizes",
                stats.frame_number,
                stats.frame_time_ms,
                stats.fps,
                stats.draw_calls,
                stats.swapchain_generation,
                stats.pool_resizes
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_interval() {
        let overlay = StatsLogOverlay::new(60);
        assert!(overlay.should_report(0));
        assert!(!overlay.should_report(59));
        assert!(overlay.should_report(120));

        let every = StatsLogOverlay::new(0);
        assert!(every.should_report(7));
    }
}
