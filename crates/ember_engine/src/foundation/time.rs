//! Frame timing

use std::time::Instant;

/// Timer advanced once per presented frame
#[derive(Debug, Clone)]
pub struct FrameTimer {
    last_frame: Instant,
    delta_time: f32,
    total_time: f32,
    frame_count: u64,
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameTimer {
    /// Create a new timer
    pub fn new() -> Self {
        Self {
            last_frame: Instant::now(),
            delta_time: 0.0,
            total_time: 0.0,
            frame_count: 0,
        }
    }

    /// Advance to now
    pub fn tick(&mut self) {
        let now = Instant::now();
        self.advance(now.duration_since(self.last_frame).as_secs_f32());
        self.last_frame = now;
    }

    fn advance(&mut self, delta: f32) {
        self.delta_time = delta;
        self.total_time += delta;
        self.frame_count += 1;
    }

    /// Seconds between the last two ticks
    pub const fn delta_time(&self) -> f32 {
        self.delta_time
    }

    /// Ticks so far
    pub const fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// FPS from the last frame time
    pub fn current_fps(&self) -> f32 {
        if self.delta_time > 0.0 {
            1.0 / self.delta_time
        } else {
            0.0
        }
    }

    /// Average FPS since creation
    pub fn average_fps(&self) -> f32 {
        if self.total_time > 0.0 {
            self.frame_count as f32 / self.total_time
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_fps_from_fixed_deltas() {
        let mut timer = FrameTimer::new();
        assert_relative_eq!(timer.current_fps(), 0.0);

        timer.advance(0.02);
        timer.advance(0.01);
        assert_eq!(timer.frame_count(), 2);
        assert_relative_eq!(timer.current_fps(), 100.0, epsilon = 1e-3);
        assert_relative_eq!(timer.average_fps(), 2.0 / 0.03, epsilon = 1e-2);
    }
}
