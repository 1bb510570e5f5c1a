//! Frame slot bookkeeping
//!
//! Tracks the state of every slot independently of the GPU objects behind
//! it. A slot cycles `Idle -> Recording -> Submitted -> Idle`; leaving
//! `Submitted` requires the slot's fence wait. The current index advances
//! only after a successful submit.

use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// Lifecycle state of one frame slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Fence signaled, command buffer free
    Idle,
    /// Command buffer being recorded
    Recording,
    /// Work submitted, fence unsignaled until the GPU finishes
    Submitted,
}

/// Round-robin cursor over a fixed number of frame slots
#[derive(Debug, Clone)]
pub struct FrameCursor {
    states: Vec<SlotState>,
    current: usize,
}

impl FrameCursor {
    /// Create a cursor over `frame_count` slots, all idle
    pub fn new(frame_count: usize) -> Self {
        Self {
            states: vec![SlotState::Idle; frame_count.max(1)],
            current: 0,
        }
    }

    /// Number of slots; fixed for the cursor's lifetime
    pub fn frame_count(&self) -> usize {
        self.states.len()
    }

    /// Slot the next frame will use
    pub const fn current(&self) -> usize {
        self.current
    }

    /// State of `slot`
    pub fn state(&self, slot: usize) -> SlotState {
        self.states[slot % self.states.len()]
    }

    /// Whether the current slot's fence has to be waited before reuse
    pub fn needs_wait(&self) -> bool {
        self.states[self.current] == SlotState::Submitted
    }

    /// Record that the current slot's fence was waited
    pub fn mark_waited(&mut self) {
        if self.states[self.current] == SlotState::Submitted {
            self.states[self.current] = SlotState::Idle;
        }
    }

    /// Move the current slot into recording
    pub fn begin_recording(&mut self) -> VulkanResult<usize> {
        match self.states[self.current] {
            SlotState::Idle => {
                self.states[self.current] = SlotState::Recording;
                Ok(self.current)
            }
            state => Err(VulkanError::InvalidOperation {
                reason: format!("Frame slot {} cannot start recording while {:?}", self.current, state),
            }),
        }
    }

    /// Mark the current slot submitted and advance to the next one
    pub fn mark_submitted(&mut self) -> VulkanResult<usize> {
        let slot = self.current;
        if self.states[slot] != SlotState::Recording {
            return Err(VulkanError::InvalidOperation {
                reason: format!("Frame slot {slot} submitted without recording"),
            });
        }
        self.states[slot] = SlotState::Submitted;
        self.current = (slot + 1) % self.states.len();
        Ok(slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots_rotate_only_on_submit() {
        let mut cursor = FrameCursor::new(2);
        assert_eq!(cursor.frame_count(), 2);
        assert!(!cursor.needs_wait());

        assert_eq!(cursor.begin_recording().unwrap(), 0);
        assert_eq!(cursor.current(), 0);
        assert_eq!(cursor.mark_submitted().unwrap(), 0);
        assert_eq!(cursor.current(), 1);
        assert_eq!(cursor.state(0), SlotState::Submitted);

        cursor.begin_recording().unwrap();
        cursor.mark_submitted().unwrap();
        assert_eq!(cursor.current(), 0);
        assert!(cursor.needs_wait());

        cursor.mark_waited();
        assert_eq!(cursor.state(0), SlotState::Idle);
        assert!(!cursor.needs_wait());
    }

    #[test]
    fn test_submitted_slot_cannot_record_before_wait() {
        let mut cursor = FrameCursor::new(1);
        cursor.begin_recording().unwrap();
        cursor.mark_submitted().unwrap();

        assert!(matches!(cursor.begin_recording(), Err(VulkanError::InvalidOperation { .. })));
        cursor.mark_waited();
        assert!(cursor.begin_recording().is_ok());
    }

    #[test]
    fn test_submit_requires_recording() {
        let mut cursor = FrameCursor::new(3);
        assert!(cursor.mark_submitted().is_err());
        assert_eq!(cursor.current(), 0);
    }

    #[test]
    fn test_zero_frames_is_clamped() {
        assert_eq!(FrameCursor::new(0).frame_count(), 1);
    }
}
