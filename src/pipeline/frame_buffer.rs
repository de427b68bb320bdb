use std::sync::{Arc, Mutex};

use crate::types::DisplayFrame;

/// Single-slot holder for the most recently published display frame.
#[derive(Default)]
pub struct FrameBuffer {
    slot: Mutex<Option<Arc<DisplayFrame>>>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the held frame. The lock only covers the pointer swap.
    pub fn publish(&self, frame: Arc<DisplayFrame>) {
        let previous = match self.slot.lock() {
            Ok(mut slot) => slot.replace(frame),
            Err(poisoned) => poisoned.into_inner().replace(frame),
        };
        drop(previous);
    }

    pub fn latest(&self) -> Option<Arc<DisplayFrame>> {
        match self.slot.lock() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl std::fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("sequence", &self.latest().map(|frame| frame.sequence))
            .finish()
    }
}
