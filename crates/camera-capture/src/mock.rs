//! Test pattern frame source (no camera attached)

use crate::{CameraError, FrameSource, VideoFrame};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Serves uniform frames whose gray level cycles with the sequence number
pub struct TestPatternSource {
    width: u32,
    height: u32,
    sequence: AtomicU32,
    offline: AtomicBool,
}

impl TestPatternSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            sequence: AtomicU32::new(0),
            offline: AtomicBool::new(false),
        }
    }

    /// Simulate losing the camera
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Relaxed);
    }
}

impl FrameSource for TestPatternSource {
    async fn next_frame(&self) -> Result<VideoFrame, CameraError> {
        if self.offline.load(Ordering::Relaxed) {
            return Err(CameraError::Stream("test pattern offline".to_string()));
        }
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let level = (sequence % 64) as u8 * 4;
        VideoFrame::filled(self.width, self.height, level, sequence)
    }
}
