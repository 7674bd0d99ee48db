//! Frame source abstraction and bounded clip recording

use crate::{CameraError, VideoFrame};
use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// MIME type of recorded clips (concatenated JPEG frames)
pub const MJPEG_CONTENT_TYPE: &str = "video/x-motion-jpeg";

/// JPEG quality used for clip frames
const CLIP_JPEG_QUALITY: u8 = 70;

/// Upper bounds applied to clip requests
pub const MAX_CLIP_DURATION: Duration = Duration::from_secs(300);
pub const MAX_CLIP_FPS: u32 = 30;
pub const MAX_CLIP_FRAMES: usize = 3000;

/// Bounded-duration clip recorded after an alert
#[derive(Debug, Clone)]
pub struct VideoClip {
    /// MJPEG byte stream
    pub data: Vec<u8>,
    /// Number of frames in the stream
    pub frames: usize,
    /// Wall time covered by the recording
    pub duration: Duration,
}

impl VideoClip {
    pub fn content_type(&self) -> &'static str {
        MJPEG_CONTENT_TYPE
    }

    pub fn is_empty(&self) -> bool {
        self.frames == 0
    }
}

/// Fixed-capacity buffer of encoded frames; the oldest frame is dropped when full
#[derive(Debug)]
pub struct ClipBuffer {
    frames: VecDeque<Vec<u8>>,
    capacity: usize,
    dropped: usize,
}

impl ClipBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            frames: VecDeque::with_capacity(capacity.min(MAX_CLIP_FRAMES)),
            capacity,
            dropped: 0,
        }
    }

    pub fn push(&mut self, jpeg: Vec<u8>) {
        if self.frames.len() >= self.capacity {
            self.frames.pop_front();
            self.dropped += 1;
        }
        self.frames.push_back(jpeg);
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Frames evicted because the buffer was full
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Concatenate the buffered frames into an MJPEG stream
    pub fn into_clip(self, duration: Duration) -> VideoClip {
        let frames = self.frames.len();
        let mut data = Vec::with_capacity(self.frames.iter().map(Vec::len).sum());
        for jpeg in self.frames {
            data.extend_from_slice(&jpeg);
        }
        VideoClip {
            data,
            frames,
            duration,
        }
    }
}

/// Supplier of frames for one camera
pub trait FrameSource: Send + Sync + 'static {
    /// Fetch the current frame
    fn next_frame(&self) -> impl Future<Output = Result<VideoFrame, CameraError>> + Send;

    /// Record a best-effort clip of `duration` at `fps`.
    ///
    /// Duration, rate and frame count are clamped to `MAX_CLIP_DURATION`,
    /// `MAX_CLIP_FPS` and `MAX_CLIP_FRAMES`. Individual frame failures are
    /// skipped; the call only fails when no frame at all could be captured.
    fn record_clip(
        &self,
        duration: Duration,
        fps: u32,
    ) -> impl Future<Output = Result<VideoClip, CameraError>> + Send {
        async move {
            let fps = fps.clamp(1, MAX_CLIP_FPS);
            let duration = duration.min(MAX_CLIP_DURATION);
            let max_frames = ((duration.as_secs_f64() * f64::from(fps)).ceil() as usize)
                .clamp(1, MAX_CLIP_FRAMES);
            let mut buffer = ClipBuffer::new(max_frames);
            let mut failures = 0usize;

            let mut ticker = tokio::time::interval(Duration::from_secs_f64(1.0 / f64::from(fps)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            let started = Instant::now();
            let deadline = started + duration;

            for _ in 0..max_frames {
                ticker.tick().await;
                if Instant::now() >= deadline {
                    break;
                }

                let encoded = match self.next_frame().await {
                    Ok(frame) => frame.to_jpeg(CLIP_JPEG_QUALITY),
                    Err(e) => Err(e),
                };

                match encoded {
                    Ok(jpeg) => buffer.push(jpeg),
                    Err(e) => {
                        failures += 1;
                        debug!("Clip frame skipped: {}", e);
                    }
                }
            }

            if buffer.is_empty() {
                return Err(CameraError::Stream(format!(
                    "no frame captured for clip ({} failures)",
                    failures
                )));
            }
            if failures > 0 {
                warn!("Clip recorded with {} missing frames", failures);
            }

            Ok(buffer.into_clip(started.elapsed()))
        }
    }
}
