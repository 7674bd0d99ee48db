//! Snapshot and clip capture for a raised alert

use camera_capture::{FrameSource, VideoClip, VideoFrame};
use chrono::{DateTime, Utc};
use fall_detection::{AlertEvent, SlotId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// Evidence capture configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Clip length recorded after the alert (seconds)
    pub clip_secs: u64,
    /// Clip frame rate
    pub clip_fps: u32,
    /// JPEG quality of the still image
    pub snapshot_quality: u8,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            clip_secs: 20,
            clip_fps: 10,
            snapshot_quality: 80,
        }
    }
}

/// Everything gathered for one alert
#[derive(Debug, Clone)]
pub struct Evidence {
    pub alert_id: Uuid,
    pub slot_id: SlotId,
    pub timestamp: DateTime<Utc>,
    /// JPEG still
    pub snapshot: Option<Vec<u8>>,
    /// MJPEG clip
    pub clip: Option<VideoClip>,
}

impl Evidence {
    /// No usable media at all
    pub fn is_empty(&self) -> bool {
        self.snapshot.is_none() && self.clip.is_none()
    }
}

/// Captures evidence from a slot's frame source
pub struct EvidenceCapture<F> {
    source: Arc<F>,
    config: CaptureConfig,
}

impl<F: FrameSource> EvidenceCapture<F> {
    pub fn new(source: Arc<F>, config: CaptureConfig) -> Self {
        Self { source, config }
    }

    /// Still image from `current` (or a fresh frame), then a bounded clip.
    /// Each part fails independently.
    pub async fn capture(&self, event: &AlertEvent, current: Option<VideoFrame>) -> Evidence {
        let frame = match current {
            Some(frame) => Ok(frame),
            None => self.source.next_frame().await,
        };

        let snapshot = match frame.and_then(|f| f.to_jpeg(self.config.snapshot_quality)) {
            Ok(jpeg) => Some(jpeg),
            Err(e) => {
                warn!("Slot {}: snapshot failed: {}", event.slot_id, e);
                None
            }
        };

        let duration = Duration::from_secs(self.config.clip_secs);
        let clip = match self.source.record_clip(duration, self.config.clip_fps).await {
            Ok(clip) => {
                info!(
                    "Slot {}: recorded {} frame clip ({} bytes)",
                    event.slot_id,
                    clip.frames,
                    clip.data.len()
                );
                Some(clip)
            }
            Err(e) => {
                warn!("Slot {}: clip recording failed: {}", event.slot_id, e);
                None
            }
        };

        Evidence {
            alert_id: event.id,
            slot_id: event.slot_id,
            timestamp: event.timestamp,
            snapshot,
            clip,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camera_capture::TestPatternSource;

    fn event() -> AlertEvent {
        AlertEvent {
            id: Uuid::new_v4(),
            slot_id: 2,
            timestamp: Utc::now(),
            last_keypoints: None,
        }
    }

    fn short_config() -> CaptureConfig {
        CaptureConfig {
            clip_secs: 1,
            clip_fps: 5,
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_and_clip() {
        let source = Arc::new(TestPatternSource::new(16, 16));
        let capture = EvidenceCapture::new(source, short_config());
        let event = event();

        let evidence = capture.capture(&event, None).await;
        assert_eq!(evidence.alert_id, event.id);
        assert_eq!(evidence.slot_id, 2);
        assert!(evidence.snapshot.is_some());
        assert!(evidence.clip.as_ref().is_some_and(|c| c.frames > 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_survives_lost_camera() {
        let source = Arc::new(TestPatternSource::new(16, 16));
        source.set_offline(true);
        let capture = EvidenceCapture::new(source, short_config());

        // the alerting frame is still in hand
        let frame = VideoFrame::filled(16, 16, 10, 0).unwrap();
        let evidence = capture.capture(&event(), Some(frame)).await;
        assert!(evidence.snapshot.is_some());
        assert!(evidence.clip.is_none());
        assert!(!evidence.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_nothing_captured() {
        let source = Arc::new(TestPatternSource::new(16, 16));
        source.set_offline(true);
        let capture = EvidenceCapture::new(source, short_config());

        let evidence = capture.capture(&event(), None).await;
        assert!(evidence.is_empty());
    }
}
