//! Per-slot source selection

use crate::{CameraConfig, CameraError, FrameSource, HttpSnapshotCamera, TestPatternSource, VideoFrame};
use tracing::warn;

/// Frame source configured for a slot
pub enum CameraSource {
    Http(HttpSnapshotCamera),
    TestPattern(TestPatternSource),
}

impl CameraSource {
    /// Snapshot camera when a URL is configured, test pattern otherwise
    pub fn from_config(config: &CameraConfig) -> Result<Self, CameraError> {
        match config.snapshot_url {
            Some(_) => Ok(CameraSource::Http(HttpSnapshotCamera::new(config)?)),
            None => {
                warn!(
                    "No snapshot URL configured, serving a {}x{} test pattern",
                    config.width, config.height
                );
                Ok(CameraSource::TestPattern(TestPatternSource::new(
                    config.width,
                    config.height,
                )))
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            CameraSource::Http(_) => "http",
            CameraSource::TestPattern(_) => "test_pattern",
        }
    }
}

impl FrameSource for CameraSource {
    async fn next_frame(&self) -> Result<VideoFrame, CameraError> {
        match self {
            CameraSource::Http(camera) => camera.next_frame().await,
            CameraSource::TestPattern(pattern) => pattern.next_frame().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_falls_back_to_test_pattern() {
        let config = CameraConfig {
            width: 32,
            height: 24,
            ..Default::default()
        };
        let source = CameraSource::from_config(&config).unwrap();
        assert_eq!(source.kind(), "test_pattern");

        let frame = source.next_frame().await.unwrap();
        assert_eq!((frame.width, frame.height), (32, 24));
    }

    #[test]
    fn test_url_selects_http_camera() {
        let config = CameraConfig {
            snapshot_url: Some("http://127.0.0.1:9/snapshot.jpg".to_string()),
            ..Default::default()
        };
        assert_eq!(CameraSource::from_config(&config).unwrap().kind(), "http");
    }
}
