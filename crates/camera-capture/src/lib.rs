//! Camera Capture Library for Fall Monitoring
//!
//! Provides the frame side of a monitored slot:
//! - RGB video frames with JPEG encode/decode
//! - `FrameSource` trait with bounded MJPEG clip recording
//! - IP camera snapshot source (HTTP)
//! - Test pattern source for development and tests
//! - `CameraSource` choosing between the two from configuration

pub mod frame;
pub mod http;
pub mod mock;
pub mod select;
pub mod source;

pub use frame::{VideoFrame, MAX_DIMENSION};
pub use http::HttpSnapshotCamera;
pub use mock::TestPatternSource;
pub use select::CameraSource;
pub use source::{FrameSource, VideoClip, MAX_CLIP_DURATION, MAX_CLIP_FPS, MJPEG_CONTENT_TYPE};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Camera error types
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Failed to open camera: {0}")]
    Open(String),

    #[error("Invalid format: {0}")]
    Format(String),

    #[error("Image encoding failed: {0}")]
    Encode(String),

    #[error("Streaming error: {0}")]
    Stream(String),

    #[error("Capture timeout")]
    Timeout,
}

impl From<image::ImageError> for CameraError {
    fn from(e: image::ImageError) -> Self {
        CameraError::Format(e.to_string())
    }
}

/// Camera configuration for one monitored slot
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// JPEG snapshot URL (e.g. "http://10.0.0.12/cgi-bin/snapshot.cgi").
    /// When unset a test pattern is served instead.
    pub snapshot_url: Option<String>,
    /// Basic auth user for the snapshot URL
    pub username: Option<String>,
    /// Basic auth password for the snapshot URL
    pub password: Option<String>,
    /// Expected width (test pattern size)
    pub width: u32,
    /// Expected height (test pattern size)
    pub height: u32,
    /// Per-request timeout (milliseconds)
    pub timeout_ms: u64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            snapshot_url: None,
            username: None,
            password: None,
            width: 640,
            height: 480,
            timeout_ms: 2000,
        }
    }
}
