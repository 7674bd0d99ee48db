//! Fall Detection
//!
//! Per-camera fall analysis from body keypoints:
//! - Movement between consecutive skeletons
//! - Lying posture from torso angle and floor proximity
//! - Stillness confirmation, cancellable countdown, one-shot alert
//! - Post-alert cooldown

pub mod config;
pub mod detector;
pub mod keypoints;
pub mod machine;
pub mod motion;
pub mod posture;
pub mod state;

pub use config::DetectionSettings;
pub use detector::{HttpPoseEstimator, NoDetector, ObjectDetector, PoseEstimator, PoseServerConfig};
pub use keypoints::{Keypoint, KeypointName, KeypointSet};
pub use machine::{advance, AlertEvent, SlotEffect, SlotInput, SlotMachine, Tick};
pub use motion::movement;
pub use posture::{is_lying, Detection, ObjectClass, PostureClassifier, PostureVerdict};
pub use state::{Countdown, Phase, SlotActivity, SlotState, SlotStatus};

use camera_capture::CameraError;
use thiserror::Error;

/// Camera slot identifier
pub type SlotId = u32;

/// Fall detection error types
#[derive(Error, Debug)]
pub enum FallError {
    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Invalid pose server reply: {0}")]
    Decode(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Frame error: {0}")]
    Frame(#[from] CameraError),
}
