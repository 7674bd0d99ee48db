//! Pose estimator and object detector collaborators
//!
//! Models run outside this process. `HttpPoseEstimator` posts each frame as
//! JPEG to a pose inference server and reads back the keypoints.

use crate::keypoints::{Keypoint, KeypointName, KeypointSet};
use crate::posture::Detection;
use crate::FallError;
use camera_capture::VideoFrame;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info};

/// Produces at most one skeleton per frame
pub trait PoseEstimator: Send + Sync + 'static {
    fn estimate(
        &self,
        frame: &VideoFrame,
    ) -> impl Future<Output = Result<Option<KeypointSet>, FallError>> + Send;
}

/// Optional box detector used to veto posture verdicts
pub trait ObjectDetector: Send + Sync + 'static {
    fn detect(&self, frame: &VideoFrame) -> impl Future<Output = Result<Vec<Detection>, FallError>> + Send;
}

/// Detector for slots without one configured
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDetector;

impl ObjectDetector for NoDetector {
    async fn detect(&self, _frame: &VideoFrame) -> Result<Vec<Detection>, FallError> {
        Ok(Vec::new())
    }
}

/// Pose inference server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseServerConfig {
    /// Endpoint accepting `image/jpeg` bodies
    pub endpoint: String,
    /// Request timeout (milliseconds)
    pub timeout_ms: u64,
    /// JPEG quality of uploaded frames
    pub jpeg_quality: u8,
    /// Server returns coordinates in 0..1 instead of pixels
    pub normalized: bool,
}

impl Default for PoseServerConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:9000/pose".to_string(),
            timeout_ms: 1000,
            jpeg_quality: 80,
            normalized: false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawKeypoint {
    #[serde(default)]
    name: Option<KeypointName>,
    x: f32,
    y: f32,
    #[serde(alias = "confidence")]
    score: f32,
}

#[derive(Debug, Deserialize)]
struct PoseResponse {
    #[serde(default)]
    keypoints: Vec<RawKeypoint>,
}

/// Decode a pose server reply; an empty keypoint list means nobody was seen
pub(crate) fn decode_response(
    body: &[u8],
    width: f32,
    height: f32,
    normalized: bool,
) -> Result<Option<KeypointSet>, FallError> {
    let response: PoseResponse =
        serde_json::from_slice(body).map_err(|e| FallError::Decode(e.to_string()))?;

    if response.keypoints.is_empty() {
        return Ok(None);
    }

    let (sx, sy) = if normalized { (width, height) } else { (1.0, 1.0) };
    let points = response
        .keypoints
        .into_iter()
        .enumerate()
        .filter_map(|(i, raw)| {
            raw.name
                .or_else(|| KeypointName::from_index(i))
                .map(|name| Keypoint::new(name, raw.x * sx, raw.y * sy, raw.score))
        })
        .collect();

    Ok(Some(KeypointSet::new(points)))
}

/// Remote pose estimator (e.g. a MoveNet single-pose server)
pub struct HttpPoseEstimator {
    client: Client,
    config: PoseServerConfig,
}

impl HttpPoseEstimator {
    pub fn new(config: PoseServerConfig) -> Result<Self, FallError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| FallError::Config(e.to_string()))?;

        info!("Using pose server at {}", config.endpoint);
        Ok(Self { client, config })
    }
}

impl PoseEstimator for HttpPoseEstimator {
    async fn estimate(&self, frame: &VideoFrame) -> Result<Option<KeypointSet>, FallError> {
        let jpeg = frame.to_jpeg(self.config.jpeg_quality)?;

        let response = self
            .client
            .post(&self.config.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "image/jpeg")
            .body(jpeg)
            .send()
            .await
            .map_err(|e| FallError::Inference(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FallError::Inference(format!(
                "pose server returned {}",
                response.status()
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FallError::Inference(e.to_string()))?;

        let keypoints = decode_response(
            &body,
            frame.width as f32,
            frame.height as f32,
            self.config.normalized,
        )?;
        debug!(
            "Frame {}: {} keypoints",
            frame.sequence,
            keypoints.as_ref().map_or(0, KeypointSet::len)
        );
        Ok(keypoints)
    }
}
