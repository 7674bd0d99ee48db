//! IP camera snapshot source

use crate::{CameraConfig, CameraError, FrameSource, VideoFrame};
use reqwest::Client;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::{debug, info};

/// Pulls one JPEG per frame from a camera's snapshot endpoint
pub struct HttpSnapshotCamera {
    client: Client,
    url: String,
    username: Option<String>,
    password: Option<String>,
    sequence: AtomicU32,
}

impl HttpSnapshotCamera {
    pub fn new(config: &CameraConfig) -> Result<Self, CameraError> {
        let url = config
            .snapshot_url
            .clone()
            .ok_or_else(|| CameraError::Open("no snapshot URL configured".to_string()))?;

        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| CameraError::Open(e.to_string()))?;

        info!("Opening snapshot camera at {}", url);

        Ok(Self {
            client,
            url,
            username: config.username.clone(),
            password: config.password.clone(),
            sequence: AtomicU32::new(0),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl FrameSource for HttpSnapshotCamera {
    async fn next_frame(&self) -> Result<VideoFrame, CameraError> {
        let mut request = self.client.get(&self.url);
        if let Some(user) = &self.username {
            request = request.basic_auth(user, self.password.as_ref());
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                CameraError::Timeout
            } else {
                CameraError::Stream(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            return Err(CameraError::Stream(format!(
                "snapshot request returned {}",
                response.status()
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| CameraError::Stream(e.to_string()))?;

        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        debug!("Snapshot {} ({} bytes)", sequence, body.len());
        VideoFrame::from_jpeg(&body, sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_snapshot_url() {
        let config = CameraConfig::default();
        assert!(matches!(
            HttpSnapshotCamera::new(&config),
            Err(CameraError::Open(_))
        ));
    }

    #[test]
    fn test_keeps_url() {
        let config = CameraConfig {
            snapshot_url: Some("http://127.0.0.1:9/snapshot.jpg".to_string()),
            ..Default::default()
        };
        let camera = HttpSnapshotCamera::new(&config).unwrap();
        assert_eq!(camera.url(), "http://127.0.0.1:9/snapshot.jpg");
    }
}
