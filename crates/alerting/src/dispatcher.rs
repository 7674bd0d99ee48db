//! Alert dispatch to the alert receiver

use crate::evidence::{Evidence, EvidenceCapture};
use crate::AlertError;
use camera_capture::{FrameSource, VideoFrame};
use fall_detection::AlertEvent;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{error, info, warn};

/// Dispatcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Alert receiver endpoint
    pub endpoint: String,
    /// Request timeout (milliseconds); covers the clip upload
    pub timeout_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:3000/api/alert".to_string(),
            timeout_ms: 30_000,
        }
    }
}

/// Receiver reply
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchOutcome {
    pub status: u16,
    pub body: String,
}

/// Delivers captured evidence somewhere
pub trait AlertDispatcher: Send + Sync + 'static {
    fn dispatch(
        &self,
        evidence: Evidence,
    ) -> impl Future<Output = Result<DispatchOutcome, AlertError>> + Send;
}

/// Multipart POST to the alert receiver
pub struct HttpAlertDispatcher {
    client: Client,
    config: DispatchConfig,
}

impl HttpAlertDispatcher {
    pub fn new(config: DispatchConfig) -> Result<Self, AlertError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| AlertError::Config(e.to_string()))?;

        Ok(Self { client, config })
    }

    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }
}

fn build_form(evidence: Evidence) -> Result<Form, AlertError> {
    let mut form = Form::new()
        .text("slot", evidence.slot_id.to_string())
        .text("timestamp", evidence.timestamp.to_rfc3339())
        .text("alert_id", evidence.alert_id.to_string());

    if let Some(jpeg) = evidence.snapshot {
        let part = Part::bytes(jpeg)
            .file_name("snapshot.jpg")
            .mime_str("image/jpeg")
            .map_err(|e| AlertError::InvalidEvidence(e.to_string()))?;
        form = form.part("snapshot", part);
    }

    if let Some(clip) = evidence.clip {
        let content_type = clip.content_type();
        let part = Part::bytes(clip.data)
            .file_name("capture.mjpeg")
            .mime_str(content_type)
            .map_err(|e| AlertError::InvalidEvidence(e.to_string()))?;
        form = form.part("video", part);
    }

    Ok(form)
}

impl AlertDispatcher for HttpAlertDispatcher {
    async fn dispatch(&self, evidence: Evidence) -> Result<DispatchOutcome, AlertError> {
        let form = build_form(evidence)?;

        let response = self
            .client
            .post(&self.config.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| AlertError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| AlertError::Transport(e.to_string()))?;

        if !(200..300).contains(&status) {
            return Err(AlertError::Rejected { status, body });
        }

        Ok(DispatchOutcome { status, body })
    }
}

/// How an alert's delivery ended
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryOutcome {
    Dispatched(DispatchOutcome),
    Failed(String),
    /// Nothing was captured, so nothing was sent
    Skipped,
}

/// Capture evidence for `event`, then hand it to the dispatcher.
/// Failures are logged and counted; nothing is retried.
pub async fn capture_and_dispatch<F, A>(
    capture: &EvidenceCapture<F>,
    dispatcher: &A,
    event: &AlertEvent,
    current: Option<VideoFrame>,
) -> DeliveryOutcome
where
    F: FrameSource,
    A: AlertDispatcher,
{
    let evidence = capture.capture(event, current).await;
    if evidence.is_empty() {
        warn!("Slot {}: no evidence captured, alert {} not sent", event.slot_id, event.id);
        metrics::counter!("fallwatch_dispatch_failures_total", "slot" => event.slot_id.to_string())
            .increment(1);
        return DeliveryOutcome::Skipped;
    }

    match dispatcher.dispatch(evidence).await {
        Ok(outcome) => {
            info!(
                "Slot {}: alert {} delivered ({})",
                event.slot_id, event.id, outcome.status
            );
            DeliveryOutcome::Dispatched(outcome)
        }
        Err(e) => {
            error!("Slot {}: alert {} dispatch failed: {}", event.slot_id, event.id, e);
            metrics::counter!("fallwatch_dispatch_failures_total", "slot" => event.slot_id.to_string())
                .increment(1);
            DeliveryOutcome::Failed(e.to_string())
        }
    }
}
