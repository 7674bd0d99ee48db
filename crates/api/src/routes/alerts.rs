//! Alert Routes

use alerting::{AlertNotice, AlertRecord};
use axum::{
    extract::{Multipart, Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::store::MediaKey;
use crate::{ApiError, AppState};

/// Fields of an incoming alert upload
#[derive(Debug, Default)]
struct AlertUpload {
    slot: Option<String>,
    timestamp: Option<DateTime<Utc>>,
    alert_id: Option<Uuid>,
    snapshot: Option<Vec<u8>>,
    video: Option<Vec<u8>>,
}

async fn read_upload(mut multipart: Multipart) -> Result<AlertUpload, ApiError> {
    let mut upload = AlertUpload::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "slot" => {
                let text = field.text().await.map_err(|e| ApiError::BadRequest(e.to_string()))?;
                let text = text.trim();
                if !text.is_empty() {
                    upload.slot = Some(text.to_string());
                }
            }
            "timestamp" => {
                let text = field.text().await.map_err(|e| ApiError::BadRequest(e.to_string()))?;
                match DateTime::parse_from_rfc3339(text.trim()) {
                    Ok(ts) => upload.timestamp = Some(ts.with_timezone(&Utc)),
                    Err(e) => warn!("Ignoring unparsable alert timestamp {:?}: {}", text, e),
                }
            }
            "alert_id" => {
                let text = field.text().await.map_err(|e| ApiError::BadRequest(e.to_string()))?;
                upload.alert_id = Uuid::parse_str(text.trim()).ok();
            }
            "snapshot" | "video" => {
                let data = field.bytes().await.map_err(|e| ApiError::BadRequest(e.to_string()))?;
                if data.is_empty() {
                    continue;
                }
                if name == "snapshot" {
                    upload.snapshot = Some(data.to_vec());
                } else {
                    upload.video = Some(data.to_vec());
                }
            }
            other => {
                warn!("Ignoring unknown alert field {:?}", other);
            }
        }
    }

    Ok(upload)
}

/// Reply to an alert upload
#[derive(Debug, Serialize, Deserialize)]
pub struct AlertReceipt {
    pub status: String,
    pub id: Uuid,
    pub sms: bool,
    pub whatsapp: bool,
}

/// Receive an alert from a monitor: store media, notify, record
pub async fn receive_alert(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<AlertReceipt>, ApiError> {
    let upload = read_upload(multipart).await?;
    let slot = upload
        .slot
        .ok_or_else(|| ApiError::BadRequest("missing slot field".to_string()))?;

    metrics::counter!("fallwatch_alerts_received_total", "slot" => slot.clone()).increment(1);
    info!("Alert received from slot {}", slot);

    let mut record = AlertRecord::new(slot.clone(), upload.timestamp);
    if let Some(id) = upload.alert_id {
        record.id = id;
    }
    let media = MediaKey {
        received_ms: record.received_at.timestamp_millis(),
        slot: &slot,
        alert_id: record.id,
    };

    if let Some(jpeg) = &upload.snapshot {
        match state.store.save_snapshot(media, jpeg).await {
            Ok(path) => record.snapshot_path = Some(path.display().to_string()),
            Err(e) => warn!("Failed to store snapshot for slot {}: {}", slot, e),
        }
    }
    if let Some(clip) = &upload.video {
        match state.store.save_video(media, clip).await {
            Ok(path) => record.video_path = Some(path.display().to_string()),
            Err(e) => warn!("Failed to store video for slot {}: {}", slot, e),
        }
    }

    let report = state
        .notifiers
        .broadcast(&AlertNotice {
            slot,
            timestamp: upload.timestamp,
        })
        .await;
    record.sms_sent = report.sms.is_sent();
    record.whatsapp_sent = report.whatsapp.is_sent();

    let receipt = AlertReceipt {
        status: "alert sent".to_string(),
        id: record.id,
        sms: record.sms_sent,
        whatsapp: record.whatsapp_sent,
    };
    state.alerts.write().await.record(record);

    Ok(Json(receipt))
}

/// Query parameters for the alerts endpoint
#[derive(Debug, Deserialize)]
pub struct AlertQuery {
    /// Only unacknowledged alerts
    #[serde(default)]
    pub pending: bool,
    /// Maximum number of records
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

/// Response for alerts endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct AlertResponse {
    pub data: Vec<AlertRecord>,
    pub count: usize,
    pub unacknowledged_count: usize,
    pub total_received: u64,
}

/// Recent alerts, newest first
pub async fn list_alerts(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AlertQuery>,
) -> Json<AlertResponse> {
    let log = state.alerts.read().await;
    let limit = params.limit.min(1000);

    let data: Vec<AlertRecord> = if params.pending {
        log.pending().into_iter().rev().take(limit).cloned().collect()
    } else {
        log.recent(limit).into_iter().cloned().collect()
    };

    Json(AlertResponse {
        count: data.len(),
        unacknowledged_count: log.pending().len(),
        total_received: log.total(),
        data,
    })
}

/// Mark an alert as handled
pub async fn acknowledge_alert(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<AlertRecord>, ApiError> {
    let mut log = state.alerts.write().await;
    log.acknowledge(id)
        .cloned()
        .map(Json)
        .ok_or(ApiError::AlertNotFound(id))
}
