//! Slot Routes

use axum::{
    extract::{Path, State},
    Json,
};
use fall_detection::{SlotId, SlotStatus};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{ApiError, AppState};

/// One slot as shown to operators
#[derive(Debug, Serialize, Deserialize)]
pub struct SlotView {
    pub id: SlotId,
    #[serde(flatten)]
    pub status: SlotStatus,
    pub sensitivity: f32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SlotList {
    pub data: Vec<SlotView>,
    pub count: usize,
}

/// Result of a start/stop request
#[derive(Debug, Serialize, Deserialize)]
pub struct SlotControl {
    pub id: SlotId,
    /// False when the slot already was in the requested state
    pub changed: bool,
    #[serde(flatten)]
    pub status: SlotStatus,
}

#[derive(Debug, Deserialize)]
pub struct SensitivityRequest {
    pub sensitivity: f32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SensitivityResponse {
    pub id: SlotId,
    pub sensitivity: f32,
    /// Value actually used after clamping
    pub effective: f32,
}

pub async fn list_slots(State(state): State<Arc<AppState>>) -> Result<Json<SlotList>, ApiError> {
    let slots = state.slots.read().await;
    let data = slots
        .statuses()
        .into_iter()
        .map(|(id, status)| {
            Ok(SlotView {
                id,
                status,
                sensitivity: slots.settings(id)?.sensitivity,
            })
        })
        .collect::<Result<Vec<_>, ApiError>>()?;

    Ok(Json(SlotList {
        count: data.len(),
        data,
    }))
}

pub async fn start_slot(
    State(state): State<Arc<AppState>>,
    Path(id): Path<SlotId>,
) -> Result<Json<SlotControl>, ApiError> {
    let mut slots = state.slots.write().await;
    let changed = slots.start(id)?;
    Ok(Json(SlotControl {
        id,
        changed,
        status: slots.status(id)?,
    }))
}

pub async fn stop_slot(
    State(state): State<Arc<AppState>>,
    Path(id): Path<SlotId>,
) -> Result<Json<SlotControl>, ApiError> {
    let mut slots = state.slots.write().await;
    let changed = slots.stop(id).await?;
    Ok(Json(SlotControl {
        id,
        changed,
        status: slots.status(id)?,
    }))
}

pub async fn set_sensitivity(
    State(state): State<Arc<AppState>>,
    Path(id): Path<SlotId>,
    Json(request): Json<SensitivityRequest>,
) -> Result<Json<SensitivityResponse>, ApiError> {
    let slots = state.slots.read().await;
    let effective = slots.set_sensitivity(id, request.sensitivity)?;
    Ok(Json(SensitivityResponse {
        id,
        sensitivity: request.sensitivity,
        effective,
    }))
}
