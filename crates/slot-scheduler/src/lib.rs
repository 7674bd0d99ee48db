//! Slot Scheduler
//!
//! One sampling loop per camera slot. Each loop owns its state machine,
//! runs evidence capture in detached tasks and publishes its status on a
//! watch channel. Slots never share mutable state.

mod manager;
mod runner;

pub use manager::SlotManager;

use alerting::CaptureConfig;
use fall_detection::SlotId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Scheduler configuration shared by all slots
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Consecutive frame failures before a slot gives up and goes idle
    pub max_source_failures: u32,
    /// Evidence capture after an alert
    pub capture: CaptureConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_source_failures: 50,
            capture: CaptureConfig::default(),
        }
    }
}

/// External collaborators of one slot
pub struct SlotResources<F, P, D, A> {
    pub source: Arc<F>,
    pub estimator: Arc<P>,
    pub detector: Arc<D>,
    pub dispatcher: Arc<A>,
}

impl<F, P, D, A> Clone for SlotResources<F, P, D, A> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            estimator: self.estimator.clone(),
            detector: self.detector.clone(),
            dispatcher: self.dispatcher.clone(),
        }
    }
}

/// Scheduler error types
#[derive(Error, Debug, PartialEq)]
pub enum SchedulerError {
    #[error("Unknown slot {0}")]
    UnknownSlot(SlotId),

    #[error("Slot {0} already registered")]
    DuplicateSlot(SlotId),

    #[error("Invalid sensitivity {0}")]
    InvalidSensitivity(f32),
}
