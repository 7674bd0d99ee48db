//! Received alert log

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, info};
use uuid::Uuid;

/// Alert log configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertLogConfig {
    /// Records kept before the oldest is dropped
    pub capacity: usize,
}

impl Default for AlertLogConfig {
    fn default() -> Self {
        Self { capacity: 500 }
    }
}

/// One alert received from a slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub id: Uuid,
    /// Slot label as sent by the monitor
    pub slot: String,
    /// Time reported by the monitor
    pub timestamp: Option<DateTime<Utc>>,
    pub received_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_path: Option<String>,
    pub sms_sent: bool,
    pub whatsapp_sent: bool,
    pub acknowledged: bool,
}

impl AlertRecord {
    pub fn new(slot: impl Into<String>, timestamp: Option<DateTime<Utc>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            slot: slot.into(),
            timestamp,
            received_at: Utc::now(),
            snapshot_path: None,
            video_path: None,
            sms_sent: false,
            whatsapp_sent: false,
            acknowledged: false,
        }
    }
}

/// Bounded, newest-last alert history
pub struct AlertLog {
    config: AlertLogConfig,
    records: VecDeque<AlertRecord>,
    /// Alerts received since start, including dropped ones
    total: u64,
}

impl AlertLog {
    pub fn new(config: AlertLogConfig) -> Self {
        info!("Creating alert log (capacity {})", config.capacity);
        Self {
            records: VecDeque::with_capacity(config.capacity.min(1024)),
            config,
            total: 0,
        }
    }

    /// Append a record, evicting the oldest when full
    pub fn record(&mut self, record: AlertRecord) -> Uuid {
        let id = record.id;
        if self.config.capacity == 0 {
            self.total += 1;
            return id;
        }
        while self.records.len() >= self.config.capacity {
            if let Some(old) = self.records.pop_front() {
                debug!("Alert log full, dropping {}", old.id);
            }
        }

        info!("Alert recorded: slot {} ({})", record.slot, id);
        self.records.push_back(record);
        self.total += 1;
        id
    }

    /// Mark an alert as handled
    pub fn acknowledge(&mut self, id: Uuid) -> Option<&AlertRecord> {
        let record = self.records.iter_mut().find(|r| r.id == id)?;
        record.acknowledged = true;
        info!("Alert acknowledged: {}", id);
        Some(record)
    }

    pub fn get(&self, id: Uuid) -> Option<&AlertRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    /// Unacknowledged alerts, oldest first
    pub fn pending(&self) -> Vec<&AlertRecord> {
        self.records.iter().filter(|r| !r.acknowledged).collect()
    }

    /// Most recent `limit` alerts, newest first
    pub fn recent(&self, limit: usize) -> Vec<&AlertRecord> {
        self.records.iter().rev().take(limit).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn total(&self) -> u64 {
        self.total
    }
}

impl Default for AlertLog {
    fn default() -> Self {
        Self::new(AlertLogConfig::default())
    }
}
