//! Slot state tracking

use crate::keypoints::KeypointSet;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Running grace period before an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Countdown {
    pub started_at: DateTime<Utc>,
    pub remaining: TimeDelta,
}

impl Countdown {
    pub fn start(at: DateTime<Utc>, duration: TimeDelta) -> Self {
        Self {
            started_at: at,
            remaining: duration,
        }
    }

    /// Remaining time at `now` for a countdown of `duration`
    pub fn remaining_at(&self, now: DateTime<Utc>, duration: TimeDelta) -> TimeDelta {
        duration - (now - self.started_at)
    }

    /// Whole seconds left, rounded up (what the overlay shows)
    pub fn remaining_secs(&self) -> u64 {
        let ms = self.remaining.num_milliseconds();
        if ms <= 0 {
            0
        } else {
            (ms as u64).div_ceil(1000)
        }
    }
}

/// Lifecycle phase of a slot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Phase {
    /// Not monitoring
    #[default]
    Idle,
    /// Sampling, no fall suspected
    Monitoring,
    /// Lying and still for the confirmation floor; becomes `Counting` on the same tick
    Confirming,
    /// Grace period running
    Counting(Countdown),
    /// Alert raised, evidence capture/dispatch in flight
    Alerting {
        alert_id: Uuid,
        raised_at: DateTime<Utc>,
    },
    /// Alerts suppressed until `until`
    Cooldown { until: DateTime<Utc> },
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Monitoring => "monitoring",
            Phase::Confirming => "confirming",
            Phase::Counting(_) => "counting",
            Phase::Alerting { .. } => "alerting",
            Phase::Cooldown { .. } => "cooldown",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Coarse slot indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotActivity {
    Idle,
    Running,
    Alerting,
}

/// Status published for display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotStatus {
    pub activity: SlotActivity,
    pub phase: String,
    /// Seconds left, only while counting down
    #[serde(skip_serializing_if = "Option::is_none")]
    pub countdown_secs: Option<u64>,
    /// End of the current cooldown
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_until: Option<DateTime<Utc>>,
    pub still_frames: u32,
}

impl Default for SlotStatus {
    fn default() -> Self {
        SlotState::default().status()
    }
}

/// Per-slot state, owned and mutated only by that slot's loop
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SlotState {
    pub phase: Phase,
    /// Last skeleton seen, `None` after a tick without a person
    pub last_keypoints: Option<KeypointSet>,
    /// Consecutive ticks below the movement threshold
    pub still_frames: u32,
}

impl SlotState {
    /// Fresh state for a slot that starts monitoring
    pub fn monitoring() -> Self {
        Self {
            phase: Phase::Monitoring,
            ..Default::default()
        }
    }

    pub fn is_running(&self) -> bool {
        self.phase != Phase::Idle
    }

    pub fn countdown(&self) -> Option<&Countdown> {
        match &self.phase {
            Phase::Counting(countdown) => Some(countdown),
            _ => None,
        }
    }

    pub fn alert_in_flight(&self) -> Option<Uuid> {
        match self.phase {
            Phase::Alerting { alert_id, .. } => Some(alert_id),
            _ => None,
        }
    }

    pub fn cooldown_until(&self) -> Option<DateTime<Utc>> {
        match self.phase {
            Phase::Cooldown { until } => Some(until),
            _ => None,
        }
    }

    pub fn status(&self) -> SlotStatus {
        let activity = match self.phase {
            Phase::Idle => SlotActivity::Idle,
            Phase::Alerting { .. } => SlotActivity::Alerting,
            _ => SlotActivity::Running,
        };

        SlotStatus {
            activity,
            phase: self.phase.name().to_string(),
            countdown_secs: self.countdown().map(Countdown::remaining_secs),
            cooldown_until: self.cooldown_until(),
            still_frames: self.still_frames,
        }
    }
}
