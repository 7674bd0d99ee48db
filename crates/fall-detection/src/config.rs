//! Fall detection settings

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

/// Per-slot detection settings.
///
/// Operators may replace a slot's settings at any time; the sampling loop
/// reads one snapshot per tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionSettings {
    /// Operator sensitivity (higher = smaller movements break stillness)
    pub sensitivity: f32,

    /// Movement threshold at sensitivity 1.0 (pixels per tick)
    pub movement_base: f32,

    /// Floor applied to sensitivity before dividing
    pub min_sensitivity: f32,

    /// Assumed sampling rate used to turn still ticks into seconds
    pub sample_rate_hz: f32,

    /// Stillness + lying required before the countdown starts (seconds)
    pub confirmation_secs: f32,

    /// Grace period before the alert fires (seconds)
    pub countdown_secs: u64,

    /// Suppression window after an alert settles (seconds)
    pub cooldown_secs: u64,

    /// Torso deviation from vertical above which it counts as horizontal (degrees)
    pub lying_min_tilt_deg: f32,

    /// Torso centre below this fraction of frame height counts as near the floor
    pub floor_fraction: f32,

    /// Minimum confidence for shoulders and hips in posture checks
    pub torso_min_confidence: f32,

    /// Minimum score for a person box to veto a lying verdict
    pub detection_min_score: f32,

    /// Height/width ratio above which a person box is upright
    pub upright_aspect_ratio: f32,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            sensitivity: 1.0,
            movement_base: 0.5,
            min_sensitivity: 0.1,
            sample_rate_hz: 10.0,
            confirmation_secs: 2.0,
            countdown_secs: 30,
            cooldown_secs: 20,
            lying_min_tilt_deg: 60.0,
            floor_fraction: 0.6,
            torso_min_confidence: 0.3,
            detection_min_score: 0.5,
            upright_aspect_ratio: 1.5,
        }
    }
}

impl DetectionSettings {
    /// Sensitivity actually used; zero, negative and NaN map to the floor
    pub fn effective_sensitivity(&self) -> f32 {
        let floor = if self.min_sensitivity.is_finite() && self.min_sensitivity > 0.0 {
            self.min_sensitivity
        } else {
            f32::EPSILON
        };

        if self.sensitivity.is_finite() {
            self.sensitivity.max(floor)
        } else {
            floor
        }
    }

    /// Mean keypoint displacement below which a tick counts as still
    pub fn move_threshold(&self) -> f32 {
        self.movement_base / self.effective_sensitivity()
    }

    /// Seconds of stillness represented by `still_frames` ticks
    pub fn still_secs(&self, still_frames: u32) -> f32 {
        if self.sample_rate_hz > 0.0 {
            still_frames as f32 / self.sample_rate_hz
        } else {
            0.0
        }
    }

    pub fn countdown(&self) -> TimeDelta {
        TimeDelta::seconds(self.countdown_secs.min(i64::MAX as u64 / 1000) as i64)
    }

    pub fn cooldown(&self) -> TimeDelta {
        TimeDelta::seconds(self.cooldown_secs.min(i64::MAX as u64 / 1000) as i64)
    }
}
