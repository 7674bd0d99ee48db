//! Lying-posture classification from torso geometry

use crate::config::DetectionSettings;
use crate::keypoints::{Keypoint, KeypointName, KeypointSet};
use serde::{Deserialize, Serialize};

/// Posture verdict for one sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostureVerdict {
    Lying,
    NotLying,
    /// Torso landmarks missing or degenerate; never treated as lying
    Unknown,
}

impl PostureVerdict {
    pub fn is_lying(self) -> bool {
        self == PostureVerdict::Lying
    }
}

/// Object detector class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectClass {
    Person,
    #[serde(other)]
    Other,
}

/// Object detector output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Bounding box [x, y, width, height]
    pub bbox: [f32; 4],
    /// Detection confidence
    pub score: f32,
    pub class: ObjectClass,
}

impl Detection {
    /// Height over width; `None` for empty boxes
    pub fn aspect_ratio(&self) -> Option<f32> {
        let [_, _, w, h] = self.bbox;
        (w > 0.0 && h > 0.0).then(|| h / w)
    }
}

/// Torso-angle + floor-proximity classifier
#[derive(Debug, Clone)]
pub struct PostureClassifier {
    min_tilt_deg: f32,
    floor_fraction: f32,
    min_confidence: f32,
    detection_min_score: f32,
    upright_aspect_ratio: f32,
}

impl Default for PostureClassifier {
    fn default() -> Self {
        Self::new(&DetectionSettings::default())
    }
}

impl PostureClassifier {
    pub fn new(settings: &DetectionSettings) -> Self {
        Self {
            min_tilt_deg: settings.lying_min_tilt_deg,
            floor_fraction: settings.floor_fraction,
            min_confidence: settings.torso_min_confidence,
            detection_min_score: settings.detection_min_score,
            upright_aspect_ratio: settings.upright_aspect_ratio,
        }
    }

    /// Classify the skeleton against a frame of `frame_height` pixels
    pub fn classify(&self, set: &KeypointSet, frame_height: f32) -> PostureVerdict {
        if !(frame_height.is_finite() && frame_height > 0.0) {
            return PostureVerdict::Unknown;
        }

        let landmark = |name| set.visible(name, self.min_confidence);
        let (Some(ls), Some(rs), Some(lh), Some(rh)) = (
            landmark(KeypointName::LeftShoulder),
            landmark(KeypointName::RightShoulder),
            landmark(KeypointName::LeftHip),
            landmark(KeypointName::RightHip),
        ) else {
            return PostureVerdict::Unknown;
        };

        let (sx, sy) = midpoint(ls, rs);
        let (hx, hy) = midpoint(lh, rh);
        let (dx, dy) = (hx - sx, hy - sy);
        if dx == 0.0 && dy == 0.0 {
            return PostureVerdict::Unknown;
        }

        // 0° = torso horizontal, 90° = torso vertical
        let elevation = dy.abs().atan2(dx.abs()).to_degrees();
        let tilt_from_vertical = 90.0 - elevation;
        let horizontal = tilt_from_vertical > self.min_tilt_deg;

        let center_y = (sy + hy) / 2.0;
        let near_floor = center_y > frame_height * self.floor_fraction;

        if horizontal && near_floor {
            PostureVerdict::Lying
        } else {
            PostureVerdict::NotLying
        }
    }

    pub fn is_lying(&self, set: &KeypointSet, frame_height: f32) -> bool {
        self.classify(set, frame_height).is_lying()
    }

    /// Let object detections veto a lying verdict.
    ///
    /// Only the most confident person box is considered. A clearly upright
    /// box overrides `Lying`; detections never promote a verdict to `Lying`.
    pub fn apply_detections(&self, verdict: PostureVerdict, detections: &[Detection]) -> PostureVerdict {
        if verdict != PostureVerdict::Lying {
            return verdict;
        }

        let best_person = detections
            .iter()
            .filter(|d| d.class == ObjectClass::Person && d.score >= self.detection_min_score)
            .max_by(|a, b| a.score.total_cmp(&b.score));

        match best_person.and_then(Detection::aspect_ratio) {
            Some(ratio) if ratio >= self.upright_aspect_ratio => PostureVerdict::NotLying,
            _ => verdict,
        }
    }
}

/// Lying check with default thresholds
pub fn is_lying(set: &KeypointSet, frame_height: f32) -> bool {
    PostureClassifier::default().is_lying(set, frame_height)
}

fn midpoint(a: &Keypoint, b: &Keypoint) -> (f32, f32) {
    ((a.x + b.x) / 2.0, (a.y + b.y) / 2.0)
}
