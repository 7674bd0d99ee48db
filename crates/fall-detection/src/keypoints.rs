//! Body keypoints (COCO-17 layout, as emitted by MoveNet)

use serde::{Deserialize, Serialize};

/// Anatomical landmark
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeypointName {
    Nose,
    LeftEye,
    RightEye,
    LeftEar,
    RightEar,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
}

impl KeypointName {
    /// All landmarks in model output order
    pub const ALL: [KeypointName; 17] = [
        KeypointName::Nose,
        KeypointName::LeftEye,
        KeypointName::RightEye,
        KeypointName::LeftEar,
        KeypointName::RightEar,
        KeypointName::LeftShoulder,
        KeypointName::RightShoulder,
        KeypointName::LeftElbow,
        KeypointName::RightElbow,
        KeypointName::LeftWrist,
        KeypointName::RightWrist,
        KeypointName::LeftHip,
        KeypointName::RightHip,
        KeypointName::LeftKnee,
        KeypointName::RightKnee,
        KeypointName::LeftAnkle,
        KeypointName::RightAnkle,
    ];

    /// Landmark at a model output index
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

/// One landmark estimate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub name: KeypointName,
    /// X coordinate (pixels)
    pub x: f32,
    /// Y coordinate (pixels, growing downwards)
    pub y: f32,
    /// Detection confidence (0-1)
    pub score: f32,
}

impl Keypoint {
    pub fn new(name: KeypointName, x: f32, y: f32, score: f32) -> Self {
        Self { name, x, y, score }
    }

    /// Euclidean distance to another keypoint
    pub fn distance_to(&self, other: &Keypoint) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn is_visible(&self, min_score: f32) -> bool {
        self.score >= min_score && self.x.is_finite() && self.y.is_finite()
    }
}

/// Keypoints of the single tracked skeleton for one tick
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeypointSet {
    points: Vec<Keypoint>,
}

impl KeypointSet {
    pub fn new(points: Vec<Keypoint>) -> Self {
        Self { points }
    }

    /// Build a set from model output order (index gives the landmark name).
    /// Entries beyond the 17 known landmarks are ignored.
    #[cfg(test)]
    pub(crate) fn from_ordered(coords: &[(f32, f32, f32)]) -> Self {
        let points = coords
            .iter()
            .enumerate()
            .filter_map(|(i, &(x, y, score))| {
                KeypointName::from_index(i).map(|name| Keypoint::new(name, x, y, score))
            })
            .collect();
        Self { points }
    }

    pub fn get(&self, name: KeypointName) -> Option<&Keypoint> {
        self.points.iter().find(|k| k.name == name)
    }

    /// Landmark if present with at least `min_score` confidence
    pub fn visible(&self, name: KeypointName, min_score: f32) -> Option<&Keypoint> {
        self.get(name).filter(|k| k.is_visible(min_score))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Keypoint> {
        self.points.iter()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
