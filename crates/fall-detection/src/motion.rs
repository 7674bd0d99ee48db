//! Movement between consecutive keypoint samples

use crate::keypoints::KeypointSet;

/// Landmarks below this confidence in either sample are not compared
pub const VISIBILITY_FLOOR: f32 = 0.2;

/// Mean displacement (pixels) of landmarks visible in both samples.
///
/// `None` when there is no previous sample or no landmark pair qualifies;
/// callers treat that as unbounded movement.
pub fn movement(prev: Option<&KeypointSet>, curr: &KeypointSet) -> Option<f32> {
    let prev = prev?;

    let (sum, matched) = curr
        .iter()
        .filter(|k| k.is_visible(VISIBILITY_FLOOR))
        .filter_map(|k| {
            prev.visible(k.name, VISIBILITY_FLOOR)
                .map(|p| k.distance_to(p))
        })
        .fold((0.0f32, 0usize), |(sum, n), d| (sum + d, n + 1));

    if matched == 0 {
        None
    } else {
        Some(sum / matched as f32)
    }
}
