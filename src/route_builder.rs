//! Route point selection.
//!
//! The densest cluster still holds many overlapping trips. Rather than
//! merging them, the single trip with the most pings becomes the point
//! source of the route.

use log::info;
use serde::{Deserialize, Serialize};

use crate::segmentation::Segment;
use crate::selection::largest_by;
use crate::GpsRecord;

/// Point counts reported by [`build_route`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteBuildStats {
    /// Pings in the chosen segment before deduplication
    pub total_points: usize,
    /// Pings left after removing consecutive duplicates
    pub deduplicated_points: usize,
    /// Segments used as the point source (1, or 0 for empty input)
    pub segment_count: usize,
    /// Segments offered to the builder
    pub original_segment_count: usize,
}

/// Output of [`build_route`].
#[derive(Debug, Clone, Default)]
pub struct RouteBuildResult {
    pub points: Vec<GpsRecord>,
    pub stats: RouteBuildStats,
}

/// Take the largest segment's pings as the route, in time order, without
/// consecutive duplicates.
///
/// Two consecutive pings are duplicates when their coordinates agree to six
/// decimal places (about 0.1 m).
pub fn build_route(segments: Vec<Segment>) -> RouteBuildResult {
    let original_segment_count = segments.len();
    let Some(largest) = largest_by(&segments, Segment::len) else {
        return RouteBuildResult::default();
    };

    let mut points = segments
        .into_iter()
        .nth(largest)
        .map(|s| s.points)
        .unwrap_or_default();
    points.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    let total_points = points.len();

    let mut deduplicated: Vec<GpsRecord> = Vec::with_capacity(total_points);
    let mut prev_key: Option<(i64, i64)> = None;
    for point in points {
        let key = coordinate_key(&point);
        if prev_key != Some(key) {
            deduplicated.push(point);
            prev_key = Some(key);
        }
    }

    info!(
        "[RouteBuilder] Largest of {} segments has {} points, {} after dedup",
        original_segment_count,
        total_points,
        deduplicated.len()
    );

    RouteBuildResult {
        stats: RouteBuildStats {
            total_points,
            deduplicated_points: deduplicated.len(),
            segment_count: 1,
            original_segment_count,
        },
        points: deduplicated,
    }
}

/// Coordinates in micro-degrees. Exact halves round away from zero, so
/// 41.0078125 keys as 41007813.
fn coordinate_key(point: &GpsRecord) -> (i64, i64) {
    (
        (point.latitude * 1e6).round() as i64,
        (point.longitude * 1e6).round() as i64,
    )
}
