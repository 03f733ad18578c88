//! Point-budget simplification of the route polyline.
//!
//! Uniform resampling keeps `target` input points at evenly spaced indices
//! (`round(i * (n - 1) / (target - 1))`), which always includes the first
//! and last point. Douglas-Peucker keeps shape-defining vertices instead and
//! falls back to uniform resampling when it still exceeds the budget.

use geo::{Coord, LineString, Simplify};
use log::info;

use crate::config::{SimplifyConfig, SimplifyMethod};
use crate::GpsPoint;

/// Reduce `points` to at most `config.target_points` points.
///
/// Input at or under the budget is returned unchanged. Output points are
/// always a subsequence of the input.
pub fn simplify_route(points: &[GpsPoint], config: &SimplifyConfig) -> Vec<GpsPoint> {
    let target = config.target_points.max(2);
    if points.len() <= target {
        return points.to_vec();
    }

    let simplified = match config.method {
        SimplifyMethod::Uniform => uniform_resample(points, target),
        SimplifyMethod::DouglasPeucker { tolerance } => {
            let reduced = douglas_peucker(points, tolerance);
            if reduced.len() > target {
                uniform_resample(&reduced, target)
            } else {
                reduced
            }
        }
    };

    info!(
        "[Simplifier] {} -> {} points ({:?})",
        points.len(),
        simplified.len(),
        config.method
    );
    simplified
}

/// Evenly spaced index sampling; `target` must be at least 2.
fn uniform_resample(points: &[GpsPoint], target: usize) -> Vec<GpsPoint> {
    let n = points.len();
    if n <= target {
        return points.to_vec();
    }
    // Multiply before dividing so exact halves round up instead of landing
    // just below .5
    (0..target)
        .map(|i| {
            let index = ((i * (n - 1)) as f64 / (target - 1) as f64).round() as usize;
            points[index.min(n - 1)]
        })
        .collect()
}

/// Douglas-Peucker in degree space (x = longitude, y = latitude).
fn douglas_peucker(points: &[GpsPoint], tolerance: f64) -> Vec<GpsPoint> {
    let line: LineString<f64> = points
        .iter()
        .map(|p| Coord {
            x: p.longitude,
            y: p.latitude,
        })
        .collect();

    line.simplify(&tolerance)
        .coords()
        .map(|c| GpsPoint::new(c.y, c.x))
        .collect()
}
