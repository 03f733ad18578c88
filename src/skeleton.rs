//! Route skeleton and virtual stops.
//!
//! ## Algorithm
//! 1. Heading-consistency filter: a single left-to-right pass that drops
//!    interior points where the route doubles back (heading change above
//!    the configured limit). The first and last point always survive.
//! 2. Walk the filtered points accumulating haversine distance; each point
//!    carries the bearing toward its successor.
//! 3. Emit a start stop at 0 m, one stop every `stop_interval_meters`
//!    (linearly interpolated inside the leg that contains it), and an end
//!    stop at the true total length.

use log::{debug, info};

use crate::config::SkeletonConfig;
use crate::geo_utils::{angular_distance, bearing, haversine_distance};
use crate::{GpsPoint, RouteGeometry, SkeletonPoint, VirtualStop};

/// Drop interior points whose heading change exceeds `max_heading_change`.
///
/// For each interior point the heading from the last *kept* point is
/// compared with the heading toward the next input point. A dropped point
/// does not become the reference for the following comparison.
pub fn filter_by_heading_consistency(
    points: &[GpsPoint],
    max_heading_change: f64,
) -> Vec<GpsPoint> {
    if points.len() < 3 {
        return points.to_vec();
    }

    let mut filtered = Vec::with_capacity(points.len());
    filtered.push(points[0]);

    for i in 1..points.len() - 1 {
        let prev = filtered[filtered.len() - 1];
        let curr = &points[i];
        let next = &points[i + 1];

        let change = angular_distance(bearing(&prev, curr), bearing(curr, next));
        if change <= max_heading_change {
            filtered.push(*curr);
        } else {
            debug!(
                "[HeadingFilter] Dropped point {} (heading change {:.0} deg)",
                i, change
            );
        }
    }

    filtered.push(points[points.len() - 1]);

    info!(
        "[HeadingFilter] {} -> {} points ({} dropped)",
        points.len(),
        filtered.len(),
        points.len() - filtered.len()
    );
    filtered
}

/// Cumulative distance and heading for each point.
///
/// The last point repeats its predecessor's bearing (0 for a single point).
pub fn skeleton_points(points: &[GpsPoint]) -> Vec<SkeletonPoint> {
    let mut skeleton: Vec<SkeletonPoint> = Vec::with_capacity(points.len());
    let mut cumulative = 0.0;

    for (i, point) in points.iter().enumerate() {
        if i > 0 {
            cumulative += haversine_distance(&points[i - 1], point);
        }
        let heading = match points.get(i + 1) {
            Some(next) => bearing(point, next),
            None => skeleton.last().map(|p| p.bearing).unwrap_or(0.0),
        };
        skeleton.push(SkeletonPoint {
            latitude: point.latitude,
            longitude: point.longitude,
            distance: cumulative,
            bearing: heading,
        });
    }

    skeleton
}

/// Place virtual stops along a skeleton every `interval` meters.
///
/// Interior stops sit exactly at multiples of `interval` strictly below the
/// total length; the end stop sits at the total length. Zero-length legs
/// never produce a stop. Empty skeletons produce no stops.
pub fn virtual_stops(skeleton: &[SkeletonPoint], interval: f64) -> Vec<VirtualStop> {
    let (Some(first), Some(last)) = (skeleton.first(), skeleton.last()) else {
        return Vec::new();
    };
    let total_distance = last.distance;

    let mut stops = vec![VirtualStop {
        latitude: first.latitude,
        longitude: first.longitude,
        distance: 0.0,
        bearing: first.bearing,
        stop_number: 0,
        is_start: true,
        is_end: false,
    }];

    let mut stop_number = 1u32;
    let mut next_stop = interval;

    for leg in skeleton.windows(2) {
        let (p1, p2) = (&leg[0], &leg[1]);

        while next_stop > p1.distance && next_stop <= p2.distance {
            if next_stop >= total_distance {
                break;
            }
            let leg_length = p2.distance - p1.distance;
            if leg_length == 0.0 {
                break;
            }

            let ratio = (next_stop - p1.distance) / leg_length;
            stops.push(VirtualStop {
                latitude: p1.latitude + (p2.latitude - p1.latitude) * ratio,
                longitude: p1.longitude + (p2.longitude - p1.longitude) * ratio,
                distance: next_stop,
                bearing: p1.bearing,
                stop_number,
                is_start: false,
                is_end: false,
            });

            stop_number += 1;
            next_stop += interval;
        }
    }

    stops.push(VirtualStop {
        latitude: last.latitude,
        longitude: last.longitude,
        distance: total_distance,
        bearing: last.bearing,
        stop_number,
        is_start: false,
        is_end: true,
    });

    stops
}

/// Build the skeleton and its virtual stops from route points.
pub fn compute_route_skeleton(points: &[GpsPoint], config: &SkeletonConfig) -> RouteGeometry {
    let filtered = filter_by_heading_consistency(points, config.max_heading_change_degrees);
    let skeleton = skeleton_points(&filtered);
    let stops = virtual_stops(&skeleton, config.stop_interval_meters);

    let total = skeleton.last().map(|p| p.distance).unwrap_or(0.0);
    info!(
        "[Skeleton] {} points, {} virtual stops (0m to {:.2}km)",
        skeleton.len(),
        stops.len(),
        total / 1000.0
    );

    RouteGeometry {
        skeleton,
        virtual_stops: stops,
    }
}
