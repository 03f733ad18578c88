//! Per-vehicle trip segmentation.
//!
//! Splits each vehicle's chronological ping stream into trips wherever the
//! time gap between consecutive pings exceeds the configured threshold, and
//! summarises every retained trip (centroid, bearing, length).

use std::collections::HashMap;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::config::SegmentationConfig;
use crate::geo_utils::{arithmetic_centroid, bearing, polyline_length};
use crate::{GpsPoint, GpsRecord};

/// A contiguous, time-ordered run of one vehicle's pings.
///
/// Built once by the segmenter; later stages select or reject whole
/// segments and never edit their contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub vehicle_id: String,
    /// Pings in ascending timestamp order (never empty)
    pub points: Vec<GpsRecord>,
    /// Arithmetic mean latitude (not a geodesic centroid)
    pub mean_lat: f64,
    /// Arithmetic mean longitude
    pub mean_lon: f64,
    /// Bearing from the first to the last ping
    pub bearing: f64,
    /// Sum of consecutive haversine legs in meters
    pub total_distance: f64,
}

impl Segment {
    /// Summarise a run of pings. Returns `None` for an empty run.
    pub fn from_points(points: Vec<GpsRecord>) -> Option<Self> {
        let first = points.first()?;
        let last = points.last()?;

        let positions: Vec<GpsPoint> = points.iter().map(GpsRecord::point).collect();
        let centroid = arithmetic_centroid(&positions);

        Some(Self {
            vehicle_id: first.vehicle_id.clone(),
            mean_lat: centroid.latitude,
            mean_lon: centroid.longitude,
            bearing: bearing(&first.point(), &last.point()),
            total_distance: polyline_length(&positions),
            points,
        })
    }

    pub fn start_point(&self) -> &GpsRecord {
        &self.points[0]
    }

    pub fn end_point(&self) -> &GpsRecord {
        &self.points[self.points.len() - 1]
    }

    pub fn centroid(&self) -> GpsPoint {
        GpsPoint::new(self.mean_lat, self.mean_lon)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Split cleaned records into trip segments.
///
/// Records are grouped by vehicle (in order of first appearance) and sorted
/// by time within each vehicle. Runs with fewer than `min_segment_points`
/// pings are discarded before any distance is computed; the survivors are
/// then filtered by `min_segment_distance_meters`.
pub fn segment_trips(records: Vec<GpsRecord>, config: &SegmentationConfig) -> Vec<Segment> {
    let gap_ms = config.time_gap_minutes * 60.0 * 1000.0;

    let mut vehicle_index: HashMap<String, usize> = HashMap::new();
    let mut by_vehicle: Vec<Vec<GpsRecord>> = Vec::new();
    for record in records {
        let idx = *vehicle_index
            .entry(record.vehicle_id.clone())
            .or_insert_with(|| {
                by_vehicle.push(Vec::new());
                by_vehicle.len() - 1
            });
        by_vehicle[idx].push(record);
    }

    let vehicle_count = by_vehicle.len();
    let mut candidates = 0usize;
    let mut segments = Vec::new();

    for mut points in by_vehicle {
        points.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

        let mut current: Vec<GpsRecord> = Vec::new();
        for point in points {
            if let Some(prev) = current.last() {
                let gap = (point.timestamp - prev.timestamp).num_milliseconds() as f64;
                if gap > gap_ms {
                    candidates += 1;
                    close_run(std::mem::take(&mut current), config, &mut segments);
                }
            }
            current.push(point);
        }
        if !current.is_empty() {
            candidates += 1;
            close_run(current, config, &mut segments);
        }
    }

    let before_distance = segments.len();
    segments.retain(|s| s.total_distance >= config.min_segment_distance_meters);

    info!(
        "[Segmenter] {} vehicles, {} trip candidates, {} with enough points, {} long enough",
        vehicle_count,
        candidates,
        before_distance,
        segments.len()
    );

    segments
}

fn close_run(run: Vec<GpsRecord>, config: &SegmentationConfig, segments: &mut Vec<Segment>) {
    if run.len() < config.min_segment_points {
        debug!(
            "[Segmenter] Dropping run of {} points (< {})",
            run.len(),
            config.min_segment_points
        );
        return;
    }
    if let Some(segment) = Segment::from_points(run) {
        segments.push(segment);
    }
}
