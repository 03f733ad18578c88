//! # Route Skeleton
//!
//! Deterministic extraction of a single canonical route from noisy,
//! multi-vehicle GPS ping streams.
//!
//! This library provides:
//! - Record cleaning and per-vehicle trip segmentation
//! - Circular k-means direction classification of trip bearings
//! - Density-based (DBSCAN-style) route-consistency filtering
//! - Route skeleton construction with evenly spaced virtual stops
//! - Optional road snapping through an injected map-matching service
//!
//! ## Features
//!
//! - **`parallel`** - Build the route-consistency neighbour graph with rayon
//! - **`http`** - Enable the OSRM road-matching client
//! - **`cli`** - Build the `route-skeleton` command-line tool
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use route_skeleton::{PipelineConfig, RawRecord, RoutePipeline};
//!
//! let records: Vec<RawRecord> = Vec::new(); // normally from `ingest`
//! let pipeline = RoutePipeline::new(PipelineConfig::default()).unwrap();
//! let output = pipeline.run(records);
//!
//! // Empty input degenerates to an empty route, never an error
//! assert!(output.route.skeleton.is_empty());
//! assert_eq!(output.pipeline.cleaning.input_count, 0);
//! ```

use chrono::NaiveDateTime;
use geo::{Coord, LineString};
use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{Result, RouteSkeletonError};

// Geometry kernel (distance, bearing, circular statistics)
pub mod geo_utils;

// Pipeline configuration
pub mod config;
pub use config::{
    CleanConfig, DirectionConfig, PipelineConfig, RouteFilterConfig, SegmentationConfig,
    SimplifyConfig, SimplifyMethod, SkeletonConfig, SnapConfig,
};

// Largest-partition selection shared by the clustering stages
pub mod selection;

// Pipeline stages, in execution order
pub mod cleaning;
pub use cleaning::{clean_records, CleanResult, RejectionCounts};

pub mod segmentation;
pub use segmentation::{segment_trips, Segment};

pub mod direction;
pub use direction::{cluster_by_direction, AngularCluster, DirectionResult};

pub mod route_filter;
pub use route_filter::{filter_by_route_consistency, RouteFilterResult};

pub mod route_builder;
pub use route_builder::{build_route, RouteBuildResult, RouteBuildStats};

pub mod snap;
pub use snap::{
    snap_to_road, CancelSignal, MatchInfo, MatchedGeometry, RoadMatcher, SnapResult, SnapStats,
};

pub mod simplify;
pub use simplify::simplify_route;

pub mod skeleton;
pub use skeleton::{
    compute_route_skeleton, filter_by_heading_consistency, skeleton_points, virtual_stops,
};

// OSRM road-matching client
#[cfg(feature = "http")]
pub mod osrm;
#[cfg(feature = "http")]
pub use osrm::{OsrmMatcher, DEFAULT_OSRM_URL, DEFAULT_REQUEST_TIMEOUT};

// CSV ingestion with explicit field mapping
pub mod ingest;
pub use ingest::{read_csv_file, read_csv_records, FieldMapping, IngestReport};

// Orchestration
pub mod pipeline;
pub use pipeline::{
    CleaningMetrics, DirectionMetrics, LogEntry, PipelineMetrics, PipelineOutput,
    RouteFilterMetrics, RoutePipeline, SegmentationMetrics, SimplifyMetrics, SkeletonMetrics, Stage,
};

// ============================================================================
// Core Types
// ============================================================================

/// A GPS coordinate with latitude and longitude.
///
/// # Example
/// ```
/// use route_skeleton::GpsPoint;
/// let point = GpsPoint::new(41.0082, 28.9784); // Istanbul
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsPoint {
    /// Create a new GPS point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// A GPS ping as delivered by ingestion, before cleaning.
///
/// Fields may be missing or malformed; the cleaner decides what survives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRecord {
    pub vehicle_id: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    /// Naive UTC instant; `None` when missing or unparsable
    pub timestamp: Option<NaiveDateTime>,
    pub speed: f64,
}

/// A cleaned GPS ping.
///
/// Produced only by [`clean_records`]: the timestamp is present, the
/// coordinates are finite, the speed is within bounds, and the vehicle id
/// is never empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GpsRecord {
    pub vehicle_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: NaiveDateTime,
    pub speed: f64,
}

impl GpsRecord {
    /// Position of this ping.
    pub fn point(&self) -> GpsPoint {
        GpsPoint::new(self.latitude, self.longitude)
    }
}

impl From<GpsRecord> for RawRecord {
    fn from(record: GpsRecord) -> Self {
        Self {
            vehicle_id: Some(record.vehicle_id),
            latitude: record.latitude,
            longitude: record.longitude,
            timestamp: Some(record.timestamp),
            speed: record.speed,
        }
    }
}

/// A point of the route skeleton.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkeletonPoint {
    pub latitude: f64,
    pub longitude: f64,
    /// Cumulative distance from the skeleton start in meters
    pub distance: f64,
    /// Heading toward the next point (the last point repeats its predecessor's)
    pub bearing: f64,
}

/// A synthetic reference marker placed along the skeleton.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualStop {
    pub latitude: f64,
    pub longitude: f64,
    /// Distance from the skeleton start in meters
    pub distance: f64,
    pub bearing: f64,
    /// 0-based; the start marker is stop 0
    pub stop_number: u32,
    pub is_start: bool,
    pub is_end: bool,
}

/// The canonical route: skeleton polyline plus its virtual stops.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteGeometry {
    pub skeleton: Vec<SkeletonPoint>,
    pub virtual_stops: Vec<VirtualStop>,
}

impl RouteGeometry {
    /// Total skeleton length in meters (0 for an empty route).
    pub fn total_distance(&self) -> f64 {
        self.skeleton.last().map(|p| p.distance).unwrap_or(0.0)
    }

    /// The skeleton as a `geo` line string (x = longitude, y = latitude).
    pub fn line_string(&self) -> LineString<f64> {
        LineString::new(
            self.skeleton
                .iter()
                .map(|p| Coord {
                    x: p.longitude,
                    y: p.latitude,
                })
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_gps_point_validation() {
        assert!(GpsPoint::new(41.0082, 28.9784).is_valid());
        assert!(!GpsPoint::new(91.0, 0.0).is_valid());
        assert!(!GpsPoint::new(0.0, 181.0).is_valid());
        assert!(!GpsPoint::new(f64::NAN, 0.0).is_valid());
    }

    #[test]
    fn test_cleaned_record_converts_back_to_raw() {
        let ts = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        let record = GpsRecord {
            vehicle_id: "34 ABC 123".to_string(),
            latitude: 41.0,
            longitude: 29.0,
            timestamp: ts,
            speed: 42.0,
        };
        let raw = RawRecord::from(record.clone());
        assert_eq!(raw.vehicle_id.as_deref(), Some("34 ABC 123"));
        assert_eq!(raw.timestamp, Some(ts));
        assert_eq!(record.point(), GpsPoint::new(41.0, 29.0));
    }

    #[test]
    fn test_route_geometry_line_string() {
        let route = RouteGeometry {
            skeleton: vec![
                SkeletonPoint {
                    latitude: 41.0,
                    longitude: 29.0,
                    distance: 0.0,
                    bearing: 0.0,
                },
                SkeletonPoint {
                    latitude: 41.001,
                    longitude: 29.0,
                    distance: 111.2,
                    bearing: 0.0,
                },
            ],
            virtual_stops: vec![],
        };
        let line = route.line_string();
        assert_eq!(line.0.len(), 2);
        assert_eq!(line.0[1].y, 41.001);
        assert_eq!(route.total_distance(), 111.2);
        assert_eq!(RouteGeometry::default().total_distance(), 0.0);
    }
}
