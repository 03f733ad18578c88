//! Pipeline configuration.
//!
//! Options are grouped per stage and deserialize from the JSON shape
//!
//! ```json
//! { "clean": { "maxSpeed": 120 },
//!   "segmentation": { "timeGapMinutes": 10, "minSegmentPoints": 30 },
//!   "routeFilter": { "eps": 400, "minPts": 5, "bearingThreshold": 25 },
//!   "snap": { "enabled": false },
//!   "simplify": { "targetPoints": 500 } }
//! ```
//!
//! Every group and option is optional and falls back to its default.

use serde::{Deserialize, Serialize};

use crate::error::{Result, RouteSkeletonError};

/// Cleaner options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CleanConfig {
    /// Upper bound on accepted speed (same unit as the record's speed).
    /// Default: 120
    pub max_speed: f64,
}

impl Default for CleanConfig {
    fn default() -> Self {
        Self { max_speed: 120.0 }
    }
}

/// Segmenter options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SegmentationConfig {
    /// A gap longer than this starts a new trip segment.
    /// Default: 10 minutes
    pub time_gap_minutes: f64,
    /// Segments with fewer raw points are dropped.
    /// Default: 30
    pub min_segment_points: usize,
    /// Segments shorter than this are dropped.
    /// Default: 500 meters
    pub min_segment_distance_meters: f64,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            time_gap_minutes: 10.0,
            min_segment_points: 30,
            min_segment_distance_meters: 500.0,
        }
    }
}

/// Direction classifier options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DirectionConfig {
    /// Number of circular k-means clusters. Default: 2
    pub k: usize,
    /// Advisory confidence threshold for the dominant ratio; never enforced.
    /// Default: 0.8
    pub dominant_threshold: f64,
    /// Fixed k-means iteration budget. Default: 10
    pub iterations: usize,
}

impl Default for DirectionConfig {
    fn default() -> Self {
        Self {
            k: 2,
            dominant_threshold: 0.8,
            iterations: 10,
        }
    }
}

/// Route-consistency (density clustering) options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RouteFilterConfig {
    /// Neighbour radius between segment centroids. Default: 400 meters
    pub eps: f64,
    /// Minimum neighbour count for a core segment. Default: 5
    pub min_pts: usize,
    /// Maximum bearing difference between neighbours. Default: 25 degrees
    pub bearing_threshold: f64,
}

impl Default for RouteFilterConfig {
    fn default() -> Self {
        Self {
            eps: 400.0,
            min_pts: 5,
            bearing_threshold: 25.0,
        }
    }
}

/// Road-snap stage options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SnapConfig {
    /// Run the snap stage. Default: false
    pub enabled: bool,
    /// Points per map-matching request. Default: 50
    pub max_points_per_request: usize,
    /// Travel profile passed to the matcher. Default: "driving"
    pub profile: String,
    /// Per-request timeout. Default: 30 seconds
    pub timeout_secs: u64,
    /// Requests in flight at once; results are reassembled in chunk order.
    /// Default: 1 (sequential)
    pub concurrency: usize,
}

impl Default for SnapConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_points_per_request: 50,
            profile: "driving".to_string(),
            timeout_secs: 30,
            concurrency: 1,
        }
    }
}

/// Downsampling strategy of the simplifier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum SimplifyMethod {
    /// Uniform index resampling.
    Uniform,
    /// Douglas-Peucker with `tolerance` in degrees, then uniform resampling
    /// if the result is still over budget.
    DouglasPeucker { tolerance: f64 },
}

/// Simplifier options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SimplifyConfig {
    /// Output point budget. Default: 500
    pub target_points: usize,
    pub method: SimplifyMethod,
}

impl Default for SimplifyConfig {
    fn default() -> Self {
        Self {
            target_points: 500,
            method: SimplifyMethod::Uniform,
        }
    }
}

/// Skeleton builder options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SkeletonConfig {
    /// Spacing of virtual stops. Default: 500 meters
    pub stop_interval_meters: f64,
    /// Interior points turning more sharply than this are dropped.
    /// Default: 120 degrees
    pub max_heading_change_degrees: f64,
}

impl Default for SkeletonConfig {
    fn default() -> Self {
        Self {
            stop_interval_meters: 500.0,
            max_heading_change_degrees: 120.0,
        }
    }
}

/// Complete pipeline configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PipelineConfig {
    pub clean: CleanConfig,
    pub segmentation: SegmentationConfig,
    pub direction: DirectionConfig,
    pub route_filter: RouteFilterConfig,
    pub snap: SnapConfig,
    pub simplify: SimplifyConfig,
    pub skeleton: SkeletonConfig,
}

impl PipelineConfig {
    /// Parse and validate a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(RouteSkeletonError::ConfigParse)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every precondition the stages rely on.
    pub fn validate(&self) -> Result<()> {
        if self.clean.max_speed.is_nan() {
            return Err(RouteSkeletonError::invalid_config(
                "clean.maxSpeed",
                "must be a number",
            ));
        }

        non_negative("segmentation.timeGapMinutes", self.segmentation.time_gap_minutes)?;
        non_negative(
            "segmentation.minSegmentDistanceMeters",
            self.segmentation.min_segment_distance_meters,
        )?;

        if self.direction.k == 0 {
            return Err(RouteSkeletonError::invalid_config(
                "direction.k",
                "must be at least 1",
            ));
        }
        if self.direction.iterations == 0 {
            return Err(RouteSkeletonError::invalid_config(
                "direction.iterations",
                "must be at least 1",
            ));
        }
        if !(0.0..=1.0).contains(&self.direction.dominant_threshold) {
            return Err(RouteSkeletonError::invalid_config(
                "direction.dominantThreshold",
                format!("{} is outside [0, 1]", self.direction.dominant_threshold),
            ));
        }

        non_negative("routeFilter.eps", self.route_filter.eps)?;
        non_negative(
            "routeFilter.bearingThreshold",
            self.route_filter.bearing_threshold,
        )?;

        if self.snap.max_points_per_request == 0 {
            return Err(RouteSkeletonError::invalid_config(
                "snap.maxPointsPerRequest",
                "must be at least 1",
            ));
        }
        if self.snap.concurrency == 0 {
            return Err(RouteSkeletonError::invalid_config(
                "snap.concurrency",
                "must be at least 1",
            ));
        }
        if self.snap.timeout_secs == 0 {
            return Err(RouteSkeletonError::invalid_config(
                "snap.timeoutSecs",
                "must be at least 1",
            ));
        }

        if self.simplify.target_points < 2 {
            return Err(RouteSkeletonError::invalid_config(
                "simplify.targetPoints",
                "must keep at least the first and last point (>= 2)",
            ));
        }
        if let SimplifyMethod::DouglasPeucker { tolerance } = self.simplify.method {
            if !tolerance.is_finite() || tolerance <= 0.0 {
                return Err(RouteSkeletonError::invalid_config(
                    "simplify.method.tolerance",
                    "must be a positive number of degrees",
                ));
            }
        }

        let interval = self.skeleton.stop_interval_meters;
        if !interval.is_finite() || interval <= 0.0 {
            return Err(RouteSkeletonError::invalid_config(
                "skeleton.stopIntervalMeters",
                "must be a positive number of meters",
            ));
        }
        if !(0.0..=180.0).contains(&self.skeleton.max_heading_change_degrees) {
            return Err(RouteSkeletonError::invalid_config(
                "skeleton.maxHeadingChangeDegrees",
                "must be within [0, 180]",
            ));
        }

        Ok(())
    }
}

fn non_negative(field: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(RouteSkeletonError::invalid_config(
            field,
            format!("{} is not a finite, non-negative number", value),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.clean.max_speed, 120.0);
        assert_eq!(config.segmentation.min_segment_points, 30);
        assert_eq!(config.direction.k, 2);
        assert_eq!(config.direction.iterations, 10);
        assert_eq!(config.route_filter.min_pts, 5);
        assert!(!config.snap.enabled);
        assert_eq!(config.simplify.target_points, 500);
        assert_eq!(config.skeleton.stop_interval_meters, 500.0);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = PipelineConfig::from_json(
            r#"{"routeFilter": {"eps": 250}, "simplify": {"targetPoints": 2000}}"#,
        )
        .unwrap();
        assert_eq!(config.route_filter.eps, 250.0);
        assert_eq!(config.route_filter.min_pts, 5);
        assert_eq!(config.simplify.target_points, 2000);
        assert_eq!(config.segmentation, SegmentationConfig::default());
    }

    #[test]
    fn test_douglas_peucker_method_from_json() {
        let config = PipelineConfig::from_json(
            r#"{"simplify": {"method": {"type": "douglasPeucker", "tolerance": 0.0001}}}"#,
        )
        .unwrap();
        assert_eq!(
            config.simplify.method,
            SimplifyMethod::DouglasPeucker { tolerance: 0.0001 }
        );
    }

    #[test]
    fn test_zero_k_fails_fast() {
        let result = PipelineConfig::from_json(r#"{"direction": {"k": 0}}"#);
        match result {
            Err(RouteSkeletonError::InvalidConfig { field, .. }) => {
                assert_eq!(field, "direction.k")
            }
            other => panic!("expected InvalidConfig, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_options_rejected() {
        let mut config = PipelineConfig::default();
        config.simplify.target_points = 1;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.skeleton.stop_interval_meters = 0.0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.snap.max_points_per_request = 0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.route_filter.eps = -1.0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.direction.dominant_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_json() {
        let result = PipelineConfig::from_json("{not json");
        assert!(matches!(result, Err(RouteSkeletonError::ConfigParse(_))));
    }
}
