//! Pipeline orchestration.
//!
//! ## Stages
//! 1. Clean: reject malformed pings, order by vehicle and time
//! 2. Segment: split each vehicle's stream into trips on time gaps
//! 3. Direction: keep the dominant heading cluster (circular k-means)
//! 4. Route filter: keep the densest route-consistent cluster (DBSCAN)
//! 5. Route builder: take the largest trip's pings, deduplicated
//! 6. Snap (optional): replace the points with road-matched geometry
//! 7. Simplify: enforce the output point budget
//! 8. Skeleton: heading filter, cumulative distance, virtual stops
//!
//! Stages 1-5, 7 and 8 are pure and never fail. Only the snap stage awaits
//! I/O, and only [`RoutePipeline::run_with_road_matcher`] runs it.

use std::time::Instant;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::cleaning::{clean_records, RejectionCounts};
use crate::config::PipelineConfig;
use crate::direction::cluster_by_direction;
use crate::error::{Result, RouteSkeletonError};
use crate::route_builder::{build_route, RouteBuildStats};
use crate::route_filter::filter_by_route_consistency;
use crate::segmentation::segment_trips;
use crate::simplify::simplify_route;
use crate::skeleton::compute_route_skeleton;
use crate::snap::{snap_to_road, CancelSignal, RoadMatcher, SnapStats};
use crate::{GpsPoint, GpsRecord, RawRecord, RouteGeometry};

/// Pipeline stage that produced a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Stage {
    Clean,
    Segmentation,
    Direction,
    RouteFilter,
    RouteBuilder,
    Snap,
    Simplify,
    Skeleton,
}

/// One human-readable progress message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub stage: Stage,
    pub message: String,
}

/// Ordered progress log of one run. Entries are also sent to `log`.
#[derive(Debug, Clone, Default)]
struct PipelineLog {
    entries: Vec<LogEntry>,
}

impl PipelineLog {
    fn push(&mut self, stage: Stage, message: String) {
        info!("[Pipeline] {:?}: {}", stage, message);
        self.entries.push(LogEntry { stage, message });
    }

    fn warn(&mut self, stage: Stage, message: String) {
        warn!("[Pipeline] {:?}: {}", stage, message);
        self.entries.push(LogEntry { stage, message });
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleaningMetrics {
    pub input_count: usize,
    pub output_count: usize,
    pub rejected: RejectionCounts,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentationMetrics {
    pub vehicle_count: usize,
    pub segment_count: usize,
    /// Pings across all kept segments
    pub total_points: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectionMetrics {
    pub cluster_centers: Vec<f64>,
    pub cluster_sizes: Vec<usize>,
    pub selected_cluster: usize,
    pub selected_count: usize,
    pub mean_heading: f64,
    pub dominant_ratio: f64,
    /// Advisory only; low confidence never stops the run
    pub confident: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteFilterMetrics {
    pub input_segments: usize,
    pub cluster_count: usize,
    pub cluster_sizes: Vec<usize>,
    pub dominant_count: usize,
    pub rejected_count: usize,
    pub noise_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimplifyMetrics {
    pub input_points: usize,
    pub output_points: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkeletonMetrics {
    pub skeleton_points: usize,
    /// Points removed by the heading-consistency filter
    pub heading_filtered_points: usize,
    pub virtual_stop_count: usize,
    pub total_distance_m: f64,
    pub total_distance_km: f64,
}

/// Per-stage metrics of one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineMetrics {
    pub cleaning: CleaningMetrics,
    pub segmentation: SegmentationMetrics,
    pub direction: DirectionMetrics,
    pub route_filter: RouteFilterMetrics,
    pub route: RouteBuildStats,
    /// Present only when the snap stage ran
    pub snap: Option<SnapStats>,
    pub simplify: SimplifyMetrics,
    pub skeleton: SkeletonMetrics,
}

/// Result of a pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineOutput {
    pub route: RouteGeometry,
    pub pipeline: PipelineMetrics,
    pub log: Vec<LogEntry>,
}

impl PipelineOutput {
    /// Pretty-printed JSON of the whole output.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(RouteSkeletonError::Serialize)
    }
}

/// State carried between the pure front half and the rest of a run.
struct PartialRun {
    points: Vec<GpsPoint>,
    metrics: PipelineMetrics,
    log: PipelineLog,
    started: Instant,
}

/// A configured route-extraction pipeline.
#[derive(Debug, Clone)]
pub struct RoutePipeline {
    config: PipelineConfig,
}

impl RoutePipeline {
    /// Validate `config` and build a pipeline.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every pure stage.
    ///
    /// No road matcher is available here, so an enabled snap stage is
    /// skipped with a warning.
    pub fn run(&self, records: Vec<RawRecord>) -> PipelineOutput {
        let mut run = self.prepare(records);
        if self.config.snap.enabled {
            run.log.warn(
                Stage::Snap,
                "Snap enabled but no road matcher supplied, skipping".to_string(),
            );
        }
        self.finish(run)
    }

    /// Run the pipeline with road snapping through `matcher`.
    ///
    /// The snap stage runs only when `snap.enabled` is set. Fails only with
    /// [`RouteSkeletonError::Cancelled`] when `cancel` fires while snapping.
    pub async fn run_with_road_matcher<M: RoadMatcher>(
        &self,
        records: Vec<RawRecord>,
        matcher: &M,
        cancel: &CancelSignal,
    ) -> Result<PipelineOutput> {
        let mut run = self.prepare(records);

        if self.config.snap.enabled {
            let snapped = snap_to_road(&run.points, matcher, &self.config.snap, cancel).await?;
            let stats = snapped.stats.clone();
            if snapped.points.is_empty() {
                run.log.warn(
                    Stage::Snap,
                    format!(
                        "No chunk matched ({} failed, {} timed out); keeping {} unsnapped points",
                        stats.failed_chunks,
                        stats.timed_out_chunks,
                        run.points.len()
                    ),
                );
            } else {
                run.log.push(
                    Stage::Snap,
                    format!(
                        "Snapped {} points to {} road points ({}/{} chunks matched)",
                        run.points.len(),
                        snapped.points.len(),
                        stats.matched_chunks,
                        stats.chunk_count
                    ),
                );
                run.points = snapped.points;
            }
            run.metrics.snap = Some(stats);
        }

        Ok(self.finish(run))
    }

    /// Stages 1-5: records to route points.
    fn prepare(&self, records: Vec<RawRecord>) -> PartialRun {
        let started = Instant::now();
        let mut log = PipelineLog::default();
        let mut metrics = PipelineMetrics::default();

        // === Clean ===
        let input_count = records.len();
        let cleaned = clean_records(records, &self.config.clean);
        metrics.cleaning = CleaningMetrics {
            input_count,
            output_count: cleaned.records.len(),
            rejected: cleaned.rejected,
        };
        log.push(
            Stage::Clean,
            format!(
                "{} of {} records kept ({} bad timestamp, {} bad coordinates, {} over speed)",
                cleaned.records.len(),
                input_count,
                cleaned.rejected.timestamp,
                cleaned.rejected.coords,
                cleaned.rejected.speed
            ),
        );

        // === Segment ===
        let vehicle_count = count_vehicles(&cleaned.records);
        let segments = segment_trips(cleaned.records, &self.config.segmentation);
        metrics.segmentation = SegmentationMetrics {
            vehicle_count,
            segment_count: segments.len(),
            total_points: segments.iter().map(|s| s.len()).sum(),
        };
        log.push(
            Stage::Segmentation,
            format!(
                "{} trip segments from {} vehicles",
                segments.len(),
                vehicle_count
            ),
        );

        // === Direction ===
        let direction = cluster_by_direction(segments, &self.config.direction);
        metrics.direction = DirectionMetrics {
            cluster_centers: direction.clusters.iter().map(|c| c.center).collect(),
            cluster_sizes: direction
                .clusters
                .iter()
                .map(|c| c.member_indices.len())
                .collect(),
            selected_cluster: direction.selected_cluster,
            selected_count: direction.selected.len(),
            mean_heading: direction.mean_heading,
            dominant_ratio: direction.dominant_ratio,
            confident: direction.confident,
        };
        let message = format!(
            "Dominant direction {:.1} deg with {} segments (ratio {:.2})",
            direction.mean_heading,
            direction.selected.len(),
            direction.dominant_ratio
        );
        if direction.confident {
            log.push(Stage::Direction, message);
        } else {
            log.warn(Stage::Direction, format!("{}, below confidence threshold", message));
        }

        // === Route filter ===
        let input_segments = direction.selected.len();
        let filtered = filter_by_route_consistency(direction.selected, &self.config.route_filter);
        metrics.route_filter = RouteFilterMetrics {
            input_segments,
            cluster_count: filtered.cluster_count,
            cluster_sizes: filtered.cluster_sizes.clone(),
            dominant_count: filtered.dominant.len(),
            rejected_count: filtered.rejected.len(),
            noise_count: filtered.noise_count,
        };
        log.push(
            Stage::RouteFilter,
            format!(
                "{} route clusters, dominant keeps {} of {} segments",
                filtered.cluster_count,
                filtered.dominant.len(),
                input_segments
            ),
        );

        // === Route builder ===
        let route = build_route(filtered.dominant);
        metrics.route = route.stats;
        log.push(
            Stage::RouteBuilder,
            format!(
                "Route from the largest segment: {} points ({} after dedup)",
                route.stats.total_points, route.stats.deduplicated_points
            ),
        );

        PartialRun {
            points: route.points.iter().map(GpsRecord::point).collect(),
            metrics,
            log,
            started,
        }
    }

    /// Stages 7-8: route points to skeleton and stops.
    fn finish(&self, run: PartialRun) -> PipelineOutput {
        let PartialRun {
            points,
            mut metrics,
            mut log,
            started,
        } = run;

        // === Simplify ===
        let simplified = simplify_route(&points, &self.config.simplify);
        metrics.simplify = SimplifyMetrics {
            input_points: points.len(),
            output_points: simplified.len(),
        };
        log.push(
            Stage::Simplify,
            format!("{} -> {} points", points.len(), simplified.len()),
        );

        // === Skeleton ===
        let route = compute_route_skeleton(&simplified, &self.config.skeleton);
        let total_distance = route.total_distance();
        metrics.skeleton = SkeletonMetrics {
            skeleton_points: route.skeleton.len(),
            heading_filtered_points: simplified.len() - route.skeleton.len(),
            virtual_stop_count: route.virtual_stops.len(),
            total_distance_m: total_distance,
            total_distance_km: total_distance / 1000.0,
        };
        log.push(
            Stage::Skeleton,
            format!(
                "{} skeleton points, {} virtual stops, {:.2} km",
                route.skeleton.len(),
                route.virtual_stops.len(),
                total_distance / 1000.0
            ),
        );

        info!(
            "[Pipeline] Completed in {:.2}s",
            started.elapsed().as_secs_f64()
        );

        PipelineOutput {
            route,
            pipeline: metrics,
            log: log.entries,
        }
    }
}

/// Distinct vehicles in records sorted by vehicle id.
fn count_vehicles(records: &[GpsRecord]) -> usize {
    if records.is_empty() {
        return 0;
    }
    1 + records
        .windows(2)
        .filter(|w| w[0].vehicle_id != w[1].vehicle_id)
        .count()
}
