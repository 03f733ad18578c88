//! Direction classification with circular k-means.
//!
//! Trip bearings live on a circle, so centers are circular means and
//! membership uses angular distance. The run is a fixed number of
//! iterations with no early exit: identical input always produces
//! identical clusters.
//!
//! ## Algorithm
//! 1. Seed `k` centers evenly around the circle (`i * 360 / k`)
//! 2. For `iterations` rounds: assign each bearing to its nearest center,
//!    then move every non-empty cluster's center to the circular mean of
//!    its members (empty clusters keep their center)
//! 3. Assign once more with the final centers
//! 4. Select the cluster with the most members (lowest index on ties)

use log::info;
use serde::{Deserialize, Serialize};

use crate::config::DirectionConfig;
use crate::geo_utils::{angular_distance, circular_mean};
use crate::segmentation::Segment;
use crate::selection::largest_by;

/// One circular k-means cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AngularCluster {
    /// Representative heading in degrees
    pub center: f64,
    /// Indices into the classified segment list, ascending
    pub member_indices: Vec<usize>,
}

/// Output of [`cluster_by_direction`].
#[derive(Debug, Clone)]
pub struct DirectionResult {
    /// All `k` clusters in center order
    pub clusters: Vec<AngularCluster>,
    /// Index of the selected (dominant) cluster in `clusters`
    pub selected_cluster: usize,
    /// Segments of the selected cluster, in input order
    pub selected: Vec<Segment>,
    /// Center of the selected cluster
    pub mean_heading: f64,
    /// `selected.len() / total segments`, 0 for empty input
    pub dominant_ratio: f64,
    /// Advisory: `dominant_ratio >= dominant_threshold`
    pub confident: bool,
}

/// Cluster segment bearings and keep the dominant direction.
///
/// `config.k` must be at least 1 (checked by [`PipelineConfig::validate`]).
///
/// [`PipelineConfig::validate`]: crate::PipelineConfig::validate
pub fn cluster_by_direction(segments: Vec<Segment>, config: &DirectionConfig) -> DirectionResult {
    let bearings: Vec<f64> = segments.iter().map(|s| s.bearing).collect();
    let clusters = circular_kmeans(&bearings, config.k, config.iterations);

    let selected_cluster = largest_by(&clusters, |c| c.member_indices.len()).unwrap_or(0);
    let (mean_heading, members) = clusters
        .get(selected_cluster)
        .map(|c| (c.center, c.member_indices.clone()))
        .unwrap_or((0.0, Vec::new()));

    let total = segments.len();
    let dominant_ratio = if total == 0 {
        0.0
    } else {
        members.len() as f64 / total as f64
    };

    let mut member_flags = vec![false; total];
    for &idx in &members {
        member_flags[idx] = true;
    }
    let selected: Vec<Segment> = segments
        .into_iter()
        .zip(member_flags)
        .filter_map(|(segment, keep)| keep.then_some(segment))
        .collect();

    let confident = dominant_ratio >= config.dominant_threshold;
    info!(
        "[DirectionFilter] sizes {:?}, selected {} segments at {:.1} deg (ratio {:.2}{})",
        clusters
            .iter()
            .map(|c| c.member_indices.len())
            .collect::<Vec<_>>(),
        selected.len(),
        mean_heading,
        dominant_ratio,
        if confident { "" } else { ", low confidence" }
    );

    DirectionResult {
        clusters,
        selected_cluster,
        selected,
        mean_heading,
        dominant_ratio,
        confident,
    }
}

/// Fixed-iteration k-means over angles in degrees.
///
/// Always returns `k` clusters (some possibly empty).
pub fn circular_kmeans(angles: &[f64], k: usize, iterations: usize) -> Vec<AngularCluster> {
    if k == 0 {
        return Vec::new();
    }

    let mut centers: Vec<f64> = (0..k).map(|i| (360.0 / k as f64) * i as f64).collect();

    for _ in 0..iterations {
        let assignments = assign(angles, &centers);
        for (i, center) in centers.iter_mut().enumerate() {
            let members: Vec<f64> = angles
                .iter()
                .zip(&assignments)
                .filter(|&(_, &a)| a == i)
                .map(|(&angle, _)| angle)
                .collect();
            if !members.is_empty() {
                *center = circular_mean(&members);
            }
        }
    }

    let assignments = assign(angles, &centers);
    centers
        .into_iter()
        .enumerate()
        .map(|(i, center)| AngularCluster {
            center,
            member_indices: assignments
                .iter()
                .enumerate()
                .filter(|&(_, &a)| a == i)
                .map(|(idx, _)| idx)
                .collect(),
        })
        .collect()
}

/// Nearest center per angle; the first center wins on equal distance.
fn assign(angles: &[f64], centers: &[f64]) -> Vec<usize> {
    angles
        .iter()
        .map(|&angle| {
            let mut best = 0;
            let mut best_dist = f64::INFINITY;
            for (i, &center) in centers.iter().enumerate() {
                let d = angular_distance(angle, center);
                if d < best_dist {
                    best = i;
                    best_dist = d;
                }
            }
            best
        })
        .collect()
}
