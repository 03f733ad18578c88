//! Route-consistency filtering with density clustering.
//!
//! A DBSCAN variant over trip segments where two segments are neighbours
//! only if their centroids are within `eps` meters AND their bearings are
//! within `bearing_threshold` degrees. The largest cluster is taken as the
//! real route; other clusters and noise are rejected.
//!
//! ## Neighbour search
//! Centroids are indexed in an R-tree as 3D points on an Earth-sized sphere.
//! Straight-line (chord) distance never exceeds great-circle distance, so a
//! chord query of radius `eps` returns a superset of the true neighbours,
//! which are then confirmed with the haversine distance. Neighbour lists are
//! sorted by segment index, so results match a brute-force scan exactly.

use std::collections::VecDeque;

use log::{debug, info};
use rstar::primitives::GeomWithData;
use rstar::RTree;
#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::config::RouteFilterConfig;
use crate::geo_utils::{angular_distance, haversine_distance, to_cartesian};
use crate::segmentation::Segment;
use crate::selection::largest_by;

/// Extra chord radius (meters) absorbing floating error in the Cartesian
/// projection. Candidates are re-checked exactly.
const CHORD_SLACK_METERS: f64 = 1.0;

type IndexedCentroid = GeomWithData<[f64; 3], usize>;

/// Output of [`filter_by_route_consistency`].
#[derive(Debug, Clone, Default)]
pub struct RouteFilterResult {
    /// Members of the largest cluster, in input order
    pub dominant: Vec<Segment>,
    /// Everything else (smaller clusters and noise), in input order
    pub rejected: Vec<Segment>,
    /// Number of clusters found
    pub cluster_count: usize,
    /// Size of every cluster, in discovery order
    pub cluster_sizes: Vec<usize>,
    /// Segments not absorbed by any cluster
    pub noise_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Label {
    Unvisited,
    Noise,
    Cluster(usize),
}

/// Keep the segments of the densest consistent route.
pub fn filter_by_route_consistency(
    segments: Vec<Segment>,
    config: &RouteFilterConfig,
) -> RouteFilterResult {
    let labels = dbscan(&segments, config);

    let cluster_count = labels
        .iter()
        .filter_map(|l| match l {
            Label::Cluster(id) => Some(id + 1),
            _ => None,
        })
        .max()
        .unwrap_or(0);
    let mut cluster_sizes = vec![0usize; cluster_count];
    for label in &labels {
        if let Label::Cluster(id) = label {
            cluster_sizes[*id] += 1;
        }
    }
    let noise_count = labels.iter().filter(|l| **l == Label::Noise).count();

    let dominant_id = largest_by(&cluster_sizes, |s| *s);

    let mut dominant = Vec::new();
    let mut rejected = Vec::new();
    for (segment, label) in segments.into_iter().zip(labels) {
        match (label, dominant_id) {
            (Label::Cluster(id), Some(best)) if id == best => dominant.push(segment),
            _ => rejected.push(segment),
        }
    }

    info!(
        "[RouteFilter] {} clusters {:?}, dominant has {} segments, {} rejected ({} noise)",
        cluster_count,
        cluster_sizes,
        dominant.len(),
        rejected.len(),
        noise_count
    );

    RouteFilterResult {
        dominant,
        rejected,
        cluster_count,
        cluster_sizes,
        noise_count,
    }
}

/// Label every segment with a cluster id or as noise.
///
/// Clusters are numbered in discovery order (by lowest core index). A noise
/// segment reached from a core segment joins that cluster as a border
/// member but never expands it.
fn dbscan(segments: &[Segment], config: &RouteFilterConfig) -> Vec<Label> {
    let neighbors = neighbor_lists(segments, config);
    let mut labels = vec![Label::Unvisited; segments.len()];
    let mut next_cluster = 0usize;

    for i in 0..segments.len() {
        if labels[i] != Label::Unvisited {
            continue;
        }
        if neighbors[i].len() < config.min_pts {
            labels[i] = Label::Noise;
            continue;
        }

        let cluster = next_cluster;
        next_cluster += 1;
        labels[i] = Label::Cluster(cluster);

        let mut queue: VecDeque<usize> = neighbors[i].iter().copied().collect();
        while let Some(current) = queue.pop_front() {
            match labels[current] {
                Label::Noise => {
                    labels[current] = Label::Cluster(cluster);
                    continue;
                }
                Label::Cluster(_) => continue,
                Label::Unvisited => {}
            }

            labels[current] = Label::Cluster(cluster);
            if neighbors[current].len() >= config.min_pts {
                queue.extend(neighbors[current].iter().copied());
            }
        }
        debug!("[RouteFilter] Cluster {} seeded by segment {}", cluster, i);
    }

    labels
}

/// Neighbours of every segment (excluding itself), ascending by index.
fn neighbor_lists(segments: &[Segment], config: &RouteFilterConfig) -> Vec<Vec<usize>> {
    let entries: Vec<IndexedCentroid> = segments
        .iter()
        .enumerate()
        .map(|(i, s)| GeomWithData::new(to_cartesian(&s.centroid()), i))
        .collect();
    let tree = RTree::bulk_load(entries);
    let radius = config.eps + CHORD_SLACK_METERS;
    let radius_sq = radius * radius;

    let query = |i: usize| -> Vec<usize> {
        let segment = &segments[i];
        let center = segment.centroid();
        let mut found: Vec<usize> = tree
            .locate_within_distance(to_cartesian(&center), radius_sq)
            .map(|entry| entry.data)
            .filter(|&j| j != i)
            .filter(|&j| {
                let other = &segments[j];
                haversine_distance(&center, &other.centroid()) <= config.eps
                    && angular_distance(segment.bearing, other.bearing) <= config.bearing_threshold
            })
            .collect();
        found.sort_unstable();
        found
    };

    #[cfg(feature = "parallel")]
    let lists: Vec<Vec<usize>> = (0..segments.len()).into_par_iter().map(query).collect();

    #[cfg(not(feature = "parallel"))]
    let lists: Vec<Vec<usize>> = (0..segments.len()).map(query).collect();

    lists
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GpsRecord;
    use chrono::NaiveDate;

    const METERS_PER_DEG_LAT: f64 = 111_194.93;

    fn segment_at(north_m: f64, bearing: f64) -> Segment {
        let ts = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        let lat = 41.0 + north_m / METERS_PER_DEG_LAT;
        Segment {
            vehicle_id: format!("bus-{}", north_m),
            points: vec![GpsRecord {
                vehicle_id: "bus".to_string(),
                latitude: lat,
                longitude: 29.0,
                timestamp: ts,
                speed: 0.0,
            }],
            mean_lat: lat,
            mean_lon: 29.0,
            bearing,
            total_distance: 1000.0,
        }
    }

    fn brute_force_neighbors(segments: &[Segment], config: &RouteFilterConfig) -> Vec<Vec<usize>> {
        (0..segments.len())
            .map(|i| {
                (0..segments.len())
                    .filter(|&j| j != i)
                    .filter(|&j| {
                        haversine_distance(&segments[i].centroid(), &segments[j].centroid())
                            <= config.eps
                            && angular_distance(segments[i].bearing, segments[j].bearing)
                                <= config.bearing_threshold
                    })
                    .collect()
            })
            .collect()
    }

    #[test]
    fn test_dense_group_wins_and_outlier_rejected() {
        let mut segments: Vec<Segment> = (0..6).map(|i| segment_at(i as f64 * 20.0, 5.0)).collect();
        // Far away, same heading
        segments.push(segment_at(5_000.0, 5.0));

        let result = filter_by_route_consistency(segments, &RouteFilterConfig::default());
        assert_eq!(result.cluster_count, 1);
        assert_eq!(result.dominant.len(), 6);
        assert_eq!(result.rejected.len(), 1);
        assert_eq!(result.noise_count, 1);
        assert_eq!(result.rejected[0].vehicle_id, "bus-5000");
    }

    #[test]
    fn test_bearing_disagreement_breaks_neighbourhood() {
        // Co-located but heading the other way: not a neighbour of anyone
        let mut segments: Vec<Segment> = (0..6).map(|i| segment_at(i as f64 * 10.0, 0.0)).collect();
        segments.push(segment_at(25.0, 40.0));

        let result = filter_by_route_consistency(segments, &RouteFilterConfig::default());
        assert_eq!(result.dominant.len(), 6);
        assert_eq!(result.rejected.len(), 1);
        assert_eq!(result.rejected[0].bearing, 40.0);
    }

    #[test]
    fn test_noise_absorbed_as_border_point() {
        // Segment 0 sits 375m from the group: it only neighbours the nearest
        // member, so it is noise when visited first, then absorbed.
        let mut segments = vec![segment_at(-375.0, 0.0)];
        segments.extend((0..6).map(|i| segment_at(i as f64 * 10.0, 0.0)));

        let result = filter_by_route_consistency(segments, &RouteFilterConfig::default());
        assert_eq!(result.cluster_count, 1);
        assert_eq!(result.dominant.len(), 7);
        assert_eq!(result.noise_count, 0);
    }

    #[test]
    fn test_largest_of_two_clusters() {
        let mut segments: Vec<Segment> = (0..6).map(|i| segment_at(i as f64 * 10.0, 0.0)).collect();
        segments.extend((0..8).map(|i| segment_at(3_000.0 + i as f64 * 10.0, 0.0)));

        let result = filter_by_route_consistency(segments, &RouteFilterConfig::default());
        assert_eq!(result.cluster_count, 2);
        assert_eq!(result.cluster_sizes, vec![6, 8]);
        assert_eq!(result.dominant.len(), 8);
        assert_eq!(result.rejected.len(), 6);
    }

    #[test]
    fn test_no_clusters_rejects_everything() {
        let segments: Vec<Segment> = (0..3).map(|i| segment_at(i as f64 * 10.0, 0.0)).collect();
        let result = filter_by_route_consistency(segments, &RouteFilterConfig::default());
        assert_eq!(result.cluster_count, 0);
        assert!(result.dominant.is_empty());
        assert_eq!(result.rejected.len(), 3);
        assert_eq!(result.noise_count, 3);
    }

    #[test]
    fn test_empty_input() {
        let result = filter_by_route_consistency(Vec::new(), &RouteFilterConfig::default());
        assert_eq!(result.cluster_count, 0);
        assert!(result.dominant.is_empty());
        assert!(result.rejected.is_empty());
    }

    #[test]
    fn test_index_matches_brute_force() {
        let config = RouteFilterConfig::default();
        let segments: Vec<Segment> = (0..40)
            .map(|i| segment_at((i * 37 % 23) as f64 * 45.0, (i * 11 % 60) as f64))
            .collect();
        assert_eq!(
            neighbor_lists(&segments, &config),
            brute_force_neighbors(&segments, &config)
        );
    }
}
