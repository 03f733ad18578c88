//! Road snapping through an injected map-matching service.
//!
//! The route is split into chunks of `max_points_per_request` points. Each
//! chunk is sent to a [`RoadMatcher`] under its own timeout; matched
//! geometries are concatenated in chunk order. A chunk that fails or times
//! out is logged and skipped, so a partial result is still a valid result.
//!
//! Chunks may be in flight concurrently (`concurrency`), but results are
//! always reassembled by chunk index. An external [`CancelSignal`] aborts
//! every in-flight request and turns the whole call into
//! [`RouteSkeletonError::Cancelled`].

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

use crate::config::SnapConfig;
use crate::error::{Result, RouteSkeletonError};
use crate::GpsPoint;

/// Geometry returned by a map-matching service for one chunk.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MatchedGeometry {
    /// Matched positions in travel order
    pub coordinates: Vec<GpsPoint>,
    /// Service-reported confidence in [0, 1]
    pub confidence: f64,
    /// Matched distance in meters
    pub distance: f64,
    /// Matched travel time in seconds
    pub duration: f64,
}

/// Summary of the first successfully matched chunk.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchInfo {
    pub confidence: f64,
    pub distance: f64,
    pub duration: f64,
}

/// A map-matching capability.
///
/// Implementations turn an ordered chunk of points into matched geometry or
/// an error. Timeouts and cancellation are enforced by [`snap_to_road`], so
/// implementations only need to perform the request.
pub trait RoadMatcher: Send + Sync {
    fn match_chunk(
        &self,
        chunk: &[GpsPoint],
        profile: &str,
    ) -> impl Future<Output = Result<MatchedGeometry>> + Send;
}

/// Shared, cloneable cancellation flag.
///
/// Cancelling wakes every task waiting on [`CancelSignal::cancelled`].
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    flag: AtomicBool,
    notify: Notify,
}

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.flag.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        loop {
            // Register before checking the flag so a concurrent cancel is not missed
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Chunk bookkeeping of one snap run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapStats {
    pub input_points: usize,
    pub snapped_points: usize,
    pub chunk_count: usize,
    pub matched_chunks: usize,
    pub failed_chunks: usize,
    pub timed_out_chunks: usize,
    /// From the first chunk that matched, if any
    pub match_info: Option<MatchInfo>,
}

/// Output of [`snap_to_road`].
#[derive(Debug, Clone, Default)]
pub struct SnapResult {
    /// Concatenated matched geometry; empty when no chunk matched
    pub points: Vec<GpsPoint>,
    pub stats: SnapStats,
}

enum ChunkOutcome {
    Matched(MatchedGeometry),
    Failed,
    TimedOut,
    Cancelled,
}

/// Snap route points to the road network.
///
/// Returns `Err(Cancelled)` if `cancel` fires before every chunk has
/// finished; any other per-chunk failure only reduces the result.
pub async fn snap_to_road<M: RoadMatcher>(
    points: &[GpsPoint],
    matcher: &M,
    config: &SnapConfig,
    cancel: &CancelSignal,
) -> Result<SnapResult> {
    let chunk_size = config.max_points_per_request.max(1);
    let limit = Duration::from_secs(config.timeout_secs);
    let chunk_count = points.len().div_ceil(chunk_size);

    info!(
        "[RoadSnap] Matching {} points in {} chunks ({} in flight, {}s timeout)",
        points.len(),
        chunk_count,
        config.concurrency.max(1),
        config.timeout_secs
    );
    let start = Instant::now();

    let outcomes: Vec<ChunkOutcome> = stream::iter(points.chunks(chunk_size).enumerate())
        .map(|(index, chunk)| match_one(matcher, index, chunk, &config.profile, limit, cancel))
        .buffered(config.concurrency.max(1))
        .collect()
        .await;

    if cancel.is_cancelled() || outcomes.iter().any(|o| matches!(o, ChunkOutcome::Cancelled)) {
        warn!("[RoadSnap] Cancelled after {:.2}s", start.elapsed().as_secs_f64());
        return Err(RouteSkeletonError::Cancelled);
    }

    let mut snapped = Vec::new();
    let mut stats = SnapStats {
        input_points: points.len(),
        chunk_count,
        ..SnapStats::default()
    };

    for outcome in outcomes {
        match outcome {
            ChunkOutcome::Matched(geometry) => {
                stats.matched_chunks += 1;
                if stats.match_info.is_none() {
                    stats.match_info = Some(MatchInfo {
                        confidence: geometry.confidence,
                        distance: geometry.distance,
                        duration: geometry.duration,
                    });
                }
                snapped.extend(geometry.coordinates);
            }
            ChunkOutcome::Failed => stats.failed_chunks += 1,
            ChunkOutcome::TimedOut => stats.timed_out_chunks += 1,
            ChunkOutcome::Cancelled => {}
        }
    }
    stats.snapped_points = snapped.len();

    info!(
        "[RoadSnap] {}/{} chunks matched ({} failed, {} timed out), {} points in {:.2}s",
        stats.matched_chunks,
        chunk_count,
        stats.failed_chunks,
        stats.timed_out_chunks,
        snapped.len(),
        start.elapsed().as_secs_f64()
    );

    Ok(SnapResult {
        points: snapped,
        stats,
    })
}

async fn match_one<M: RoadMatcher>(
    matcher: &M,
    index: usize,
    chunk: &[GpsPoint],
    profile: &str,
    limit: Duration,
    cancel: &CancelSignal,
) -> ChunkOutcome {
    if cancel.is_cancelled() {
        return ChunkOutcome::Cancelled;
    }

    tokio::select! {
        biased;
        _ = cancel.cancelled() => ChunkOutcome::Cancelled,
        result = tokio::time::timeout(limit, matcher.match_chunk(chunk, profile)) => match result {
            Ok(Ok(geometry)) => ChunkOutcome::Matched(geometry),
            Ok(Err(e)) => {
                warn!("[RoadSnap] Chunk {} ({} points) failed: {}", index, chunk.len(), e);
                ChunkOutcome::Failed
            }
            Err(_) => {
                warn!("[RoadSnap] Chunk {} timed out after {:?}", index, limit);
                ChunkOutcome::TimedOut
            }
        },
    }
}
