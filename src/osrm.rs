//! OSRM map-matching client.
//!
//! Implements [`RoadMatcher`] against the OSRM `/match` service:
//!
//! ```text
//! GET {base}/match/v1/{profile}/{lon},{lat};{lon},{lat};...?geometries=geojson&overview=full
//! ```
//!
//! Only the first matching of a response is used. A response whose `code`
//! is not `Ok`, or that carries no matchings, is an error for that chunk.

use std::time::Duration;

use log::debug;
use reqwest::Client;
use serde::Deserialize;

use crate::config::SnapConfig;
use crate::error::{Result, RouteSkeletonError};
use crate::snap::{MatchedGeometry, RoadMatcher};
use crate::GpsPoint;

/// Public OSRM demo server.
pub const DEFAULT_OSRM_URL: &str = "https://router.project-osrm.org";

/// Transport timeout of [`OsrmMatcher::public`].
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Added to `snap.timeoutSecs` so the per-chunk timeout fires before the
/// HTTP client gives up.
const SNAP_TIMEOUT_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct MatchResponse {
    code: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    matchings: Vec<Matching>,
}

#[derive(Debug, Deserialize)]
struct Matching {
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    distance: f64,
    #[serde(default)]
    duration: f64,
    geometry: LineGeometry,
}

/// GeoJSON LineString; positions are `[lon, lat]`.
#[derive(Debug, Deserialize)]
struct LineGeometry {
    coordinates: Vec<[f64; 2]>,
}

/// HTTP road matcher backed by an OSRM server.
#[derive(Debug, Clone)]
pub struct OsrmMatcher {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl OsrmMatcher {
    /// Create a matcher for the OSRM server at `base_url` whose requests give
    /// up after `timeout`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            RouteSkeletonError::road_match(format!("Failed to create HTTP client: {}", e), None)
        })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    /// Matcher whose transport timeout outlasts `config.timeout_secs`, so a
    /// slow chunk is counted as timed out rather than failed.
    pub fn for_snap(base_url: &str, config: &SnapConfig) -> Result<Self> {
        Self::new(
            base_url,
            Duration::from_secs(config.timeout_secs) + SNAP_TIMEOUT_GRACE,
        )
    }

    /// Matcher for the public demo server.
    pub fn public() -> Result<Self> {
        Self::new(DEFAULT_OSRM_URL, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn match_url(&self, chunk: &[GpsPoint], profile: &str) -> String {
        let coords = chunk
            .iter()
            .map(|p| format!("{},{}", p.longitude, p.latitude))
            .collect::<Vec<_>>()
            .join(";");
        format!(
            "{}/match/v1/{}/{}?geometries=geojson&overview=full",
            self.base_url, profile, coords
        )
    }

    async fn request(&self, chunk: &[GpsPoint], profile: &str) -> Result<MatchedGeometry> {
        let url = self.match_url(chunk, profile);
        debug!("[OsrmMatcher] GET {} ({} points)", self.base_url, chunk.len());

        let response = self.client.get(&url).send().await.map_err(|e| {
            RouteSkeletonError::road_match(
                format!("Request error: {}", e),
                e.status().map(|s| s.as_u16()),
            )
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RouteSkeletonError::road_match(
                format!("HTTP {}", status),
                Some(status.as_u16()),
            ));
        }

        let body: MatchResponse = response.json().await.map_err(|e| {
            RouteSkeletonError::road_match(format!("Parse error: {}", e), Some(status.as_u16()))
        })?;
        into_geometry(body)
    }
}

impl RoadMatcher for OsrmMatcher {
    async fn match_chunk(&self, chunk: &[GpsPoint], profile: &str) -> Result<MatchedGeometry> {
        self.request(chunk, profile).await
    }
}

fn into_geometry(body: MatchResponse) -> Result<MatchedGeometry> {
    if body.code != "Ok" {
        let detail = body.message.unwrap_or_default();
        return Err(RouteSkeletonError::road_match(
            format!("{} {}", body.code, detail).trim_end().to_string(),
            None,
        ));
    }

    let Some(matching) = body.matchings.into_iter().next() else {
        return Err(RouteSkeletonError::road_match("No matchings returned", None));
    };

    Ok(MatchedGeometry {
        coordinates: matching
            .geometry
            .coordinates
            .into_iter()
            .map(|[lon, lat]| GpsPoint::new(lat, lon))
            .collect(),
        confidence: matching.confidence,
        distance: matching.distance,
        duration: matching.duration,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<MatchedGeometry> {
        into_geometry(serde_json::from_str(json).unwrap())
    }

    #[test]
    fn test_match_url() {
        let matcher = OsrmMatcher::new("http://localhost:5000/", DEFAULT_REQUEST_TIMEOUT).unwrap();
        let chunk = [GpsPoint::new(41.01, 28.97), GpsPoint::new(41.02, 28.98)];
        assert_eq!(
            matcher.match_url(&chunk, "driving"),
            "http://localhost:5000/match/v1/driving/\
             28.97,41.01;28.98,41.02?geometries=geojson&overview=full"
        );
    }

    #[test]
    fn test_client_timeout_outlasts_snap_timeout() {
        let config = SnapConfig {
            timeout_secs: 90,
            ..SnapConfig::default()
        };
        let matcher = OsrmMatcher::for_snap(DEFAULT_OSRM_URL, &config).unwrap();
        assert_eq!(matcher.timeout(), Duration::from_secs(95));
        assert!(matcher.timeout() > Duration::from_secs(config.timeout_secs));

        assert_eq!(OsrmMatcher::public().unwrap().timeout(), DEFAULT_REQUEST_TIMEOUT);
    }

    #[test]
    fn test_first_matching_used() {
        let geometry = parse(
            r#"{
                "code": "Ok",
                "matchings": [
                    {"confidence": 0.87, "distance": 1520.4, "duration": 180.2,
                     "geometry": {"type": "LineString",
                                  "coordinates": [[28.97, 41.01], [28.98, 41.02]]}},
                    {"confidence": 0.1, "distance": 1.0, "duration": 1.0,
                     "geometry": {"type": "LineString", "coordinates": [[0.0, 0.0]]}}
                ],
                "tracepoints": []
            }"#,
        )
        .unwrap();

        assert_eq!(
            geometry.coordinates,
            vec![GpsPoint::new(41.01, 28.97), GpsPoint::new(41.02, 28.98)]
        );
        assert_eq!(geometry.confidence, 0.87);
        assert_eq!(geometry.distance, 1520.4);
        assert_eq!(geometry.duration, 180.2);
    }

    #[test]
    fn test_non_ok_code_is_error() {
        let result = parse(r#"{"code": "NoMatch", "message": "Could not match the trace."}"#);
        match result {
            Err(RouteSkeletonError::RoadMatch { message, .. }) => {
                assert_eq!(message, "NoMatch Could not match the trace.")
            }
            other => panic!("expected RoadMatch, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_matchings_is_error() {
        assert!(parse(r#"{"code": "Ok", "matchings": []}"#).is_err());
    }
}
