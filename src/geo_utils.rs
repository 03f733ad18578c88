//! Geographic utilities.
//!
//! Pure functions shared by every pipeline stage: great-circle distance,
//! initial bearing and circular statistics over headings. No other module
//! does its own trigonometry on coordinates.
//!
//! Degree/radian conversions are written as `x * PI / 180.0` rather than
//! `to_radians()` so results are reproducible across implementations that
//! use the same expression order.

use std::f64::consts::PI;

use crate::GpsPoint;

/// Mean Earth radius used by the haversine formula, in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

#[inline]
fn deg_to_rad(degrees: f64) -> f64 {
    (degrees * PI) / 180.0
}

#[inline]
fn rad_to_deg(radians: f64) -> f64 {
    (radians * 180.0) / PI
}

/// Map any angle in degrees onto `[0, 360)`.
#[inline]
fn normalize_degrees(degrees: f64) -> f64 {
    (degrees + 360.0) % 360.0
}

/// Great-circle distance between two points in meters.
///
/// # Example
/// ```
/// use route_skeleton::GpsPoint;
/// use route_skeleton::geo_utils::haversine_distance;
///
/// let london = GpsPoint::new(51.5074, -0.1278);
/// let paris = GpsPoint::new(48.8566, 2.3522);
/// let d = haversine_distance(&london, &paris);
/// assert!((d - 343_500.0).abs() < 5_000.0);
/// ```
pub fn haversine_distance(p1: &GpsPoint, p2: &GpsPoint) -> f64 {
    let phi1 = deg_to_rad(p1.latitude);
    let phi2 = deg_to_rad(p2.latitude);
    let delta_phi = deg_to_rad(p2.latitude - p1.latitude);
    let delta_lambda = deg_to_rad(p2.longitude - p1.longitude);

    let a = (delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_METERS * c
}

/// Initial great-circle bearing from `from` toward `to`, in degrees `[0, 360)`.
///
/// 0 is north, 90 is east.
pub fn bearing(from: &GpsPoint, to: &GpsPoint) -> f64 {
    let phi1 = deg_to_rad(from.latitude);
    let phi2 = deg_to_rad(to.latitude);
    let delta_lambda = deg_to_rad(to.longitude - from.longitude);

    let y = delta_lambda.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * delta_lambda.cos();

    normalize_degrees(rad_to_deg(y.atan2(x)))
}

/// Circular mean of a set of headings in degrees, in `[0, 360)`.
///
/// Averages the unit vectors `(sin θ, cos θ)` so that 350° and 10° average
/// to 0° rather than 180°. Returns 0 for an empty slice.
pub fn circular_mean(angles: &[f64]) -> f64 {
    if angles.is_empty() {
        return 0.0;
    }

    let (sum_sin, sum_cos) = angles.iter().fold((0.0, 0.0), |(s, c), &a| {
        let rad = deg_to_rad(a);
        (s + rad.sin(), c + rad.cos())
    });
    let n = angles.len() as f64;

    normalize_degrees(rad_to_deg((sum_sin / n).atan2(sum_cos / n)))
}

/// Smallest angle between two headings, in degrees `[0, 180]`.
pub fn angular_distance(a: f64, b: f64) -> f64 {
    let diff = (a - b).abs();
    diff.min(360.0 - diff)
}

/// Total length of a polyline in meters.
pub fn polyline_length(points: &[GpsPoint]) -> f64 {
    points
        .windows(2)
        .map(|w| haversine_distance(&w[0], &w[1]))
        .sum()
}

/// Arithmetic mean of latitudes and longitudes.
///
/// Not a geodesic centroid; adequate for the short, local trips the
/// pipeline clusters. Returns (0, 0) for an empty slice.
pub fn arithmetic_centroid(points: &[GpsPoint]) -> GpsPoint {
    if points.is_empty() {
        return GpsPoint::new(0.0, 0.0);
    }
    let n = points.len() as f64;
    let sum_lat: f64 = points.iter().map(|p| p.latitude).sum();
    let sum_lng: f64 = points.iter().map(|p| p.longitude).sum();
    GpsPoint::new(sum_lat / n, sum_lng / n)
}

/// Point on the unit sphere scaled to the Earth radius (meters).
///
/// Chord length between two such points never exceeds the haversine
/// distance, which makes it a safe pre-filter for radius queries.
pub fn to_cartesian(point: &GpsPoint) -> [f64; 3] {
    let phi = deg_to_rad(point.latitude);
    let lambda = deg_to_rad(point.longitude);
    [
        EARTH_RADIUS_METERS * phi.cos() * lambda.cos(),
        EARTH_RADIUS_METERS * phi.cos() * lambda.sin(),
        EARTH_RADIUS_METERS * phi.sin(),
    ]
}
