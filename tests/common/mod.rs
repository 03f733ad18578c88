//! Deterministic synthetic fleet for integration tests.
//!
//! The standard scenario is one bus corridor running north from
//! (41.0, 29.0) in 30m steps, ten seconds apart:
//! - 8 northbound trips on the corridor (bus-n3 reports 70 pings, the rest 50)
//! - 3 southbound trips on the same corridor
//! - bus-n0 drives back south after a 30 minute break (a 40 ping trip)
//! - 2 northbound trips on a parallel street 5km east
//! - 12 malformed records: 5 without timestamp, 3 with NaN latitude,
//!   4 over the speed limit
//!
//! Lateral jitter of up to 3m is applied per ping from a fixed formula, so
//! every run produces identical records.

#![allow(dead_code)]

use chrono::{Duration, NaiveDate, NaiveDateTime};
use route_skeleton::RawRecord;

pub const METERS_PER_DEG_LAT: f64 = 111_194.93;
pub const CORRIDOR_LAT: f64 = 41.0;
pub const CORRIDOR_LON: f64 = 29.0;
pub const STEP_METERS: f64 = 30.0;

pub const NORTHBOUND_TRIPS: usize = 8;
pub const SOUTHBOUND_TRIPS: usize = 3;
pub const DETOUR_TRIPS: usize = 2;
pub const LONGEST_TRIP_POINTS: usize = 70;
pub const MISSING_TIMESTAMP: usize = 5;
pub const BAD_COORDS: usize = 3;
pub const OVER_SPEED: usize = 4;

/// Route pipeline logs through the test harness; `RUST_LOG=debug` shows
/// per-stage detail.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn t0() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 5, 1)
        .unwrap()
        .and_hms_opt(6, 0, 0)
        .unwrap()
}

fn meters_east_to_deg(m: f64) -> f64 {
    m / (METERS_PER_DEG_LAT * CORRIDOR_LAT.to_radians().cos())
}

/// Lateral offset in meters, in [-3, 3].
fn jitter(seed: usize, i: usize) -> f64 {
    ((i * 7919 + seed * 104_729) % 7) as f64 - 3.0
}

/// One trip along the corridor.
///
/// `north_start_m` is where the trip starts (meters north of the corridor
/// origin) and `direction` is +1 for northbound, -1 for southbound.
pub fn trip(
    vehicle: &str,
    seed: usize,
    start: NaiveDateTime,
    north_start_m: f64,
    direction: f64,
    east_offset_m: f64,
    count: usize,
) -> Vec<RawRecord> {
    (0..count)
        .map(|i| {
            let north = north_start_m + direction * i as f64 * STEP_METERS;
            let east = east_offset_m + jitter(seed, i);
            RawRecord {
                vehicle_id: Some(vehicle.to_string()),
                latitude: CORRIDOR_LAT + north / METERS_PER_DEG_LAT,
                longitude: CORRIDOR_LON + meters_east_to_deg(east),
                timestamp: Some(start + Duration::seconds(10 * i as i64)),
                speed: 30.0 + (i % 5) as f64,
            }
        })
        .collect()
}

fn malformed_records() -> Vec<RawRecord> {
    let mut records = Vec::new();
    for i in 0..MISSING_TIMESTAMP {
        records.push(RawRecord {
            vehicle_id: Some("bus-n1".to_string()),
            latitude: CORRIDOR_LAT,
            longitude: CORRIDOR_LON,
            timestamp: None,
            speed: i as f64,
        });
    }
    for i in 0..BAD_COORDS {
        records.push(RawRecord {
            vehicle_id: Some("bus-s0".to_string()),
            latitude: f64::NAN,
            longitude: CORRIDOR_LON,
            timestamp: Some(t0() + Duration::hours(5) + Duration::seconds(i as i64)),
            speed: 20.0,
        });
    }
    for i in 0..OVER_SPEED {
        records.push(RawRecord {
            vehicle_id: None,
            latitude: CORRIDOR_LAT,
            longitude: CORRIDOR_LON,
            timestamp: Some(t0() + Duration::hours(6) + Duration::seconds(i as i64)),
            speed: 150.0 + i as f64,
        });
    }
    records
}

/// The standard scenario, vehicles interleaved in input order.
pub fn standard_fleet() -> Vec<RawRecord> {
    let mut records = Vec::new();

    for v in 0..NORTHBOUND_TRIPS {
        let count = if v == 3 { LONGEST_TRIP_POINTS } else { 50 };
        let start = t0() + Duration::minutes(7 * v as i64);
        records.extend(trip(&format!("bus-n{}", v), v, start, 0.0, 1.0, 0.0, count));
    }

    // bus-n0 ends at 490s; back south 30 minutes later
    let return_start = t0() + Duration::seconds(490) + Duration::minutes(30);
    records.extend(trip("bus-n0", 20, return_start, 1470.0, -1.0, 0.0, 40));

    for v in 0..SOUTHBOUND_TRIPS {
        let start = t0() + Duration::minutes(5 + 9 * v as i64);
        records.extend(trip(&format!("bus-s{}", v), 30 + v, start, 1470.0, -1.0, 0.0, 50));
    }

    for v in 0..DETOUR_TRIPS {
        let start = t0() + Duration::minutes(11 * v as i64);
        records.extend(trip(&format!("bus-d{}", v), 40 + v, start, 0.0, 1.0, 5_000.0, 50));
    }

    records.extend(malformed_records());

    // Interleave deterministically so input order is not vehicle order
    let mut interleaved: Vec<(usize, RawRecord)> = records
        .into_iter()
        .enumerate()
        .map(|(i, r)| ((i * 37) % 101, r))
        .collect();
    interleaved.sort_by_key(|(key, _)| *key);
    interleaved.into_iter().map(|(_, r)| r).collect()
}

/// Total record count of the standard scenario.
pub fn standard_fleet_size() -> usize {
    (NORTHBOUND_TRIPS - 1) * 50
        + LONGEST_TRIP_POINTS
        + 40
        + SOUTHBOUND_TRIPS * 50
        + DETOUR_TRIPS * 50
        + MISSING_TIMESTAMP
        + BAD_COORDS
        + OVER_SPEED
}

/// Serialize records in the Turkish export layout (`;` separated, decimal
/// comma, day-first timestamps).
pub fn to_turkish_csv(records: &[RawRecord]) -> String {
    let mut out = String::from("Plaka;Enlem;Boylam;KonumZamani;Hiz\n");
    for r in records {
        let timestamp = r
            .timestamp
            .map(|t| t.format("%d/%m/%Y %H:%M:%S").to_string())
            .unwrap_or_default();
        out.push_str(&format!(
            "{};{};{};{};{}\n",
            r.vehicle_id.as_deref().unwrap_or(""),
            format!("{}", r.latitude).replace('.', ","),
            format!("{}", r.longitude).replace('.', ","),
            timestamp,
            format!("{}", r.speed).replace('.', ","),
        ));
    }
    out
}
