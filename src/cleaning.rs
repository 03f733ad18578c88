//! Record cleaning.
//!
//! Rejects structurally invalid pings and orders the survivors by vehicle,
//! then time. Malformed input only increments counters; nothing here fails.

use log::info;
use serde::{Deserialize, Serialize};

use crate::config::CleanConfig;
use crate::{GpsRecord, RawRecord};

/// Vehicle id given to records without one, so they sort as a regular id.
pub const UNKNOWN_VEHICLE: &str = "unknown";

/// Rejected record counts per reason. Reasons are mutually exclusive and
/// checked in field order: timestamp, then coordinates, then speed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectionCounts {
    pub timestamp: usize,
    pub coords: usize,
    pub speed: usize,
}

impl RejectionCounts {
    pub fn total(&self) -> usize {
        self.timestamp + self.coords + self.speed
    }
}

/// Output of [`clean_records`].
#[derive(Debug, Clone, Default)]
pub struct CleanResult {
    /// Surviving records sorted by `(vehicle_id, timestamp)`
    pub records: Vec<GpsRecord>,
    pub rejected: RejectionCounts,
}

/// Drop invalid records and sort the rest by vehicle and time.
///
/// The sort is stable, so records sharing vehicle and timestamp keep their
/// input order. Running this on its own output is a no-op.
pub fn clean_records(records: Vec<RawRecord>, config: &CleanConfig) -> CleanResult {
    let input_count = records.len();
    let mut rejected = RejectionCounts::default();
    let mut cleaned = Vec::with_capacity(input_count);

    for record in records {
        let Some(timestamp) = record.timestamp else {
            rejected.timestamp += 1;
            continue;
        };
        if !record.latitude.is_finite() || !record.longitude.is_finite() {
            rejected.coords += 1;
            continue;
        }
        if record.speed > config.max_speed {
            rejected.speed += 1;
            continue;
        }

        let vehicle_id = match record.vehicle_id {
            Some(id) if !id.is_empty() => id,
            _ => UNKNOWN_VEHICLE.to_string(),
        };

        cleaned.push(GpsRecord {
            vehicle_id,
            latitude: record.latitude,
            longitude: record.longitude,
            timestamp,
            speed: record.speed,
        });
    }

    cleaned.sort_by(|a, b| {
        a.vehicle_id
            .cmp(&b.vehicle_id)
            .then(a.timestamp.cmp(&b.timestamp))
    });

    info!(
        "[Cleaner] {} -> {} records (rejected: {} timestamp, {} coords, {} speed)",
        input_count,
        cleaned.len(),
        rejected.timestamp,
        rejected.coords,
        rejected.speed
    );

    CleanResult {
        records: cleaned,
        rejected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, NaiveDateTime};

    fn t(secs: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
            + Duration::seconds(secs)
    }

    fn raw(
        vehicle: Option<&str>,
        lat: f64,
        lon: f64,
        ts: Option<NaiveDateTime>,
        speed: f64,
    ) -> RawRecord {
        RawRecord {
            vehicle_id: vehicle.map(|v| v.to_string()),
            latitude: lat,
            longitude: lon,
            timestamp: ts,
            speed,
        }
    }

    fn messy_input() -> Vec<RawRecord> {
        vec![
            raw(Some("B"), 41.0, 29.0, Some(t(20)), 30.0),
            raw(Some("A"), 41.0, 29.0, Some(t(10)), 30.0),
            raw(Some("A"), 41.0, 29.0, None, 30.0),
            raw(Some("A"), f64::NAN, 29.0, Some(t(0)), 30.0),
            raw(Some("A"), 41.0, f64::INFINITY, Some(t(0)), 30.0),
            raw(Some("B"), 41.0, 29.0, Some(t(5)), 250.0),
            raw(Some("A"), 41.0, 29.0, Some(t(0)), 0.0),
            raw(None, 41.0, 29.0, Some(t(0)), 10.0),
            raw(Some("B"), 41.0, 29.0, Some(t(0)), 120.0),
        ]
    }

    #[test]
    fn test_rejections_counted_by_reason() {
        let result = clean_records(messy_input(), &CleanConfig::default());
        assert_eq!(result.rejected.timestamp, 1);
        assert_eq!(result.rejected.coords, 2);
        assert_eq!(result.rejected.speed, 1);
        assert_eq!(result.records.len(), 5);
    }

    #[test]
    fn test_counts_conserve_input_size() {
        let input = messy_input();
        let n = input.len();
        let result = clean_records(input, &CleanConfig::default());
        assert_eq!(result.records.len() + result.rejected.total(), n);
    }

    #[test]
    fn test_timestamp_checked_before_coords() {
        let input = vec![raw(Some("A"), f64::NAN, f64::NAN, None, 999.0)];
        let result = clean_records(input, &CleanConfig::default());
        assert_eq!(result.rejected.timestamp, 1);
        assert_eq!(result.rejected.coords, 0);
        assert_eq!(result.rejected.speed, 0);
    }

    #[test]
    fn test_output_sorted_by_vehicle_then_time() {
        let result = clean_records(messy_input(), &CleanConfig::default());
        for w in result.records.windows(2) {
            assert!(w[0].vehicle_id <= w[1].vehicle_id);
            if w[0].vehicle_id == w[1].vehicle_id {
                assert!(w[0].timestamp <= w[1].timestamp);
            }
        }
        let ids: Vec<&str> = result.records.iter().map(|r| r.vehicle_id.as_str()).collect();
        assert_eq!(ids, vec!["A", "A", "B", "B", "unknown"]);
    }

    #[test]
    fn test_speed_at_limit_is_kept() {
        let input = vec![raw(Some("A"), 41.0, 29.0, Some(t(0)), 120.0)];
        let result = clean_records(input, &CleanConfig::default());
        assert_eq!(result.records.len(), 1);
    }

    #[test]
    fn test_empty_vehicle_id_uses_placeholder() {
        let input = vec![raw(Some(""), 41.0, 29.0, Some(t(0)), 1.0)];
        let result = clean_records(input, &CleanConfig::default());
        assert_eq!(result.records[0].vehicle_id, UNKNOWN_VEHICLE);
    }

    #[test]
    fn test_idempotent() {
        let first = clean_records(messy_input(), &CleanConfig::default());
        let again = clean_records(
            first.records.iter().cloned().map(RawRecord::from).collect(),
            &CleanConfig::default(),
        );
        assert_eq!(again.rejected, RejectionCounts::default());
        assert_eq!(again.records, first.records);
    }
}
