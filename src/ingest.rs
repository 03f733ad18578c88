//! CSV ingestion.
//!
//! Turns a headed, delimited fleet export into [`RawRecord`]s. Column names
//! vary between feeds, so each logical field is resolved through an ordered
//! list of candidate columns ([`FieldMapping`]); the first candidate with a
//! non-empty cell wins.
//!
//! Ingestion is lenient: malformed values become missing or NaN fields and
//! are left for the cleaner to count. Only rows whose finite coordinates
//! are outside the valid latitude/longitude range are dropped here.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, NaiveDateTime};
use csv::{ReaderBuilder, StringRecord, Trim};
use log::info;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::RawRecord;

/// Timestamp layouts tried (in order) after the day-first feed format.
const NAIVE_FORMATS: [&str; 3] = [
    "%d/%m/%Y %H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// Candidate column names per logical field, in priority order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMapping {
    pub vehicle_id: Vec<String>,
    pub latitude: Vec<String>,
    pub longitude: Vec<String>,
    pub timestamp: Vec<String>,
    pub speed: Vec<String>,
}

impl Default for FieldMapping {
    /// Column names of the Turkish fleet export, then English fallbacks.
    fn default() -> Self {
        fn names(list: &[&str]) -> Vec<String> {
            list.iter().map(|s| s.to_string()).collect()
        }
        Self {
            vehicle_id: names(&["Plaka", "plaka", "vehicleId"]),
            latitude: names(&["Enlem", "enlem", "lat"]),
            longitude: names(&["Boylam", "boylam", "lon"]),
            timestamp: names(&["KonumZamani", "KonumZamanı", "timestamp"]),
            speed: names(&["Hiz", "hiz", "speed"]),
        }
    }
}

/// Row accounting for one ingestion run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    /// Data rows read (header excluded)
    pub rows: usize,
    /// Records handed on to the pipeline
    pub records: usize,
    /// Rows dropped for finite coordinates outside the valid range
    pub out_of_range: usize,
}

/// Header positions of each candidate column that exists in the file.
struct ResolvedColumns {
    vehicle_id: Vec<usize>,
    latitude: Vec<usize>,
    longitude: Vec<usize>,
    timestamp: Vec<usize>,
    speed: Vec<usize>,
}

impl ResolvedColumns {
    fn resolve(headers: &StringRecord, mapping: &FieldMapping) -> Self {
        let find = |candidates: &[String]| -> Vec<usize> {
            candidates
                .iter()
                .filter_map(|name| headers.iter().position(|h| h == name.as_str()))
                .collect()
        };
        Self {
            vehicle_id: find(&mapping.vehicle_id),
            latitude: find(&mapping.latitude),
            longitude: find(&mapping.longitude),
            timestamp: find(&mapping.timestamp),
            speed: find(&mapping.speed),
        }
    }
}

/// Read raw records from delimited text with a header row.
///
/// The delimiter (`,`, `;` or tab) is detected from the header line.
pub fn read_csv_records<R: Read>(
    mut reader: R,
    mapping: &FieldMapping,
) -> Result<(Vec<RawRecord>, IngestReport)> {
    let mut text = String::new();
    reader.read_to_string(&mut text)?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text.as_str());

    let mut csv_reader = ReaderBuilder::new()
        .delimiter(detect_delimiter(text))
        .flexible(true)
        .trim(Trim::All)
        .from_reader(text.as_bytes());

    let headers = csv_reader.headers()?.clone();
    let columns = ResolvedColumns::resolve(&headers, mapping);

    let mut report = IngestReport::default();
    let mut records = Vec::new();

    for row in csv_reader.records() {
        let row = row?;
        report.rows += 1;

        let record = RawRecord {
            vehicle_id: first_value(&row, &columns.vehicle_id).map(str::to_string),
            latitude: first_value(&row, &columns.latitude)
                .and_then(parse_number)
                .unwrap_or(f64::NAN),
            longitude: first_value(&row, &columns.longitude)
                .and_then(parse_number)
                .unwrap_or(f64::NAN),
            timestamp: first_value(&row, &columns.timestamp).and_then(parse_timestamp),
            speed: first_value(&row, &columns.speed)
                .and_then(parse_number)
                .unwrap_or(0.0),
        };

        if out_of_range(&record) {
            report.out_of_range += 1;
            continue;
        }
        records.push(record);
    }

    report.records = records.len();
    info!(
        "[Ingest] {} rows -> {} records ({} out of range)",
        report.rows, report.records, report.out_of_range
    );
    Ok((records, report))
}

/// Read raw records from a CSV file on disk.
pub fn read_csv_file<P: AsRef<Path>>(
    path: P,
    mapping: &FieldMapping,
) -> Result<(Vec<RawRecord>, IngestReport)> {
    let file = File::open(path)?;
    read_csv_records(file, mapping)
}

fn detect_delimiter(text: &str) -> u8 {
    let header = text.lines().next().unwrap_or_default();
    [b',', b';', b'\t']
        .into_iter()
        .max_by_key(|&d| header.bytes().filter(|&b| b == d).count())
        .filter(|&d| header.as_bytes().contains(&d))
        .unwrap_or(b',')
}

fn first_value<'a>(row: &'a StringRecord, columns: &[usize]) -> Option<&'a str> {
    columns
        .iter()
        .filter_map(|&i| row.get(i))
        .find(|value| !value.is_empty())
}

/// Parse a number that may use a decimal comma.
pub fn parse_number(value: &str) -> Option<f64> {
    value.trim().replacen(',', ".", 1).parse::<f64>().ok()
}

/// Parse a feed timestamp into a naive UTC instant.
///
/// Tries `d/m/Y H:M:S` first, then RFC 3339 (offset applied), then ISO-like
/// naive layouts.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(ts) = NaiveDateTime::parse_from_str(value, NAIVE_FORMATS[0]) {
        return Some(ts);
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.naive_utc());
    }
    NAIVE_FORMATS[1..]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
}

fn out_of_range(record: &RawRecord) -> bool {
    let (lat, lon) = (record.latitude, record.longitude);
    (lat.is_finite() && !(-90.0..=90.0).contains(&lat))
        || (lon.is_finite() && !(-180.0..=180.0).contains(&lon))
}
