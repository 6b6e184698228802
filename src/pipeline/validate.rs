//! Validation and coercion of raw rows into [`TripRecord`]s.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike};
use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::pipeline::region::bin;
use crate::pipeline::types::{RawRecord, TripRecord};

const TIMESTAMP_FIELDS: &[&str] = &[
    "pickup_datetime",
    "tpep_pickup_datetime",
    "lpep_pickup_datetime",
    "timestamp",
    "datetime",
    "date",
];
const LONGITUDE_FIELDS: &[&str] = &["pickup_longitude", "longitude", "lon", "lng"];
const LATITUDE_FIELDS: &[&str] = &["pickup_latitude", "latitude", "lat"];
const PASSENGER_FIELDS: &[&str] = &["passenger_count", "passengers"];

const REQUIRED_FIELDS: &str = "a parseable timestamp, a numeric longitude and a numeric latitude";

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S%.f",
    "%m/%d/%Y %H:%M",
];

/// Trips that survived validation, plus how many rows went in.
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub trips: Vec<TripRecord>,
    pub raw_count: usize,
    pub dropped: usize,
}

/// Keeps the rows with a parseable timestamp and finite coordinates.
///
/// Rejected rows are only counted. Fails with [`PipelineError::EmptyInput`]
/// when nothing survives.
pub fn validate_rows(rows: Vec<RawRecord>, region_size: f64) -> Result<ValidationOutcome> {
    let raw_count = rows.len();
    let trips: Vec<TripRecord> = rows
        .iter()
        .filter_map(|row| to_trip(row, region_size))
        .collect();
    let dropped = raw_count - trips.len();

    if dropped > 0 {
        debug!(dropped, "Dropped rows failing validation");
    }

    if trips.is_empty() {
        return Err(PipelineError::EmptyInput {
            required: REQUIRED_FIELDS,
        });
    }

    info!(raw_count, valid = trips.len(), dropped, "Rows validated");
    Ok(ValidationOutcome {
        trips,
        raw_count,
        dropped,
    })
}

fn to_trip(row: &RawRecord, region_size: f64) -> Option<TripRecord> {
    let timestamp = parse_timestamp(row.get(TIMESTAMP_FIELDS)?)?;
    let longitude = parse_coordinate(row.get(LONGITUDE_FIELDS)?)?;
    let latitude = parse_coordinate(row.get(LATITUDE_FIELDS)?)?;
    let passenger_count = row
        .get(PASSENGER_FIELDS)
        .and_then(parse_passengers)
        .unwrap_or(1);

    let date = timestamp.date();
    Some(TripRecord {
        timestamp,
        date,
        hour: timestamp.hour(),
        day_of_week: date.weekday().num_days_from_sunday(),
        month: date.month(),
        region: bin(longitude, latitude, region_size),
        longitude,
        latitude,
        passenger_count,
    })
}

pub(crate) fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

fn parse_coordinate(s: &str) -> Option<f64> {
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_passengers(s: &str) -> Option<u32> {
    let n = s.parse::<f64>().ok().filter(|v| v.is_finite())?;
    if n < 1.0 {
        return None;
    }
    Some(n.min(u32::MAX as f64) as u32)
}
