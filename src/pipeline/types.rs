//! Data types flowing between pipeline stages.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use ndarray::{Array1, Array3};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

use crate::config::AggregationLevel;

/// One decoded source row: lower-cased header name to trimmed cell text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    fields: HashMap<String, String>,
}

impl RawRecord {
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let fields = pairs
            .into_iter()
            .map(|(k, v)| (k.as_ref().trim().to_lowercase(), v.as_ref().trim().to_string()))
            .collect();
        Self { fields }
    }

    /// Returns the first non-empty value among `aliases` (matched case-insensitively).
    pub fn get(&self, aliases: &[&str]) -> Option<&str> {
        aliases.iter().find_map(|alias| {
            self.fields
                .get(&alias.to_lowercase())
                .map(String::as_str)
                .filter(|v| !v.is_empty())
        })
    }
}

/// Grid-cell key of the form `region_{lonCell}_{latCell}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RegionId(String);

impl RegionId {
    pub(crate) fn from_cells(lon_cell: i64, lat_cell: i64) -> Self {
        Self(format!("region_{}_{}", lon_cell, lat_cell))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A validated trip.
#[derive(Debug, Clone, PartialEq)]
pub struct TripRecord {
    pub timestamp: NaiveDateTime,
    pub date: NaiveDate,
    pub hour: u32,
    /// 0 = Sunday .. 6 = Saturday.
    pub day_of_week: u32,
    pub month: u32,
    pub region: RegionId,
    pub longitude: f64,
    pub latitude: f64,
    pub passenger_count: u32,
}

impl TripRecord {
    pub fn is_weekend(&self) -> bool {
        self.day_of_week == 0 || self.day_of_week == 6
    }
}

/// A bucket's position on the time axis. `hour` is set only for hourly aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Period {
    pub date: NaiveDate,
    pub hour: Option<u32>,
}

impl Period {
    pub fn of(trip: &TripRecord, level: AggregationLevel) -> Self {
        Self {
            date: trip.date,
            hour: match level {
                AggregationLevel::Daily => None,
                AggregationLevel::Hourly => Some(trip.hour),
            },
        }
    }

    /// The period immediately after this one (next day, or next hour when hourly).
    pub fn succ(&self) -> Self {
        match self.hour {
            None => Self {
                date: self.date + Duration::days(1),
                hour: None,
            },
            Some(h) if h >= 23 => Self {
                date: self.date + Duration::days(1),
                hour: Some(0),
            },
            Some(h) => Self {
                date: self.date,
                hour: Some(h + 1),
            },
        }
    }

    pub fn day_of_week(&self) -> u32 {
        self.date.weekday().num_days_from_sunday()
    }

    pub fn is_weekend(&self) -> bool {
        matches!(self.day_of_week(), 0 | 6)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.hour {
            Some(h) => write!(f, "{} {:02}:00", self.date.format("%Y-%m-%d"), h),
            None => write!(f, "{}", self.date.format("%Y-%m-%d")),
        }
    }
}

/// Demand aggregated over one (period, region) key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateBucket {
    pub date: NaiveDate,
    pub hour: Option<u32>,
    pub region: RegionId,
    pub demand: u32,
    pub total_passengers: u64,
    pub day_of_week: u32,
    pub month: u32,
    pub is_weekend: u8,
}

impl AggregateBucket {
    pub fn period(&self) -> Period {
        Period {
            date: self.date,
            hour: self.hour,
        }
    }
}

/// Identifies the target of one sample: which bucket it predicts and the
/// last bucket its window saw.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleLabel {
    pub date: NaiveDate,
    pub hour: Option<u32>,
    pub region: RegionId,
    #[serde(skip)]
    pub window_end: Period,
}

impl SampleLabel {
    pub fn period(&self) -> Period {
        Period {
            date: self.date,
            hour: self.hour,
        }
    }
}

/// Windowed samples across all eligible regions.
///
/// `features` is `[sample, window position, channel]`; `targets` and `dates`
/// are aligned with the sample axis.
#[derive(Debug, Clone)]
pub struct Sequence {
    pub features: Array3<f64>,
    pub targets: Array1<f64>,
    pub dates: Vec<SampleLabel>,
    pub regions: Vec<RegionId>,
}

impl Sequence {
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn sequence_length(&self) -> usize {
        self.features.shape()[1]
    }
}
