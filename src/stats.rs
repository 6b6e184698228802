use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashSet;

use crate::pipeline::types::AggregateBucket;
use crate::pipeline::validate::ValidationOutcome;

/// Read-only counts describing one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DataSummary {
    pub raw_records: usize,
    pub processed_records: usize,
    pub aggregated_buckets: usize,
    pub sequences: usize,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub regions: usize,
    pub average_demand: f64,
}

impl DataSummary {
    pub fn from_stages(outcome: &ValidationOutcome, buckets: &[AggregateBucket]) -> Self {
        let regions: HashSet<_> = buckets.iter().map(|b| &b.region).collect();
        let total_demand: u64 = buckets.iter().map(|b| u64::from(b.demand)).sum();

        DataSummary {
            raw_records: outcome.raw_count,
            processed_records: outcome.trips.len(),
            aggregated_buckets: buckets.len(),
            sequences: 0,
            first_date: buckets.iter().map(|b| b.date).min(),
            last_date: buckets.iter().map(|b| b.date).max(),
            regions: regions.len(),
            average_demand: if buckets.is_empty() {
                0.0
            } else {
                total_demand as f64 / buckets.len() as f64
            },
        }
    }

    /// Set the number of windowed samples built from the buckets
    pub fn with_sequences(mut self, sequences: usize) -> Self {
        self.sequences = sequences;
        self
    }

    pub fn pct(part: usize, total: usize) -> f64 {
        if total == 0 {
            0.0
        } else {
            (part as f64 / total as f64) * 100.0
        }
    }

    pub fn valid_pct(&self) -> f64 {
        Self::pct(self.processed_records, self.raw_records)
    }
}

/// The first `limit` aggregated rows, in their sorted order.
pub fn preview(buckets: &[AggregateBucket], limit: usize) -> &[AggregateBucket] {
    &buckets[..limit.min(buckets.len())]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AggregationLevel;
    use crate::pipeline::aggregate::aggregate_trips;
    use crate::pipeline::types::RawRecord;
    use crate::pipeline::validate::validate_rows;

    fn outcome() -> ValidationOutcome {
        let row = |ts: &str, lon: &str| {
            RawRecord::from_pairs([("timestamp", ts), ("lon", lon), ("lat", "40.71")])
        };
        validate_rows(
            vec![
                row("2024-02-01 08:00:00", "-74.01"),
                row("2024-02-01 09:00:00", "-74.01"),
                row("2024-02-03 09:00:00", "-74.01"),
                row("2024-02-02 09:00:00", "-73.51"),
                row("garbage", "-73.51"),
            ],
            0.05,
        )
        .unwrap()
    }

    #[test]
    fn test_pct_with_zero_total() {
        assert_eq!(DataSummary::pct(10, 0), 0.0);
    }

    #[test]
    fn test_summary_counts() {
        let outcome = outcome();
        let buckets = aggregate_trips(&outcome.trips, AggregationLevel::Daily);
        let summary = DataSummary::from_stages(&outcome, &buckets).with_sequences(12);

        assert_eq!(summary.raw_records, 5);
        assert_eq!(summary.processed_records, 4);
        assert_eq!(summary.aggregated_buckets, 3);
        assert_eq!(summary.sequences, 12);
        assert_eq!(summary.regions, 2);
        assert_eq!(summary.first_date, NaiveDate::from_ymd_opt(2024, 2, 1));
        assert_eq!(summary.last_date, NaiveDate::from_ymd_opt(2024, 2, 3));
        assert!((summary.average_demand - 4.0 / 3.0).abs() < 1e-12);
        assert_eq!(summary.valid_pct(), 80.0);
    }

    #[test]
    fn test_preview_is_bounded() {
        let outcome = outcome();
        let buckets = aggregate_trips(&outcome.trips, AggregationLevel::Daily);

        assert_eq!(preview(&buckets, 2).len(), 2);
        assert_eq!(preview(&buckets, 10).len(), 3);
        assert_eq!(preview(&buckets, 0).len(), 0);
    }
}
