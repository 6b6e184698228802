//! Per-region sliding windows over aggregated demand.

use ndarray::{Array1, Array2, Array3};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

use crate::error::{PipelineError, Result};
use crate::pipeline::types::{AggregateBucket, RegionId, SampleLabel, Sequence};

/// Channels per window position: demand, day-of-week / 6, weekend flag,
/// passengers per trip.
pub const FEATURE_CHANNELS: usize = 4;

/// Encodes one bucket as a feature vector, in channel order.
pub fn encode_features(bucket: &AggregateBucket) -> [f64; FEATURE_CHANNELS] {
    [
        f64::from(bucket.demand),
        f64::from(bucket.day_of_week) / 6.0,
        f64::from(bucket.is_weekend),
        bucket.total_passengers as f64 / f64::from(bucket.demand.max(1)),
    ]
}

/// Encodes a run of buckets as a `[window position, channel]` matrix.
pub fn encode_window<'a>(buckets: impl IntoIterator<Item = &'a AggregateBucket>) -> Array2<f64> {
    let rows: Vec<[f64; FEATURE_CHANNELS]> = buckets.into_iter().map(encode_features).collect();
    Array2::from(rows)
}

/// Splits buckets into per-region histories, each sorted by period.
///
/// Regions are returned in order of first appearance in `buckets`.
pub fn group_by_region(buckets: &[AggregateBucket]) -> Vec<(RegionId, Vec<&AggregateBucket>)> {
    let mut order: Vec<RegionId> = Vec::new();
    let mut seen: HashSet<&RegionId> = HashSet::new();
    let mut groups: HashMap<&RegionId, Vec<&AggregateBucket>> = HashMap::new();

    for bucket in buckets {
        if seen.insert(&bucket.region) {
            order.push(bucket.region.clone());
        }
        groups.entry(&bucket.region).or_default().push(bucket);
    }

    order
        .into_iter()
        .map(|region| {
            let mut history = groups.remove(&region).unwrap_or_default();
            history.sort_by_key(|b| b.period());
            (region, history)
        })
        .collect()
}

/// Builds `(window, target)` samples for every region with more than
/// `sequence_length` buckets.
///
/// The window for sample `i` is buckets `i - sequence_length .. i` of one
/// region and the target is bucket `i`'s demand, so no window ever contains
/// its own target or anything after it. Regions with too little history are
/// skipped. Samples are ordered region by region.
pub fn build_sequences(buckets: &[AggregateBucket], sequence_length: usize) -> Result<Sequence> {
    let mut windows: Vec<Array2<f64>> = Vec::new();
    let mut targets: Vec<f64> = Vec::new();
    let mut dates: Vec<SampleLabel> = Vec::new();
    let mut regions: Vec<RegionId> = Vec::new();

    for (region, history) in group_by_region(buckets) {
        if history.len() < sequence_length + 1 {
            warn!(
                region = %region,
                buckets = history.len(),
                required = sequence_length + 1,
                "Skipping region with insufficient history"
            );
            continue;
        }

        let encoded = encode_window(history.iter().copied());
        for i in sequence_length..history.len() {
            windows.push(
                encoded
                    .slice(ndarray::s![i - sequence_length..i, ..])
                    .to_owned(),
            );
            targets.push(f64::from(history[i].demand));
            dates.push(SampleLabel {
                date: history[i].date,
                hour: history[i].hour,
                region: region.clone(),
                window_end: history[i - 1].period(),
            });
        }

        debug!(
            region = %region,
            samples = history.len() - sequence_length,
            "Region windowed"
        );
        regions.push(region);
    }

    if windows.is_empty() {
        return Err(PipelineError::InsufficientData { sequence_length });
    }

    let features = stack_windows(&windows, sequence_length)?;
    info!(
        samples = targets.len(),
        regions = regions.len(),
        sequence_length,
        "Sequences built"
    );

    Ok(Sequence {
        features,
        targets: Array1::from(targets),
        dates,
        regions,
    })
}

/// Stacks `[window, channel]` matrices into a `[sample, window, channel]` array.
pub fn stack_windows(windows: &[Array2<f64>], sequence_length: usize) -> Result<Array3<f64>> {
    let mut flat = Vec::with_capacity(windows.len() * sequence_length * FEATURE_CHANNELS);
    for window in windows {
        flat.extend(window.iter().copied());
    }
    let expected = windows.len() * sequence_length * FEATURE_CHANNELS;
    let actual = flat.len();
    Array3::from_shape_vec((windows.len(), sequence_length, FEATURE_CHANNELS), flat)
        .map_err(|_| PipelineError::ShapeMismatch { expected, actual })
}
