//! Forward-looking inputs for forecasting past the observed range.

use chrono::NaiveDate;
use ndarray::{Array2, Array3};
use serde::Serialize;
use std::collections::VecDeque;
use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::pipeline::scaler::Scaler;
use crate::pipeline::sequence::{
    FEATURE_CHANNELS, encode_features, encode_window, group_by_region, stack_windows,
};
use crate::pipeline::split::FittedScalers;
use crate::pipeline::types::{AggregateBucket, Period, RegionId};
use crate::regressor::Regressor;

/// A future period to report, pointing at the input window that predicts it.
#[derive(Debug, Clone, PartialEq)]
pub struct FutureLabel {
    pub date: NaiveDate,
    pub hour: Option<u32>,
    pub region: RegionId,
    /// Row of [`FutureInputs::features`] whose prediction this label shares.
    pub sample: usize,
}

/// One normalized window per eligible region and the labels it stands for.
#[derive(Debug, Clone)]
pub struct FutureInputs {
    pub features: Array3<f64>,
    pub regions: Vec<RegionId>,
    pub labels: Vec<FutureLabel>,
}

/// A forecast in original demand units.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastRow {
    pub date: NaiveDate,
    pub hour: Option<u32>,
    pub region: RegionId,
    pub predicted: f64,
}

/// Eligible regions with their most recent `sequence_length` buckets.
fn recent_histories<'a>(
    buckets: &'a [AggregateBucket],
    regions: &[RegionId],
    sequence_length: usize,
) -> Vec<(RegionId, Vec<&'a AggregateBucket>)> {
    group_by_region(buckets)
        .into_iter()
        .filter(|(region, history)| regions.contains(region) && history.len() >= sequence_length)
        .map(|(region, history)| {
            let start = history.len() - sequence_length;
            (region, history[start..].to_vec())
        })
        .collect()
}

/// Builds the latest window of each region that produced sequences.
///
/// Each window is normalized with the already fitted feature scaler and labelled
/// with the `steps` periods following the region's last observed bucket. All
/// labels of a region share that one window, so a single-step regressor gives
/// them the same value.
pub fn extrapolate(
    buckets: &[AggregateBucket],
    regions: &[RegionId],
    sequence_length: usize,
    steps: usize,
    feature_scaler: &Scaler,
) -> Result<FutureInputs> {
    let mut windows: Vec<Array2<f64>> = Vec::new();
    let mut eligible: Vec<RegionId> = Vec::new();
    let mut labels: Vec<FutureLabel> = Vec::new();

    for (region, recent) in recent_histories(buckets, regions, sequence_length) {
        let Some(last) = recent.last().map(|b| b.period()) else {
            continue;
        };
        let sample = windows.len();
        windows.push(feature_scaler.normalize_array(&encode_window(recent.iter().copied())));

        let mut period = last;
        for _ in 0..steps {
            period = period.succ();
            labels.push(FutureLabel {
                date: period.date,
                hour: period.hour,
                region: region.clone(),
                sample,
            });
        }
        debug!(region = %region, last = %last, "Future window built");
        eligible.push(region);
    }

    if windows.is_empty() {
        return Err(PipelineError::NoFutureData { sequence_length });
    }

    let features = stack_windows(&windows, sequence_length)?;
    info!(regions = eligible.len(), labels = labels.len(), "Future inputs built");
    Ok(FutureInputs {
        features,
        regions: eligible,
        labels,
    })
}

struct RollingState {
    region: RegionId,
    window: VecDeque<[f64; FEATURE_CHANNELS]>,
    last: Period,
    passengers_per_trip: f64,
}

/// Forecasts `steps` periods ahead by feeding each prediction back into its window.
///
/// Every step predicts all eligible regions at once, appends a synthetic bucket
/// carrying the predicted demand, the calendar features of the new period and
/// the region's last observed passengers-per-trip, then drops the oldest entry.
pub async fn rolling_forecast<R: Regressor + ?Sized>(
    regressor: &R,
    buckets: &[AggregateBucket],
    regions: &[RegionId],
    sequence_length: usize,
    steps: usize,
    scalers: &FittedScalers,
) -> anyhow::Result<Vec<ForecastRow>> {
    let mut states: Vec<RollingState> = recent_histories(buckets, regions, sequence_length)
        .into_iter()
        .filter_map(|(region, recent)| {
            let last = recent.last()?;
            Some(RollingState {
                passengers_per_trip: encode_features(last)[3],
                last: last.period(),
                window: recent.iter().copied().map(encode_features).collect(),
                region,
            })
        })
        .collect();

    if states.is_empty() {
        return Err(PipelineError::NoFutureData { sequence_length }.into());
    }

    let mut rows: Vec<Vec<ForecastRow>> = vec![Vec::with_capacity(steps); states.len()];
    for _ in 0..steps {
        let flat: Vec<f64> = states
            .iter()
            .flat_map(|state| state.window.iter().flatten())
            .map(|&v| scalers.features.normalize(v))
            .collect();
        let inputs =
            Array3::from_shape_vec((states.len(), sequence_length, FEATURE_CHANNELS), flat)?;
        let predictions = regressor.predict(&inputs).await?;
        if predictions.len() != states.len() {
            return Err(PipelineError::ShapeMismatch {
                expected: states.len(),
                actual: predictions.len(),
            }
            .into());
        }

        for ((state, region_rows), &prediction) in
            states.iter_mut().zip(rows.iter_mut()).zip(predictions.iter())
        {
            let demand = scalers.targets.denormalize(prediction).max(0.0);
            let period = state.last.succ();
            region_rows.push(ForecastRow {
                date: period.date,
                hour: period.hour,
                region: state.region.clone(),
                predicted: demand,
            });

            state.window.pop_front();
            state.window.push_back([
                demand,
                f64::from(period.day_of_week()) / 6.0,
                f64::from(u8::from(period.is_weekend())),
                state.passengers_per_trip,
            ]);
            state.last = period;
        }
    }

    info!(regions = states.len(), steps, "Rolling forecast complete");
    Ok(rows.into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScalePolicy;
    use crate::pipeline::region::bin;
    use async_trait::async_trait;
    use chrono::{Datelike, Duration};
    use ndarray::Array1;
    use std::sync::Mutex;

    fn bucket(region: &RegionId, day: i64, demand: u32) -> AggregateBucket {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + Duration::days(day);
        let dow = date.weekday().num_days_from_sunday();
        AggregateBucket {
            date,
            hour: None,
            region: region.clone(),
            demand,
            total_passengers: u64::from(demand) * 2,
            day_of_week: dow,
            month: date.month(),
            is_weekend: u8::from(dow == 0 || dow == 6),
        }
    }

    /// Predicts the normalized demand of the last window position.
    struct LastValue;

    #[async_trait]
    impl Regressor for LastValue {
        async fn fit(&mut self, _: &Array3<f64>, _: &Array1<f64>) -> anyhow::Result<()> {
            Ok(())
        }

        async fn predict(&self, features: &Array3<f64>) -> anyhow::Result<Array1<f64>> {
            let last = features.shape()[1] - 1;
            Ok(Array1::from_shape_fn(features.shape()[0], |i| features[[i, last, 0]]))
        }
    }

    fn identity_scalers() -> FittedScalers {
        let unit = Scaler::fit(&[0.0, 1.0], ScalePolicy::Reject).unwrap();
        FittedScalers {
            features: unit,
            targets: unit,
        }
    }

    #[test]
    fn test_one_window_per_region_with_shared_labels() {
        let a = bin(1.0, 1.0, 0.1);
        let b = bin(5.0, 5.0, 0.1);
        let mut buckets: Vec<_> = (0..10).map(|d| bucket(&a, d, d as u32)).collect();
        buckets.extend((0..3).map(|d| bucket(&b, d, 1)));
        let scaler = Scaler::fit(&[0.0, 10.0], ScalePolicy::Reject).unwrap();

        let inputs = extrapolate(&buckets, &[a.clone(), b.clone()], 4, 7, &scaler).unwrap();

        assert_eq!(inputs.regions, vec![a.clone()]);
        assert_eq!(inputs.features.shape(), &[1, 4, FEATURE_CHANNELS]);
        // most recent four demands are 6..=9, normalized by 10
        assert_eq!(inputs.features[[0, 0, 0]], 0.6);
        assert_eq!(inputs.features[[0, 3, 0]], 0.9);
        assert_eq!(inputs.labels.len(), 7);
        assert!(inputs.labels.iter().all(|l| l.sample == 0 && l.region == a));
        let last = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        assert_eq!(inputs.labels[0].date, last + Duration::days(1));
        assert_eq!(inputs.labels[6].date, last + Duration::days(7));
    }

    #[test]
    fn test_regions_without_sequences_are_ignored() {
        let a = bin(1.0, 1.0, 0.1);
        let buckets: Vec<_> = (0..10).map(|d| bucket(&a, d, 1)).collect();
        let scaler = Scaler::fit(&[0.0, 10.0], ScalePolicy::Reject).unwrap();

        let result = extrapolate(&buckets, &[], 4, 7, &scaler);
        assert!(matches!(
            result,
            Err(PipelineError::NoFutureData { sequence_length: 4 })
        ));
    }

    #[test]
    fn test_exactly_sequence_length_buckets_qualify() {
        let a = bin(1.0, 1.0, 0.1);
        let buckets: Vec<_> = (0..4).map(|d| bucket(&a, d, 1)).collect();
        let scaler = Scaler::fit(&[0.0, 10.0], ScalePolicy::Reject).unwrap();

        let inputs = extrapolate(&buckets, &[a], 4, 2, &scaler).unwrap();
        assert_eq!(inputs.labels.len(), 2);
    }

    /// Predicts one more than the last window demand and records the last
    /// window position it was shown.
    #[derive(Default)]
    struct StepUp {
        seen: Mutex<Vec<[f64; FEATURE_CHANNELS]>>,
    }

    #[async_trait]
    impl Regressor for StepUp {
        async fn fit(&mut self, _: &Array3<f64>, _: &Array1<f64>) -> anyhow::Result<()> {
            Ok(())
        }

        async fn predict(&self, features: &Array3<f64>) -> anyhow::Result<Array1<f64>> {
            let last = features.shape()[1] - 1;
            self.seen
                .lock()
                .unwrap()
                .push(std::array::from_fn(|c| features[[0, last, c]]));
            Ok(Array1::from_shape_fn(features.shape()[0], |i| features[[i, last, 0]] + 1.0))
        }
    }

    #[tokio::test]
    async fn test_rolling_forecast_feeds_predictions_back() {
        let a = bin(1.0, 1.0, 0.1);
        let buckets: Vec<_> = (0..5).map(|d| bucket(&a, d, 2)).collect();
        let model = StepUp::default();

        let rows = rolling_forecast(&model, &buckets, &[a.clone()], 3, 4, &identity_scalers())
            .await
            .unwrap();

        let predicted: Vec<f64> = rows.iter().map(|r| r.predicted).collect();
        assert_eq!(predicted, vec![3.0, 4.0, 5.0, 6.0]);
        let last = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        for (step, row) in rows.iter().enumerate() {
            assert_eq!(row.date, last + Duration::days(step as i64 + 1));
            assert_eq!(row.region, a);
        }

        // 2024-01-05 is a Friday; the rolled periods are Sat, Sun, Mon
        let seen = model.seen.lock().unwrap();
        let calendar: Vec<(f64, f64)> = seen.iter().map(|f| (f[1], f[2])).collect();
        assert_eq!(
            calendar,
            vec![(5.0 / 6.0, 0.0), (6.0 / 6.0, 1.0), (0.0, 1.0), (1.0 / 6.0, 0.0)]
        );
        let demand: Vec<f64> = seen.iter().map(|f| f[0]).collect();
        assert_eq!(demand, vec![2.0, 3.0, 4.0, 5.0]);
        assert!(seen.iter().all(|f| f[3] == 2.0));
    }

    #[tokio::test]
    async fn test_rolling_forecast_without_regions_fails() {
        let a = bin(1.0, 1.0, 0.1);
        let buckets: Vec<_> = (0..2).map(|d| bucket(&a, d, 1)).collect();

        let result = rolling_forecast(&LastValue, &buckets, &[a], 3, 4, &identity_scalers()).await;
        assert!(result.is_err());
    }
}
