//! Chronological train/test partitioning with train-only scaling.

use ndarray::{Array1, Array3, Axis, s};
use serde::Serialize;
use tracing::info;

use crate::config::ScalePolicy;
use crate::error::{PipelineError, Result};
use crate::pipeline::scaler::Scaler;
use crate::pipeline::types::{SampleLabel, Sequence};

/// Normalized training arrays.
#[derive(Debug, Clone)]
pub struct TrainSet {
    pub features: Array3<f64>,
    pub targets: Array1<f64>,
}

/// Normalized test arrays plus what is needed to report in original units.
#[derive(Debug, Clone)]
pub struct TestSet {
    pub features: Array3<f64>,
    pub targets: Array1<f64>,
    pub dates: Vec<SampleLabel>,
    pub original_targets: Array1<f64>,
}

/// Scalers fitted on the training slice only.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct FittedScalers {
    pub features: Scaler,
    pub targets: Scaler,
}

#[derive(Debug, Clone)]
pub struct Split {
    pub train: TrainSet,
    pub test: TestSet,
    pub scalers: FittedScalers,
}

/// Splits `sequence` at `floor(len * train_ratio)` without reordering.
///
/// Consumes the sequence so its unscaled windows are released once the
/// normalized copies exist.
pub fn split_sequences(sequence: Sequence, train_ratio: f64, policy: ScalePolicy) -> Result<Split> {
    if sequence.is_empty() {
        return Err(PipelineError::NoSequences);
    }

    let total = sequence.len();
    let train_size = (total as f64 * train_ratio).floor() as usize;
    if train_size == 0 {
        return Err(PipelineError::EmptyTrainingSplit { total, train_ratio });
    }

    let Sequence {
        features,
        targets,
        mut dates,
        ..
    } = sequence;

    let train_features = features.slice(s![..train_size, .., ..]);
    let train_targets = targets.slice(s![..train_size]);
    let scalers = FittedScalers {
        features: Scaler::fit(train_features.iter(), policy)?,
        targets: Scaler::fit(train_targets.iter(), policy)?,
    };

    let train = TrainSet {
        features: train_features.mapv(|v| scalers.features.normalize(v)),
        targets: train_targets.mapv(|v| scalers.targets.normalize(v)),
    };

    let (_, test_features) = features.view().split_at(Axis(0), train_size);
    let original_targets = targets.slice(s![train_size..]).to_owned();
    let test = TestSet {
        features: test_features.mapv(|v| scalers.features.normalize(v)),
        targets: scalers.targets.normalize_array(&original_targets),
        dates: dates.split_off(train_size),
        original_targets,
    };

    info!(
        total,
        train = train.targets.len(),
        test = test.targets.len(),
        feature_min = scalers.features.min(),
        feature_max = scalers.features.max(),
        target_min = scalers.targets.min(),
        target_max = scalers.targets.max(),
        "Sequences split"
    );

    Ok(Split {
        train,
        test,
        scalers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::region::bin;
    use crate::pipeline::sequence::FEATURE_CHANNELS;
    use crate::pipeline::types::Period;
    use chrono::{Duration, NaiveDate};

    fn sequence(n: usize) -> Sequence {
        let region = bin(1.0, 1.0, 0.1);
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let features =
            Array3::from_shape_fn((n, 2, FEATURE_CHANNELS), |(i, t, c)| (i + t + c) as f64);
        let targets = Array1::from_shape_fn(n, |i| (i * 2) as f64);
        let dates = (0..n)
            .map(|i| {
                let date = start + Duration::days(i as i64 + 2);
                SampleLabel {
                    date,
                    hour: None,
                    region: region.clone(),
                    window_end: Period {
                        date: date - Duration::days(1),
                        hour: None,
                    },
                }
            })
            .collect();
        Sequence {
            features,
            targets,
            dates,
            regions: vec![region],
        }
    }

    #[test]
    fn test_split_sizes_and_order() {
        let split = split_sequences(sequence(100), 0.8, ScalePolicy::Reject).unwrap();

        assert_eq!(split.train.targets.len(), 80);
        assert_eq!(split.test.targets.len(), 20);
        assert_eq!(split.test.dates.len(), 20);
        assert_eq!(split.test.features.shape(), &[20, 2, FEATURE_CHANNELS]);
        let expected: Vec<f64> = (80..100).map(|i| (i * 2) as f64).collect();
        assert_eq!(split.test.original_targets.to_vec(), expected);
        assert_eq!(
            split.test.dates[0].date,
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + Duration::days(82)
        );
    }

    #[test]
    fn test_scalers_come_from_train_only() {
        let split = split_sequences(sequence(10), 0.5, ScalePolicy::Reject).unwrap();

        // train targets are 0, 2, .., 8
        assert_eq!(split.scalers.targets.min(), 0.0);
        assert_eq!(split.scalers.targets.max(), 8.0);
        // train features span 0 ..= 4 + 1 + 3
        assert_eq!(split.scalers.features.min(), 0.0);
        assert_eq!(split.scalers.features.max(), 8.0);

        // test values above the train range scale past 1 rather than refitting
        assert_eq!(split.test.targets[0], 10.0 / 8.0);
        assert_eq!(split.train.targets[4], 1.0);
        let restored = split.scalers.targets.denormalize_array(&split.test.targets);
        assert_eq!(restored, split.test.original_targets);
    }

    #[test]
    fn test_floor_of_train_size() {
        let split = split_sequences(sequence(7), 0.8, ScalePolicy::Reject).unwrap();
        assert_eq!(split.train.targets.len(), 5);
        assert_eq!(split.test.targets.len(), 2);
    }

    #[test]
    fn test_empty_sequence_fails() {
        let empty = Sequence {
            features: Array3::zeros((0, 2, FEATURE_CHANNELS)),
            targets: Array1::zeros(0),
            dates: Vec::new(),
            regions: Vec::new(),
        };
        assert!(matches!(
            split_sequences(empty, 0.8, ScalePolicy::Reject),
            Err(PipelineError::NoSequences)
        ));
    }

    #[test]
    fn test_no_training_samples_fails() {
        assert!(matches!(
            split_sequences(sequence(1), 0.8, ScalePolicy::Reject),
            Err(PipelineError::EmptyTrainingSplit { total: 1, .. })
        ));
    }
}
