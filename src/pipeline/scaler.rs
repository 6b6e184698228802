//! Global min-max scaling.

use ndarray::{Array, Dimension};
use serde::Serialize;

use crate::config::ScalePolicy;
use crate::error::{PipelineError, Result};

/// Ranges narrower than this are treated as constant.
const MIN_RANGE: f64 = 1e-12;

/// Min/max bounds frozen at fit time.
///
/// A scaler is fit once on training data and reused unchanged for test and
/// future inputs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Scaler {
    min: f64,
    max: f64,
}

impl Scaler {
    /// Takes the scalar min and max over every element of `values`.
    ///
    /// # Errors
    ///
    /// [`PipelineError::EmptyScaleInput`] for an empty array, and
    /// [`PipelineError::DegenerateScale`] for a constant one under
    /// [`ScalePolicy::Reject`].
    pub fn fit<'a>(values: impl IntoIterator<Item = &'a f64>, policy: ScalePolicy) -> Result<Self> {
        let (min, max) = values
            .into_iter()
            .fold(None, |acc: Option<(f64, f64)>, &v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
            .ok_or(PipelineError::EmptyScaleInput)?;

        if max - min < MIN_RANGE && policy == ScalePolicy::Reject {
            return Err(PipelineError::DegenerateScale { value: min });
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    fn range(&self) -> Option<f64> {
        let range = self.max - self.min;
        (range >= MIN_RANGE).then_some(range)
    }

    pub fn normalize(&self, x: f64) -> f64 {
        match self.range() {
            Some(range) => (x - self.min) / range,
            None => 0.0,
        }
    }

    pub fn denormalize(&self, x: f64) -> f64 {
        match self.range() {
            Some(range) => x * range + self.min,
            None => self.min,
        }
    }

    pub fn normalize_array<D: Dimension>(&self, values: &Array<f64, D>) -> Array<f64, D> {
        values.mapv(|v| self.normalize(v))
    }

    pub fn denormalize_array<D: Dimension>(&self, values: &Array<f64, D>) -> Array<f64, D> {
        values.mapv(|v| self.denormalize(v))
    }
}
