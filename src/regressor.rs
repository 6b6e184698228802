//! Contract for the learnable regressor that consumes the windowed arrays.
//!
//! The pipeline only ever talks to a model through [`Regressor`]. The
//! [`WindowMeanBaseline`] here is a least-squares baseline that keeps the
//! command line runnable without a trained network.

use anyhow::{Result, ensure};
use async_trait::async_trait;
use ndarray::{Array1, Array3, Axis, s};
use serde::Serialize;

use crate::pipeline::utility::{mean, mean_absolute_error, mean_squared_error};

/// Loss and metric of a model on a labelled set, in the units it was given.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Evaluation {
    pub loss: f64,
    pub mae: f64,
}

#[async_trait]
pub trait Regressor: Send + Sync {
    /// Trains on `features` `[N, window, channels]` against `targets` `[N]`.
    async fn fit(&mut self, features: &Array3<f64>, targets: &Array1<f64>) -> Result<()>;

    /// Returns one prediction per sample.
    async fn predict(&self, features: &Array3<f64>) -> Result<Array1<f64>>;

    /// Mean squared error loss and mean absolute error of `predict` on a labelled set.
    async fn evaluate(&self, features: &Array3<f64>, targets: &Array1<f64>) -> Result<Evaluation> {
        let predictions = self.predict(features).await?;
        ensure!(
            predictions.len() == targets.len(),
            "predicted {} values for {} targets",
            predictions.len(),
            targets.len()
        );
        let (actual, predicted) = (targets.to_vec(), predictions.to_vec());
        Ok(Evaluation {
            loss: mean_squared_error(&actual, &predicted),
            mae: mean_absolute_error(&actual, &predicted),
        })
    }
}

/// Fits `target = slope * mean(window demand) + intercept` by ordinary least squares.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindowMeanBaseline {
    slope: f64,
    intercept: f64,
}

impl WindowMeanBaseline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn coefficients(&self) -> (f64, f64) {
        (self.slope, self.intercept)
    }

    fn window_means(features: &Array3<f64>) -> Array1<f64> {
        features
            .slice(s![.., .., 0])
            .mean_axis(Axis(1))
            .unwrap_or_else(|| Array1::zeros(features.shape()[0]))
    }
}

#[async_trait]
impl Regressor for WindowMeanBaseline {
    async fn fit(&mut self, features: &Array3<f64>, targets: &Array1<f64>) -> Result<()> {
        ensure!(
            features.shape()[0] == targets.len(),
            "{} windows for {} targets",
            features.shape()[0],
            targets.len()
        );
        ensure!(!targets.is_empty(), "cannot fit on an empty training set");

        let x = Self::window_means(features).to_vec();
        let y = targets.to_vec();
        let (x_mean, y_mean) = (mean(&x), mean(&y));

        let covariance: f64 = x.iter().zip(&y).map(|(a, b)| (a - x_mean) * (b - y_mean)).sum();
        let variance: f64 = x.iter().map(|a| (a - x_mean).powi(2)).sum();

        // constant inputs carry no signal; fall back to the target mean
        self.slope = if variance > f64::EPSILON {
            covariance / variance
        } else {
            0.0
        };
        self.intercept = y_mean - self.slope * x_mean;
        Ok(())
    }

    async fn predict(&self, features: &Array3<f64>) -> Result<Array1<f64>> {
        Ok(Self::window_means(features).mapv(|m| self.slope * m + self.intercept))
    }
}
