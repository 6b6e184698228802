//! Pipeline configuration.
//!
//! Loaded from a JSON file (missing fields take their defaults) and then
//! overridden field by field from the command line.

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};

/// Time granularity of demand buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationLevel {
    #[default]
    Daily,
    Hourly,
}

/// How future inputs are produced for forecasting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForecastMode {
    /// One window per region; every future label shares its prediction.
    #[default]
    Single,
    /// Feed each prediction back into the window and step forward.
    Rolling,
}

/// What a scaler does when fit on a constant array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalePolicy {
    #[default]
    Reject,
    /// normalize(x) = 0 and denormalize(x) = min.
    Collapse,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub aggregation_level: AggregationLevel,
    /// Grid cell size in degrees of longitude/latitude.
    pub region_size: f64,
    pub sequence_length: usize,
    pub train_ratio: f64,
    pub days_to_predict: usize,
    pub forecast_mode: ForecastMode,
    pub scale_policy: ScalePolicy,
    pub preview_limit: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            aggregation_level: AggregationLevel::Daily,
            region_size: 0.05,
            sequence_length: 14,
            train_ratio: 0.8,
            days_to_predict: 7,
            forecast_mode: ForecastMode::Single,
            scale_policy: ScalePolicy::Reject,
            preview_limit: 10,
        }
    }
}

impl PipelineConfig {
    /// Loads the config from a JSON file at `path`.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.region_size.is_finite() || self.region_size <= 0.0 {
            return Err(PipelineError::InvalidConfig(format!(
                "region_size must be a positive number, got {}",
                self.region_size
            )));
        }
        if self.sequence_length < 1 {
            return Err(PipelineError::InvalidConfig(
                "sequence_length must be at least 1".to_string(),
            ));
        }
        if !(self.train_ratio > 0.0 && self.train_ratio < 1.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "train_ratio must be strictly between 0 and 1, got {}",
                self.train_ratio
            )));
        }
        if self.days_to_predict < 1 {
            return Err(PipelineError::InvalidConfig(
                "days_to_predict must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
