//! Stage orchestration.
//!
//! [`PipelineContext`] owns the configuration and exposes one method per stage.
//! Each stage takes the previous stage's output and returns a new value, so a
//! stage cannot run before its inputs exist. Large buffers are moved forward and
//! dropped as soon as the next stage has consumed them.

use chrono::NaiveDate;
use serde::Serialize;
use tracing::info;

use crate::config::{ForecastMode, PipelineConfig};
use crate::error::Result;
use crate::pipeline::aggregate::aggregate_trips;
use crate::pipeline::future::{ForecastRow, FutureInputs, extrapolate, rolling_forecast};
use crate::pipeline::sequence::build_sequences;
use crate::pipeline::split::{FittedScalers, Split, split_sequences};
use crate::pipeline::types::{AggregateBucket, RawRecord, RegionId, Sequence};
use crate::pipeline::utility::{mean_absolute_error, root_mean_squared_error};
use crate::pipeline::validate::{ValidationOutcome, validate_rows};
use crate::regressor::Regressor;
use crate::stats::DataSummary;

/// A test-set prediction next to its observed value, in trips.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionRow {
    pub date: NaiveDate,
    pub hour: Option<u32>,
    pub region: RegionId,
    pub actual: f64,
    pub predicted: f64,
}

/// Test-set quality. `loss` and `normalized_mae` are in scaled units,
/// `mae` and `rmse` in trips.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ModelEvaluation {
    pub loss: f64,
    pub normalized_mae: f64,
    pub mae: f64,
    pub rmse: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub summary: DataSummary,
    pub evaluation: ModelEvaluation,
    pub predictions: Vec<PredictionRow>,
    pub forecast: Vec<ForecastRow>,
}

#[derive(Debug, Clone)]
pub struct PipelineContext {
    config: PipelineConfig,
}

impl PipelineContext {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn validate(&self, rows: Vec<RawRecord>) -> Result<ValidationOutcome> {
        validate_rows(rows, self.config.region_size)
    }

    pub fn aggregate(&self, outcome: &ValidationOutcome) -> Vec<AggregateBucket> {
        aggregate_trips(&outcome.trips, self.config.aggregation_level)
    }

    pub fn sequences(&self, buckets: &[AggregateBucket]) -> Result<Sequence> {
        build_sequences(buckets, self.config.sequence_length)
    }

    pub fn split(&self, sequence: Sequence) -> Result<Split> {
        split_sequences(sequence, self.config.train_ratio, self.config.scale_policy)
    }

    pub fn extrapolate(
        &self,
        buckets: &[AggregateBucket],
        regions: &[RegionId],
        scalers: &FittedScalers,
    ) -> Result<FutureInputs> {
        extrapolate(
            buckets,
            regions,
            self.config.sequence_length,
            self.config.days_to_predict,
            &scalers.features,
        )
    }

    /// Validates and aggregates raw rows, returning the buckets and their summary.
    pub fn prepare(&self, rows: Vec<RawRecord>) -> Result<(Vec<AggregateBucket>, DataSummary)> {
        let outcome = self.validate(rows)?;
        let buckets = self.aggregate(&outcome);
        let summary = DataSummary::from_stages(&outcome, &buckets);
        Ok((buckets, summary))
    }

    /// Runs every stage, trains `regressor`, and reports test predictions and the
    /// forecast in original units.
    #[tracing::instrument(skip_all, fields(rows = rows.len()))]
    pub async fn run<R: Regressor + ?Sized>(
        &self,
        rows: Vec<RawRecord>,
        regressor: &mut R,
    ) -> anyhow::Result<PipelineReport> {
        let (buckets, summary) = self.prepare(rows)?;
        let sequence = self.sequences(&buckets)?;
        let summary = summary.with_sequences(sequence.len());
        let regions = sequence.regions.clone();

        let Split {
            train,
            test,
            scalers,
        } = self.split(sequence)?;

        regressor.fit(&train.features, &train.targets).await?;
        info!(samples = train.targets.len(), "Regressor fitted");
        drop(train);

        let normalized = regressor.evaluate(&test.features, &test.targets).await?;
        let predicted = scalers
            .targets
            .denormalize_array(&regressor.predict(&test.features).await?);

        let actual = test.original_targets.to_vec();
        let predicted_values = predicted.to_vec();
        let evaluation = ModelEvaluation {
            loss: normalized.loss,
            normalized_mae: normalized.mae,
            mae: mean_absolute_error(&actual, &predicted_values),
            rmse: root_mean_squared_error(&actual, &predicted_values),
        };
        info!(
            loss = evaluation.loss,
            mae = evaluation.mae,
            rmse = evaluation.rmse,
            "Regressor evaluated"
        );

        let predictions = test
            .dates
            .into_iter()
            .zip(actual)
            .zip(predicted_values)
            .map(|((label, actual), predicted)| PredictionRow {
                date: label.date,
                hour: label.hour,
                region: label.region,
                actual,
                predicted,
            })
            .collect();

        let forecast = self.forecast(&*regressor, &buckets, &regions, &scalers).await?;

        Ok(PipelineReport {
            summary,
            evaluation,
            predictions,
            forecast,
        })
    }

    async fn forecast<R: Regressor + ?Sized>(
        &self,
        regressor: &R,
        buckets: &[AggregateBucket],
        regions: &[RegionId],
        scalers: &FittedScalers,
    ) -> anyhow::Result<Vec<ForecastRow>> {
        match self.config.forecast_mode {
            ForecastMode::Single => {
                let inputs = self.extrapolate(buckets, regions, scalers)?;
                let predictions = regressor.predict(&inputs.features).await?;
                anyhow::ensure!(
                    predictions.len() == inputs.regions.len(),
                    "predicted {} values for {} future windows",
                    predictions.len(),
                    inputs.regions.len()
                );
                Ok(inputs
                    .labels
                    .into_iter()
                    .map(|label| ForecastRow {
                        predicted: scalers
                            .targets
                            .denormalize(predictions[label.sample])
                            .max(0.0),
                        date: label.date,
                        hour: label.hour,
                        region: label.region,
                    })
                    .collect())
            }
            ForecastMode::Rolling => {
                rolling_forecast(
                    regressor,
                    buckets,
                    regions,
                    self.config.sequence_length,
                    self.config.days_to_predict,
                    scalers,
                )
                .await
            }
        }
    }
}
