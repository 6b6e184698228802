//! The spatiotemporal feature pipeline.
//!
//! Raw rows are validated into trips, binned into grid regions and aggregated
//! into per-period demand buckets. Each region's history is then cut into
//! fixed-width windows, split chronologically into train and test sets, and
//! min-max scaled with bounds taken from the training set only. The same
//! scaling is applied to the forward windows used for forecasting.

pub mod aggregate;
pub mod future;
pub mod region;
pub mod run;
pub mod scaler;
pub mod sequence;
pub mod split;
pub mod types;
pub mod utility;
pub mod validate;

pub use run::{ModelEvaluation, PipelineContext, PipelineReport, PredictionRow};
