//! Error taxonomy for the feature pipeline.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Failed to decode trip source: {0}")]
    Decode(String),
    #[error("No valid trip records after filtering; rows need {required}")]
    EmptyInput { required: &'static str },
    #[error("No region has more than {sequence_length} buckets of history")]
    InsufficientData { sequence_length: usize },
    #[error("No sequences to split")]
    NoSequences,
    #[error("Train ratio {train_ratio} leaves no training samples out of {total}")]
    EmptyTrainingSplit { total: usize, train_ratio: f64 },
    #[error("No region has at least {sequence_length} buckets to extrapolate from")]
    NoFutureData { sequence_length: usize },
    #[error("Cannot scale a constant array (min == max == {value})")]
    DegenerateScale { value: f64 },
    #[error("Cannot fit a scaler on an empty array")]
    EmptyScaleInput,
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Shape mismatch: expected {expected} values, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, PipelineError>;

impl From<csv::Error> for PipelineError {
    fn from(e: csv::Error) -> Self {
        PipelineError::Decode(e.to_string())
    }
}
