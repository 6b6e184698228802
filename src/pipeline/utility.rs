/// Computes the arithmetic mean of a slice of values. Returns 0.0 for empty input.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Mean of squared differences between paired values. Returns 0.0 for empty input.
pub fn mean_squared_error(actual: &[f64], predicted: &[f64]) -> f64 {
    let squared: Vec<f64> = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .collect();
    mean(&squared)
}

/// Mean of absolute differences between paired values. Returns 0.0 for empty input.
pub fn mean_absolute_error(actual: &[f64], predicted: &[f64]) -> f64 {
    let absolute: Vec<f64> = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).abs())
        .collect();
    mean(&absolute)
}

pub fn root_mean_squared_error(actual: &[f64], predicted: &[f64]) -> f64 {
    mean_squared_error(actual, predicted).sqrt()
}
