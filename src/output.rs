//! Output formatting and persistence for pipeline results.
//!
//! Supports pretty-printing, JSON serialization, and CSV append.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info};

use crate::stats::DataSummary;
use csv::WriterBuilder;
use std::fs::OpenOptions;
use std::path::Path;

/// Logs a summary using Rust's debug pretty-print format.
pub fn print_pretty(summary: &DataSummary) {
    debug!("{:#?}", summary);
}

/// Logs any serializable value as pretty-printed JSON.
pub fn print_json(value: &impl Serialize) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Appends rows to a CSV file.
///
/// Creates the file with headers if it does not already exist.
pub fn append_records<T: Serialize>(path: &str, rows: &[T]) -> Result<()> {
    let file_exists = Path::new(path).exists();
    debug!(path, file_exists, rows = rows.len(), "Appending CSV records");

    let file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .with_context(|| format!("Failed to open '{path}'"))?;

    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists) // IMPORTANT when appending
        .from_writer(file);

    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PredictionRow;
    use crate::pipeline::region::bin;
    use chrono::NaiveDate;
    use std::env;
    use std::fs;

    fn temp_path(name: &str) -> String {
        format!("{}/{}", env::temp_dir().display(), name)
    }

    fn row(hour: Option<u32>) -> PredictionRow {
        PredictionRow {
            date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            hour,
            region: bin(12.34, 56.78, 0.1),
            actual: 3.0,
            predicted: 2.5,
        }
    }

    #[test]
    fn test_print_pretty_does_not_panic() {
        print_pretty(&DataSummary::default());
    }

    #[test]
    fn test_print_json_does_not_panic() {
        print_json(&DataSummary::default()).unwrap();
    }

    #[test]
    fn test_append_records_writes_header_once() {
        let path = temp_path("trip_demand_test_header.csv");
        let _ = fs::remove_file(&path);

        append_records(&path, &[row(None)]).unwrap();
        append_records(&path, &[row(None), row(None)]).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines[0], "date,hour,region,actual,predicted");
        assert_eq!(lines.iter().filter(|l| l.starts_with("date,")).count(), 1);
        // 1 header + 3 data rows
        assert_eq!(lines.len(), 4);
        assert!(lines[1..].iter().all(|l| l.starts_with("2024-05-01,")));

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_append_records_row_format() {
        let path = temp_path("trip_demand_test_format.csv");
        let _ = fs::remove_file(&path);

        append_records(&path, &[row(Some(7))]).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines[0], "date,hour,region,actual,predicted");
        assert_eq!(lines[1], "2024-05-01,7,region_123_567,3.0,2.5");

        fs::remove_file(&path).unwrap();
    }
}
