//! CSV decoder for raw trip rows.

use csv::{ReaderBuilder, Trim};

use crate::error::{PipelineError, Result};
use crate::pipeline::types::RawRecord;

/// Decodes CSV bytes into one [`RawRecord`] per data line, keyed by header.
///
/// # Errors
///
/// Returns [`PipelineError::Decode`] if the header or any record is malformed.
pub fn parse_trips(bytes: &[u8]) -> Result<Vec<RawRecord>> {
    let mut rdr = ReaderBuilder::new().trim(Trim::All).from_reader(bytes);
    let headers = rdr.headers()?.clone();

    let mut rows = Vec::new();
    for (i, result) in rdr.records().enumerate() {
        let record =
            result.map_err(|e| PipelineError::Decode(format!("record {}: {}", i + 1, e)))?;
        rows.push(RawRecord::from_pairs(headers.iter().zip(record.iter())));
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty_bytes_returns_no_rows() {
        let rows = parse_trips(&[]).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_parse_rows_keyed_by_header() {
        let csv = "pickup_datetime, Pickup_Longitude ,pickup_latitude\n\
                   2024-01-01 08:00:00, -73.98 ,40.75\n";
        let rows = parse_trips(csv.as_bytes()).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get(&["pickup_datetime"]), Some("2024-01-01 08:00:00"));
        assert_eq!(rows[0].get(&["pickup_longitude"]), Some("-73.98"));
        assert_eq!(rows[0].get(&["pickup_latitude"]), Some("40.75"));
    }

    #[test]
    fn test_parse_ragged_record_fails() {
        let csv = "a,b,c\n1,2,3\n4,5\n";
        let result = parse_trips(csv.as_bytes());
        assert!(matches!(result, Err(PipelineError::Decode(msg)) if msg.contains("record 2")));
    }

    #[test]
    fn test_parse_invalid_utf8_fails() {
        let bytes = b"a,b\n\xFF\xFE,1\n";
        assert!(parse_trips(bytes).is_err());
    }
}
