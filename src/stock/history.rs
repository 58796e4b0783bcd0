//! Serialized price history stored alongside each quote.
//!
//! The blob is one `"<timestamp_ms>, <close>"` line per point, oldest first,
//! each line terminated by `\n`.

use serde::{Deserialize, Serialize};

/// One historical close
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    /// Milliseconds since the Unix epoch
    pub timestamp_ms: i64,
    pub close: f64,
}

impl HistoryPoint {
    pub fn new(timestamp_ms: i64, close: f64) -> Self {
        Self { timestamp_ms, close }
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum HistoryParseError {
    #[error("line {line}: expected `timestamp, close`")]
    MissingField { line: usize },

    #[error("line {line}: invalid timestamp `{value}`")]
    InvalidTimestamp { line: usize, value: String },

    #[error("line {line}: invalid close `{value}`")]
    InvalidClose { line: usize, value: String },
}

pub fn serialize_history(points: &[HistoryPoint]) -> String {
    let mut blob = String::with_capacity(points.len() * 24);
    for point in points {
        blob.push_str(&point.timestamp_ms.to_string());
        blob.push_str(", ");
        blob.push_str(&point.close.to_string());
        blob.push('\n');
    }
    blob
}

/// Parse a history blob back into points. Blank lines are ignored.
pub fn parse_history(blob: &str) -> Result<Vec<HistoryPoint>, HistoryParseError> {
    let mut points = Vec::new();

    for (idx, raw) in blob.lines().enumerate() {
        let line = idx + 1;
        if raw.trim().is_empty() {
            continue;
        }

        let (timestamp, close) = raw
            .split_once(',')
            .ok_or(HistoryParseError::MissingField { line })?;

        let timestamp = timestamp.trim();
        let close = close.trim();

        let timestamp_ms = timestamp
            .parse::<i64>()
            .map_err(|_| HistoryParseError::InvalidTimestamp {
                line,
                value: timestamp.to_string(),
            })?;
        let close = close
            .parse::<f64>()
            .map_err(|_| HistoryParseError::InvalidClose {
                line,
                value: close.to_string(),
            })?;

        points.push(HistoryPoint { timestamp_ms, close });
    }

    Ok(points)
}
