//! Batch input parsing.

use std::num::ParseIntError;

/// Batch used when the operator does not provide one.
pub const SAMPLE_BATCH: [i32; 8] = [1, 2, 3, 4, 5, 6, 7, 8];

/// Where the batch came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchSource {
    /// Parsed from the operator's input.
    Parsed,
    /// Blank input; sample used.
    Sample,
    /// Input did not parse; sample used.
    Fallback(String),
}

/// Parse whitespace-separated integers.
pub fn parse_batch(line: &str) -> Result<Vec<i32>, ParseIntError> {
    line.split_whitespace().map(str::parse).collect()
}

/// Batch for one line of operator input. Blank or unparsable input yields
/// [`SAMPLE_BATCH`].
pub fn resolve_batch(line: &str) -> (Vec<i32>, BatchSource) {
    if line.trim().is_empty() {
        return (SAMPLE_BATCH.to_vec(), BatchSource::Sample);
    }
    match parse_batch(line) {
        Ok(batch) => (batch, BatchSource::Parsed),
        Err(e) => (SAMPLE_BATCH.to_vec(), BatchSource::Fallback(e.to_string())),
    }
}

/// Render a batch as `1, 2, 3`.
pub fn format_batch(batch: &[i32]) -> String {
    batch
        .iter()
        .map(i32::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
