//! Benchmark runner output parsing.
//!
//! The runner writes one raw JSON blob per run. This crate turns that blob
//! into the pass/fail/skip/warn/not-applicable counts the operator persists
//! in scan status, and validates the payload stored in ClusterScanReports.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors reading runner output.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Output blob is not valid JSON or misses required count fields.
    #[error("malformed runner output: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Check counts extracted from one runner output blob.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total: u32,
    pub pass: u32,
    pub fail: u32,
    pub skip: u32,
    #[serde(default)]
    pub warn: u32,
    #[serde(default)]
    pub not_applicable: u32,
}

impl Summary {
    /// Parses runner output bytes into a summary.
    ///
    /// Empty input yields `None` (the runner wrote nothing); anything else
    /// must be a valid result blob.
    pub fn get(output: &[u8]) -> Result<Option<Self>, ReportError> {
        if output.is_empty() {
            return Ok(None);
        }
        let summary = serde_json::from_slice(output)?;
        Ok(Some(summary))
    }
}

/// Validates a runner output blob and returns it unchanged.
///
/// The persisted report payload must round-trip the runner's bytes exactly,
/// so this only checks the blob parses as JSON.
pub fn report_json_bytes(output: &[u8]) -> Result<&[u8], ReportError> {
    let _: serde_json::Value = serde_json::from_slice(output)?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    const OUTPUT: &str =
        r#"{"total":10,"pass":7,"fail":2,"skip":1,"warn":0,"notApplicable":0}"#;

    #[test]
    fn parses_counts_from_runner_output() {
        let summary = Summary::get(OUTPUT.as_bytes()).unwrap().unwrap();
        assert_eq!(
            summary,
            Summary {
                total: 10,
                pass: 7,
                fail: 2,
                skip: 1,
                warn: 0,
                not_applicable: 0,
            }
        );
    }

    #[test]
    fn empty_output_is_none() {
        assert!(Summary::get(b"").unwrap().is_none());
    }

    #[test]
    fn malformed_output_is_an_error() {
        assert!(Summary::get(b"not json").is_err());
        assert!(report_json_bytes(b"{truncated").is_err());
    }

    #[test]
    fn report_payload_round_trips_input_bytes() {
        let payload = report_json_bytes(OUTPUT.as_bytes()).unwrap();
        assert_eq!(payload, OUTPUT.as_bytes());
    }

    #[test]
    fn missing_optional_counts_default_to_zero() {
        let summary = Summary::get(br#"{"total":4,"pass":4,"fail":0,"skip":0}"#)
            .unwrap()
            .unwrap();
        assert_eq!(summary.warn, 0);
        assert_eq!(summary.not_applicable, 0);
    }
}
