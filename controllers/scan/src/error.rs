//! Controller-specific error types.
//!
//! Errors that reach the error policy are requeued with backoff. Terminal
//! validation failures never become errors; they are written to the scan's
//! Failed condition instead. `MissingOutput` sits in between: the job
//! correlator catches it and fails the run rather than retrying.

use thiserror::Error;

/// Errors that can occur in the scan operator.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Runner output could not be parsed
    #[error("report error: {0}")]
    Report(#[from] kb_report::ReportError),

    /// Another scan currently owns the right to run
    #[error("scan contention: {0}")]
    ScanContention(String),

    /// Child resource without the expected labels/annotations
    #[error("malformed resource: {0}")]
    MalformedResource(String),

    /// Runner finished but produced no usable output
    #[error("missing scan output: {0}")]
    MissingOutput(String),

    /// Status update kept conflicting past the bounded retry budget
    #[error("conflict retries exhausted: {0}")]
    ConflictExhausted(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Metric registration or collection error
    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Resource watch failed
    #[error("resource watch failed: {0}")]
    Watch(String),

    /// Metrics endpoint I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
