//! ClusterScanReport CRD
//!
//! One immutable record per completed non-failed scan run, owned by the
//! ClusterScan and purged by retention.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "kubescan.microscaler.io",
    version = "v1",
    kind = "ClusterScanReport"
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterScanReportSpec {
    /// Benchmark version the run used.
    #[serde(default)]
    pub benchmark_version: String,

    /// RFC3339 time the run finished.
    #[serde(default)]
    pub last_run_timestamp: String,

    /// Raw result payload as produced by the runner.
    #[serde(default)]
    pub report_json: String,
}
