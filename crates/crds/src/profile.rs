//! ClusterScanProfile CRD
//!
//! Read-only input binding a scan to a benchmark version, with an optional
//! list of check IDs to force-skip.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "kubescan.microscaler.io",
    version = "v1",
    kind = "ClusterScanProfile"
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterScanProfileSpec {
    /// Benchmark this profile runs; must name a ClusterScanBenchmark.
    #[serde(default)]
    pub benchmark_version: String,

    /// Check IDs to skip regardless of the benchmark defaults.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skip_tests: Vec<String>,
}
