//! ClusterScanBenchmark CRD
//!
//! Read-only input describing a versioned set of compliance checks and the
//! clusters it applies to.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "kubescan.microscaler.io",
    version = "v1",
    kind = "ClusterScanBenchmark"
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterScanBenchmarkSpec {
    /// Cluster provider this benchmark applies to; empty matches any.
    #[serde(default)]
    pub cluster_provider: String,

    /// Lowest supported cluster version (inclusive); empty for no lower bound.
    #[serde(default)]
    pub min_kubernetes_version: String,

    /// Highest supported cluster version (inclusive); empty for no upper bound.
    #[serde(default)]
    pub max_kubernetes_version: String,

    /// Config map holding a custom benchmark definition, if any.
    #[serde(default)]
    pub custom_benchmark_config_map_name: String,

    /// Namespace of the custom benchmark config map.
    #[serde(default)]
    pub custom_benchmark_config_map_namespace: String,
}
