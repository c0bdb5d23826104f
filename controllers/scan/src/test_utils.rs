//! Test helpers for building scan fixtures.

#[cfg(test)]
use crate::controller::OperatorConfig;
#[cfg(test)]
use crds::{
    ClusterScan, ClusterScanBenchmark, ClusterScanBenchmarkSpec, ClusterScanProfile,
    ClusterScanProfileSpec, ClusterScanSpec, ScheduledScanConfig,
};
#[cfg(test)]
pub fn scan_named(name: &str) -> ClusterScan {
    ClusterScan::new(name, ClusterScanSpec::default())
}

#[cfg(test)]
pub fn scheduled_scan_named(name: &str, cron: &str) -> ClusterScan {
    ClusterScan::new(
        name,
        ClusterScanSpec {
            scheduled_scan_config: Some(ScheduledScanConfig {
                cron_schedule: cron.to_string(),
                ..ScheduledScanConfig::default()
            }),
            ..ClusterScanSpec::default()
        },
    )
}

#[cfg(test)]
pub fn profile_named(name: &str, benchmark_version: &str) -> ClusterScanProfile {
    ClusterScanProfile::new(
        name,
        ClusterScanProfileSpec {
            benchmark_version: benchmark_version.to_string(),
            skip_tests: Vec::new(),
        },
    )
}

#[cfg(test)]
pub fn benchmark_named(
    name: &str,
    provider: &str,
    min_version: &str,
    max_version: &str,
) -> ClusterScanBenchmark {
    ClusterScanBenchmark::new(
        name,
        ClusterScanBenchmarkSpec {
            cluster_provider: provider.to_string(),
            min_kubernetes_version: min_version.to_string(),
            max_kubernetes_version: max_version.to_string(),
            ..ClusterScanBenchmarkSpec::default()
        },
    )
}

#[cfg(test)]
pub fn operator_config() -> OperatorConfig {
    OperatorConfig {
        controller_name: "kubescan".to_string(),
        cluster_name: "prod".to_string(),
        cluster_provider: "k3s".to_string(),
        kubernetes_version: "v1.22.3".to_string(),
        scan_image: "microscaler/kubescan-runner".to_string(),
        scan_image_tag: "v0.4.1".to_string(),
        alerts_enabled: true,
        alert_severity: "warning".to_string(),
        metrics_addr: "0.0.0.0:8080".to_string(),
    }
}
