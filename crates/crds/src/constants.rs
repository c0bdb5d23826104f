//! Well-known names and labels shared by the operator and its child resources.

/// Namespace the operator launches scan runner resources into.
pub const SCAN_NS: &str = "kubescan-system";

/// Service account the runner job executes under.
pub const SCAN_SERVICE_ACCOUNT: &str = "kubescan-serviceaccount";

/// Name prefix for the per-scan runner config map.
pub const SCAN_CONFIG_CM: &str = "scan-config-cm";

/// Name prefix for the per-scan plugin config map.
pub const SCAN_PLUGINS_CM: &str = "scan-plugins-cm";

/// Name prefix for the per-scan user skip-list config map.
pub const SCAN_USER_SKIP_CM: &str = "scan-user-skip-cm";

/// Name prefix for the per-scan copy of a custom benchmark config map.
pub const CUSTOM_BENCHMARK_CM: &str = "custom-benchmark-cm";

/// Config map holding the default profile per cluster provider.
pub const DEFAULT_PROFILES_CM: &str = "default-scan-profiles";

/// Service fronting the runner aggregation endpoint.
pub const SCAN_SERVICE: &str = "kubescan-benchmark";

/// Key inside the output config map holding the raw result blob.
pub const SCAN_OUTPUT_FILE: &str = "output.json";

/// Directory the runner mounts a custom benchmark under.
pub const CUSTOM_BENCHMARK_BASE_DIR: &str = "/etc/kbs/custombenchmark/cfg";

/// Historical reports kept per scheduled scan when no retention is configured.
pub const DEFAULT_RETENTION: usize = 3;

/// Schedule used when a scheduled scan config carries an empty cron expression.
pub const DEFAULT_CRON_SCHEDULE: &str = "0 0 * * *";

/// API group of the kubescan CRDs.
pub const GROUP: &str = "kubescan.microscaler.io";

/// Label identifying resources owned by a kubescan controller instance.
pub const LABEL_CONTROLLER: &str = "kubescan.microscaler.io/controller";

/// Label recording the profile a child resource was launched with.
pub const LABEL_PROFILE: &str = "kubescan.microscaler.io/profile";

/// Label pointing a child resource back at its owning ClusterScan.
pub const LABEL_SCAN: &str = "kubescan.microscaler.io/scan";

/// Annotation the runner pod sets when the scan finishes.
///
/// Value is `"true"` on success, `"error"` on a generic failure, or a
/// free-form failure message.
pub const COMPLETION_ANNOTATION: &str = "kubescan.microscaler.io/done";

/// Label key/value carried by the runner aggregator pod.
pub const RUNNER_LABEL_KEY: &str = "run";
/// See [`RUNNER_LABEL_KEY`].
pub const RUNNER_LABEL_VALUE: &str = "scan-agent";

/// Label key/value carried by the per-node worker daemonset pods.
pub const WORKER_LABEL_KEY: &str = "app";
/// See [`WORKER_LABEL_KEY`].
pub const WORKER_LABEL_VALUE: &str = "kubescan-worker";

/// Name prefix of the per-node worker daemonset spawned by the runner.
pub const WORKER_DS_PREFIX: &str = "kubescan-worker";

/// Name of the single-slot Lease guarding cluster-wide scan concurrency.
pub const ACTIVE_SCAN_LEASE: &str = "kubescan-active-scan";

/// Seconds an unrenewed scan lease is considered valid.
pub const ACTIVE_SCAN_LEASE_SECONDS: i32 = 3600;

const RUNNER_PREFIX: &str = "scan-runner";
const OUTPUT_CM_PREFIX: &str = "scan-output-for";
const REPORT_PREFIX: &str = "scan-report";

// Kubernetes object names cap at 63 characters for label compatibility.
const MAX_NAME_LEN: usize = 63;

/// Joins name segments with `-`, truncated to a legal object name.
pub fn safe_concat_name(parts: &[&str]) -> String {
    let joined = parts
        .iter()
        .filter(|p| !p.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("-");
    if joined.len() <= MAX_NAME_LEN {
        return joined;
    }
    let mut truncated: String = joined.chars().take(MAX_NAME_LEN).collect();
    while truncated.ends_with('-') {
        truncated.pop();
    }
    truncated
}

/// Name of the runner job for a scan.
pub fn runner_job_name(scan_name: &str) -> String {
    safe_concat_name(&[RUNNER_PREFIX, scan_name])
}

/// Name of the config map the runner writes its result blob into.
pub fn output_config_map_name(scan_name: &str) -> String {
    safe_concat_name(&[OUTPUT_CM_PREFIX, scan_name])
}

/// Prefix shared by every report generated for a scan; retention keys on it.
pub fn report_name_prefix(scan_name: &str) -> String {
    format!("{}-", safe_concat_name(&[REPORT_PREFIX, scan_name]))
}

/// `generateName` used when persisting a report for a scan run.
pub fn report_generate_name(scan_name: &str, profile_name: &str) -> String {
    format!(
        "{}-",
        safe_concat_name(&[REPORT_PREFIX, scan_name, profile_name])
    )
}

/// Name of the alerting rule created for a scan.
pub fn alert_rule_name(scan_name: &str) -> String {
    safe_concat_name(&["kubescan-alerts", scan_name])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concat_skips_empty_segments() {
        assert_eq!(safe_concat_name(&["scan-runner", "nightly"]), "scan-runner-nightly");
        assert_eq!(safe_concat_name(&["scan-report", "s", ""]), "scan-report-s");
    }

    #[test]
    fn concat_truncates_to_object_name_limit() {
        let long = "x".repeat(80);
        let name = safe_concat_name(&["scan-runner", &long]);
        assert_eq!(name.len(), 63);
        assert!(!name.ends_with('-'));
    }

    #[test]
    fn derived_names_follow_conventions() {
        assert_eq!(runner_job_name("nightly"), "scan-runner-nightly");
        assert_eq!(output_config_map_name("nightly"), "scan-output-for-nightly");
        assert_eq!(report_name_prefix("nightly"), "scan-report-nightly-");
        assert!(report_generate_name("nightly", "cis-1.8")
            .starts_with(&report_name_prefix("nightly")));
    }
}
