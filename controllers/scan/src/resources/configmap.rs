//! Config maps mounted into the runner job.

use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::ObjectMeta;
use serde_json::json;

use crate::controller::OperatorConfig;
use crate::error::ControllerError;
use crds::{
    ClusterScan, ClusterScanProfile, CUSTOM_BENCHMARK_BASE_DIR, CUSTOM_BENCHMARK_CM, SCAN_CONFIG_CM,
    SCAN_NS, SCAN_PLUGINS_CM, SCAN_SERVICE, SCAN_USER_SKIP_CM, output_config_map_name,
    runner_job_name, safe_concat_name,
};
use kube::ResourceExt;

use super::child_labels;

const CONFIG_FILE_NAME: &str = "config.json";
/// Skip-list key the runner applies to the currently selected benchmark.
const CURRENT_BENCHMARK_KEY: &str = "current";

fn config_map(name: String, scan: &ClusterScan, profile_name: &str, config: &OperatorConfig, body: String) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(name),
            namespace: Some(SCAN_NS.to_string()),
            labels: Some(child_labels(scan, profile_name, &config.controller_name)),
            ..ObjectMeta::default()
        },
        data: Some([(CONFIG_FILE_NAME.to_string(), body)].into()),
        ..ConfigMap::default()
    }
}

/// Aggregator configuration consumed by the runner.
pub fn scan_config_map(
    scan: &ClusterScan,
    profile_name: &str,
    config: &OperatorConfig,
) -> Result<ConfigMap, ControllerError> {
    let scan_name = scan.name_any();
    let body = serde_json::to_string_pretty(&json!({
        "namespace": SCAN_NS,
        "runName": runner_job_name(&scan_name),
        "advertiseAddress": SCAN_SERVICE,
        "outputConfigMapName": output_config_map_name(&scan_name),
        "workerImage": config.scan_image_ref(),
    }))?;
    Ok(config_map(
        safe_concat_name(&[SCAN_CONFIG_CM, &scan_name]),
        scan,
        profile_name,
        config,
        body,
    ))
}

/// Plugin definition telling the runner which benchmark to execute.
pub fn plugin_config_map(
    scan: &ClusterScan,
    profile: &ClusterScanProfile,
    config: &OperatorConfig,
    custom_benchmark: Option<&ConfigMap>,
) -> Result<ConfigMap, ControllerError> {
    let scan_name = scan.name_any();
    let profile_name = profile.name_any();
    let body = serde_json::to_string_pretty(&json!({
        "namespace": SCAN_NS,
        "runName": runner_job_name(&scan_name),
        "image": config.scan_image_ref(),
        "benchmarkVersion": profile.spec.benchmark_version,
        "isCustomBenchmark": custom_benchmark.is_some(),
        "customBenchmarkConfigDir": CUSTOM_BENCHMARK_BASE_DIR,
        "customBenchmarkConfigMapName": custom_benchmark
            .and_then(|cm| cm.metadata.name.clone())
            .unwrap_or_default(),
    }))?;
    Ok(config_map(
        safe_concat_name(&[SCAN_PLUGINS_CM, &scan_name]),
        scan,
        &profile_name,
        config,
        body,
    ))
}

/// Per-run skip list, present only when the profile skips tests.
pub fn skip_config_map(
    scan: &ClusterScan,
    profile: &ClusterScanProfile,
    config: &OperatorConfig,
) -> Result<Option<ConfigMap>, ControllerError> {
    let skip = &profile.spec.skip_tests;
    if skip.is_empty() {
        return Ok(None);
    }
    let body = serde_json::to_string(&json!({
        "skip": { CURRENT_BENCHMARK_KEY: skip }
    }))?;
    Ok(Some(config_map(
        skip_config_map_name(&scan.name_any()),
        scan,
        &profile.name_any(),
        config,
        body,
    )))
}

pub fn skip_config_map_name(scan_name: &str) -> String {
    safe_concat_name(&[SCAN_USER_SKIP_CM, scan_name])
}

/// Copy of a user-supplied custom benchmark config map into the scan
/// namespace so the runner pod can mount it. Removed again at cleanup.
pub fn custom_benchmark_copy(
    scan: &ClusterScan,
    profile_name: &str,
    config: &OperatorConfig,
    source: &ConfigMap,
) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(custom_benchmark_copy_name(&scan.name_any())),
            namespace: Some(SCAN_NS.to_string()),
            labels: Some(child_labels(scan, profile_name, &config.controller_name)),
            ..ObjectMeta::default()
        },
        data: source.data.clone(),
        ..ConfigMap::default()
    }
}

pub fn custom_benchmark_copy_name(scan_name: &str) -> String {
    safe_concat_name(&[CUSTOM_BENCHMARK_CM, scan_name])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{operator_config, profile_named, scan_named};

    #[test]
    fn scan_config_map_targets_the_run() {
        let scan = scan_named("nightly");
        let cm = scan_config_map(&scan, "cis-1.8-profile", &operator_config()).unwrap();
        assert_eq!(cm.metadata.name.as_deref(), Some("scan-config-cm-nightly"));
        assert_eq!(cm.metadata.namespace.as_deref(), Some(SCAN_NS));
        let body = &cm.data.unwrap()[CONFIG_FILE_NAME];
        assert!(body.contains("scan-runner-nightly"));
        assert!(body.contains("scan-output-for-nightly"));
    }

    #[test]
    fn skip_config_map_only_built_when_profile_skips() {
        let scan = scan_named("nightly");
        let config = operator_config();
        let mut profile = profile_named("cis-1.8-profile", "cis-1.8");
        assert!(skip_config_map(&scan, &profile, &config).unwrap().is_none());

        profile.spec.skip_tests = vec!["1.1.1".to_string(), "1.2.4".to_string()];
        let cm = skip_config_map(&scan, &profile, &config).unwrap().unwrap();
        assert_eq!(cm.metadata.name.as_deref(), Some("scan-user-skip-cm-nightly"));
        let body = &cm.data.unwrap()[CONFIG_FILE_NAME];
        assert_eq!(
            serde_json::from_str::<serde_json::Value>(body).unwrap(),
            serde_json::json!({"skip": {"current": ["1.1.1", "1.2.4"]}})
        );
    }

    #[test]
    fn custom_benchmark_copy_carries_source_data() {
        let scan = scan_named("nightly");
        let source = ConfigMap {
            data: Some([("cfg.yaml".to_string(), "checks: []".to_string())].into()),
            ..ConfigMap::default()
        };
        let copy = custom_benchmark_copy(&scan, "p", &operator_config(), &source);
        assert_eq!(
            copy.metadata.name.as_deref(),
            Some("custom-benchmark-cm-nightly")
        );
        assert_eq!(copy.data, source.data);
    }
}
