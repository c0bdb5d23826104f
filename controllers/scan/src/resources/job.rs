//! Runner job builder.
//!
//! One job per scan run, fixed name, backoff limit 0: the runner either
//! finishes or the job fails, and the correlator reads the outcome off the
//! job conditions. Retry policy lives in the scan lifecycle, not the job.

use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, ContainerPort, EmptyDirVolumeSource, EnvVar, EnvVarSource,
    ObjectFieldSelector, PodSpec, PodTemplateSpec, Toleration, Volume, VolumeMount,
};
use kube::ResourceExt;
use kube::api::ObjectMeta;

use crate::controller::OperatorConfig;
use crds::{
    ClusterScan, ClusterScanProfile, RUNNER_LABEL_KEY, RUNNER_LABEL_VALUE, SCAN_NS,
    SCAN_PLUGINS_CM, SCAN_SERVICE, SCAN_SERVICE_ACCOUNT, SCAN_CONFIG_CM, SCAN_USER_SKIP_CM,
    output_config_map_name, runner_job_name, safe_concat_name,
};

use super::child_labels;

const BACKOFF_LIMIT: i32 = 0;
const TERMINATION_GRACE_SECONDS: i64 = 0;

pub fn runner_job(
    scan: &ClusterScan,
    profile: &ClusterScanProfile,
    config: &OperatorConfig,
) -> Job {
    let scan_name = scan.name_any();
    let profile_name = profile.name_any();
    let job_name = runner_job_name(&scan_name);

    let mut pod_labels = child_labels(scan, &profile_name, &config.controller_name);
    pod_labels.insert("app.kubernetes.io/name".to_string(), "kubescan".to_string());
    pod_labels.insert("app.kubernetes.io/instance".to_string(), job_name.clone());
    pod_labels.insert(RUNNER_LABEL_KEY.to_string(), RUNNER_LABEL_VALUE.to_string());

    let mut volumes = vec![
        config_map_volume("config-volume", safe_concat_name(&[SCAN_CONFIG_CM, &scan_name])),
        config_map_volume("plugins-volume", safe_concat_name(&[SCAN_PLUGINS_CM, &scan_name])),
        Volume {
            name: "output-volume".to_string(),
            empty_dir: Some(EmptyDirVolumeSource::default()),
            ..Volume::default()
        },
    ];
    let mut mounts = vec![
        mount("config-volume", "/etc/kubescan"),
        mount("plugins-volume", "/plugins.d"),
        mount("output-volume", "/tmp/results"),
    ];
    if !profile.spec.skip_tests.is_empty() {
        volumes.push(config_map_volume(
            "user-skip-volume",
            safe_concat_name(&[SCAN_USER_SKIP_CM, &scan_name]),
        ));
        mounts.push(mount("user-skip-volume", "/etc/kbs/userskip"));
    }

    let env = vec![
        env_value("OVERRIDE_BENCHMARK_VERSION", &profile.spec.benchmark_version),
        env_value("RUNNER_NS", SCAN_NS),
        EnvVar {
            name: "RUNNER_POD_NAME".to_string(),
            value_from: Some(EnvVarSource {
                field_ref: Some(ObjectFieldSelector {
                    field_path: "metadata.name".to_string(),
                    ..ObjectFieldSelector::default()
                }),
                ..EnvVarSource::default()
            }),
            ..EnvVar::default()
        },
        env_value("RUNNER_ADVERTISE_ADDRESS", SCAN_SERVICE),
        env_value("OUTPUT_CONFIGMAPNAME", &output_config_map_name(&scan_name)),
    ];

    Job {
        metadata: ObjectMeta {
            name: Some(job_name),
            namespace: Some(SCAN_NS.to_string()),
            labels: Some(child_labels(scan, &profile_name, &config.controller_name)),
            ..ObjectMeta::default()
        },
        spec: Some(JobSpec {
            backoff_limit: Some(BACKOFF_LIMIT),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(pod_labels),
                    ..ObjectMeta::default()
                }),
                spec: Some(PodSpec {
                    service_account_name: Some(SCAN_SERVICE_ACCOUNT.to_string()),
                    termination_grace_period_seconds: Some(TERMINATION_GRACE_SECONDS),
                    tolerations: Some(vec![Toleration {
                        operator: Some("Exists".to_string()),
                        ..Toleration::default()
                    }]),
                    restart_policy: Some("Never".to_string()),
                    volumes: Some(volumes),
                    containers: vec![Container {
                        name: "kubescan-runner".to_string(),
                        image: Some(config.scan_image_ref()),
                        image_pull_policy: Some("Always".to_string()),
                        env: Some(env),
                        ports: Some(vec![ContainerPort {
                            container_port: 8080,
                            protocol: Some("TCP".to_string()),
                            ..ContainerPort::default()
                        }]),
                        volume_mounts: Some(mounts),
                        ..Container::default()
                    }],
                    ..PodSpec::default()
                }),
            },
            ..JobSpec::default()
        }),
        ..Job::default()
    }
}

fn config_map_volume(volume_name: &str, cm_name: String) -> Volume {
    Volume {
        name: volume_name.to_string(),
        config_map: Some(ConfigMapVolumeSource {
            name: cm_name,
            ..ConfigMapVolumeSource::default()
        }),
        ..Volume::default()
    }
}

fn mount(volume_name: &str, path: &str) -> VolumeMount {
    VolumeMount {
        name: volume_name.to_string(),
        mount_path: path.to_string(),
        ..VolumeMount::default()
    }
}

fn env_value(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        ..EnvVar::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{operator_config, profile_named, scan_named};

    #[test]
    fn runner_job_is_single_shot_and_labeled() {
        let scan = scan_named("nightly");
        let profile = profile_named("cis-1.8-profile", "cis-1.8");
        let job = runner_job(&scan, &profile, &operator_config());

        assert_eq!(job.metadata.name.as_deref(), Some("scan-runner-nightly"));
        assert_eq!(job.metadata.namespace.as_deref(), Some(SCAN_NS));
        let spec = job.spec.unwrap();
        assert_eq!(spec.backoff_limit, Some(0));

        let pod = spec.template.spec.unwrap();
        assert_eq!(pod.restart_policy.as_deref(), Some("Never"));
        assert_eq!(pod.service_account_name.as_deref(), Some(SCAN_SERVICE_ACCOUNT));

        let pod_labels = spec.template.metadata.unwrap().labels.unwrap();
        assert_eq!(pod_labels[RUNNER_LABEL_KEY], RUNNER_LABEL_VALUE);

        let env = pod.containers[0].env.clone().unwrap();
        let output = env
            .iter()
            .find(|e| e.name == "OUTPUT_CONFIGMAPNAME")
            .unwrap();
        assert_eq!(output.value.as_deref(), Some("scan-output-for-nightly"));
    }

    #[test]
    fn skip_volume_mounted_only_when_profile_skips() {
        let scan = scan_named("nightly");
        let config = operator_config();
        let mut profile = profile_named("cis-1.8-profile", "cis-1.8");

        let job = runner_job(&scan, &profile, &config);
        let volumes = job.spec.unwrap().template.spec.unwrap().volumes.unwrap();
        assert!(!volumes.iter().any(|v| v.name == "user-skip-volume"));

        profile.spec.skip_tests = vec!["1.1.1".to_string()];
        let job = runner_job(&scan, &profile, &config);
        let volumes = job.spec.unwrap().template.spec.unwrap().volumes.unwrap();
        assert!(volumes.iter().any(|v| v.name == "user-skip-volume"));
    }
}
