//! Aggregation service fronting the runner pod.

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::ObjectMeta;

use crate::controller::OperatorConfig;
use crds::{ClusterScan, RUNNER_LABEL_KEY, RUNNER_LABEL_VALUE, SCAN_NS, SCAN_SERVICE};

use super::child_labels;

pub fn runner_service(
    scan: &ClusterScan,
    profile_name: &str,
    config: &OperatorConfig,
) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(SCAN_SERVICE.to_string()),
            namespace: Some(SCAN_NS.to_string()),
            labels: Some(child_labels(scan, profile_name, &config.controller_name)),
            ..ObjectMeta::default()
        },
        spec: Some(ServiceSpec {
            selector: Some(
                [(RUNNER_LABEL_KEY.to_string(), RUNNER_LABEL_VALUE.to_string())].into(),
            ),
            ports: Some(vec![ServicePort {
                port: 8080,
                protocol: Some("TCP".to_string()),
                target_port: Some(IntOrString::Int(8080)),
                ..ServicePort::default()
            }]),
            ..ServiceSpec::default()
        }),
        ..Service::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{operator_config, scan_named};

    #[test]
    fn service_selects_the_runner_pod() {
        let svc = runner_service(&scan_named("nightly"), "p", &operator_config());
        assert_eq!(svc.metadata.name.as_deref(), Some(SCAN_SERVICE));
        let spec = svc.spec.unwrap();
        assert_eq!(
            spec.selector.unwrap()[RUNNER_LABEL_KEY],
            RUNNER_LABEL_VALUE
        );
        assert_eq!(spec.ports.unwrap()[0].port, 8080);
    }
}
