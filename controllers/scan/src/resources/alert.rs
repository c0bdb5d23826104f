//! PrometheusRule builder for scan alerting.
//!
//! Rules fire off the operator's own metrics, labeled by scan name, so one
//! rule object per scan is enough. The rule is owned by the scan and
//! garbage-collected with it.

use std::collections::BTreeMap;

use kube::ResourceExt;
use kube::api::ObjectMeta;

use crate::controller::OperatorConfig;
use crds::{
    AlertingRule, ClusterScan, PrometheusRule, PrometheusRuleSpec, RuleGroup, SCAN_NS,
    ScoreWarning, alert_rule_name,
};

use super::{child_labels, scan_owner_ref};

/// Builds the alerting rule for a scan, or `None` when the scan does not
/// ask for alerts.
pub fn scan_alert_rule(
    scan: &ClusterScan,
    profile_name: &str,
    config: &OperatorConfig,
) -> Option<PrometheusRule> {
    let alert_rule = scan.alert_rule()?;
    let scan_name = scan.name_any();

    let mut rules = Vec::new();
    if alert_rule.alert_on_complete {
        rules.push(AlertingRule {
            alert: "KubescanScanComplete".to_string(),
            expr: format!(
                "kubescan_scan_num_scans_complete{{scan_name=\"{scan_name}\"}} > 0"
            ),
            labels: alert_labels(config, &scan_name, profile_name),
            annotations: BTreeMap::from([(
                "summary".to_string(),
                format!("security scan {scan_name} has completed"),
            )]),
        });
    }
    if alert_rule.alert_on_failure {
        let fail_expr = if scan.spec.score_warning == ScoreWarning::Fail {
            format!(
                "kubescan_scan_num_tests_fail{{scan_name=\"{scan_name}\"}} > 0 or \
                 kubescan_scan_num_tests_warn{{scan_name=\"{scan_name}\"}} > 0"
            )
        } else {
            format!("kubescan_scan_num_tests_fail{{scan_name=\"{scan_name}\"}} > 0")
        };
        rules.push(AlertingRule {
            alert: "KubescanScanFailed".to_string(),
            expr: fail_expr,
            labels: alert_labels(config, &scan_name, profile_name),
            annotations: BTreeMap::from([(
                "summary".to_string(),
                format!("security scan {scan_name} has failing tests"),
            )]),
        });
    }
    if rules.is_empty() {
        return None;
    }

    Some(PrometheusRule {
        metadata: ObjectMeta {
            name: Some(alert_rule_name(&scan_name)),
            namespace: Some(SCAN_NS.to_string()),
            labels: Some(child_labels(scan, profile_name, &config.controller_name)),
            owner_references: scan_owner_ref(scan).map(|r| vec![r]),
            ..ObjectMeta::default()
        },
        spec: PrometheusRuleSpec {
            groups: vec![RuleGroup {
                name: format!("kubescan-{scan_name}"),
                rules,
            }],
        },
    })
}

fn alert_labels(
    config: &OperatorConfig,
    scan_name: &str,
    profile_name: &str,
) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("severity".to_string(), config.alert_severity.clone()),
        ("scan_name".to_string(), scan_name.to_string()),
        ("scan_profile_name".to_string(), profile_name.to_string()),
        ("cluster_name".to_string(), config.cluster_name.clone()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{operator_config, scan_named, scheduled_scan_named};
    use crds::ScanAlertRule;

    #[test]
    fn no_rule_without_alert_config() {
        let scan = scan_named("nightly");
        assert!(scan_alert_rule(&scan, "p", &operator_config()).is_none());
    }

    #[test]
    fn failure_alert_widens_to_warnings_when_scoring_fails_on_warn() {
        let mut scan = scheduled_scan_named("nightly", "0 0 * * *");
        if let Some(cfg) = scan.spec.scheduled_scan_config.as_mut() {
            cfg.scan_alert_rule = Some(ScanAlertRule {
                alert_on_complete: false,
                alert_on_failure: true,
            });
        }

        let rule = scan_alert_rule(&scan, "p", &operator_config()).unwrap();
        assert_eq!(rule.metadata.name.as_deref(), Some("kubescan-alerts-nightly"));
        let rules = &rule.spec.groups[0].rules;
        assert_eq!(rules.len(), 1);
        assert!(!rules[0].expr.contains("num_tests_warn"));

        scan.spec.score_warning = ScoreWarning::Fail;
        let rule = scan_alert_rule(&scan, "p", &operator_config()).unwrap();
        assert!(rule.spec.groups[0].rules[0].expr.contains("num_tests_warn"));
    }

    #[test]
    fn complete_and_failure_alerts_can_coexist() {
        let mut scan = scheduled_scan_named("nightly", "0 0 * * *");
        if let Some(cfg) = scan.spec.scheduled_scan_config.as_mut() {
            cfg.scan_alert_rule = Some(ScanAlertRule {
                alert_on_complete: true,
                alert_on_failure: true,
            });
        }
        let rule = scan_alert_rule(&scan, "p", &operator_config()).unwrap();
        let names: Vec<_> = rule.spec.groups[0]
            .rules
            .iter()
            .map(|r| r.alert.as_str())
            .collect();
        assert_eq!(names, vec!["KubescanScanComplete", "KubescanScanFailed"]);
    }
}
