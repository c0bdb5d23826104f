//! Prometheus metrics for completed scan runs.
//!
//! Per-run results are exported as gauges plus a completion counter, all
//! labeled by scan, profile and cluster. Emission is gated on
//! Complete=True with Alerted=Unknown, so each run is recorded exactly
//! once; after recording, Alerted flips to True or False and the gate
//! closes until the next run.

use kube::ResourceExt;
use kube_runtime::controller::Action;
use prometheus::{GaugeVec, IntCounterVec, Opts, Registry};
use std::time::Duration;
use tracing::{info, warn};

use crate::controller::Ctx;
use crate::error::ControllerError;
use crate::reconcile_helpers::update_scan_status_with_retry;
use crds::{ClusterScan, ClusterScanSummary, ConditionStatus, ScanConditionType};

const LABELS: [&str; 3] = ["scan_name", "scan_profile_name", "cluster_name"];

#[derive(Clone)]
pub struct ScanMetrics {
    num_tests_total: GaugeVec,
    num_tests_pass: GaugeVec,
    num_tests_fail: GaugeVec,
    num_tests_skipped: GaugeVec,
    num_tests_warn: GaugeVec,
    num_tests_na: GaugeVec,
    num_scans_complete: IntCounterVec,
}

impl ScanMetrics {
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let gauge = |name: &str, help: &str| -> Result<GaugeVec, prometheus::Error> {
            let v = GaugeVec::new(Opts::new(name, help), &LABELS)?;
            registry.register(Box::new(v.clone()))?;
            Ok(v)
        };
        let num_scans_complete = IntCounterVec::new(
            Opts::new(
                "kubescan_scan_num_scans_complete",
                "Number of scan runs that have completed",
            ),
            &LABELS,
        )?;
        registry.register(Box::new(num_scans_complete.clone()))?;
        Ok(Self {
            num_tests_total: gauge(
                "kubescan_scan_num_tests_total",
                "Total tests in the last completed run",
            )?,
            num_tests_pass: gauge(
                "kubescan_scan_num_tests_pass",
                "Passed tests in the last completed run",
            )?,
            num_tests_fail: gauge(
                "kubescan_scan_num_tests_fail",
                "Failed tests in the last completed run",
            )?,
            num_tests_skipped: gauge(
                "kubescan_scan_num_tests_skipped",
                "Skipped tests in the last completed run",
            )?,
            num_tests_warn: gauge(
                "kubescan_scan_num_tests_warn",
                "Warning tests in the last completed run",
            )?,
            num_tests_na: gauge(
                "kubescan_scan_num_tests_na",
                "Not-applicable tests in the last completed run",
            )?,
            num_scans_complete,
        })
    }

    /// Records one completed run.
    pub fn record_run(
        &self,
        scan_name: &str,
        profile_name: &str,
        cluster_name: &str,
        summary: &ClusterScanSummary,
    ) {
        let labels = [scan_name, profile_name, cluster_name];
        self.num_tests_total
            .with_label_values(&labels)
            .set(f64::from(summary.total));
        self.num_tests_pass
            .with_label_values(&labels)
            .set(f64::from(summary.pass));
        self.num_tests_fail
            .with_label_values(&labels)
            .set(f64::from(summary.fail));
        self.num_tests_skipped
            .with_label_values(&labels)
            .set(f64::from(summary.skip));
        self.num_tests_warn
            .with_label_values(&labels)
            .set(f64::from(summary.warn));
        self.num_tests_na
            .with_label_values(&labels)
            .set(f64::from(summary.not_applicable));
        self.num_scans_complete.with_label_values(&labels).inc();
    }
}

/// Label value used for one-shot scans so dashboards keep bounded
/// cardinality.
pub fn metric_scan_name(scan: &ClusterScan) -> String {
    if scan.is_recurring() {
        scan.name_any()
    } else {
        "manual".to_string()
    }
}

/// Handles the metrics-and-alerting leg of a scan reconcile.
///
/// Returns `Some(action)` when this reconcile recorded a run, so the
/// dispatcher can requeue and let the scheduling leg observe the new
/// Alerted state.
/// How the Alerted condition resolves once a run's metrics are recorded.
///
/// The message states why nothing will fire; a configured rule that exists
/// resolves True with no message.
fn alerted_resolution(
    alerts_enabled: bool,
    alert_configured: bool,
    rule_name: &str,
) -> (ConditionStatus, Option<&'static str>) {
    if !alert_configured {
        (
            ConditionStatus::False,
            Some("no alert rule configured for this scan"),
        )
    } else if !alerts_enabled {
        (
            ConditionStatus::False,
            Some("alerting is disabled for this operator"),
        )
    } else if rule_name.is_empty() {
        (
            ConditionStatus::False,
            Some("alert rule creation failed, no alerts will be sent"),
        )
    } else {
        (ConditionStatus::True, None)
    }
}

/// The emission gate: a run is recorded exactly when it is complete and the
/// job correlator has armed Alerted but nothing has resolved it yet.
pub fn needs_recording(status: &crds::ClusterScanStatus) -> bool {
    status.conditions.is_true(ScanConditionType::Complete)
        && status.conditions.is_unknown(ScanConditionType::Alerted)
}

pub async fn process(
    scan: &ClusterScan,
    ctx: &Ctx,
) -> Result<Option<Action>, ControllerError> {
    let name = scan.name_any();
    let Some(status) = scan.status.as_ref() else {
        return Ok(None);
    };
    if !needs_recording(status) {
        return Ok(None);
    }

    match status.summary.as_ref() {
        Some(summary) => {
            ctx.metrics.record_run(
                &metric_scan_name(scan),
                status.last_run_scan_profile_name.as_deref().unwrap_or_default(),
                &ctx.config.cluster_name,
                summary,
            );
            info!("recorded run metrics for scan {}", name);
        }
        None => warn!("scan {} completed without a summary, nothing to record", name),
    }

    let alerts_enabled = ctx.config.alerts_enabled;
    let alert_configured = scan.alert_rule().is_some();
    let rule_name = status.scan_alerting_rule_name.clone();
    update_scan_status_with_retry(&ctx.scans, &name, move |s| {
        let Some(st) = s.status.as_mut() else { return };
        match alerted_resolution(alerts_enabled, alert_configured, &rule_name) {
            (resolved, Some(message)) => {
                st.conditions
                    .set_with_message(ScanConditionType::Alerted, resolved, message);
            }
            (resolved, None) => st.conditions.set(ScanConditionType::Alerted, resolved),
        }
    })
    .await?;

    Ok(Some(Action::requeue(Duration::ZERO)))
}
