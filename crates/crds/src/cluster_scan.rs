//! ClusterScan CRD
//!
//! A ClusterScan is one declarative request to run a compliance benchmark
//! against the cluster. Its status carries the lifecycle conditions the
//! reconciler and correlators advance.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::condition::Conditions;
use crate::constants::{DEFAULT_CRON_SCHEDULE, DEFAULT_RETENTION};

#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "kubescan.microscaler.io",
    version = "v1",
    kind = "ClusterScan",
    status = "ClusterScanStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterScanSpec {
    /// Scan profile to use; empty picks the provider default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_profile_name: Option<String>,

    /// Recurring-scan configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_scan_config: Option<ScheduledScanConfig>,

    /// Whether checks reporting "warn" count towards scan failure.
    #[serde(default)]
    pub score_warning: ScoreWarning,
}

/// Scoring policy for checks that report a warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ScoreWarning {
    /// Warnings do not fail the scan.
    #[default]
    Pass,
    /// Warnings fail the scan.
    Fail,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledScanConfig {
    /// Standard 5-field cron expression; empty uses the operator default.
    #[serde(default)]
    pub cron_schedule: String,

    /// Number of past reports to keep; 0 uses the operator default.
    #[serde(default)]
    pub retention_count: usize,

    /// Alerts to send out for runs of this scan.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_alert_rule: Option<ScanAlertRule>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScanAlertRule {
    /// Alert every time a run completes.
    #[serde(default)]
    pub alert_on_complete: bool,
    /// Alert when a run has check failures.
    #[serde(default)]
    pub alert_on_failure: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterScanStatus {
    /// Derived user-facing state, recomputed on every status change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<ClusterScanStatusDisplay>,

    /// RFC3339 start time of the last run; empty means the scan never ran.
    #[serde(default)]
    pub last_run_timestamp: String,

    /// Profile the last run was launched with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_scan_profile_name: Option<String>,

    /// Check counts of the last completed run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<ClusterScanSummary>,

    /// Generation last fully processed by the operator.
    #[serde(default)]
    pub observed_generation: i64,

    /// Lifecycle conditions; see [`crate::condition`].
    #[serde(default, skip_serializing_if = "Conditions::is_empty")]
    pub conditions: Conditions,

    /// RFC3339 time the next scheduled run fires; empty when unscheduled.
    #[serde(default)]
    pub next_scan_at: String,

    /// Name of the alerting rule created for this scan, if any.
    #[serde(default)]
    pub scan_alerting_rule_name: String,
}

/// Condensed state surfaced to users.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterScanStatusDisplay {
    /// One of pending/running/reporting/error/fail/pass.
    pub state: String,
    /// Detail for error and fail states.
    pub message: String,
    /// True when the scan ended in an error or check failures.
    pub error: bool,
    /// True while the scan is still progressing.
    pub transitioning: bool,
}

/// Check counts summarizing one completed run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterScanSummary {
    pub total: u32,
    pub pass: u32,
    pub fail: u32,
    pub skip: u32,
    pub warn: u32,
    pub not_applicable: u32,
}

impl ClusterScan {
    /// The scan's cron expression, if it is a recurring scan.
    ///
    /// An empty configured expression falls back to the operator default.
    pub fn cron_schedule(&self) -> Option<&str> {
        let cfg = self.spec.scheduled_scan_config.as_ref()?;
        if cfg.cron_schedule.is_empty() {
            Some(DEFAULT_CRON_SCHEDULE)
        } else {
            Some(&cfg.cron_schedule)
        }
    }

    /// True when the scan has a recurring schedule configured.
    ///
    /// An empty expression still counts: [`Self::cron_schedule`] defaults it.
    pub fn is_recurring(&self) -> bool {
        self.spec.scheduled_scan_config.is_some()
    }

    /// Reports kept for this scan before retention purges the oldest.
    pub fn retention_count(&self) -> usize {
        match self.spec.scheduled_scan_config.as_ref() {
            Some(cfg) if cfg.retention_count != 0 => cfg.retention_count,
            _ => DEFAULT_RETENTION,
        }
    }

    /// Alert rule configuration, when any alert is requested.
    pub fn alert_rule(&self) -> Option<&ScanAlertRule> {
        let rule = self
            .spec
            .scheduled_scan_config
            .as_ref()?
            .scan_alert_rule
            .as_ref()?;
        (rule.alert_on_complete || rule.alert_on_failure).then_some(rule)
    }
}

impl ClusterScanStatus {
    /// Clears run-scoped fields so the same scan relaunches as a fresh run.
    ///
    /// Conditions, last-run timestamp and next-fire time must go together,
    /// otherwise a partially reset scan could be observed mid-transition.
    pub fn reset_for_next_run(&mut self) {
        self.conditions.clear();
        self.last_run_timestamp.clear();
        self.next_scan_at.clear();
        self.summary = None;
        self.display = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan_with_config(cfg: Option<ScheduledScanConfig>) -> ClusterScan {
        ClusterScan::new(
            "nightly",
            ClusterScanSpec {
                scheduled_scan_config: cfg,
                ..ClusterScanSpec::default()
            },
        )
    }

    #[test]
    fn retention_defaults_to_three() {
        let scan = scan_with_config(Some(ScheduledScanConfig::default()));
        assert_eq!(scan.retention_count(), 3);
        let scan = scan_with_config(Some(ScheduledScanConfig {
            retention_count: 5,
            ..ScheduledScanConfig::default()
        }));
        assert_eq!(scan.retention_count(), 5);
    }

    #[test]
    fn empty_cron_falls_back_to_default_once_configured() {
        let scan = scan_with_config(None);
        assert_eq!(scan.cron_schedule(), None);
        assert!(!scan.is_recurring());

        let scan = scan_with_config(Some(ScheduledScanConfig::default()));
        assert_eq!(scan.cron_schedule(), Some(DEFAULT_CRON_SCHEDULE));
        assert!(scan.is_recurring());

        let scan = scan_with_config(Some(ScheduledScanConfig {
            cron_schedule: "*/5 * * * *".into(),
            ..ScheduledScanConfig::default()
        }));
        assert_eq!(scan.cron_schedule(), Some("*/5 * * * *"));
        assert!(scan.is_recurring());
    }

    #[test]
    fn alert_rule_requires_at_least_one_alert() {
        let scan = scan_with_config(Some(ScheduledScanConfig {
            scan_alert_rule: Some(ScanAlertRule::default()),
            ..ScheduledScanConfig::default()
        }));
        assert!(scan.alert_rule().is_none());

        let scan = scan_with_config(Some(ScheduledScanConfig {
            scan_alert_rule: Some(ScanAlertRule {
                alert_on_failure: true,
                alert_on_complete: false,
            }),
            ..ScheduledScanConfig::default()
        }));
        assert!(scan.alert_rule().is_some());
    }

    #[test]
    fn reset_clears_run_scoped_status_atomically() {
        use crate::condition::{ConditionStatus, ScanConditionType};

        let mut status = ClusterScanStatus {
            last_run_timestamp: "2024-01-01T10:00:00Z".into(),
            next_scan_at: "2024-01-02T00:00:00Z".into(),
            summary: Some(ClusterScanSummary::default()),
            ..ClusterScanStatus::default()
        };
        status.conditions.set(ScanConditionType::Created, ConditionStatus::True);
        status.conditions.set(ScanConditionType::Complete, ConditionStatus::True);

        status.reset_for_next_run();

        assert!(status.conditions.is_empty());
        assert!(status.last_run_timestamp.is_empty());
        assert!(status.next_scan_at.is_empty());
        assert!(status.summary.is_none());
    }
}
