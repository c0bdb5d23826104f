//! Recurring-scan scheduling and report retention.
//!
//! A recurring ClusterScan is a single long-lived object: after each run
//! completes, the job correlator stamps the next fire time, the scan
//! controller re-arms with a delayed requeue, and when the time is due the
//! run-scoped status is cleared atomically so the same scan relaunches.
//! "Sleeping" is always a delayed requeue, never a blocking wait.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cron::Schedule;
use kube::ResourceExt;
use kube::api::ListParams;
use kube_runtime::controller::Action;
use tracing::{error, info};

use crate::controller::Ctx;
use crate::error::ControllerError;
use crate::reconcile_helpers::{delete_ignore_not_found, update_scan_status_with_retry};
use crds::{ClusterScan, ClusterScanReport, ScanConditionType, report_name_prefix};

/// Standard cron is 5 fields; the cron crate wants a leading seconds field.
fn normalize_cron(expr: &str) -> String {
    if expr.split_whitespace().count() == 5 {
        format!("0 {expr}")
    } else {
        expr.to_string()
    }
}

/// Checks a cron expression parses. Invalid expressions are terminal.
pub fn validate_cron(expr: &str) -> Result<(), String> {
    Schedule::from_str(&normalize_cron(expr))
        .map(|_| ())
        .map_err(|e| format!("invalid cron expression {expr:?}: {e}"))
}

/// Next fire time of `expr` strictly after `now`.
pub fn next_fire_time(expr: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, String> {
    let schedule = Schedule::from_str(&normalize_cron(expr))
        .map_err(|e| format!("invalid cron expression {expr:?}: {e}"))?;
    schedule
        .after(&now)
        .next()
        .ok_or_else(|| format!("cron expression {expr:?} never fires"))
}

/// Outcome of waking up for a persisted fire time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WakeDecision {
    /// The fire time is still in the future (clock skew / early wake).
    NotDue(Duration),
    /// The fire time has passed.
    Due,
}

/// Compares a persisted RFC3339 fire time against `now`.
pub fn wake_decision(next_scan_at: &str, now: DateTime<Utc>) -> Result<WakeDecision, String> {
    let next = DateTime::parse_from_rfc3339(next_scan_at)
        .map_err(|e| format!("bad next-scan time {next_scan_at:?}: {e}"))?
        .with_timezone(&Utc);
    if next > now {
        let delta = (next - now).to_std().unwrap_or(Duration::ZERO);
        Ok(WakeDecision::NotDue(delta))
    } else {
        Ok(WakeDecision::Due)
    }
}

/// Handles the scheduling leg of a scan reconcile.
///
/// Returns `Some(action)` when the scan is a completed recurring scan:
/// either a re-arm for a future fire time, or an immediate requeue after
/// the atomic reset.
pub async fn process(
    scan: &ClusterScan,
    ctx: &Ctx,
) -> Result<Option<Action>, ControllerError> {
    let name = scan.name_any();
    let Some(status) = scan.status.as_ref() else {
        return Ok(None);
    };
    if !status.conditions.is_true(ScanConditionType::Complete)
        || !scan.is_recurring()
        || status.next_scan_at.is_empty()
    {
        return Ok(None);
    }

    match wake_decision(&status.next_scan_at, Utc::now()) {
        Err(e) => Err(ControllerError::MalformedResource(format!(
            "scan {name}: {e}"
        ))),
        Ok(WakeDecision::NotDue(delta)) => {
            info!(
                "scan {} is scheduled for {}, re-arming in {:?}",
                name, status.next_scan_at, delta
            );
            Ok(Some(Action::requeue(delta)))
        }
        Ok(WakeDecision::Due) => {
            info!("scan {} schedule is due, resetting for a fresh run", name);
            update_scan_status_with_retry(&ctx.scans, &name, |s| {
                if let Some(st) = s.status.as_mut() {
                    st.reset_for_next_run();
                }
            })
            .await?;
            Ok(Some(Action::requeue(Duration::ZERO)))
        }
    }
}

/// Report names to delete for a scan under the given retention count.
///
/// Reports are matched by the scan's report-name prefix, newest kept first.
pub fn reports_to_purge(
    reports: &[ClusterScanReport],
    scan_name: &str,
    retention: usize,
) -> Vec<String> {
    let prefix = report_name_prefix(scan_name);
    let mut matching: Vec<(&str, DateTime<Utc>)> = reports
        .iter()
        .filter_map(|r| {
            let name = r.metadata.name.as_deref()?;
            if !name.starts_with(&prefix) {
                return None;
            }
            let created = r
                .metadata
                .creation_timestamp
                .as_ref()
                .map(|t| t.0)
                .unwrap_or(DateTime::<Utc>::MIN_UTC);
            Some((name, created))
        })
        .collect();
    if matching.len() <= retention {
        return Vec::new();
    }
    matching.sort_by(|a, b| b.1.cmp(&a.1));
    matching[retention..]
        .iter()
        .map(|(name, _)| (*name).to_string())
        .collect()
}

/// Deletes reports beyond the scan's retention count. Best effort: delete
/// failures are logged, never escalated.
pub async fn purge_old_reports(scan: &ClusterScan, ctx: &Ctx) -> Result<(), ControllerError> {
    let scan_name = scan.name_any();
    let retention = scan.retention_count();
    let reports = ctx.reports.list(&ListParams::default()).await?;
    let purge = reports_to_purge(&reports.items, &scan_name, retention);
    if purge.is_empty() {
        return Ok(());
    }
    info!(
        "purging {} old reports for scan {} (retention {})",
        purge.len(),
        scan_name,
        retention
    );
    for name in purge {
        if let Err(e) =
            delete_ignore_not_found(&ctx.reports, &name, &Default::default()).await
        {
            error!("error deleting old report {}: {}", name, e);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use kube::api::ObjectMeta;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

    fn report(name: &str, day: u32) -> ClusterScanReport {
        ClusterScanReport {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                creation_timestamp: Some(Time(
                    Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
                )),
                ..ObjectMeta::default()
            },
            spec: Default::default(),
        }
    }

    #[test]
    fn daily_schedule_fires_at_next_midnight() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        let next = next_fire_time("0 0 * * *", now).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap());
    }

    #[test]
    fn invalid_cron_is_rejected() {
        assert!(validate_cron("not a cron").is_err());
        assert!(validate_cron("61 0 * * *").is_err());
        assert!(validate_cron("*/15 * * * *").is_ok());
    }

    #[test]
    fn wake_decision_rearms_until_due() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        let decision = wake_decision("2024-01-01T11:00:00Z", now).unwrap();
        assert_eq!(decision, WakeDecision::NotDue(Duration::from_secs(3600)));
        let decision = wake_decision("2024-01-01T09:00:00Z", now).unwrap();
        assert_eq!(decision, WakeDecision::Due);
        assert!(wake_decision("yesterday", now).is_err());
    }

    #[test]
    fn retention_keeps_the_newest_reports() {
        let reports: Vec<_> = (1..=5)
            .map(|d| report(&format!("scan-report-nightly-{d}"), d))
            .collect();
        let purge = reports_to_purge(&reports, "nightly", 3);
        assert_eq!(
            purge,
            vec![
                "scan-report-nightly-2".to_string(),
                "scan-report-nightly-1".to_string(),
            ]
        );
    }

    #[test]
    fn retention_purges_incrementally_as_reports_arrive() {
        let mut reports: Vec<_> = (3..=5)
            .map(|d| report(&format!("scan-report-nightly-{d}"), d))
            .collect();
        assert!(reports_to_purge(&reports, "nightly", 3).is_empty());

        reports.push(report("scan-report-nightly-6", 6));
        assert_eq!(
            reports_to_purge(&reports, "nightly", 3),
            vec!["scan-report-nightly-3".to_string()]
        );
    }

    #[test]
    fn retention_ignores_other_scans_reports() {
        let reports = vec![
            report("scan-report-nightly-1", 1),
            report("scan-report-weekly-1", 2),
            report("scan-report-weekly-2", 3),
            report("scan-report-weekly-3", 4),
            report("scan-report-weekly-4", 5),
        ];
        let purge = reports_to_purge(&reports, "weekly", 3);
        assert_eq!(purge, vec!["scan-report-weekly-1".to_string()]);
    }
}
