//! Derived user-facing scan state.
//!
//! The display block is recomputed from scratch on every status change so it
//! never drifts from the conditions it is derived from.

use crds::{
    ClusterScanSpec, ClusterScanStatus, ClusterScanStatusDisplay, ScanConditionType, ScoreWarning,
};

const STATE_PENDING: &str = "pending";
const STATE_RUNNING: &str = "running";
const STATE_REPORTING: &str = "reporting";
const STATE_ERROR: &str = "error";
const STATE_FAIL: &str = "fail";
const STATE_PASS: &str = "pass";

/// Recomputes `status.display` from the current conditions and summary.
pub fn apply(status: &mut ClusterScanStatus, spec: &ClusterScanSpec) {
    let conds = &status.conditions;
    let pending = conds.is_true(ScanConditionType::Pending);
    let running = conds.is_unknown(ScanConditionType::RunCompleted);
    let run_completed = conds.is_true(ScanConditionType::RunCompleted);
    let failed = conds.is_true(ScanConditionType::Failed);
    let completed = conds.is_true(ScanConditionType::Complete);
    let failed_message = conds
        .message(ScanConditionType::Failed)
        .unwrap_or_default()
        .to_string();

    let mut display = ClusterScanStatusDisplay::default();
    if pending {
        display.state = STATE_PENDING.into();
        display.message = "Scan is Pending, waiting for another scan to finish".into();
        display.transitioning = true;
        display.error = false;
    }
    if running {
        display.state = STATE_RUNNING.into();
        display.message = String::new();
        display.transitioning = true;
        display.error = false;
    }
    if run_completed {
        display.state = STATE_REPORTING.into();
        display.message = String::new();
        display.transitioning = true;
        display.error = false;
    }
    if failed {
        display.state = STATE_ERROR.into();
        display.message = failed_message;
        display.error = true;
        status.display = Some(display);
        return;
    }
    if completed {
        match status.summary {
            None => {
                display.state = STATE_ERROR.into();
                display.error = true;
                display.message = "scan complete, failed to generate report".into();
                status.display = Some(display);
                return;
            }
            Some(summary) => {
                if summary.fail > 0 {
                    display.state = STATE_FAIL.into();
                    display.message =
                        "scan complete, there are check failures, please review the report".into();
                    display.error = true;
                } else if summary.warn > 0 && spec.score_warning == ScoreWarning::Fail {
                    display.state = STATE_FAIL.into();
                    display.message =
                        "scan complete, warnings were generated for manual checks, please review the report"
                            .into();
                    display.error = true;
                } else {
                    display.state = STATE_PASS.into();
                    display.error = false;
                }
                display.transitioning = false;
            }
        }
    }
    status.display = Some(display);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crds::{ClusterScanSummary, ConditionStatus};

    fn state_of(status: &ClusterScanStatus) -> &str {
        status.display.as_ref().map(|d| d.state.as_str()).unwrap_or("")
    }

    #[test]
    fn pending_then_running_then_reporting() {
        let spec = ClusterScanSpec::default();
        let mut status = ClusterScanStatus::default();

        status
            .conditions
            .set(ScanConditionType::Pending, ConditionStatus::True);
        apply(&mut status, &spec);
        assert_eq!(state_of(&status), "pending");
        assert!(status.display.as_ref().is_some_and(|d| d.transitioning));

        status
            .conditions
            .set(ScanConditionType::RunCompleted, ConditionStatus::Unknown);
        apply(&mut status, &spec);
        assert_eq!(state_of(&status), "running");

        status
            .conditions
            .set(ScanConditionType::RunCompleted, ConditionStatus::True);
        apply(&mut status, &spec);
        assert_eq!(state_of(&status), "reporting");
    }

    #[test]
    fn failed_wins_and_carries_the_message() {
        let spec = ClusterScanSpec::default();
        let mut status = ClusterScanStatus::default();
        status.conditions.set_with_message(
            ScanConditionType::Failed,
            ConditionStatus::True,
            "profile not valid for provider eks",
        );
        status
            .conditions
            .set(ScanConditionType::Complete, ConditionStatus::True);
        apply(&mut status, &spec);
        let display = status.display.expect("display set");
        assert_eq!(display.state, "error");
        assert!(display.error);
        assert_eq!(display.message, "profile not valid for provider eks");
    }

    #[test]
    fn complete_without_summary_is_an_error() {
        let spec = ClusterScanSpec::default();
        let mut status = ClusterScanStatus::default();
        status
            .conditions
            .set(ScanConditionType::Complete, ConditionStatus::True);
        apply(&mut status, &spec);
        assert_eq!(state_of(&status), "error");
    }

    #[test]
    fn completed_scan_scores_pass_fail_and_warning_policy() {
        let spec = ClusterScanSpec::default();
        let mut status = ClusterScanStatus::default();
        status
            .conditions
            .set(ScanConditionType::Complete, ConditionStatus::True);

        status.summary = Some(ClusterScanSummary {
            total: 10,
            pass: 8,
            fail: 2,
            ..ClusterScanSummary::default()
        });
        apply(&mut status, &spec);
        assert_eq!(state_of(&status), "fail");

        status.summary = Some(ClusterScanSummary {
            total: 10,
            pass: 9,
            warn: 1,
            ..ClusterScanSummary::default()
        });
        apply(&mut status, &spec);
        assert_eq!(state_of(&status), "pass");

        let strict = ClusterScanSpec {
            score_warning: ScoreWarning::Fail,
            ..ClusterScanSpec::default()
        };
        apply(&mut status, &strict);
        assert_eq!(state_of(&status), "fail");
    }
}
