//! Runner-pod correlator.
//!
//! The runner pod announces its outcome through a completion annotation:
//! `"true"` on success, `"error"` on a generic failure, anything else is a
//! failure message. On the first completed observation the owning scan is
//! marked RunCompleted (plus Failed for non-success), which hands the run
//! to the job correlator.

use std::sync::Arc;

use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use tracing::{info, warn};

use crate::controller::Ctx;
use crate::display;
use crate::error::ControllerError;
use crate::reconcile_helpers::update_scan_status_with_retry;
use crds::{
    COMPLETION_ANNOTATION, ConditionStatus, LABEL_CONTROLLER, LABEL_SCAN, ScanConditionType,
    runner_job_name,
};

/// Outcome encoded in the completion annotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionVerdict {
    Success,
    /// Failed without detail.
    FailedGeneric,
    /// Failed with a runner-supplied message.
    FailedWithMessage(String),
}

pub fn completion_verdict(annotation: &str) -> CompletionVerdict {
    match annotation {
        "true" => CompletionVerdict::Success,
        "error" => CompletionVerdict::FailedGeneric,
        message => CompletionVerdict::FailedWithMessage(message.to_string()),
    }
}

pub async fn reconcile(pod: Arc<Pod>, ctx: Arc<Ctx>) -> Result<Action, ControllerError> {
    if pod.metadata.deletion_timestamp.is_some() {
        return Ok(Action::await_change());
    }
    let labels = pod.metadata.labels.clone().unwrap_or_default();
    if labels.get(LABEL_CONTROLLER) != Some(&ctx.config.controller_name) {
        return Ok(Action::await_change());
    }
    let annotations = pod.metadata.annotations.clone().unwrap_or_default();
    let Some(done) = annotations.get(COMPLETION_ANNOTATION) else {
        // still running; nothing to correlate yet
        return Ok(Action::await_change());
    };
    let Some(scan_name) = labels.get(LABEL_SCAN) else {
        warn!("runner pod {} carries no owning-scan label", pod.name_any());
        return Ok(Action::await_change());
    };

    let Some(scan) = ctx.scans.get_opt(scan_name).await? else {
        info!("scan {} is gone, ignoring its runner pod", scan_name);
        return Ok(Action::await_change());
    };
    // the job correlator only acts on a live runner job
    if ctx.jobs.get_opt(&runner_job_name(scan_name)).await?.is_none() {
        return Ok(Action::await_change());
    }

    let already_run_completed = scan
        .status
        .as_ref()
        .is_some_and(|s| s.conditions.is_true(ScanConditionType::RunCompleted));
    if already_run_completed {
        return Ok(Action::await_change());
    }

    let verdict = completion_verdict(done);
    info!("runner pod for scan {} finished: {:?}", scan_name, verdict);
    update_scan_status_with_retry(&ctx.scans, scan_name, move |s| {
        let spec = s.spec.clone();
        let Some(st) = s.status.as_mut() else { return };
        st.conditions
            .set(ScanConditionType::RunCompleted, ConditionStatus::True);
        match &verdict {
            CompletionVerdict::Success => {}
            CompletionVerdict::FailedGeneric => {
                st.conditions
                    .set(ScanConditionType::Failed, ConditionStatus::True);
            }
            CompletionVerdict::FailedWithMessage(message) => {
                st.conditions.set_with_message(
                    ScanConditionType::Failed,
                    ConditionStatus::True,
                    message.clone(),
                );
            }
        }
        display::apply(st, &spec);
    })
    .await?;

    Ok(Action::await_change())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn annotation_values_map_to_verdicts() {
        assert_eq!(completion_verdict("true"), CompletionVerdict::Success);
        assert_eq!(completion_verdict("error"), CompletionVerdict::FailedGeneric);
        assert_eq!(
            completion_verdict("node agent timed out"),
            CompletionVerdict::FailedWithMessage("node agent timed out".to_string())
        );
    }
}
