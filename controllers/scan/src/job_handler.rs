//! Runner-job correlator.
//!
//! Watches the label-selected runner jobs and finishes scan runs in two
//! steps keyed off scan conditions. RunCompleted=True: read the runner
//! output, persist the report, mark Complete. Complete=True: stamp the
//! terminal status, schedule the next occurrence, delete the job and clean
//! up leftovers, release the concurrency slot.
//!
//! Jobs without a live owning scan are deleted; this correlator never
//! touches jobs that other controllers own.

use std::sync::Arc;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use k8s_openapi::api::batch::v1::Job;
use kube::ResourceExt;
use kube::api::{DeleteParams, ListParams, ObjectMeta, PostParams};
use kube_runtime::controller::Action;
use tracing::{error, info, warn};

use crate::controller::Ctx;
use crate::error::ControllerError;
use crate::reconcile_helpers::{delete_ignore_not_found, update_scan_status_with_retry};
use crate::resources::scan_owner_ref;
use crate::{display, lease, schedule};
use crds::{
    ClusterScan, ClusterScanReport, ClusterScanReportSpec, ClusterScanSummary, ConditionStatus,
    LABEL_CONTROLLER, LABEL_SCAN, RUNNER_LABEL_KEY, RUNNER_LABEL_VALUE, SCAN_OUTPUT_FILE,
    ScanConditionType, WORKER_DS_PREFIX, WORKER_LABEL_KEY, WORKER_LABEL_VALUE,
    output_config_map_name, report_generate_name, runner_job_name,
};

pub async fn reconcile(job: Arc<Job>, ctx: Arc<Ctx>) -> Result<Action, ControllerError> {
    if job.metadata.deletion_timestamp.is_some() {
        return Ok(Action::await_change());
    }
    let job_name = job.name_any();
    let labels = job.metadata.labels.clone().unwrap_or_default();
    if labels.get(LABEL_CONTROLLER) != Some(&ctx.config.controller_name) {
        return Ok(Action::await_change());
    }

    let Some(scan_name) = labels.get(LABEL_SCAN) else {
        error!("job {} carries no owning-scan label, deleting it", job_name);
        delete_job(&ctx, &job_name).await?;
        return Ok(Action::await_change());
    };
    let Some(scan) = ctx.scans.get_opt(scan_name).await? else {
        warn!("scan {} is gone, deleting orphan job {}", scan_name, job_name);
        delete_job(&ctx, &job_name).await?;
        return Ok(Action::await_change());
    };

    let conditions = scan
        .status
        .as_ref()
        .map(|s| s.conditions.clone())
        .unwrap_or_default();
    if conditions.is_true(ScanConditionType::Complete) {
        return complete_run(&scan, &job_name, &ctx).await;
    }
    if conditions.is_true(ScanConditionType::RunCompleted) {
        return persist_results(&scan, &ctx).await;
    }
    Ok(Action::await_change())
}

/// Terminal step of a run: stamp final status, re-arm recurring scans,
/// remove the job and everything the runner left behind, free the slot.
async fn complete_run(
    scan: &ClusterScan,
    job_name: &str,
    ctx: &Ctx,
) -> Result<Action, ControllerError> {
    let scan_name = scan.name_any();
    let recurring = scan.is_recurring();

    let next_scan_at = if recurring {
        match scan.cron_schedule().map(|e| schedule::next_fire_time(e, Utc::now())) {
            Some(Ok(next)) => Some(next.to_rfc3339_opts(SecondsFormat::Secs, true)),
            Some(Err(e)) => {
                // validated at launch; only reachable if the spec changed mid-run
                error!("scan {} has an unusable schedule: {}", scan_name, e);
                None
            }
            None => None,
        }
    } else {
        None
    };

    update_scan_status_with_retry(&ctx.scans, &scan_name, move |s| {
        let spec = s.spec.clone();
        let generation = s.metadata.generation.unwrap_or(0);
        let Some(st) = s.status.as_mut() else { return };
        let failed = st.conditions.is_true(ScanConditionType::Failed);
        // only arm the alert gate once; the metrics leg closes it
        if !failed && st.conditions.status(ScanConditionType::Alerted).is_none() {
            st.conditions
                .set(ScanConditionType::Alerted, ConditionStatus::Unknown);
        }
        st.observed_generation = generation;
        if let Some(next) = next_scan_at.as_ref() {
            st.next_scan_at = next.clone();
        }
        display::apply(st, &spec);
    })
    .await?;
    info!("run of scan {} is complete, tearing down the runner", scan_name);

    if recurring {
        schedule::purge_old_reports(scan, ctx).await?;
    }

    delete_job(ctx, job_name).await?;
    ensure_cleanup(&scan_name, ctx).await;
    lease::release(ctx, &scan_name).await?;

    Ok(Action::await_change())
}

/// Reporting step of a run: turn the runner's output into a persisted
/// report plus a status summary, then mark Complete.
async fn persist_results(scan: &ClusterScan, ctx: &Ctx) -> Result<Action, ControllerError> {
    let scan_name = scan.name_any();
    let failed = scan
        .status
        .as_ref()
        .is_some_and(|s| s.conditions.is_true(ScanConditionType::Failed));

    if failed {
        update_scan_status_with_retry(&ctx.scans, &scan_name, |s| {
            let spec = s.spec.clone();
            if let Some(st) = s.status.as_mut() {
                st.conditions
                    .set(ScanConditionType::Complete, ConditionStatus::True);
                display::apply(st, &spec);
            }
        })
        .await?;
        return Ok(Action::requeue(Duration::ZERO));
    }

    match fetch_results(scan, ctx).await {
        Ok((summary, report)) => {
            ctx.reports.create(&PostParams::default(), &report).await?;
            update_scan_status_with_retry(&ctx.scans, &scan_name, move |s| {
                let spec = s.spec.clone();
                if let Some(st) = s.status.as_mut() {
                    st.summary = Some(summary);
                    st.conditions
                        .set(ScanConditionType::Complete, ConditionStatus::True);
                    display::apply(st, &spec);
                }
            })
            .await?;
            info!("persisted report for scan {}, marking complete", scan_name);
        }
        Err(ControllerError::MissingOutput(msg)) => {
            // the runner claims success but produced nothing usable;
            // retrying cannot recover, fail the run instead
            error!("scan {} produced no usable output: {}", scan_name, msg);
            update_scan_status_with_retry(&ctx.scans, &scan_name, move |s| {
                let spec = s.spec.clone();
                if let Some(st) = s.status.as_mut() {
                    st.conditions.set_with_message(
                        ScanConditionType::Failed,
                        ConditionStatus::True,
                        msg.clone(),
                    );
                    st.conditions
                        .set(ScanConditionType::Complete, ConditionStatus::True);
                    display::apply(st, &spec);
                }
            })
            .await?;
        }
        Err(e) => return Err(e),
    }
    Ok(Action::requeue(Duration::ZERO))
}

/// Reads the runner's output config map into a summary and a report object.
///
/// Missing, empty or malformed output all surface as `MissingOutput`.
async fn fetch_results(
    scan: &ClusterScan,
    ctx: &Ctx,
) -> Result<(ClusterScanSummary, ClusterScanReport), ControllerError> {
    let scan_name = scan.name_any();
    let cm_name = output_config_map_name(&scan_name);
    let cm = ctx
        .configmaps
        .get_opt(&cm_name)
        .await?
        .ok_or_else(|| {
            ControllerError::MissingOutput(format!("output config map {cm_name} not found"))
        })?;
    let output = cm
        .data
        .unwrap_or_default()
        .remove(SCAN_OUTPUT_FILE)
        .unwrap_or_default();

    let raw = kb_report::Summary::get(output.as_bytes())
        .map_err(|e| {
            ControllerError::MissingOutput(format!("output in {cm_name} is malformed: {e}"))
        })?
        .ok_or_else(|| {
            ControllerError::MissingOutput(format!("output in {cm_name} is empty"))
        })?;
    let summary = ClusterScanSummary {
        total: raw.total,
        pass: raw.pass,
        fail: raw.fail,
        skip: raw.skip,
        warn: raw.warn,
        not_applicable: raw.not_applicable,
    };

    let payload = kb_report::report_json_bytes(output.as_bytes()).map_err(|e| {
        ControllerError::MissingOutput(format!("output in {cm_name} is malformed: {e}"))
    })?;

    let profile_name = scan
        .status
        .as_ref()
        .and_then(|s| s.last_run_scan_profile_name.clone())
        .unwrap_or_default();
    let benchmark_version = match ctx.profiles.get_opt(&profile_name).await? {
        Some(profile) => profile.spec.benchmark_version,
        None => String::new(),
    };

    let report = ClusterScanReport {
        metadata: ObjectMeta {
            generate_name: Some(report_generate_name(&scan_name, &profile_name)),
            owner_references: scan_owner_ref(scan).map(|r| vec![r]),
            ..ObjectMeta::default()
        },
        spec: ClusterScanReportSpec {
            benchmark_version,
            last_run_timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            report_json: String::from_utf8_lossy(payload).into_owned(),
        },
    };
    Ok((summary, report))
}

async fn delete_job(ctx: &Ctx, job_name: &str) -> Result<(), ControllerError> {
    delete_ignore_not_found(&ctx.jobs, job_name, &DeleteParams::background()).await
}

/// Best-effort removal of everything a run leaves behind: worker
/// daemonsets, the runner pod, per-scan config maps. Failures are logged,
/// never escalated; the next run's fixed-name creates tolerate leftovers.
async fn ensure_cleanup(scan_name: &str, ctx: &Ctx) {
    let worker_selector = format!("{WORKER_LABEL_KEY}={WORKER_LABEL_VALUE}");
    match ctx
        .daemonsets
        .list(&ListParams::default().labels(&worker_selector))
        .await
    {
        Ok(list) => {
            for ds in list.items {
                let name = ds.name_any();
                if !name.starts_with(WORKER_DS_PREFIX) {
                    continue;
                }
                if let Err(e) =
                    delete_ignore_not_found(&ctx.daemonsets, &name, &DeleteParams::default()).await
                {
                    warn!("cleanup: could not delete daemonset {}: {}", name, e);
                }
            }
        }
        Err(e) => warn!("cleanup: could not list worker daemonsets: {}", e),
    }

    let runner_prefix = runner_job_name(scan_name);
    let runner_selector = format!("{RUNNER_LABEL_KEY}={RUNNER_LABEL_VALUE}");
    match ctx
        .pods
        .list(&ListParams::default().labels(&runner_selector))
        .await
    {
        Ok(list) => {
            for pod in list.items {
                let name = pod.name_any();
                if !name.starts_with(&runner_prefix) {
                    continue;
                }
                if let Err(e) =
                    delete_ignore_not_found(&ctx.pods, &name, &DeleteParams::default()).await
                {
                    warn!("cleanup: could not delete runner pod {}: {}", name, e);
                }
            }
        }
        Err(e) => warn!("cleanup: could not list runner pods: {}", e),
    }

    match ctx.configmaps.list(&ListParams::default()).await {
        Ok(list) => {
            for cm in list.items {
                let name = cm.name_any();
                if !name.contains(scan_name) {
                    continue;
                }
                if let Err(e) =
                    delete_ignore_not_found(&ctx.configmaps, &name, &DeleteParams::default()).await
                {
                    warn!("cleanup: could not delete config map {}: {}", name, e);
                }
            }
        }
        Err(e) => warn!("cleanup: could not list config maps: {}", e),
    }
}
