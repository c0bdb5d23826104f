//! Kubernetes resource watchers.
//!
//! One kube_runtime Controller per watched kind: ClusterScans, the
//! label-selected runner jobs, and the label-selected runner pods. The job
//! controller additionally re-reconciles a scan's runner job whenever the
//! scan itself changes, which is how a status transition written by one
//! correlator wakes the next one.
//!
//! All three share the same error policy: count consecutive failures per
//! object and requeue with Fibonacci backoff.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::batch::v1::Job;
use kube::{Resource, ResourceExt};
use kube_runtime::controller::{Action, Config as ControllerConfig};
use kube_runtime::reflector::ObjectRef;
use kube_runtime::{Controller, watcher};
use tracing::{error, info};

use crate::controller::Ctx;
use crate::error::ControllerError;
use crate::{backoff, job_handler, pod_handler, scan_handler};
use crds::{ClusterScan, LABEL_CONTROLLER, SCAN_NS, runner_job_name};

fn error_policy<K>(obj: Arc<K>, error: &ControllerError, ctx: Arc<Ctx>) -> Action
where
    K: Resource,
{
    let key = obj.meta().name.clone().unwrap_or_default();
    let count = ctx.errors.bump(&key);
    let delay = backoff::for_error_count(count);
    error!(
        "reconcile of {} failed ({} consecutive): {}, requeueing in {:?}",
        key, count, error, delay
    );
    Action::requeue(delay)
}

fn controller_config() -> ControllerConfig {
    ControllerConfig::default()
        .debounce(Duration::from_secs(1))
        .concurrency(2)
}

pub async fn run_scan_controller(ctx: Arc<Ctx>) -> Result<(), ControllerError> {
    info!("starting ClusterScan watcher");
    let scans = ctx.scans.clone();
    Controller::new(scans, watcher::Config::default())
        .with_config(controller_config())
        .run(reconcile_scan, error_policy, ctx)
        .for_each(|res| async move {
            if let Err(e) = res {
                error!("ClusterScan controller error: {}", e);
            }
        })
        .await;
    Ok(())
}

async fn reconcile_scan(
    scan: Arc<ClusterScan>,
    ctx: Arc<Ctx>,
) -> Result<Action, ControllerError> {
    let name = scan.name_any();
    let action = scan_handler::reconcile(scan, ctx.clone()).await?;
    ctx.errors.reset(&name);
    Ok(action)
}

pub async fn run_job_controller(ctx: Arc<Ctx>) -> Result<(), ControllerError> {
    info!("starting runner job watcher");
    let selector = format!("{LABEL_CONTROLLER}={}", ctx.config.controller_name);
    let jobs = ctx.jobs.clone();
    let scans = ctx.scans.clone();
    Controller::new(jobs, watcher::Config::default().labels(&selector))
        .with_config(controller_config())
        .watches(scans, watcher::Config::default(), |scan: ClusterScan| {
            let job = ObjectRef::<Job>::new(&runner_job_name(&scan.name_any())).within(SCAN_NS);
            std::iter::once(job)
        })
        .run(reconcile_job, error_policy, ctx)
        .for_each(|res| async move {
            if let Err(e) = res {
                error!("runner job controller error: {}", e);
            }
        })
        .await;
    Ok(())
}

async fn reconcile_job(job: Arc<Job>, ctx: Arc<Ctx>) -> Result<Action, ControllerError> {
    let name = job.name_any();
    let action = job_handler::reconcile(job, ctx.clone()).await?;
    ctx.errors.reset(&name);
    Ok(action)
}

pub async fn run_pod_controller(ctx: Arc<Ctx>) -> Result<(), ControllerError> {
    info!("starting runner pod watcher");
    let selector = format!("{LABEL_CONTROLLER}={}", ctx.config.controller_name);
    let pods = ctx.pods.clone();
    Controller::new(pods, watcher::Config::default().labels(&selector))
        .with_config(controller_config())
        .run(
            |pod, ctx: Arc<Ctx>| async move {
                let name = pod.name_any();
                let action = pod_handler::reconcile(pod, ctx.clone()).await?;
                ctx.errors.reset(&name);
                Ok(action)
            },
            error_policy,
            ctx,
        )
        .for_each(|res| async move {
            if let Err(e) = res {
                error!("runner pod controller error: {}", e);
            }
        })
        .await;
    Ok(())
}
