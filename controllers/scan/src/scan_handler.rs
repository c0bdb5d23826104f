//! ClusterScan reconciler.
//!
//! Drives a scan from creation to a launched runner job in two observations:
//! the first flips Pending and requeues, the second re-validates against
//! live state, acquires the single-scan slot and creates the child
//! resources. Everything after launch is driven by the job and pod
//! correlators.
//!
//! Validation failures are terminal (Failed, wait for a spec change);
//! contention and apiserver hiccups surface as errors so the error policy
//! retries with backoff.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::{Api, ListParams, PostParams};
use kube::ResourceExt;
use kube_runtime::controller::Action;
use semver::{Version, VersionReq};
use tracing::{debug, error, info, warn};

use crate::controller::Ctx;
use crate::display;
use crate::error::ControllerError;
use crate::reconcile_helpers::{create_or_skip, is_already_exists, update_scan_status_with_retry};
use crate::resources::{alert, configmap, job, service};
use crate::{lease, metrics, schedule};
use crds::{
    ClusterScan, ClusterScanBenchmark, ClusterScanProfile, ConditionStatus, DEFAULT_PROFILES_CM,
    LABEL_CONTROLLER, RUNNER_LABEL_KEY, RUNNER_LABEL_VALUE, SCAN_NS, ScanConditionType,
};

/// Fallback key in the default-profiles config map.
const DEFAULT_PROVIDER_KEY: &str = "default";

/// Why a launch attempt stopped short of creating resources.
enum LaunchAbort {
    /// Scan is marked Failed; nothing happens until the spec changes.
    Terminal(String),
    /// Transient problem; error policy requeues with backoff.
    Retry(ControllerError),
}

impl From<kube::Error> for LaunchAbort {
    fn from(e: kube::Error) -> Self {
        LaunchAbort::Retry(e.into())
    }
}

pub async fn reconcile(scan: Arc<ClusterScan>, ctx: Arc<Ctx>) -> Result<Action, ControllerError> {
    if scan.metadata.deletion_timestamp.is_some() {
        return Ok(Action::await_change());
    }
    // metrics first: a completed run must be recorded before a reschedule
    // can clear its summary
    if let Some(action) = metrics::process(&scan, &ctx).await? {
        return Ok(action);
    }
    if let Some(action) = schedule::process(&scan, &ctx).await? {
        return Ok(action);
    }
    launch(&scan, &ctx).await
}

async fn launch(scan: &ClusterScan, ctx: &Ctx) -> Result<Action, ControllerError> {
    let name = scan.name_any();
    let status = scan.status.clone().unwrap_or_default();
    if !status.last_run_timestamp.is_empty()
        || status.conditions.is_true(ScanConditionType::Created)
    {
        // launched already; the correlators own the rest of the run
        return Ok(Action::await_change());
    }

    if !status.conditions.is_true(ScanConditionType::Pending) {
        debug!("scan {} observed for the first time, marking pending", name);
        update_scan_status_with_retry(&ctx.scans, &name, |s| {
            let spec = s.spec.clone();
            if let Some(st) = s.status.as_mut() {
                st.conditions.set_with_message(
                    ScanConditionType::Pending,
                    ConditionStatus::True,
                    "scan run pending",
                );
                display::apply(st, &spec);
            }
        })
        .await?;
        return Ok(Action::requeue(Duration::from_secs(1)));
    }

    ensure_no_runner(ctx).await?;

    let (profile, benchmark) = match resolve_profile(scan, ctx).await {
        Ok(resolved) => resolved,
        Err(LaunchAbort::Terminal(msg)) => return fail_scan(ctx, &name, msg).await,
        Err(LaunchAbort::Retry(e)) => return Err(e),
    };
    let profile_name = profile.name_any();

    if let Some(expr) = scan.cron_schedule() {
        if let Err(msg) = schedule::validate_cron(expr) {
            return fail_scan(ctx, &name, msg).await;
        }
    }

    lease::acquire(ctx, &name).await?;

    info!(
        "launching runner job for scan {} with profile {}",
        name, profile_name
    );

    let custom_cm = if benchmark.spec.custom_benchmark_config_map_name.is_empty() {
        None
    } else {
        match prepare_custom_benchmark(scan, &profile_name, &benchmark, ctx).await {
            Ok(cm) => Some(cm),
            Err(LaunchAbort::Terminal(msg)) => return fail_scan(ctx, &name, msg).await,
            Err(LaunchAbort::Retry(e)) => return Err(e),
        }
    };

    if let Err(e) = create_children(scan, &profile, custom_cm.as_ref(), ctx).await {
        mark_reconciling(ctx, &name).await;
        return Err(e);
    }

    let mut rule_name = status.scan_alerting_rule_name.clone();
    if ctx.config.alerts_enabled && scan.alert_rule().is_some() && rule_name.is_empty() {
        if let Some(rule) = alert::scan_alert_rule(scan, &profile_name, &ctx.config) {
            match ctx.alert_rules.create(&PostParams::default(), &rule).await {
                Ok(created) => rule_name = created.name_any(),
                Err(e) if is_already_exists(&e) => rule_name = rule.name_any(),
                Err(e) => {
                    error!(
                        "alerts will not be sent for scan {}, creating its rule failed: {}",
                        name, e
                    );
                }
            }
        }
    }

    let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    update_scan_status_with_retry(&ctx.scans, &name, move |s| {
        let spec = s.spec.clone();
        let Some(st) = s.status.as_mut() else { return };
        if st.conditions.is_true(ScanConditionType::Failed) {
            st.conditions
                .set(ScanConditionType::Failed, ConditionStatus::False);
        }
        st.conditions.remove(ScanConditionType::Reconciling);
        st.last_run_timestamp = now.clone();
        st.last_run_scan_profile_name = Some(profile_name.clone());
        st.conditions
            .set(ScanConditionType::Created, ConditionStatus::True);
        st.conditions.set_with_message(
            ScanConditionType::RunCompleted,
            ConditionStatus::Unknown,
            "creating job to run the benchmark",
        );
        st.scan_alerting_rule_name = rule_name.clone();
        display::apply(st, &spec);
    })
    .await?;

    Ok(Action::await_change())
}

/// Live check that no runner of any scan is active.
///
/// The lease is advisory state; the presence of actual runner jobs or pods
/// is what decides whether a launch may proceed.
async fn ensure_no_runner(ctx: &Ctx) -> Result<(), ControllerError> {
    let selector = format!("{LABEL_CONTROLLER}={}", ctx.config.controller_name);
    let jobs = ctx
        .jobs
        .list(&ListParams::default().labels(&selector))
        .await?;
    if !jobs.items.is_empty() {
        return Err(ControllerError::ScanContention(
            "a scan runner job is already running".to_string(),
        ));
    }
    let pods = ctx
        .pods
        .list(&ListParams::default().labels(&format!("{RUNNER_LABEL_KEY}={RUNNER_LABEL_VALUE}")))
        .await?;
    if !pods.items.is_empty() {
        return Err(ControllerError::ScanContention(
            "a scan runner pod is already running".to_string(),
        ));
    }
    Ok(())
}

async fn resolve_profile(
    scan: &ClusterScan,
    ctx: &Ctx,
) -> Result<(ClusterScanProfile, ClusterScanBenchmark), LaunchAbort> {
    let profile_name = match scan.spec.scan_profile_name.as_deref() {
        Some(p) if !p.is_empty() => p.to_string(),
        _ => {
            let cm = ctx
                .configmaps
                .get_opt(DEFAULT_PROFILES_CM)
                .await?
                .ok_or_else(|| {
                    LaunchAbort::Terminal(format!(
                        "config map {DEFAULT_PROFILES_CM} with default scan profiles not found"
                    ))
                })?;
            let data = cm.data.unwrap_or_default();
            default_profile_from(
                &data,
                &ctx.config.cluster_provider,
                &ctx.config.kubernetes_version,
            )
            .map_err(LaunchAbort::Terminal)?
        }
    };

    let profile = ctx
        .profiles
        .get_opt(&profile_name)
        .await?
        .ok_or_else(|| LaunchAbort::Terminal(format!("scan profile {profile_name} not found")))?;
    let benchmark = ctx
        .benchmarks
        .get_opt(&profile.spec.benchmark_version)
        .await?
        .ok_or_else(|| {
            LaunchAbort::Terminal(format!(
                "benchmark {} referenced by profile {profile_name} not found",
                profile.spec.benchmark_version
            ))
        })?;
    validate_benchmark(
        &benchmark,
        &ctx.config.cluster_provider,
        &ctx.config.kubernetes_version,
    )
    .map_err(LaunchAbort::Terminal)?;
    Ok((profile, benchmark))
}

/// Picks the default profile for a provider from the default-profiles
/// config map.
///
/// An entry is either a plain profile name, or one `"<semver-range>:<name>"`
/// line per supported cluster version range.
pub fn default_profile_from(
    data: &BTreeMap<String, String>,
    provider: &str,
    cluster_version: &str,
) -> Result<String, String> {
    let entry = data
        .get(provider)
        .or_else(|| data.get(DEFAULT_PROVIDER_KEY))
        .ok_or_else(|| format!("no default scan profile configured for provider {provider}"))?;

    let lines: Vec<&str> = entry
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    match lines.as_slice() {
        [] => Err(format!(
            "empty default scan profile entry for provider {provider}"
        )),
        [single] if !single.contains(':') => Ok((*single).to_string()),
        _ => {
            let cluster = parse_cluster_version(cluster_version)?;
            for line in &lines {
                let Some((range, profile)) = line.split_once(':') else {
                    continue;
                };
                match version_req(range) {
                    Ok(req) if req.matches(&cluster) => return Ok(profile.trim().to_string()),
                    Ok(_) => {}
                    Err(e) => warn!("skipping malformed profile range {:?}: {}", range, e),
                }
            }
            Err(format!(
                "no default scan profile for provider {provider} matches cluster version {cluster_version}"
            ))
        }
    }
}

/// Checks a benchmark applies to this cluster's provider and version.
pub fn validate_benchmark(
    benchmark: &ClusterScanBenchmark,
    provider: &str,
    cluster_version: &str,
) -> Result<(), String> {
    let spec = &benchmark.spec;
    let name = benchmark.name_any();
    if !spec.cluster_provider.is_empty()
        && !spec.cluster_provider.eq_ignore_ascii_case(provider)
    {
        return Err(format!(
            "benchmark {name} is for provider {}, this cluster is {provider}",
            spec.cluster_provider
        ));
    }

    let mut range = String::new();
    if !spec.min_kubernetes_version.is_empty() {
        range.push_str(">=");
        range.push_str(&spec.min_kubernetes_version);
    }
    if !spec.max_kubernetes_version.is_empty() {
        if !range.is_empty() {
            range.push_str(", ");
        }
        range.push_str("<=");
        range.push_str(&spec.max_kubernetes_version);
    }
    if range.is_empty() {
        return Ok(());
    }

    let req = VersionReq::parse(&range)
        .map_err(|e| format!("benchmark {name} version range {range:?} is not semver: {e}"))?;
    let cluster = parse_cluster_version(cluster_version)?;
    if !req.matches(&cluster) {
        return Err(format!(
            "benchmark {name} does not support cluster version {cluster_version}"
        ));
    }
    Ok(())
}

fn parse_cluster_version(version: &str) -> Result<Version, String> {
    let trimmed = version.strip_prefix('v').unwrap_or(version);
    Version::parse(trimmed)
        .map_err(|e| format!("cluster version {version:?} is not semver: {e}"))
}

/// Space-separated comparator ranges as found in profile entries.
fn version_req(range: &str) -> Result<VersionReq, semver::Error> {
    let normalized = range.split_whitespace().collect::<Vec<_>>().join(", ");
    VersionReq::parse(&normalized)
}

/// Makes the user-supplied custom benchmark config map mountable by the
/// runner: used as-is when already in the scan namespace, copied there
/// otherwise. The copy is removed by post-run cleanup.
async fn prepare_custom_benchmark(
    scan: &ClusterScan,
    profile_name: &str,
    benchmark: &ClusterScanBenchmark,
    ctx: &Ctx,
) -> Result<ConfigMap, LaunchAbort> {
    let cm_name = &benchmark.spec.custom_benchmark_config_map_name;
    let src_ns = if benchmark.spec.custom_benchmark_config_map_namespace.is_empty() {
        SCAN_NS
    } else {
        &benchmark.spec.custom_benchmark_config_map_namespace
    };
    let src_api: Api<ConfigMap> = Api::namespaced(ctx.client.clone(), src_ns);
    let source = src_api.get_opt(cm_name).await?.ok_or_else(|| {
        LaunchAbort::Terminal(format!(
            "custom benchmark config map {src_ns}/{cm_name} not found"
        ))
    })?;
    if src_ns == SCAN_NS {
        return Ok(source);
    }
    let copy = configmap::custom_benchmark_copy(scan, profile_name, &ctx.config, &source);
    create_or_skip(&ctx.configmaps, &copy)
        .await
        .map_err(LaunchAbort::Retry)?;
    Ok(copy)
}

async fn create_children(
    scan: &ClusterScan,
    profile: &ClusterScanProfile,
    custom_cm: Option<&ConfigMap>,
    ctx: &Ctx,
) -> Result<(), ControllerError> {
    let profile_name = profile.name_any();
    let config_cm = configmap::scan_config_map(scan, &profile_name, &ctx.config)?;
    create_or_skip(&ctx.configmaps, &config_cm).await?;

    let plugin_cm = configmap::plugin_config_map(scan, profile, &ctx.config, custom_cm)?;
    create_or_skip(&ctx.configmaps, &plugin_cm).await?;

    if let Some(skip_cm) = configmap::skip_config_map(scan, profile, &ctx.config)? {
        create_or_skip(&ctx.configmaps, &skip_cm).await?;
    }

    let svc = service::runner_service(scan, &profile_name, &ctx.config);
    create_or_skip(&ctx.services, &svc).await?;

    let runner = job::runner_job(scan, profile, &ctx.config);
    create_or_skip(&ctx.jobs, &runner).await?;
    Ok(())
}

/// Records that a retryable launch step is in flight. Best effort: losing
/// this write only loses a progress marker.
async fn mark_reconciling(ctx: &Ctx, name: &str) {
    let result = update_scan_status_with_retry(&ctx.scans, name, |s| {
        if let Some(st) = s.status.as_mut() {
            st.conditions
                .set(ScanConditionType::Reconciling, ConditionStatus::True);
        }
    })
    .await;
    if let Err(e) = result {
        warn!("could not mark scan {} as reconciling: {}", name, e);
    }
}

/// Marks a scan terminally failed and stops reconciling it until its spec
/// changes.
async fn fail_scan(
    ctx: &Ctx,
    name: &str,
    message: String,
) -> Result<Action, ControllerError> {
    error!("scan {} failed validation: {}", name, message);
    update_scan_status_with_retry(&ctx.scans, name, move |s| {
        let spec = s.spec.clone();
        if let Some(st) = s.status.as_mut() {
            st.conditions.set_with_message(
                ScanConditionType::Failed,
                ConditionStatus::True,
                message.clone(),
            );
            display::apply(st, &spec);
        }
    })
    .await?;
    Ok(Action::await_change())
}
