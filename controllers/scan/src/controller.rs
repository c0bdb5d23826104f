//! Operator wiring.
//!
//! Builds the shared reconcile context (typed API handles, operator
//! configuration, metrics, the in-process current-scan marker) and runs the
//! three watchers plus the metrics endpoint until one of them exits.

use std::env;
use std::sync::{Arc, Mutex};

use k8s_openapi::api::apps::v1::DaemonSet;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::coordination::v1::Lease;
use k8s_openapi::api::core::v1::{ConfigMap, Pod, Service};
use kube::{Api, Client};
use tokio::task::JoinHandle;
use tracing::info;

use crate::backoff::ErrorCounts;
use crate::error::ControllerError;
use crate::metrics::ScanMetrics;
use crate::{http, watcher};
use crds::{
    ClusterScan, ClusterScanBenchmark, ClusterScanProfile, ClusterScanReport, PrometheusRule,
    SCAN_NS,
};

/// Static operator configuration, loaded from the environment at startup.
#[derive(Debug, Clone)]
pub struct OperatorConfig {
    /// Name this operator instance stamps on everything it owns.
    pub controller_name: String,
    pub cluster_name: String,
    pub cluster_provider: String,
    /// Cluster version, e.g. `v1.30.2`. Read from the apiserver at startup.
    pub kubernetes_version: String,
    pub scan_image: String,
    pub scan_image_tag: String,
    pub alerts_enabled: bool,
    pub alert_severity: String,
    pub metrics_addr: String,
}

impl OperatorConfig {
    pub fn from_env() -> Self {
        OperatorConfig {
            controller_name: env::var("CONTROLLER_NAME")
                .unwrap_or_else(|_| "kubescan".to_string()),
            cluster_name: env::var("CLUSTER_NAME").unwrap_or_else(|_| "local".to_string()),
            cluster_provider: env::var("CLUSTER_PROVIDER").unwrap_or_default(),
            kubernetes_version: String::new(),
            scan_image: env::var("SCAN_IMAGE")
                .unwrap_or_else(|_| "microscaler/kubescan-runner".to_string()),
            scan_image_tag: env::var("SCAN_IMAGE_TAG").unwrap_or_else(|_| "latest".to_string()),
            alerts_enabled: env::var("ALERTS_ENABLED")
                .map(|v| v == "true")
                .unwrap_or(false),
            alert_severity: env::var("ALERT_SEVERITY").unwrap_or_else(|_| "warning".to_string()),
            metrics_addr: env::var("METRICS_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
        }
    }

    /// Full runner image reference.
    pub fn scan_image_ref(&self) -> String {
        format!("{}:{}", self.scan_image, self.scan_image_tag)
    }
}

/// Shared state handed to every reconciler.
pub struct Ctx {
    pub client: Client,
    pub scans: Api<ClusterScan>,
    pub profiles: Api<ClusterScanProfile>,
    pub benchmarks: Api<ClusterScanBenchmark>,
    pub reports: Api<ClusterScanReport>,
    pub jobs: Api<Job>,
    pub pods: Api<Pod>,
    pub daemonsets: Api<DaemonSet>,
    pub configmaps: Api<ConfigMap>,
    pub services: Api<Service>,
    pub leases: Api<Lease>,
    pub alert_rules: Api<PrometheusRule>,
    pub config: OperatorConfig,
    /// Same-process fast path for the active-scan lease.
    pub current_scan: Mutex<Option<String>>,
    pub metrics: ScanMetrics,
    pub errors: ErrorCounts,
}

/// Top-level operator: owns the watcher tasks and the metrics server.
pub struct Controller {
    scan_watcher: JoinHandle<Result<(), ControllerError>>,
    job_watcher: JoinHandle<Result<(), ControllerError>>,
    pod_watcher: JoinHandle<Result<(), ControllerError>>,
    metrics_server: JoinHandle<Result<(), ControllerError>>,
}

impl Controller {
    pub async fn new(mut config: OperatorConfig) -> Result<Self, ControllerError> {
        info!("initializing scan operator {}", config.controller_name);

        let client = Client::try_default().await?;
        if config.kubernetes_version.is_empty() {
            let version = client.apiserver_version().await?;
            config.kubernetes_version = version.git_version;
        }
        info!(
            "cluster {} ({}) running {}",
            config.cluster_name, config.cluster_provider, config.kubernetes_version
        );

        let metrics = ScanMetrics::new(prometheus::default_registry())?;
        let metrics_addr = config.metrics_addr.clone();

        let ctx = Arc::new(Ctx {
            scans: Api::all(client.clone()),
            profiles: Api::all(client.clone()),
            benchmarks: Api::all(client.clone()),
            reports: Api::all(client.clone()),
            jobs: Api::namespaced(client.clone(), SCAN_NS),
            pods: Api::namespaced(client.clone(), SCAN_NS),
            daemonsets: Api::namespaced(client.clone(), SCAN_NS),
            configmaps: Api::namespaced(client.clone(), SCAN_NS),
            services: Api::namespaced(client.clone(), SCAN_NS),
            leases: Api::namespaced(client.clone(), SCAN_NS),
            alert_rules: Api::namespaced(client.clone(), SCAN_NS),
            client,
            config,
            current_scan: Mutex::new(None),
            metrics,
            errors: ErrorCounts::default(),
        });

        let scan_watcher = tokio::spawn(watcher::run_scan_controller(ctx.clone()));
        let job_watcher = tokio::spawn(watcher::run_job_controller(ctx.clone()));
        let pod_watcher = tokio::spawn(watcher::run_pod_controller(ctx));
        let metrics_server =
            tokio::spawn(async move { http::serve(&metrics_addr).await });

        Ok(Self {
            scan_watcher,
            job_watcher,
            pod_watcher,
            metrics_server,
        })
    }

    /// Runs until any watcher or the metrics server exits.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("scan operator running");
        tokio::select! {
            result = &mut self.scan_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("ClusterScan watcher panicked: {e}")))??;
            }
            result = &mut self.job_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("job watcher panicked: {e}")))??;
            }
            result = &mut self.pod_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("pod watcher panicked: {e}")))??;
            }
            result = &mut self.metrics_server => {
                result.map_err(|e| ControllerError::Watch(format!("metrics server panicked: {e}")))??;
            }
        }
        Ok(())
    }
}
