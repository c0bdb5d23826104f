//! kubescan operator
//!
//! Reconciles ClusterScan CRDs into compliance-benchmark runner jobs,
//! correlates runner outcomes back into scan status and reports, schedules
//! recurring scans and exports per-run metrics.

mod backoff;
mod controller;
mod display;
mod error;
mod http;
mod job_handler;
mod lease;
mod metrics;
mod pod_handler;
mod reconcile_helpers;
mod resources;
mod scan_handler;
#[cfg(test)]
mod scan_handler_test;
mod schedule;
#[cfg(test)]
mod test_utils;
mod watcher;

use tracing::info;

use crate::controller::{Controller, OperatorConfig};
use crate::error::ControllerError;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt::init();

    let config = OperatorConfig::from_env();
    info!("starting kubescan operator");
    info!("  cluster: {} ({})", config.cluster_name, config.cluster_provider);
    info!("  runner image: {}", config.scan_image_ref());
    info!("  alerts enabled: {}", config.alerts_enabled);

    let controller = Controller::new(config).await?;
    controller.run().await
}
