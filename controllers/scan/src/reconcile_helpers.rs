//! Helper functions for common reconciliation patterns
//!
//! Status updates race with the correlators, so every terminal mutation goes
//! through a bounded retry-on-conflict loop instead of surfacing 409s to the
//! caller. Child-resource creation is idempotent: a redelivered pre-run
//! event must never produce duplicate jobs or config maps.

use crate::error::ControllerError;
use crds::ClusterScan;
use kube::api::{Api, DeleteParams, PostParams};
use kube::core::Resource;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

/// Attempts per optimistic-concurrency retry loop.
pub const CONFLICT_RETRIES: usize = 5;

/// True for an apiserver 409 caused by a stale resource version.
pub fn is_conflict(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 409 && ae.reason == "Conflict")
}

/// True for an apiserver 409 caused by a create of an existing object.
pub fn is_already_exists(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 409 && ae.reason == "AlreadyExists")
}

/// True for an apiserver 404.
pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 404)
}

/// Creates an object, treating "already exists" as success.
pub async fn create_or_skip<K>(api: &Api<K>, obj: &K) -> Result<(), ControllerError>
where
    K: Resource + Clone + std::fmt::Debug + Serialize + DeserializeOwned,
{
    match api.create(&PostParams::default(), obj).await {
        Ok(_) => Ok(()),
        Err(e) if is_already_exists(&e) => {
            debug!("object {:?} already exists, skipping create", obj.meta().name);
            Ok(())
        }
        Err(e) => Err(ControllerError::Kube(e)),
    }
}

/// Deletes an object, treating "not found" as success.
///
/// Conflicting deletes (409 against a concurrent finalizer update) are
/// retried within the bounded budget.
pub async fn delete_ignore_not_found<K>(
    api: &Api<K>,
    name: &str,
    dp: &DeleteParams,
) -> Result<(), ControllerError>
where
    K: Resource + Clone + std::fmt::Debug + DeserializeOwned,
{
    for attempt in 0..CONFLICT_RETRIES {
        match api.delete(name, dp).await {
            Ok(_) => return Ok(()),
            Err(e) if is_not_found(&e) => return Ok(()),
            Err(e) if is_conflict(&e) && attempt + 1 < CONFLICT_RETRIES => {
                debug!("conflict deleting {}, retrying", name);
            }
            Err(e) => return Err(ControllerError::Kube(e)),
        }
    }
    Err(ControllerError::ConflictExhausted(format!("delete of {name}")))
}

/// Get-mutate-replace loop for ClusterScan status under optimistic concurrency.
///
/// The closure runs against the freshest copy on every attempt, so it must
/// be a pure function of the fetched object.
pub async fn update_scan_status_with_retry<F>(
    api: &Api<ClusterScan>,
    name: &str,
    mutate: F,
) -> Result<ClusterScan, ControllerError>
where
    F: Fn(&mut ClusterScan),
{
    for attempt in 0..CONFLICT_RETRIES {
        let mut scan = api.get(name).await?;
        if scan.status.is_none() {
            scan.status = Some(Default::default());
        }
        mutate(&mut scan);
        let data = serde_json::to_vec(&scan)?;
        match api.replace_status(name, &PostParams::default(), data).await {
            Ok(updated) => return Ok(updated),
            Err(e) if is_conflict(&e) && attempt + 1 < CONFLICT_RETRIES => {
                debug!("conflict updating status of scan {}, retrying", name);
            }
            Err(e) => return Err(ControllerError::Kube(e)),
        }
    }
    Err(ControllerError::ConflictExhausted(format!(
        "status update for scan {name}"
    )))
}
