//! Cluster-wide single-scan concurrency guard.
//!
//! The right to run a benchmark job is a single-slot Lease in the operator
//! namespace: holder identity is the scan name, expiry comes from the renew
//! time plus the lease duration. Acquisition is a server-side atomic create,
//! so two scans racing for the slot cannot both win. The in-process
//! current-scan marker is only a same-process fast path; the live
//! runner-present check in the scan handler remains the source of truth.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::MicroTime;
use kube::api::{ObjectMeta, PostParams};
use tracing::{debug, info, warn};

use crate::controller::Ctx;
use crate::error::ControllerError;
use crate::reconcile_helpers::{delete_ignore_not_found, is_already_exists, is_conflict};
use crds::{ACTIVE_SCAN_LEASE, ACTIVE_SCAN_LEASE_SECONDS, SCAN_NS};

/// What the durable lease record currently says.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaseState {
    /// No holder recorded.
    Free,
    /// A holder is recorded but its lease ran out without renewal.
    Expired,
    /// A holder owns the slot.
    HeldBy(String),
}

/// Classifies a lease record at a point in time.
pub fn lease_state(lease: &Lease, now: DateTime<Utc>) -> LeaseState {
    let Some(spec) = lease.spec.as_ref() else {
        return LeaseState::Free;
    };
    let holder = match spec.holder_identity.as_deref() {
        Some(h) if !h.is_empty() => h.to_string(),
        _ => return LeaseState::Free,
    };
    let stamped = spec
        .renew_time
        .as_ref()
        .or(spec.acquire_time.as_ref())
        .map(|t| t.0);
    let duration = i64::from(spec.lease_duration_seconds.unwrap_or(ACTIVE_SCAN_LEASE_SECONDS));
    match stamped {
        Some(t) if t + ChronoDuration::seconds(duration) < now => LeaseState::Expired,
        // a holder without any timestamp never expires; treat as held
        _ => LeaseState::HeldBy(holder),
    }
}

fn new_lease(scan_name: &str, now: DateTime<Utc>) -> Lease {
    Lease {
        metadata: ObjectMeta {
            name: Some(ACTIVE_SCAN_LEASE.to_string()),
            namespace: Some(SCAN_NS.to_string()),
            ..ObjectMeta::default()
        },
        spec: Some(LeaseSpec {
            holder_identity: Some(scan_name.to_string()),
            lease_duration_seconds: Some(ACTIVE_SCAN_LEASE_SECONDS),
            acquire_time: Some(MicroTime(now)),
            renew_time: Some(MicroTime(now)),
            ..LeaseSpec::default()
        }),
    }
}

/// Acquires the single-scan slot for `scan_name`.
///
/// Returns `ScanContention` (retryable, no status mutation) when another
/// live scan holds the slot.
pub async fn acquire(ctx: &Ctx, scan_name: &str) -> Result<(), ControllerError> {
    // same-process fast path
    let current = ctx
        .current_scan
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .clone();
    if let Some(cur) = current {
        if cur != scan_name {
            if ctx.scans.get_opt(&cur).await?.is_some() {
                return Err(ControllerError::ScanContention(format!(
                    "scan {cur} is currently running"
                )));
            }
            debug!("current scan {} gone, clearing in-process marker", cur);
            let mut guard = ctx.current_scan.lock().unwrap_or_else(|e| e.into_inner());
            if guard.as_deref() == Some(cur.as_str()) {
                *guard = None;
            }
        }
    }

    let now = Utc::now();
    match ctx.leases.create(&PostParams::default(), &new_lease(scan_name, now)).await {
        Ok(_) => {
            info!("scan {} acquired the active-scan lease", scan_name);
            mark_current(ctx, scan_name);
            Ok(())
        }
        Err(e) if is_already_exists(&e) => {
            let existing = ctx.leases.get(ACTIVE_SCAN_LEASE).await?;
            match lease_state(&existing, now) {
            LeaseState::Free | LeaseState::Expired => {
                take_over(ctx, existing, scan_name, now).await
            }
            LeaseState::HeldBy(holder) if holder == scan_name => {
                take_over(ctx, existing, scan_name, now).await
            }
            LeaseState::HeldBy(holder) => {
                // holder may have been deleted without releasing the slot
                if ctx.scans.get_opt(&holder).await?.is_none() {
                    warn!("lease holder scan {} is gone, taking over", holder);
                    take_over(ctx, existing, scan_name, now).await
                } else {
                    Err(ControllerError::ScanContention(format!(
                        "scan {holder} holds the active-scan lease"
                    )))
                }
            }
            }
        }
        Err(e) => Err(ControllerError::Kube(e)),
    }
}

async fn take_over(
    ctx: &Ctx,
    mut existing: Lease,
    scan_name: &str,
    now: DateTime<Utc>,
) -> Result<(), ControllerError> {
    let spec = existing.spec.get_or_insert_with(LeaseSpec::default);
    let transitions = spec.lease_transitions.unwrap_or(0);
    if spec.holder_identity.as_deref() != Some(scan_name) {
        spec.lease_transitions = Some(transitions + 1);
        spec.acquire_time = Some(MicroTime(now));
    }
    spec.holder_identity = Some(scan_name.to_string());
    spec.lease_duration_seconds = Some(ACTIVE_SCAN_LEASE_SECONDS);
    spec.renew_time = Some(MicroTime(now));

    match ctx
        .leases
        .replace(ACTIVE_SCAN_LEASE, &PostParams::default(), &existing)
        .await
    {
        Ok(_) => {
            info!("scan {} took over the active-scan lease", scan_name);
            mark_current(ctx, scan_name);
            Ok(())
        }
        // another contender replaced it first
        Err(e) if is_conflict(&e) => Err(ControllerError::ScanContention(format!(
            "lost the active-scan lease race for scan {scan_name}"
        ))),
        Err(e) => Err(ControllerError::Kube(e)),
    }
}

/// Releases the slot if `scan_name` holds it.
pub async fn release(ctx: &Ctx, scan_name: &str) -> Result<(), ControllerError> {
    {
        let mut guard = ctx.current_scan.lock().unwrap_or_else(|e| e.into_inner());
        if guard.as_deref() == Some(scan_name) {
            *guard = None;
        }
    }
    if let Some(lease) = ctx.leases.get_opt(ACTIVE_SCAN_LEASE).await? {
        let holder = lease
            .spec
            .as_ref()
            .and_then(|s| s.holder_identity.as_deref());
        if holder == Some(scan_name) {
            delete_ignore_not_found(&ctx.leases, ACTIVE_SCAN_LEASE, &Default::default()).await?;
            info!("scan {} released the active-scan lease", scan_name);
        }
    }
    Ok(())
}

fn mark_current(ctx: &Ctx, scan_name: &str) {
    let mut guard = ctx.current_scan.lock().unwrap_or_else(|e| e.into_inner());
    *guard = Some(scan_name.to_string());
}
