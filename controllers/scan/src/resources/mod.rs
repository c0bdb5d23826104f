//! Typed builders for the child resources a scan run needs.
//!
//! Everything is built with fixed, scan-derived names so launch is
//! idempotent: re-creating after a partial failure hits AlreadyExists and
//! moves on.

pub mod alert;
pub mod configmap;
pub mod job;
pub mod service;

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};

use crds::{ClusterScan, LABEL_CONTROLLER, LABEL_PROFILE, LABEL_SCAN};

/// Labels stamped on every child resource of a scan run.
pub fn child_labels(
    scan: &ClusterScan,
    profile_name: &str,
    controller_name: &str,
) -> BTreeMap<String, String> {
    BTreeMap::from([
        (LABEL_CONTROLLER.to_string(), controller_name.to_string()),
        (LABEL_PROFILE.to_string(), profile_name.to_string()),
        (LABEL_SCAN.to_string(), scan.name_any()),
    ])
}

/// Controller owner reference pointing back at the scan.
///
/// Missing UID means the scan came from a stale cache; callers treat that
/// as retryable.
pub fn scan_owner_ref(scan: &ClusterScan) -> Option<OwnerReference> {
    scan.controller_owner_ref(&())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::scan_named;

    #[test]
    fn child_labels_identify_controller_profile_and_scan() {
        let scan = scan_named("nightly");
        let labels = child_labels(&scan, "cis-1.8-profile", "kubescan");
        assert_eq!(labels[LABEL_CONTROLLER], "kubescan");
        assert_eq!(labels[LABEL_PROFILE], "cis-1.8-profile");
        assert_eq!(labels[LABEL_SCAN], "nightly");
    }
}
