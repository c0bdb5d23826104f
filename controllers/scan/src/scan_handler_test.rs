use std::collections::BTreeMap;

use crate::scan_handler::{default_profile_from, validate_benchmark};
use crate::test_utils::benchmark_named;

fn profiles(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn benchmark_version_window_is_inclusive() {
    let bench = benchmark_named("cis-1.8", "k3s", "1.20.0", "1.25.0");
    assert!(validate_benchmark(&bench, "k3s", "v1.22.3").is_ok());
    assert!(validate_benchmark(&bench, "k3s", "v1.20.0").is_ok());
    assert!(validate_benchmark(&bench, "k3s", "v1.25.0").is_ok());
    assert!(validate_benchmark(&bench, "k3s", "v1.19.5").is_err());
    assert!(validate_benchmark(&bench, "k3s", "v1.26.0").is_err());
}

#[test]
fn benchmark_provider_match_is_case_insensitive() {
    let bench = benchmark_named("cis-1.8", "K3S", "", "");
    assert!(validate_benchmark(&bench, "k3s", "v1.22.3").is_ok());
    assert!(validate_benchmark(&bench, "rke2", "v1.22.3").is_err());

    // empty provider matches any cluster
    let bench = benchmark_named("generic-1.0", "", "", "");
    assert!(validate_benchmark(&bench, "rke2", "v1.22.3").is_ok());
}

#[test]
fn open_ended_version_bounds() {
    let bench = benchmark_named("cis-1.8", "", "1.21.0", "");
    assert!(validate_benchmark(&bench, "k3s", "v1.30.0").is_ok());
    assert!(validate_benchmark(&bench, "k3s", "v1.20.9").is_err());

    let bench = benchmark_named("cis-1.6", "", "", "1.24.0");
    assert!(validate_benchmark(&bench, "k3s", "v1.20.0").is_ok());
    assert!(validate_benchmark(&bench, "k3s", "v1.25.0").is_err());
}

#[test]
fn non_semver_cluster_version_is_an_error() {
    let bench = benchmark_named("cis-1.8", "", "1.20.0", "");
    assert!(validate_benchmark(&bench, "k3s", "one-point-twenty").is_err());
}

#[test]
fn default_profile_plain_entry() {
    let data = profiles(&[("k3s", "k3s-cis-1.8-profile"), ("default", "cis-1.8-profile")]);
    assert_eq!(
        default_profile_from(&data, "k3s", "v1.22.3").unwrap(),
        "k3s-cis-1.8-profile"
    );
    // unknown provider falls back to the default entry
    assert_eq!(
        default_profile_from(&data, "gke", "v1.22.3").unwrap(),
        "cis-1.8-profile"
    );
}

#[test]
fn default_profile_versioned_entry_picks_matching_range() {
    let data = profiles(&[(
        "rke2",
        ">=1.20.0 <1.25.0:rke2-cis-1.6-profile\n>=1.25.0:rke2-cis-1.8-profile",
    )]);
    assert_eq!(
        default_profile_from(&data, "rke2", "v1.22.3").unwrap(),
        "rke2-cis-1.6-profile"
    );
    assert_eq!(
        default_profile_from(&data, "rke2", "v1.26.1").unwrap(),
        "rke2-cis-1.8-profile"
    );
    assert!(default_profile_from(&data, "rke2", "v1.19.0").is_err());
}

#[test]
fn default_profile_missing_entry_is_an_error() {
    let data = profiles(&[]);
    assert!(default_profile_from(&data, "k3s", "v1.22.3").is_err());
}
