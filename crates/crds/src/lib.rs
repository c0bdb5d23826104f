//! kubescan CRD Definitions
//!
//! Kubernetes Custom Resource Definitions for the kubescan operator.

pub mod benchmark;
pub mod cluster_scan;
pub mod condition;
pub mod constants;
pub mod profile;
pub mod prometheus_rule;
pub mod report;

pub use benchmark::*;
pub use cluster_scan::*;
pub use condition::*;
pub use constants::*;
pub use profile::*;
pub use prometheus_rule::*;
pub use report::*;
