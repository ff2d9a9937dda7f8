//! Cluster-bound license verification.
//!
//! This crate checks that the software running in a Kubernetes cluster holds
//! a license issued for that cluster and product, and stops the process when
//! it does not.
//!
//! - License validation: X.509 chain to a trusted CA, client-auth usage, a
//!   DNS name equal to the cluster UID, and the product in the subject
//!   organization
//! - One-shot and periodic verification
//! - Fail-closed failure path: log, record a Warning event on the root
//!   controller, broadcast shutdown, exit
//!
//! # Design Principles
//!
//! - **Fail closed**: a failed check always ends the process; reporting is
//!   best effort and never blocks the exit
//! - **Fresh reads**: the license is re-read on every attempt so a rotated
//!   secret is picked up
//! - **Sequential attempts**: one loop, one attempt at a time, no shared
//!   mutable state
//! - **Explicit configuration**: no process-global settings

mod certificate;
mod config;
mod error;
mod failure;
mod kubernetes;
mod platform;
mod shutdown;
mod source;
mod verifier;

pub use certificate::{validate_license, validate_license_at, CredentialFormat, VerifiedLicense};
pub use config::{
    name_with_suffix, VerifierConfig, DEFAULT_INTERVAL_SECS, DEFAULT_SHUTDOWN_GRACE_MS,
    EVENT_NAME_SUFFIX, EVENT_REASON_LICENSE_VERIFICATION_FAILED, EVENT_SOURCE_LICENSE_VERIFIER,
    MAX_OWNER_DEPTH, SYSTEM_NAMESPACE,
};
pub use error::{LicenseError, LicenseResult, PlatformError, PlatformResult};
pub use failure::{FailureHandler, ReportOutcome, SkipReason, LICENSE_FAILURE_EXIT_CODE};
pub use kubernetes::{
    current_namespace, current_pod_name, possibly_in_cluster, resolve_namespace, KubeConnector,
    KubePlatform,
};
pub use platform::{
    create_or_patch_event, detect_workload, ClusterObject, ClusterPlatform, PlatformConnector,
    PodIdentity,
};
pub use shutdown::{ProcessExit, Shutdown, ShutdownListener, StdProcessExit};
pub use source::{CredentialSource, LicenseFile};
pub use verifier::{LicenseVerifier, VerificationSession};

/// Re-exported so callers can pass explicit verification times.
pub use rustls_pki_types::UnixTime;
