//! Verifier configuration and fixed names.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Namespace whose UID identifies the cluster.
pub const SYSTEM_NAMESPACE: &str = "kube-system";

/// Component recorded as the source of failure events.
pub const EVENT_SOURCE_LICENSE_VERIFIER: &str = "License Verifier";

/// Reason recorded on failure events.
pub const EVENT_REASON_LICENSE_VERIFICATION_FAILED: &str = "License Verification Failed";

/// Suffix appended to the root controller name to name the failure event.
pub const EVENT_NAME_SUFFIX: &str = "license";

/// Maximum number of owner hops followed when looking for the root controller.
pub const MAX_OWNER_DEPTH: usize = 10;

/// Default re-verification interval (one hour).
pub const DEFAULT_INTERVAL_SECS: u64 = 60 * 60;

/// Default time cooperating tasks get to stop before the process exits.
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 5_000;

/// Configuration for a verification session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifierConfig {
    /// Where the license is read from on every attempt.
    pub license_file: PathBuf,
    /// PEM-encoded CA certificates trusted to issue licenses.
    pub ca_cert: String,
    /// Organization the license must be issued to.
    pub product_name: String,
    /// Whether licenses are enforced at all.
    pub enforce_license: bool,
    /// Seconds between periodic verifications.
    pub interval_secs: u64,
    /// Milliseconds to wait for cooperating tasks before exiting on failure.
    pub shutdown_grace_ms: u64,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            license_file: PathBuf::new(),
            ca_cert: String::new(),
            product_name: String::new(),
            enforce_license: true,
            interval_secs: DEFAULT_INTERVAL_SECS,
            shutdown_grace_ms: DEFAULT_SHUTDOWN_GRACE_MS,
        }
    }
}

impl VerifierConfig {
    /// Creates an enforcing config with default timings.
    #[must_use]
    pub fn new(
        license_file: impl Into<PathBuf>,
        ca_cert: impl Into<String>,
        product_name: impl Into<String>,
    ) -> Self {
        Self {
            license_file: license_file.into(),
            ca_cert: ca_cert.into(),
            product_name: product_name.into(),
            ..Default::default()
        }
    }

    /// Returns true when verification is switched off.
    #[must_use]
    pub fn skip_license_verification(&self) -> bool {
        !self.enforce_license
    }

    /// Interval between periodic attempts. Never zero.
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    /// Grace period granted to cooperating tasks on fatal failure.
    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// Builds `<name>-<suffix>`, truncating `name` so the result fits in a
/// 63-character object name.
#[must_use]
pub fn name_with_suffix(name: &str, suffix: &str) -> String {
    const MAX_NAME_LEN: usize = 63;
    let budget = MAX_NAME_LEN.saturating_sub(suffix.len() + 1);
    let mut cut = name.len().min(budget);
    while !name.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}-{}", &name[..cut], suffix)
}
