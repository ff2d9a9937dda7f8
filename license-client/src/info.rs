//! Issuer addresses and feature lists.
//!
//! The issuer address is chosen from explicit configuration: an explicit
//! base address wins, otherwise the enforcement flag picks between the
//! production and the non-production issuer.

use crate::error::{ClientError, ClientResult};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// Production license issuer.
pub const PROD_ADDRESS: &str = "https://byte.builders";

/// Non-production issuer, used when license enforcement is off.
pub const QA_ADDRESS: &str = "https://appscode.ninja";

/// Path of the license issue API, relative to the issuer base.
pub const LICENSE_ISSUER_API_PATH: &str = "api/v1/license/issue";

/// Path of the cluster registration API, relative to the issuer base.
pub const REGISTRATION_API_PATH: &str = "api/v1/register";

/// Configuration for reaching the license issuer.
///
/// Enforcement is on unless switched off explicitly, so an empty config
/// talks to the production issuer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IssuerConfig {
    /// Explicit issuer base address. Overrides the enforcement-based choice.
    pub base_url: Option<String>,
    /// Whether licenses are enforced. Off selects the non-production issuer.
    pub enforce_license: bool,
    /// Request timeout in seconds. `None` leaves latency bounds to the caller.
    pub timeout_secs: Option<u64>,
}

impl Default for IssuerConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            enforce_license: true,
            timeout_secs: None,
        }
    }
}

impl IssuerConfig {
    /// Creates a config that talks to the production issuer.
    #[must_use]
    pub fn production() -> Self {
        Self::default()
    }

    /// Creates a config with enforcement off, which selects the
    /// non-production issuer.
    #[must_use]
    pub fn non_production() -> Self {
        Self {
            enforce_license: false,
            ..Default::default()
        }
    }

    /// Creates a config pinned to an explicit issuer address.
    #[must_use]
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: Some(base_url.into()),
            ..Default::default()
        }
    }

    /// Returns true when license verification is not enforced.
    #[must_use]
    pub fn skip_license_verification(&self) -> bool {
        !self.enforce_license
    }

    /// Returns the configured request timeout, if any.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Resolves the issuer base address.
    pub fn api_server_address(&self) -> ClientResult<Url> {
        let raw = match self.base_url.as_deref() {
            Some(base) if !base.trim().is_empty() => base.trim(),
            _ if self.skip_license_verification() => QA_ADDRESS,
            _ => PROD_ADDRESS,
        };
        let url = Url::parse(raw).map_err(|e| ClientError::InvalidUrl(format!("{raw}: {e}")))?;
        if url.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl(format!("{raw}: not a base address")));
        }
        Ok(url)
    }

    /// Resolves the full license issue endpoint.
    pub fn license_issuer_endpoint(&self) -> ClientResult<Url> {
        Ok(join_path(&self.api_server_address()?, LICENSE_ISSUER_API_PATH))
    }

    /// Resolves the full cluster registration endpoint.
    pub fn registration_endpoint(&self) -> ClientResult<Url> {
        Ok(join_path(&self.api_server_address()?, REGISTRATION_API_PATH))
    }
}

/// Appends `segment` to the path of `base`, collapsing the slash between them.
fn join_path(base: &Url, segment: &str) -> Url {
    let mut url = base.clone();
    let path = format!(
        "{}/{}",
        base.path().trim_end_matches('/'),
        segment.trim_start_matches('/')
    );
    url.set_path(&path);
    url
}

/// Splits a feature string on whitespace, commas and semicolons.
///
/// The result is de-duplicated and sorted.
#[must_use]
pub fn parse_features(features: &str) -> Vec<String> {
    features
        .split(|c: char| c.is_whitespace() || c == ',' || c == ';')
        .filter(|f| !f.is_empty())
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
