//! Error types for license verification and failure reporting.

use thiserror::Error;

/// Result type for license verification.
pub type LicenseResult<T> = Result<T, LicenseError>;

/// Result type for orchestration platform calls.
pub type PlatformResult<T> = Result<T, PlatformError>;

/// Why a license verification attempt failed.
///
/// Variants are listed in the order the checks run, so the first structural
/// problem in a credential is always the one reported.
#[derive(Debug, Error)]
pub enum LicenseError {
    /// The credential holds no PEM block.
    #[error("failed to parse certificate PEM")]
    Decode,

    /// The credential looks like a signed token. Token licenses are not
    /// supported yet.
    #[error("license token format is not supported")]
    UnsupportedFormat,

    /// The PEM block is not a valid X.509 certificate.
    #[error("failed to parse certificate: {0}")]
    Parse(String),

    /// No CA certificate could be loaded from the trust root.
    #[error("failed to parse root certificate")]
    RootPool,

    /// Chain, validity window, cluster binding or key usage check failed.
    #[error("failed to verify certificate: {0}")]
    Chain(String),

    /// The certificate was issued to a different product.
    #[error("license was not issued for {0}")]
    ProductMismatch(String),

    /// The cluster identity could not be resolved.
    #[error("failed to resolve cluster identity: {0}")]
    ClusterIdentity(#[source] PlatformError),

    /// The credential source could not be read.
    #[error("failed to read license from {location}: {source}")]
    ReadLicense {
        location: String,
        #[source]
        source: std::io::Error,
    },

    /// The orchestration platform client could not be built.
    #[error("failed to create cluster client: {0}")]
    ClientConstruction(#[source] PlatformError),
}

/// Errors from the orchestration platform.
///
/// These only ever affect failure reporting or session setup; they are never
/// a reason to keep running with an unverified license.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// Building a client (loading cluster configuration) failed.
    #[error("client error: {0}")]
    Client(String),

    /// An API call failed.
    #[error("API error: {0}")]
    Api(String),

    /// The requested object does not exist.
    #[error("{kind} {name} not found")]
    NotFound { kind: String, name: String },

    /// A field the caller relies on is missing from a returned object.
    #[error("missing field {0}")]
    MissingField(&'static str),

    /// The owner chain is longer than the walk allows.
    #[error("owner chain exceeds {0} levels")]
    OwnerChainTooDeep(usize),

    /// An object appears twice in its own owner chain.
    #[error("owner chain loops back to {0}")]
    OwnerCycle(String),

    /// The host name could not be read.
    #[error("failed to read host name: {0}")]
    Hostname(String),
}

impl From<kube::Error> for PlatformError {
    fn from(err: kube::Error) -> Self {
        PlatformError::Api(err.to_string())
    }
}
