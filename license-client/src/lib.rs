//! Client side of license acquisition.
//!
//! Resolves the issuer endpoint from explicit configuration and requests a
//! signed license for a cluster and a set of features. The license it returns
//! is what `license-verifier` later checks.
//!
//! # Wire format
//!
//! `POST <issuer>/api/v1/license/issue` with
//! `{"cluster": "<uid>", "features": ["..."]}` and an optional bearer token.
//! A success response carries `{"license": "<base64>", "contract": {...}}`.

mod client;
mod error;
mod info;

pub use client::{AcquiredLicense, LicenseClient};
pub use error::{ClientError, ClientResult};
pub use info::{
    parse_features, IssuerConfig, LICENSE_ISSUER_API_PATH, PROD_ADDRESS, QA_ADDRESS,
    REGISTRATION_API_PATH,
};
