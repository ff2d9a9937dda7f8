//! License certificate decoding and verification.
//!
//! A license is a PEM-encoded X.509 certificate issued by a trusted CA. It is
//! bound to one cluster through a DNS-name subject alternative name equal to
//! the cluster UID, and to one product through the subject organization.
//!
//! Checks run in a fixed order and stop at the first failure:
//!
//! 1. PEM decode
//! 2. X.509 parse
//! 3. trust root load
//! 4. chain, validity, cluster binding and client-auth key usage
//! 5. product organization

use crate::error::{LicenseError, LicenseResult};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rustls_pki_types::{CertificateDer, ServerName, TrustAnchor, UnixTime};
use webpki::{anchor_from_trusted_cert, EndEntityCert, KeyUsage, ALL_VERIFICATION_ALGS};
use x509_parser::certificate::X509Certificate;
use x509_parser::pem::{parse_x509_pem, Pem};
use x509_parser::prelude::FromDer;

const PEM_BEGIN: &[u8] = b"-----BEGIN";
const PEM_CERTIFICATE_LABEL: &str = "CERTIFICATE";

/// The shape a credential blob appears to have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialFormat {
    /// PEM-armored data, expected to hold a certificate.
    Certificate,
    /// A compact signed token (`header.payload.signature`). Recognized so it
    /// can be rejected explicitly; token licenses are not issued yet.
    Token,
    /// Neither of the above.
    Unknown,
}

impl CredentialFormat {
    /// Classifies a credential without validating it.
    #[must_use]
    pub fn detect(credential: &[u8]) -> Self {
        if credential.windows(PEM_BEGIN.len()).any(|w| w == PEM_BEGIN) {
            return Self::Certificate;
        }
        if looks_like_token(credential) {
            return Self::Token;
        }
        Self::Unknown
    }
}

/// Returns true for three non-empty base64url segments whose first segment
/// decodes to a JSON object.
fn looks_like_token(credential: &[u8]) -> bool {
    let Ok(text) = std::str::from_utf8(credential) else {
        return false;
    };
    let segments: Vec<&str> = text.trim().split('.').collect();
    if segments.len() != 3 || segments.iter().any(|s| s.is_empty()) {
        return false;
    }
    if segments
        .iter()
        .any(|s| URL_SAFE_NO_PAD.decode(s.as_bytes()).is_err())
    {
        return false;
    }
    URL_SAFE_NO_PAD
        .decode(segments[0].as_bytes())
        .ok()
        .and_then(|header| {
            serde_json::from_slice::<serde_json::Map<String, serde_json::Value>>(&header).ok()
        })
        .is_some()
}

/// Details of a license that passed every check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedLicense {
    /// Subject organizations the license was issued to.
    pub organizations: Vec<String>,
    /// Start of the validity window (seconds since epoch).
    pub not_before: i64,
    /// End of the validity window (seconds since epoch).
    pub not_after: i64,
}

/// Verifies `license` against `ca_cert` for `cluster_uid` and `product_name`
/// at the current time.
pub fn validate_license(
    license: &[u8],
    ca_cert: &[u8],
    cluster_uid: &str,
    product_name: &str,
) -> LicenseResult<VerifiedLicense> {
    validate_license_at(license, ca_cert, cluster_uid, product_name, UnixTime::now())
}

/// Same as [`validate_license`] with an explicit verification time.
pub fn validate_license_at(
    license: &[u8],
    ca_cert: &[u8],
    cluster_uid: &str,
    product_name: &str,
    now: UnixTime,
) -> LicenseResult<VerifiedLicense> {
    let pem = decode_pem(license)?;

    let (rest, cert) = X509Certificate::from_der(&pem.contents)
        .map_err(|e| LicenseError::Parse(e.to_string()))?;
    if !rest.is_empty() {
        return Err(LicenseError::Parse(format!(
            "{} bytes of trailing data",
            rest.len()
        )));
    }

    let anchors = load_trust_anchors(ca_cert)?;

    let der = CertificateDer::from(pem.contents.as_slice());
    verify_chain(&der, &anchors, cluster_uid, now)?;

    let organizations = cert
        .subject()
        .iter_organization()
        .filter_map(|attr| attr.as_str().ok())
        .map(str::to_string)
        .collect::<Vec<_>>();
    if !organizations.iter().any(|org| org == product_name) {
        return Err(LicenseError::ProductMismatch(product_name.to_string()));
    }

    Ok(VerifiedLicense {
        organizations,
        not_before: cert.validity().not_before.timestamp(),
        not_after: cert.validity().not_after.timestamp(),
    })
}

/// Extracts the first PEM block, routing token-shaped input to its own error.
fn decode_pem(license: &[u8]) -> LicenseResult<Pem> {
    match CredentialFormat::detect(license) {
        CredentialFormat::Certificate => parse_x509_pem(license)
            .map(|(_, pem)| pem)
            .map_err(|_| LicenseError::Decode),
        // TODO: verify token licenses once the issuer starts handing them out.
        CredentialFormat::Token => Err(LicenseError::UnsupportedFormat),
        CredentialFormat::Unknown => Err(LicenseError::Decode),
    }
}

/// Loads every `CERTIFICATE` block of `ca_cert` as a trust anchor.
///
/// Blocks that fail to decode or parse are skipped; at least one must load.
fn load_trust_anchors(ca_cert: &[u8]) -> LicenseResult<Vec<TrustAnchor<'static>>> {
    let anchors: Vec<TrustAnchor<'static>> = pem_blocks(ca_cert)
        .filter(|pem| pem.label == PEM_CERTIFICATE_LABEL)
        .filter_map(|pem| {
            let der = CertificateDer::from(pem.contents.as_slice());
            anchor_from_trusted_cert(&der).ok().map(|a| a.to_owned())
        })
        .collect();

    if anchors.is_empty() {
        return Err(LicenseError::RootPool);
    }
    Ok(anchors)
}

/// Decodes each PEM block of `buffer` on its own, starting at every
/// `-----BEGIN` marker, so a malformed block does not hide the ones after it.
fn pem_blocks(buffer: &[u8]) -> impl Iterator<Item = Pem> + '_ {
    buffer
        .windows(PEM_BEGIN.len())
        .enumerate()
        .filter(|(_, window)| *window == PEM_BEGIN)
        .filter_map(move |(offset, _)| {
            parse_x509_pem(&buffer[offset..])
                .ok()
                .map(|(_, pem)| pem)
        })
}

/// Verifies the chain to one of `anchors` for client authentication, then
/// checks the cluster UID against the certificate's DNS names.
fn verify_chain(
    der: &CertificateDer<'_>,
    anchors: &[TrustAnchor<'static>],
    cluster_uid: &str,
    now: UnixTime,
) -> LicenseResult<()> {
    let end_entity =
        EndEntityCert::try_from(der).map_err(|e| LicenseError::Chain(format!("{e:?}")))?;

    end_entity
        .verify_for_usage(
            ALL_VERIFICATION_ALGS,
            anchors,
            &[],
            now,
            KeyUsage::client_auth(),
            None,
            None,
        )
        .map_err(|e| LicenseError::Chain(format!("{e:?}")))?;

    let name = ServerName::try_from(cluster_uid).map_err(|_| {
        LicenseError::Chain(format!("cluster identity {cluster_uid:?} is not a valid name"))
    })?;
    end_entity
        .verify_is_valid_for_subject_name(&name)
        .map_err(|e| LicenseError::Chain(format!("{e:?}")))?;

    Ok(())
}
