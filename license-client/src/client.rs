//! License acquisition over HTTPS.
//!
//! A single POST per call, no retries. The response is only trusted when the
//! issuer answers with a success status.

use crate::error::{ClientError, ClientResult};
use crate::info::IssuerConfig;
use reqwest::{Client, Method, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

/// Resource name reported in server-response errors.
const LICENSE_RESOURCE: &str = "License";

/// Request body sent to the issuer.
#[derive(Debug, Serialize)]
struct AcquireRequest<'a> {
    cluster: &'a str,
    features: &'a [String],
}

/// Success body returned by the issuer.
#[derive(Debug, Deserialize)]
struct AcquireResponse {
    #[serde(default)]
    contract: Option<serde_json::Value>,
    #[serde(with = "base64_bytes")]
    license: Vec<u8>,
}

/// A license handed out by the issuer.
#[derive(Debug, Clone, PartialEq)]
pub struct AcquiredLicense {
    /// The signed credential, usually a PEM-encoded certificate.
    pub license: Vec<u8>,
    /// Contract details, when the issuer attaches them.
    pub contract: Option<serde_json::Value>,
}

/// Client for the license issue API.
#[derive(Debug, Clone)]
pub struct LicenseClient {
    url: Url,
    token: String,
    cluster_uid: String,
    http: Client,
}

impl LicenseClient {
    /// Creates a client for the issuer selected by `config`.
    ///
    /// An empty `token` sends no `Authorization` header.
    pub fn new(
        config: &IssuerConfig,
        token: impl Into<String>,
        cluster_uid: impl Into<String>,
    ) -> ClientResult<Self> {
        let url = config.license_issuer_endpoint()?;
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout() {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            url,
            token: token.into(),
            cluster_uid: cluster_uid.into(),
            http: builder.build()?,
        })
    }

    /// Returns the resolved issue endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.url
    }

    /// Requests a license for this cluster covering `features`.
    pub async fn acquire_license(&self, features: &[String]) -> ClientResult<AcquiredLicense> {
        let body = serde_json::to_vec(&AcquireRequest {
            cluster: &self.cluster_uid,
            features,
        })?;
        trace!(
            method = "POST",
            url = %self.url,
            body = %String::from_utf8_lossy(&body),
            "license issue request"
        );

        let mut request = self
            .http
            .post(self.url.clone())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body);
        if !self.token.is_empty() {
            request = request.bearer_auth(&self.token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.transport_error(e))?;

        if !status.is_success() {
            debug!(status = status.as_u16(), "license issuer rejected request");
            return Err(ClientError::ServerResponse {
                status: status.as_u16(),
                method: Method::POST.to_string(),
                resource: LICENSE_RESOURCE.to_string(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }

        let parsed: AcquireResponse = serde_json::from_slice(&bytes)?;
        debug!(
            bytes = parsed.license.len(),
            has_contract = parsed.contract.is_some(),
            "acquired license"
        );
        Ok(AcquiredLicense {
            license: parsed.license,
            contract: parsed.contract,
        })
    }

    /// Logs a transport failure with its causes and wraps it.
    fn transport_error(&self, err: reqwest::Error) -> ClientError {
        let err = ClientError::Http(err);
        warn!(
            url = %self.url,
            connect = err.is_connect(),
            error = %err,
            cause = %err.transport_detail().unwrap_or_default(),
            "license issuer request failed"
        );
        err
    }
}

/// Decodes standard base64 text, which is how the issuer encodes byte fields.
mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        BASE64
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
