//! Error types for the license issuer client.

use thiserror::Error;

/// Result type for issuer client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur while talking to the license issuer.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The issuer base address could not be parsed.
    #[error("invalid issuer address: {0}")]
    InvalidUrl(String),

    /// Transport-level failure (DNS, TLS, connection, reading the body).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The issuer answered with a non-success status.
    ///
    /// The body is kept verbatim for diagnostics and is never parsed.
    #[error("the server rejected our request ({method} {resource}, status {status}): {body}")]
    ServerResponse {
        status: u16,
        method: String,
        resource: String,
        body: String,
    },

    /// The success body did not match the expected license response shape.
    #[error("failed to decode license response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ClientError {
    /// Returns the HTTP status for server-response errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::ServerResponse { status, .. } => Some(*status),
            ClientError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Returns true when the issuer could not be reached at all.
    pub fn is_connect(&self) -> bool {
        matches!(self, ClientError::Http(e) if e.is_connect())
    }

    /// Returns the chain of underlying causes of a transport error, joined
    /// with `": "`. This is where TLS certificate failures show up.
    pub fn transport_detail(&self) -> Option<String> {
        let ClientError::Http(err) = self else {
            return None;
        };
        let mut causes = Vec::new();
        let mut source = std::error::Error::source(err);
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = std::error::Error::source(cause);
        }
        Some(causes.join(": "))
    }

    /// Returns the raw response body for server-response errors.
    pub fn body(&self) -> Option<&str> {
        match self {
            ClientError::ServerResponse { body, .. } => Some(body),
            _ => None,
        }
    }
}
