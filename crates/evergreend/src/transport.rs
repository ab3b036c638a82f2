//! HTTP transport for the session endpoints.
//!
//! The renewal endpoint rotates the access token: a POST carrying the
//! browser-style session cookie comes back as `{ accessToken,
//! expiresIn, user }` on success. Sign-out is a courtesy POST that
//! invalidates the server-side session.
//!
//! The trait seam exists so lifecycle tests can script outcomes without
//! a server; the daemon wires in [`HttpRefreshTransport`].

use std::future::Future;
use std::time::Duration;

use evergreen_core::RenewalResponse;
use reqwest::{Client, Url};
use thiserror::Error;

// ============================================================================
// Constants
// ============================================================================

/// Renewal endpoint, as an absolute path on the API origin.
pub const RENEW_ENDPOINT: &str = "/api/session/renew";

/// Sign-out endpoint, as an absolute path on the API origin.
pub const SIGN_OUT_ENDPOINT: &str = "/api/session/sign-out";

/// Default per-request timeout. A renewal that outlives this counts as
/// a failed attempt and enters the retry ladder.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Error Types
// ============================================================================

/// Errors from the renewal transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The configured base URL or endpoint path is not a valid URL.
    #[error("invalid endpoint: {message}")]
    InvalidEndpoint { message: String },

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {message}")]
    Client { message: String },

    /// The request did not complete (connect, send, or timeout).
    #[error("network error: {message}")]
    Network { message: String },

    /// The server answered outside the 2xx range.
    #[error("renewal rejected with HTTP status {status}")]
    Status { status: u16 },

    /// The response body did not decode as a renewal payload.
    #[error("malformed renewal response: {message}")]
    Malformed { message: String },
}

impl TransportError {
    fn network(e: reqwest::Error) -> Self {
        Self::Network {
            message: e.to_string(),
        }
    }

    fn malformed(e: reqwest::Error) -> Self {
        Self::Malformed {
            message: e.to_string(),
        }
    }
}

// ============================================================================
// Transport Trait
// ============================================================================

/// Renewal and sign-out calls as seen by the lifecycle actor.
pub trait RefreshTransport: Send + Sync + 'static {
    /// Requests a renewed access token for the current session.
    fn refresh(&self) -> impl Future<Output = Result<RenewalResponse, TransportError>> + Send;

    /// Tells the server the session is over. Best effort; callers
    /// proceed with local teardown whatever this returns.
    fn sign_out(&self) -> impl Future<Output = Result<(), TransportError>> + Send;
}

// ============================================================================
// HTTP Transport
// ============================================================================

/// Production transport speaking to the API over HTTPS.
///
/// The client keeps a cookie store so the server-issued session cookie
/// rides along on every renewal, the same way a browser would send it.
#[derive(Debug, Clone)]
pub struct HttpRefreshTransport {
    client: Client,
    renew_url: Url,
    sign_out_url: Url,
}

impl HttpRefreshTransport {
    /// Builds a transport for the given API origin.
    ///
    /// The endpoint paths are absolute, so any path on `base_url`
    /// itself is ignored: `https://api.example.com/v2` still renews
    /// against `https://api.example.com/api/session/renew`.
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, TransportError> {
        let base = Url::parse(base_url).map_err(|e| TransportError::InvalidEndpoint {
            message: format!("{base_url}: {e}"),
        })?;
        let renew_url = base
            .join(RENEW_ENDPOINT)
            .map_err(|e| TransportError::InvalidEndpoint {
                message: e.to_string(),
            })?;
        let sign_out_url = base
            .join(SIGN_OUT_ENDPOINT)
            .map_err(|e| TransportError::InvalidEndpoint {
                message: e.to_string(),
            })?;

        let client = Client::builder()
            .cookie_store(true)
            .timeout(request_timeout)
            .user_agent(concat!("evergreend/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Client {
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            renew_url,
            sign_out_url,
        })
    }

    /// Resolved renewal endpoint.
    #[must_use]
    pub fn renew_url(&self) -> &Url {
        &self.renew_url
    }

    /// Resolved sign-out endpoint.
    #[must_use]
    pub fn sign_out_url(&self) -> &Url {
        &self.sign_out_url
    }
}

impl RefreshTransport for HttpRefreshTransport {
    fn refresh(&self) -> impl Future<Output = Result<RenewalResponse, TransportError>> + Send {
        async move {
            let response = self
                .client
                .post(self.renew_url.clone())
                .send()
                .await
                .map_err(TransportError::network)?;

            let status = response.status();
            if !status.is_success() {
                return Err(TransportError::Status {
                    status: status.as_u16(),
                });
            }

            response
                .json::<RenewalResponse>()
                .await
                .map_err(TransportError::malformed)
        }
    }

    fn sign_out(&self) -> impl Future<Output = Result<(), TransportError>> + Send {
        async move {
            let response = self
                .client
                .post(self.sign_out_url.clone())
                .send()
                .await
                .map_err(TransportError::network)?;

            let status = response.status();
            if !status.is_success() {
                return Err(TransportError::Status {
                    status: status.as_u16(),
                });
            }
            Ok(())
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_invalid_base_url() {
        let result = HttpRefreshTransport::new("not a url", DEFAULT_REQUEST_TIMEOUT);
        assert!(matches!(
            result,
            Err(TransportError::InvalidEndpoint { .. })
        ));
    }

    #[test]
    fn test_new_rejects_schemeless_base_url() {
        let result = HttpRefreshTransport::new("api.pennyworth.app", DEFAULT_REQUEST_TIMEOUT);
        assert!(matches!(
            result,
            Err(TransportError::InvalidEndpoint { .. })
        ));
    }

    #[test]
    fn test_new_joins_endpoint_paths() {
        let transport =
            HttpRefreshTransport::new("https://api.pennyworth.app", DEFAULT_REQUEST_TIMEOUT)
                .unwrap();

        assert_eq!(
            transport.renew_url().as_str(),
            "https://api.pennyworth.app/api/session/renew"
        );
        assert_eq!(
            transport.sign_out_url().as_str(),
            "https://api.pennyworth.app/api/session/sign-out"
        );
    }

    #[test]
    fn test_endpoint_paths_are_absolute_on_the_origin() {
        let transport =
            HttpRefreshTransport::new("https://api.pennyworth.app/v2/", DEFAULT_REQUEST_TIMEOUT)
                .unwrap();

        // Absolute endpoint paths replace the base path entirely.
        assert_eq!(
            transport.renew_url().as_str(),
            "https://api.pennyworth.app/api/session/renew"
        );
    }

    #[test]
    fn test_error_display() {
        let err = TransportError::Status { status: 502 };
        assert_eq!(err.to_string(), "renewal rejected with HTTP status 502");

        let err = TransportError::Network {
            message: "connection refused".into(),
        };
        assert_eq!(err.to_string(), "network error: connection refused");
    }
}
