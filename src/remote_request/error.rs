use std::error::Error as StdError;

use thiserror::Error;

use super::{RemoteRequestFailure, RemoteRequestKey};

/// curl-compatible transport error codes, the numeric vocabulary the
/// remote collaborators already report network failures in.
const CURLE_COULDNT_RESOLVE_HOST: u16 = 6;
const CURLE_COULDNT_CONNECT: u16 = 7;
const CURLE_OPERATION_TIMEDOUT: u16 = 28;
const CURLE_RECV_ERROR: u16 = 56;

/// Errors returned by a call to one of the remote collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteServiceError {
    /// DNS, connection or timeout failure below HTTP.
    #[error("transport error (code {code}): {message}")]
    Transport { code: u16, message: String },

    /// The service answered with a non-2xx status.
    #[error("HTTP error (status {status}): {message}")]
    Http { status: u16, message: String },

    /// The call cannot be made yet because a prerequisite is not ready.
    #[error("not ready: {reason}")]
    NotReady { reason: String },
}

impl RemoteServiceError {
    pub fn transport(code: u16, message: impl Into<String>) -> Self {
        Self::Transport {
            code,
            message: message.into(),
        }
    }

    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }

    pub fn not_ready(reason: impl Into<String>) -> Self {
        Self::NotReady {
            reason: reason.into(),
        }
    }

    /// Whether trying the same call again later could succeed.
    ///
    /// Transport errors, 5xx, 408 and 429 are worth retrying; any other 4xx
    /// is a permanent rejection.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } | Self::NotReady { .. } => true,
            Self::Http { status, .. } => *status >= 500 || *status == 408 || *status == 429,
        }
    }
}

impl From<reqwest::Error> for RemoteServiceError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            let message = status.canonical_reason().unwrap_or("unknown status");
            return Self::http(status.as_u16(), message);
        }

        let code = if err.is_timeout() {
            CURLE_OPERATION_TIMEDOUT
        } else if err.is_connect() {
            if is_dns_failure(&err) {
                CURLE_COULDNT_RESOLVE_HOST
            } else {
                CURLE_COULDNT_CONNECT
            }
        } else {
            CURLE_RECV_ERROR
        };

        Self::transport(code, err.to_string())
    }
}

// hyper-util reports resolver failures as "dns error" somewhere in the chain.
fn is_dns_failure(err: &reqwest::Error) -> bool {
    let mut source: Option<&(dyn StdError + 'static)> = err.source();
    while let Some(inner) = source {
        let text = inner.to_string();
        if text.contains("dns error") || text.contains("failed to lookup address") {
            return true;
        }
        source = inner.source();
    }
    false
}

/// A [`RemoteServiceError`] tied to the ledger row of the attempt that failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("remote request {key} failed: {source}")]
pub struct RemoteRequestError {
    pub key: RemoteRequestKey,
    #[source]
    pub source: RemoteServiceError,
}

impl RemoteRequestError {
    pub fn new(key: RemoteRequestKey, source: RemoteServiceError) -> Self {
        Self { key, source }
    }

    /// The failure record to attach to the attempt, if this is a real failure.
    pub fn failure(&self) -> Option<RemoteRequestFailure> {
        RemoteRequestFailure::from_service_error(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::remote_request::RemoteRequestType;

    #[test]
    fn retryable_classification() {
        assert!(RemoteServiceError::transport(28, "timeout").is_retryable());
        assert!(RemoteServiceError::http(503, "Service Unavailable").is_retryable());
        assert!(RemoteServiceError::http(429, "Too Many Requests").is_retryable());
        assert!(!RemoteServiceError::http(400, "Bad Request").is_retryable());
        assert!(!RemoteServiceError::http(404, "Not Found").is_retryable());
    }

    #[test]
    fn request_error_display_carries_key() {
        let err = RemoteRequestError::new(
            RemoteRequestKey::new("job-1", RemoteRequestType::MACHINE_CREATE, 3),
            RemoteServiceError::http(500, "Internal Server Error"),
        );
        assert_eq!(
            err.to_string(),
            "remote request job-1/machine/create/3 failed: HTTP error (status 500): Internal Server Error"
        );
    }

    #[tokio::test]
    async fn http_status_error_is_classified_as_http() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = reqwest::get(server.uri())
            .await
            .unwrap()
            .error_for_status()
            .unwrap_err();

        assert_eq!(
            RemoteServiceError::from(err),
            RemoteServiceError::http(503, "Service Unavailable")
        );
    }

    #[tokio::test]
    async fn timeout_is_classified_as_network_28() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(50))
            .build()
            .unwrap();
        let err = client.get(server.uri()).send().await.unwrap_err();

        match RemoteServiceError::from(err) {
            RemoteServiceError::Transport { code, .. } => assert_eq!(code, 28),
            other => panic!("expected transport error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn refused_connection_is_classified_as_network_7() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = reqwest::get(format!("http://127.0.0.1:{port}/"))
            .await
            .unwrap_err();

        match RemoteServiceError::from(err) {
            RemoteServiceError::Transport { code, .. } => assert_eq!(code, 7),
            other => panic!("expected transport error, got {other:?}"),
        }
    }
}
