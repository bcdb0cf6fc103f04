use std::fmt;

use serde::{Deserialize, Serialize};

use super::RemoteServiceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureType {
    Network,
    Http,
}

/// Why an attempt failed, as reported in the job status payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRequestFailure {
    #[serde(rename = "type")]
    pub failure_type: FailureType,
    /// curl error code for network failures, HTTP status for http failures.
    pub code: u16,
    pub message: Option<String>,
}

impl RemoteRequestFailure {
    pub fn network(code: u16, message: Option<String>) -> Self {
        Self {
            failure_type: FailureType::Network,
            code,
            message,
        }
    }

    pub fn http(status: u16, message: Option<String>) -> Self {
        Self {
            failure_type: FailureType::Http,
            code: status,
            message,
        }
    }

    /// Classifies a remote error. Readiness gates are not failures.
    pub fn from_service_error(err: &RemoteServiceError) -> Option<Self> {
        match err {
            RemoteServiceError::Transport { code, message } => {
                Some(Self::network(*code, non_empty(message)))
            }
            RemoteServiceError::Http { status, message } => {
                Some(Self::http(*status, non_empty(message)))
            }
            RemoteServiceError::NotReady { .. } => None,
        }
    }
}

fn non_empty(message: &str) -> Option<String> {
    (!message.is_empty()).then(|| message.to_string())
}

impl fmt::Display for RemoteRequestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.failure_type {
            FailureType::Network => "network",
            FailureType::Http => "http",
        };
        match &self.message {
            Some(message) => write!(f, "{kind}/{}: {message}", self.code),
            None => write!(f, "{kind}/{}", self.code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_transport_as_network() {
        let failure = RemoteRequestFailure::from_service_error(&RemoteServiceError::transport(
            6,
            "could not resolve host",
        ))
        .unwrap();
        assert_eq!(failure.failure_type, FailureType::Network);
        assert_eq!(failure.code, 6);
        assert_eq!(failure.message.as_deref(), Some("could not resolve host"));
    }

    #[test]
    fn classifies_status_as_http() {
        let failure =
            RemoteRequestFailure::from_service_error(&RemoteServiceError::http(503, "")).unwrap();
        assert_eq!(failure, RemoteRequestFailure::http(503, None));
        assert_eq!(failure.to_string(), "http/503");
    }

    #[test]
    fn not_ready_is_not_a_failure() {
        assert!(
            RemoteRequestFailure::from_service_error(&RemoteServiceError::not_ready("no ip"))
                .is_none()
        );
    }

    #[test]
    fn serializes_with_type_field() {
        let failure = RemoteRequestFailure::network(28, Some("timed out".into()));
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "network", "code": 28, "message": "timed out"})
        );
    }
}
