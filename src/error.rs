use thiserror::Error;

use crate::remote_request::RemoteRequestKey;

/// The result type used throughout the coordinator.
pub type Result<T> = std::result::Result<T, CoordinatorError>;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("Storage error: {message}")]
    Storage { message: String },

    /// A create-if-absent lost its race and the winning row could not be read back.
    #[error("Remote request {0} was created concurrently but could not be found")]
    LedgerConflict(RemoteRequestKey),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl CoordinatorError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Whether the caller may simply try again later.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::LedgerConflict(_) | Self::Channel(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote_request::RemoteRequestType;

    #[test]
    fn storage_error_display() {
        let err = CoordinatorError::storage("lock poisoned");
        assert_eq!(err.to_string(), "Storage error: lock poisoned");
    }

    #[test]
    fn ledger_conflict_is_transient() {
        let key = RemoteRequestKey::new("job-1", RemoteRequestType::MACHINE_CREATE, 0);
        let err = CoordinatorError::LedgerConflict(key);
        assert!(err.is_transient());
        assert_eq!(
            err.to_string(),
            "Remote request job-1/machine/create/0 was created concurrently but could not be found"
        );
        assert!(!CoordinatorError::storage("lock poisoned").is_transient());
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CoordinatorError>();
    }
}
