use thiserror::Error;

use crate::common::error::BatchError::GenericError;

/// Remote error code of a job that does not exist (anymore).
pub const JOB_NOT_FOUND: &str = "JobNotFound";
pub const POOL_NOT_FOUND: &str = "PoolNotFound";
/// Resize error code reported when the account has no free cores left.
pub const ACCOUNT_CORE_QUOTA_REACHED: &str = "AccountCoreQuotaReached";

#[derive(Debug, Error)]
pub enum BatchError {
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error("Remote error ({code}): {message}")]
    RemoteError { code: String, message: String },
    #[error("Timed out waiting for {what} of {resource} after {elapsed_minutes} minutes")]
    Timeout {
        what: String,
        resource: String,
        elapsed_minutes: u64,
    },
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    #[error("Allocation error: {0}")]
    AllocationError(String),
    #[error("Operation was cancelled: {0}")]
    Cancelled(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Deserialization error: {0}")]
    DeserializationError(String),
    #[error("Error: {0}")]
    GenericError(String),
}

impl BatchError {
    pub fn remote(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RemoteError {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn remote_code(&self) -> Option<&str> {
        match self {
            Self::RemoteError { code, .. } => Some(code.as_str()),
            _ => None,
        }
    }

    /// Returns true if the remote side reported that the requested job or pool does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self.remote_code(), Some(JOB_NOT_FOUND | POOL_NOT_FOUND))
    }

    /// Cancellation has to be propagated immediately, even from otherwise best-effort
    /// operations.
    pub fn is_cancellation(&self) -> bool {
        match self {
            Self::Cancelled(_) => true,
            Self::IoError(error) => error.kind() == std::io::ErrorKind::Interrupted,
            _ => false,
        }
    }
}

impl From<serde_json::error::Error> for BatchError {
    fn from(e: serde_json::error::Error) -> Self {
        Self::SerializationError(e.to_string())
    }
}

impl From<anyhow::Error> for BatchError {
    fn from(error: anyhow::Error) -> Self {
        Self::GenericError(error.to_string())
    }
}

impl From<toml::de::Error> for BatchError {
    fn from(error: toml::de::Error) -> Self {
        Self::DeserializationError(error.to_string())
    }
}

impl From<String> for BatchError {
    fn from(e: String) -> Self {
        GenericError(e)
    }
}

#[cfg(test)]
mod tests {
    use crate::common::error::{BatchError, JOB_NOT_FOUND};

    #[test]
    fn not_found_job() {
        assert!(BatchError::remote(JOB_NOT_FOUND, "The specified job does not exist.").is_not_found());
        assert!(BatchError::remote("PoolNotFound", "").is_not_found());
    }

    #[test]
    fn other_remote_error_is_not_not_found() {
        let error = BatchError::remote("OperationTimedOut", "timeout");
        assert!(!error.is_not_found());
        assert!(!error.is_cancellation());
    }

    #[test]
    fn cancellation_kinds() {
        assert!(BatchError::Cancelled("ctrl-c".into()).is_cancellation());
        let error: BatchError =
            std::io::Error::new(std::io::ErrorKind::Interrupted, "interrupted").into();
        assert!(error.is_cancellation());
        let error: BatchError = std::io::Error::other("broken").into();
        assert!(!error.is_cancellation());
    }

    #[test]
    fn timeout_message() {
        let error = BatchError::Timeout {
            what: "steady state".to_string(),
            resource: "pool p1".to_string(),
            elapsed_minutes: 15,
        };
        assert_eq!(
            error.to_string(),
            "Timed out waiting for steady state of pool p1 after 15 minutes"
        );
    }
}
