//! Error types for the PulsarConsumer operator

use thiserror::Error;

/// Errors that can occur during operator operations
#[derive(Error, Debug)]
pub enum OperatorError {
    /// Kubernetes API error, including optimistic-concurrency conflicts
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    /// Invalid or incomplete object metadata
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The PulsarConsumer spec failed validation
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// The owner reference for a managed resource could not be produced
    #[error("Failed to build owner reference: {0}")]
    OwnerReference(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// YAML serialization error
    #[error("YAML serialization error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// The invocation was cancelled before it completed
    #[error("Reconciliation cancelled")]
    Cancelled,
}

/// Result type for operator operations
pub type Result<T> = std::result::Result<T, OperatorError>;

impl OperatorError {
    /// Check if this error is retryable
    ///
    /// Spec and metadata problems are not: they need a new generation of the
    /// resource before another attempt can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OperatorError::KubeError(_) | OperatorError::SerializationError(_)
        )
    }

    /// Get a suggested requeue delay for retryable errors
    pub fn requeue_delay(&self) -> Option<std::time::Duration> {
        if self.is_retryable() {
            Some(std::time::Duration::from_secs(30))
        } else {
            None
        }
    }

    /// Whether this is an API conflict (HTTP 409) from a stale resourceVersion
    pub fn is_conflict(&self) -> bool {
        matches!(self, OperatorError::KubeError(kube::Error::Api(ae)) if ae.code == 409)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error(code: u16, reason: &str) -> OperatorError {
        OperatorError::KubeError(kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".to_string(),
            message: format!("{} error", reason),
            reason: reason.to_string(),
            code,
        }))
    }

    #[test]
    fn test_error_display() {
        let err = OperatorError::OwnerReference("PulsarConsumer orders has no uid".to_string());
        assert!(err.to_string().contains("owner reference"));
        assert!(err.to_string().contains("orders"));
    }

    #[test]
    fn test_retryable_errors() {
        assert!(api_error(500, "InternalError").is_retryable());
        assert!(api_error(409, "Conflict").is_retryable());

        assert!(!OperatorError::ValidationError("test".to_string()).is_retryable());
        assert!(!OperatorError::OwnerReference("test".to_string()).is_retryable());
        assert!(!OperatorError::Cancelled.is_retryable());
    }

    #[test]
    fn test_requeue_delay() {
        let retryable = api_error(503, "ServiceUnavailable");
        assert_eq!(
            retryable.requeue_delay(),
            Some(std::time::Duration::from_secs(30))
        );

        let not_retryable = OperatorError::InvalidConfig("test".to_string());
        assert!(not_retryable.requeue_delay().is_none());
    }

    #[test]
    fn test_conflict_detection() {
        assert!(api_error(409, "Conflict").is_conflict());
        assert!(!api_error(404, "NotFound").is_conflict());
        assert!(!OperatorError::Cancelled.is_conflict());
    }
}
