//! Error types for change detection

/// Change detector error
#[derive(Debug, thiserror::Error)]
pub enum DetectorError {
    /// Request could not be decoded
    #[error("invalid change request: {0}")]
    InvalidMessage(#[from] serde_json::Error),

    /// Worker task has stopped and no longer accepts requests
    #[error("change detector worker is not running")]
    WorkerUnavailable,

    /// Diff task panicked or was cancelled
    #[error("change detection task failed: {0}")]
    Panicked(String),
}

impl DetectorError {
    /// Check if resubmitting the same request could succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Panicked(_))
    }
}
