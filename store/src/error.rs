use thiserror::Error;

/// Failures every session store reports the same way.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No record under this session id.
    #[error("no stored session: {0}")]
    NotFound(String),

    /// Insert refused because the id is taken.
    #[error("session id already stored: {0}")]
    Duplicate(String),

    #[error("storage backend error: {0}")]
    Backend(String),

    /// A stored record could not be encoded or decoded.
    #[error("session record encoding error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Whether the failure is the backend's, as opposed to a lookup or
    /// uniqueness outcome the caller is expected to handle.
    pub fn is_backend_failure(&self) -> bool {
        matches!(self, Self::Backend(_) | Self::Serialization(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_outcomes_are_not_backend_failures() {
        assert!(!StoreError::NotFound("KYC_1".into()).is_backend_failure());
        assert!(!StoreError::Duplicate("KYC_1".into()).is_backend_failure());
        assert!(StoreError::Backend("disk full".into()).is_backend_failure());
        assert!(StoreError::Serialization("truncated".into()).is_backend_failure());
    }
}
