//! Stable error codes shared by the server and its clients.
//!
//! Codes travel in HTTP error bodies as snake_case strings so a client can
//! rebuild the typed failure without parsing human-readable messages.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    AllocationError,
    NotFound,
    SessionExpired,
    InvalidTransition,
    SessionNotPending,
    DeviceUnsupported,
    DeviceClassRejected,
    LivenessNotConfirmed,
    IncompleteCapture,
    ScorerUnavailable,
    InvalidRequest,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AllocationError => "allocation_error",
            Self::NotFound => "not_found",
            Self::SessionExpired => "session_expired",
            Self::InvalidTransition => "invalid_transition",
            Self::SessionNotPending => "session_not_pending",
            Self::DeviceUnsupported => "device_unsupported",
            Self::DeviceClassRejected => "device_class_rejected",
            Self::LivenessNotConfirmed => "liveness_not_confirmed",
            Self::IncompleteCapture => "incomplete_capture",
            Self::ScorerUnavailable => "scorer_unavailable",
            Self::InvalidRequest => "invalid_request",
            Self::Internal => "internal",
        }
    }

    /// Whether the same request may succeed if repeated on the same session.
    pub fn is_retryable_in_place(&self) -> bool {
        matches!(
            self,
            Self::LivenessNotConfirmed | Self::IncompleteCapture | Self::ScorerUnavailable
        )
    }

    /// Whether the session is unusable and the initiating device must issue a new one.
    pub fn requires_new_session(&self) -> bool {
        matches!(
            self,
            Self::NotFound | Self::SessionExpired | Self::SessionNotPending
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_matches_as_str() {
        let codes = [
            ErrorCode::AllocationError,
            ErrorCode::NotFound,
            ErrorCode::SessionExpired,
            ErrorCode::InvalidTransition,
            ErrorCode::SessionNotPending,
            ErrorCode::DeviceUnsupported,
            ErrorCode::DeviceClassRejected,
            ErrorCode::LivenessNotConfirmed,
            ErrorCode::IncompleteCapture,
            ErrorCode::ScorerUnavailable,
            ErrorCode::InvalidRequest,
            ErrorCode::Internal,
        ];
        for code in codes {
            let json = serde_json::to_string(&code).unwrap();
            assert_eq!(json, format!("\"{}\"", code.as_str()));
        }
    }
}
