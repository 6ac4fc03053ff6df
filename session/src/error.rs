use thiserror::Error;

use kyc_store::StoreError;
use kyc_types::{DeviceClass, ErrorCode, SessionId, SessionStatus};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("could not allocate a session id: {0}")]
    AllocationError(String),

    #[error("session {0} not found")]
    NotFound(SessionId),

    #[error("session {0} has expired")]
    SessionExpired(SessionId),

    #[error("session {session_id}: cannot move {from} -> {to}, current status is {current}")]
    InvalidTransition {
        session_id: SessionId,
        from: SessionStatus,
        to: SessionStatus,
        current: SessionStatus,
    },

    #[error("session {session_id} is already {status}")]
    SessionNotPending {
        session_id: SessionId,
        status: SessionStatus,
    },

    #[error("device class {0} may not complete this verification")]
    DeviceClassRejected(DeviceClass),

    #[error("liveness was not confirmed")]
    LivenessNotConfirmed,

    #[error("incomplete capture: {0}")]
    IncompleteCapture(String),

    #[error("verification scorer unavailable: {0}")]
    ScorerUnavailable(String),

    #[error("invalid locator: {0}")]
    InvalidLocator(String),

    #[error("invalid transition payload: {0}")]
    InvalidPayload(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl SessionError {
    /// The stable wire code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::AllocationError(_) => ErrorCode::AllocationError,
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::SessionExpired(_) => ErrorCode::SessionExpired,
            Self::InvalidTransition { .. } => ErrorCode::InvalidTransition,
            Self::SessionNotPending { .. } => ErrorCode::SessionNotPending,
            Self::DeviceClassRejected(_) => ErrorCode::DeviceClassRejected,
            Self::LivenessNotConfirmed => ErrorCode::LivenessNotConfirmed,
            Self::IncompleteCapture(_) => ErrorCode::IncompleteCapture,
            Self::ScorerUnavailable(_) => ErrorCode::ScorerUnavailable,
            Self::InvalidLocator(_) | Self::InvalidPayload(_) => ErrorCode::InvalidRequest,
            Self::Store(_) => ErrorCode::Internal,
        }
    }

    /// Message shown to the person holding the device.
    pub fn user_message(&self) -> String {
        match self {
            Self::AllocationError(_) | Self::Store(_) => {
                "Something went wrong on our side. Please try again.".to_string()
            }
            Self::NotFound(_) => {
                "Session not found or expired. Please generate a new QR code.".to_string()
            }
            Self::SessionExpired(_) => {
                "This verification session has expired. Please request a new one.".to_string()
            }
            Self::InvalidTransition { current, .. } => format!(
                "This verification session is already {}. It cannot be started again.",
                human_status(*current)
            ),
            Self::SessionNotPending { status, .. } => format!(
                "This verification session is already {}. Please request a new one.",
                human_status(*status)
            ),
            Self::DeviceClassRejected(_) => "KYC verification must be completed on a mobile \
                device. Laptop/desktop cameras are not permitted for biometric verification. \
                Please open this link on your smartphone or tablet."
                .to_string(),
            Self::LivenessNotConfirmed => {
                "We could not confirm a live face. Please look at the camera, blink naturally \
                 and try again."
                    .to_string()
            }
            Self::IncompleteCapture(what) => {
                format!("Missing required capture: {what}. Please complete all capture steps.")
            }
            Self::ScorerUnavailable(_) => {
                "Verification is temporarily unavailable. Please try again in a moment."
                    .to_string()
            }
            Self::InvalidLocator(_) | Self::InvalidPayload(_) => {
                "The request was not valid.".to_string()
            }
        }
    }
}

fn human_status(status: SessionStatus) -> &'static str {
    match status {
        SessionStatus::Pending => "waiting to start",
        SessionStatus::InProgress => "in progress",
        SessionStatus::Completed => "completed",
        SessionStatus::Expired => "expired",
        SessionStatus::Failed => "closed",
    }
}
