use thiserror::Error;

use kyc_session::SessionError;
use kyc_types::ErrorCode;

use crate::CaptureStep;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("device unsupported: {0}")]
    DeviceUnsupported(String),

    #[error("camera permission denied")]
    CameraDenied,

    #[error("camera is in use by another capture step")]
    CameraBusy,

    #[error("camera failure: {0}")]
    Camera(String),

    #[error("step {requested} called while the flow is at {current}")]
    OutOfOrder {
        current: CaptureStep,
        requested: CaptureStep,
    },

    #[error("liveness was not confirmed")]
    LivenessNotConfirmed,

    #[error("incomplete capture: {0}")]
    IncompleteCapture(String),

    #[error("step {0} timed out")]
    StepTimedOut(CaptureStep),

    #[error("capture cancelled")]
    Cancelled,

    #[error("could not reach the verification service: {0}")]
    Transport(String),

    #[error("{code}: {message}")]
    Backend { code: ErrorCode, message: String },
}

impl CaptureError {
    pub fn backend(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Backend {
            code,
            message: message.into(),
        }
    }

    /// The wire code closest to this error, where one exists.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::DeviceUnsupported(_) | Self::CameraDenied => Some(ErrorCode::DeviceUnsupported),
            Self::LivenessNotConfirmed => Some(ErrorCode::LivenessNotConfirmed),
            Self::IncompleteCapture(_) => Some(ErrorCode::IncompleteCapture),
            Self::Backend { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Whether the failed step may simply be called again.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::CameraBusy
            | Self::Camera(_)
            | Self::LivenessNotConfirmed
            | Self::IncompleteCapture(_)
            | Self::StepTimedOut(_)
            | Self::Transport(_)
            | Self::OutOfOrder { .. } => true,
            Self::Backend { code, .. } => code.is_retryable_in_place(),
            Self::DeviceUnsupported(_) | Self::CameraDenied | Self::Cancelled => false,
        }
    }

    /// Whether the session itself has already ended, so there is nothing to
    /// abort on the server.
    pub fn session_already_closed(&self) -> bool {
        matches!(self, Self::Backend { code, .. } if code.requires_new_session())
    }
}

impl From<SessionError> for CaptureError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::LivenessNotConfirmed => Self::LivenessNotConfirmed,
            SessionError::IncompleteCapture(what) => Self::IncompleteCapture(what),
            other => Self::Backend {
                code: other.code(),
                message: other.user_message(),
            },
        }
    }
}
