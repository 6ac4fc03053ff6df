use thiserror::Error;

use kyc_capture::CaptureError;
use kyc_session::SessionError;
use kyc_types::ErrorCode;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out")]
    Timeout,

    /// The server answered with a typed error body.
    #[error("{code}: {message}")]
    Api { code: ErrorCode, message: String },

    #[error("unexpected HTTP {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("could not decode response: {0}")]
    Decode(String),

    #[error("invalid base URL: {0}")]
    InvalidUrl(String),
}

impl ClientError {
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Api { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Whether repeating the same request later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout => true,
            Self::UnexpectedStatus { status, .. } => *status >= 500,
            Self::Api { code, .. } => matches!(
                code,
                ErrorCode::Internal | ErrorCode::ScorerUnavailable | ErrorCode::AllocationError
            ),
            Self::Decode(_) | Self::InvalidUrl(_) => false,
        }
    }

    /// Whether the session can no longer be read.
    pub fn session_gone(&self) -> bool {
        matches!(
            self.code(),
            Some(ErrorCode::NotFound | ErrorCode::SessionExpired)
        )
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

/// Lets an in-process manager stand in for the HTTP API.
impl From<SessionError> for ClientError {
    fn from(e: SessionError) -> Self {
        Self::Api {
            code: e.code(),
            message: e.user_message(),
        }
    }
}

impl From<ClientError> for CaptureError {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::Api {
                code: ErrorCode::LivenessNotConfirmed,
                ..
            } => CaptureError::LivenessNotConfirmed,
            ClientError::Api {
                code: ErrorCode::IncompleteCapture,
                message,
            } => CaptureError::IncompleteCapture(message),
            ClientError::Api { code, message } => CaptureError::backend(code, message),
            ClientError::Transport(detail) => CaptureError::Transport(detail),
            ClientError::Timeout => CaptureError::Transport("request timed out".into()),
            other => CaptureError::backend(ErrorCode::Internal, other.to_string()),
        }
    }
}
