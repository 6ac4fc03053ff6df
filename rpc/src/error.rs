//! RPC error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use tracing::error;

use kyc_session::SessionError;
use kyc_types::ErrorCode;

use crate::handlers::ErrorBody;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("server error: {0}")]
    Server(String),
}

impl RpcError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Session(e) => e.code(),
            Self::InvalidRequest(_) => ErrorCode::InvalidRequest,
            Self::Server(_) => ErrorCode::Internal,
        }
    }

    /// HTTP status for this error.
    pub fn status_code(&self) -> StatusCode {
        match self.code() {
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::SessionExpired => StatusCode::GONE,
            ErrorCode::InvalidTransition | ErrorCode::SessionNotPending => StatusCode::CONFLICT,
            ErrorCode::DeviceClassRejected | ErrorCode::DeviceUnsupported => StatusCode::FORBIDDEN,
            ErrorCode::LivenessNotConfirmed | ErrorCode::IncompleteCapture => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ErrorCode::ScorerUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::InvalidRequest => StatusCode::BAD_REQUEST,
            ErrorCode::AllocationError | ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            Self::Session(e) => e.user_message(),
            Self::InvalidRequest(detail) => detail.clone(),
            Self::Server(_) => "Something went wrong on our side. Please try again.".to_string(),
        }
    }
}

impl IntoResponse for RpcError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
            error!(error = %self, "request failed");
        }
        let body = ErrorBody {
            error: self.code(),
            message: self.message(),
        };
        (status, Json(body)).into_response()
    }
}
