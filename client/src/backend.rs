//! The HTTP API as a capture backend.

use async_trait::async_trait;

use kyc_capture::{CaptureError, HandoffBackend, VerificationOutcome};
use kyc_session::{SessionError, VerificationSubmission};
use kyc_types::{SessionId, SessionStatus};

use crate::HandoffClient;

#[async_trait]
impl HandoffBackend for HandoffClient {
    async fn authorize(&self, session_id: &SessionId) -> Result<SessionStatus, CaptureError> {
        let info = self.session_info(session_id).await?;
        match info.status {
            SessionStatus::Pending | SessionStatus::InProgress => Ok(info.status),
            SessionStatus::Expired => Err(SessionError::SessionExpired(session_id.clone()).into()),
            status @ (SessionStatus::Completed | SessionStatus::Failed) => {
                Err(SessionError::SessionNotPending {
                    session_id: session_id.clone(),
                    status,
                }
                .into())
            }
        }
    }

    async fn start(&self, session_id: &SessionId) -> Result<SessionStatus, CaptureError> {
        Ok(HandoffClient::start(self, session_id).await?.status)
    }

    async fn submit(
        &self,
        session_id: &SessionId,
        submission: VerificationSubmission,
    ) -> Result<VerificationOutcome, CaptureError> {
        let response = self.verify(session_id, &submission).await?;
        Ok(VerificationOutcome {
            status: response.status,
            result: response.result,
        })
    }

    async fn abort(&self, session_id: &SessionId, reason: &str) -> Result<SessionStatus, CaptureError> {
        Ok(HandoffClient::abort(self, session_id, reason).await?.status)
    }
}
