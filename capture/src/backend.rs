//! What the capture flow needs from the lifecycle service.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use kyc_session::{SessionGuard, SessionManager, VerificationScorer, VerificationSubmission};
use kyc_types::{DeviceClass, SessionId, SessionStatus, VerificationResult};

use crate::CaptureError;

/// The session status after a verification submission.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VerificationOutcome {
    pub status: SessionStatus,
    pub result: Option<VerificationResult>,
}

#[async_trait]
pub trait HandoffBackend: Send + Sync {
    /// Ask the guard whether this device may act on the session.
    async fn authorize(&self, session_id: &SessionId) -> Result<SessionStatus, CaptureError>;

    async fn start(&self, session_id: &SessionId) -> Result<SessionStatus, CaptureError>;

    async fn submit(
        &self,
        session_id: &SessionId,
        submission: VerificationSubmission,
    ) -> Result<VerificationOutcome, CaptureError>;

    async fn abort(&self, session_id: &SessionId, reason: &str) -> Result<SessionStatus, CaptureError>;
}

/// Drives an in-process [`SessionManager`] as a device of class `device`.
pub struct LocalBackend {
    manager: SessionManager,
    guard: SessionGuard,
    scorer: Arc<dyn VerificationScorer>,
    device: DeviceClass,
}

impl LocalBackend {
    pub fn new(
        manager: SessionManager,
        guard: SessionGuard,
        scorer: Arc<dyn VerificationScorer>,
        device: DeviceClass,
    ) -> Self {
        Self {
            manager,
            guard,
            scorer,
            device,
        }
    }
}

#[async_trait]
impl HandoffBackend for LocalBackend {
    async fn authorize(&self, session_id: &SessionId) -> Result<SessionStatus, CaptureError> {
        Ok(self.guard.authorize(session_id, self.device)?.status)
    }

    async fn start(&self, session_id: &SessionId) -> Result<SessionStatus, CaptureError> {
        Ok(self.manager.start(session_id)?.status)
    }

    async fn submit(
        &self,
        session_id: &SessionId,
        submission: VerificationSubmission,
    ) -> Result<VerificationOutcome, CaptureError> {
        let session = self
            .manager
            .verify(session_id, submission, self.scorer.as_ref())
            .await?;
        Ok(VerificationOutcome {
            status: session.status,
            result: session.result,
        })
    }

    async fn abort(&self, session_id: &SessionId, reason: &str) -> Result<SessionStatus, CaptureError> {
        Ok(self.manager.abort(session_id, reason)?.status)
    }
}
