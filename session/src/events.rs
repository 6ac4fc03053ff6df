//! Lifecycle events published on every successful transition.

use serde::{Deserialize, Serialize};

use kyc_types::{FailureReason, KycSession, SessionId, SessionStatus, Timestamp, VerificationResult};

/// Capacity of the manager's event channel. Slow subscribers lag and skip.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEvent {
    pub session_id: SessionId,
    pub status: SessionStatus,
    pub previous: SessionStatus,
    pub at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<VerificationResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<FailureReason>,
}

impl SessionEvent {
    pub(crate) fn transition(previous: SessionStatus, session: &KycSession) -> Self {
        Self {
            session_id: session.session_id.clone(),
            status: session.status,
            previous,
            at: session.updated_at,
            result: session.result.clone(),
            failure_reason: session.failure_reason.clone(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
