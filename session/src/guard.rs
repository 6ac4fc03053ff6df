//! Admission of a completing device to a session.

use serde::{Deserialize, Serialize};
use tracing::warn;

use kyc_types::{DeviceClass, KycSession, SessionId, SessionStatus};

use crate::{SessionError, SessionManager};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardPolicy {
    /// Reject every device that does not classify as mobile. Turning this off
    /// is meant for local development only.
    pub require_mobile_device: bool,
}

impl Default for GuardPolicy {
    fn default() -> Self {
        Self {
            require_mobile_device: true,
        }
    }
}

/// Consulted before every capture step.
#[derive(Clone)]
pub struct SessionGuard {
    manager: SessionManager,
    policy: GuardPolicy,
}

impl SessionGuard {
    pub fn new(manager: SessionManager, policy: GuardPolicy) -> Self {
        Self { manager, policy }
    }

    pub fn policy(&self) -> GuardPolicy {
        self.policy
    }

    /// The device half of [`authorize`](Self::authorize), for reads that
    /// must still show an expired or finished session.
    pub fn check_device(&self, device: DeviceClass) -> Result<(), SessionError> {
        if self.policy.require_mobile_device && !device.is_mobile() {
            return Err(SessionError::DeviceClassRejected(device));
        }
        Ok(())
    }

    /// Admit `device` to `session_id`, or say why not.
    ///
    /// The device check runs first so a desktop browser learns it is in the
    /// wrong place even for a stale link. The session read applies lazy
    /// expiry.
    pub fn authorize(
        &self,
        session_id: &SessionId,
        device: DeviceClass,
    ) -> Result<KycSession, SessionError> {
        self.check_device(device).map_err(|e| {
            warn!(session = %session_id, %device, "device class rejected");
            e
        })?;

        let session = self.manager.get_status(session_id)?;
        match session.status {
            SessionStatus::Pending | SessionStatus::InProgress => Ok(session),
            SessionStatus::Expired => Err(SessionError::SessionExpired(session_id.clone())),
            SessionStatus::Completed | SessionStatus::Failed => {
                Err(SessionError::SessionNotPending {
                    session_id: session_id.clone(),
                    status: session.status,
                })
            }
        }
    }
}
