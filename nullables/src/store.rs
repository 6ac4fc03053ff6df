//! Nullable store: thread-safe in-memory session storage for testing.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use kyc_store::{CasOutcome, SessionStore, StoreError};
use kyc_types::{KycSession, SessionId, SessionStatus};

/// An in-memory session store.
///
/// The map lock is held across the read and the write of
/// `compare_and_swap`, which is what makes it atomic.
pub struct NullStore {
    sessions: Mutex<BTreeMap<SessionId, KycSession>>,
    failing: AtomicBool,
}

impl NullStore {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(BTreeMap::new()),
            failing: AtomicBool::new(false),
        }
    }

    /// Make every subsequent call fail with a backend error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Overwrite a record without any checks, for arranging test fixtures.
    pub fn put_raw(&self, session: KycSession) {
        self.sessions
            .lock()
            .unwrap()
            .insert(session.session_id.clone(), session);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("null store set to fail".into()));
        }
        Ok(())
    }
}

impl Default for NullStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore for NullStore {
    fn insert(&self, session: &KycSession) -> Result<(), StoreError> {
        self.check()?;
        let mut sessions = self.sessions.lock().unwrap();
        if sessions.contains_key(&session.session_id) {
            return Err(StoreError::Duplicate(session.session_id.to_string()));
        }
        sessions.insert(session.session_id.clone(), session.clone());
        Ok(())
    }

    fn get(&self, id: &SessionId) -> Result<Option<KycSession>, StoreError> {
        self.check()?;
        Ok(self.sessions.lock().unwrap().get(id).cloned())
    }

    fn compare_and_swap(
        &self,
        id: &SessionId,
        expected: SessionStatus,
        updated: &KycSession,
    ) -> Result<CasOutcome, StoreError> {
        self.check()?;
        let mut sessions = self.sessions.lock().unwrap();
        let current = sessions
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if current.status != expected {
            return Ok(CasOutcome::Conflict {
                current: current.clone(),
            });
        }
        *current = updated.clone();
        Ok(CasOutcome::Swapped)
    }

    fn remove(&self, id: &SessionId) -> Result<bool, StoreError> {
        self.check()?;
        Ok(self.sessions.lock().unwrap().remove(id).is_some())
    }

    fn iter_sessions(&self) -> Result<Vec<KycSession>, StoreError> {
        self.check()?;
        Ok(self.sessions.lock().unwrap().values().cloned().collect())
    }

    fn session_count(&self) -> Result<u64, StoreError> {
        self.check()?;
        Ok(self.sessions.lock().unwrap().len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kyc_types::{SubjectRef, Timestamp};

    fn session(id: &str) -> KycSession {
        KycSession::new(
            SessionId::parse(id).unwrap(),
            SubjectRef::new("APP-1").unwrap(),
            Timestamp::new(0),
            900,
        )
    }

    #[test]
    fn behaves_like_a_session_store() {
        let store = NullStore::new();
        let s = session("KYC_AAAAAAAAAAAA");
        store.insert(&s).unwrap();
        assert!(matches!(store.insert(&s), Err(StoreError::Duplicate(_))));

        let mut started = s.clone();
        started.status = SessionStatus::InProgress;
        assert_eq!(
            store
                .compare_and_swap(&s.session_id, SessionStatus::Pending, &started)
                .unwrap(),
            CasOutcome::Swapped
        );
        assert!(matches!(
            store
                .compare_and_swap(&s.session_id, SessionStatus::Pending, &started)
                .unwrap(),
            CasOutcome::Conflict { .. }
        ));
        assert!(store.remove(&s.session_id).unwrap());
        assert!(store.is_empty());
    }

    #[test]
    fn failing_mode_reports_backend_errors() {
        let store = NullStore::new();
        store.set_failing(true);
        assert!(matches!(
            store.get(&SessionId::parse("KYC_AAAAAAAAAAAA").unwrap()),
            Err(StoreError::Backend(_))
        ));
    }
}
