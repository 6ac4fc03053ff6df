//! LMDB implementation of SessionStore.
//!
//! LMDB allows a single write transaction at a time, so reading the current
//! record and writing its replacement inside one write transaction makes
//! `compare_and_swap` atomic across threads.

use std::sync::Arc;

use heed::types::{Bytes, Str};
use heed::{Database, Env, RoTxn};
use tracing::debug;

use kyc_store::{CasOutcome, SessionStore, StoreError};
use kyc_types::{KycSession, SessionId, SessionStatus};

use crate::LmdbError;

pub struct LmdbSessionStore {
    pub(crate) env: Arc<Env>,
    pub(crate) sessions_db: Database<Str, Bytes>,
}

fn encode(session: &KycSession) -> Result<Vec<u8>, LmdbError> {
    Ok(bincode::serialize(session)?)
}

fn decode(bytes: &[u8]) -> Result<KycSession, LmdbError> {
    Ok(bincode::deserialize(bytes)?)
}

impl LmdbSessionStore {
    fn read(&self, txn: &RoTxn, id: &SessionId) -> Result<Option<KycSession>, LmdbError> {
        match self.sessions_db.get(txn, id.as_str())? {
            Some(bytes) => Ok(Some(decode(bytes)?)),
            None => Ok(None),
        }
    }
}

impl SessionStore for LmdbSessionStore {
    fn insert(&self, session: &KycSession) -> Result<(), StoreError> {
        let key = session.session_id.as_str();
        let value = encode(session)?;
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        let exists = self
            .sessions_db
            .get(&wtxn, key)
            .map_err(LmdbError::from)?
            .is_some();
        if exists {
            return Err(StoreError::Duplicate(key.to_string()));
        }
        self.sessions_db
            .put(&mut wtxn, key, &value)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn get(&self, id: &SessionId) -> Result<Option<KycSession>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        Ok(self.read(&rtxn, id)?)
    }

    fn compare_and_swap(
        &self,
        id: &SessionId,
        expected: SessionStatus,
        updated: &KycSession,
    ) -> Result<CasOutcome, StoreError> {
        let value = encode(updated)?;
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        let current = self
            .read(&wtxn, id)?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if current.status != expected {
            debug!(session = %id, %expected, actual = %current.status, "CAS conflict");
            return Ok(CasOutcome::Conflict { current });
        }
        self.sessions_db
            .put(&mut wtxn, id.as_str(), &value)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(CasOutcome::Swapped)
    }

    fn remove(&self, id: &SessionId) -> Result<bool, StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        let existed = self
            .sessions_db
            .delete(&mut wtxn, id.as_str())
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(existed)
    }

    fn iter_sessions(&self) -> Result<Vec<KycSession>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let iter = self.sessions_db.iter(&rtxn).map_err(LmdbError::from)?;
        let mut sessions = Vec::new();
        for entry in iter {
            let (_key, bytes) = entry.map_err(LmdbError::from)?;
            sessions.push(decode(bytes)?);
        }
        Ok(sessions)
    }

    fn session_count(&self) -> Result<u64, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        Ok(self.sessions_db.len(&rtxn).map_err(LmdbError::from)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LmdbEnvironment;
    use kyc_types::{SubjectRef, Timestamp};

    fn temp_env() -> (tempfile::TempDir, LmdbEnvironment) {
        let dir = tempfile::tempdir().expect("temp dir");
        let env = LmdbEnvironment::open(dir.path(), 4, 16 * 1024 * 1024).expect("open env");
        (dir, env)
    }

    fn session(id: &str) -> KycSession {
        KycSession::new(
            SessionId::parse(id).unwrap(),
            SubjectRef::new("APP-7").unwrap(),
            Timestamp::new(1_000),
            900,
        )
    }

    #[test]
    fn insert_then_get() {
        let (_dir, env) = temp_env();
        let store = env.session_store();
        let s = session("KYC_AAAAAAAAAAAA");
        store.insert(&s).unwrap();
        assert_eq!(store.get(&s.session_id).unwrap(), Some(s));
        assert_eq!(store.session_count().unwrap(), 1);
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let (_dir, env) = temp_env();
        let store = env.session_store();
        let s = session("KYC_AAAAAAAAAAAA");
        store.insert(&s).unwrap();
        let err = store.insert(&s).unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
    }

    #[test]
    fn cas_only_swaps_on_matching_status() {
        let (_dir, env) = temp_env();
        let store = env.session_store();
        let s = session("KYC_BBBBBBBBBBBB");
        store.insert(&s).unwrap();

        let mut started = s.clone();
        started.status = SessionStatus::InProgress;
        assert_eq!(
            store
                .compare_and_swap(&s.session_id, SessionStatus::Pending, &started)
                .unwrap(),
            CasOutcome::Swapped
        );

        let outcome = store
            .compare_and_swap(&s.session_id, SessionStatus::Pending, &started)
            .unwrap();
        match outcome {
            CasOutcome::Conflict { current } => assert_eq!(current.status, SessionStatus::InProgress),
            CasOutcome::Swapped => panic!("second CAS must conflict"),
        }
    }

    #[test]
    fn cas_on_unknown_id_is_not_found() {
        let (_dir, env) = temp_env();
        let store = env.session_store();
        let s = session("KYC_CCCCCCCCCCCC");
        let err = store
            .compare_and_swap(&s.session_id, SessionStatus::Pending, &s)
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn remove_and_iterate() {
        let (_dir, env) = temp_env();
        let store = env.session_store();
        store.insert(&session("KYC_AAAAAAAAAAAA")).unwrap();
        store.insert(&session("KYC_BBBBBBBBBBBB")).unwrap();

        let ids: Vec<String> = store
            .iter_sessions()
            .unwrap()
            .into_iter()
            .map(|s| s.session_id.to_string())
            .collect();
        assert_eq!(ids, vec!["KYC_AAAAAAAAAAAA", "KYC_BBBBBBBBBBBB"]);

        assert!(store.remove(&SessionId::parse("KYC_AAAAAAAAAAAA").unwrap()).unwrap());
        assert!(!store.remove(&SessionId::parse("KYC_AAAAAAAAAAAA").unwrap()).unwrap());
        assert_eq!(store.session_count().unwrap(), 1);
    }

    #[test]
    fn sessions_survive_reopen() {
        let dir = tempfile::tempdir().expect("temp dir");
        let s = session("KYC_DDDDDDDDDDDD");
        {
            let env = LmdbEnvironment::open(dir.path(), 4, 16 * 1024 * 1024).unwrap();
            env.session_store().insert(&s).unwrap();
        }
        let env = LmdbEnvironment::open(dir.path(), 4, 16 * 1024 * 1024).unwrap();
        assert_eq!(env.session_store().get(&s.session_id).unwrap(), Some(s));
    }
}
