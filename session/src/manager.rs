//! The session lifecycle manager.
//!
//! Every status change goes through [`SessionStore::compare_and_swap`], so two
//! callers racing on the same edge cannot both win. Expiry is observed lazily:
//! any read or write that finds a non-terminal session past its `expires_at`
//! first moves it to `Expired`.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use kyc_store::{CasOutcome, SessionStore, StoreError};
use kyc_types::{
    Clock, FailureReason, IdGenerator, KycSession, OsIdGenerator, SessionId, SessionParams,
    SessionStatus, SubjectRef, SystemClock, Timestamp, VerificationResult,
};

use crate::events::{SessionEvent, EVENT_CHANNEL_CAPACITY};
use crate::scorer::VerificationScorer;
use crate::submission::VerificationSubmission;
use crate::sweep::SweepReport;
use crate::SessionError;

/// Data attached to a session by a transition.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TransitionPayload {
    pub result: Option<VerificationResult>,
    pub failure_reason: Option<FailureReason>,
}

impl TransitionPayload {
    pub fn completed(result: VerificationResult) -> Self {
        Self {
            result: Some(result),
            failure_reason: None,
        }
    }

    pub fn rejected(result: VerificationResult) -> Self {
        Self {
            result: Some(result),
            failure_reason: Some(FailureReason::VerificationRejected),
        }
    }

    pub fn aborted(reason: impl Into<String>) -> Self {
        Self {
            result: None,
            failure_reason: Some(FailureReason::Aborted(reason.into())),
        }
    }

    fn validate_for(&self, to: SessionStatus) -> Result<(), SessionError> {
        match (&self.failure_reason, to) {
            (None, SessionStatus::Failed) => {
                return Err(SessionError::InvalidPayload(
                    "a failed session needs a failure reason".into(),
                ))
            }
            (Some(_), status) if status != SessionStatus::Failed => {
                return Err(SessionError::InvalidPayload(format!(
                    "failure reason given for a move to {status}"
                )))
            }
            _ => {}
        }
        if let Some(result) = &self.result {
            if !matches!(to, SessionStatus::Completed | SessionStatus::Failed) {
                return Err(SessionError::InvalidPayload(format!(
                    "result given for a move to {to}"
                )));
            }
            if !result.has_valid_confidence() {
                return Err(SessionError::InvalidPayload(format!(
                    "confidence {} is outside [0, 100]",
                    result.confidence
                )));
            }
        }
        if to == SessionStatus::Completed && self.result.is_none() {
            return Err(SessionError::InvalidPayload(
                "a completed session needs a verification result".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    params: SessionParams,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>, params: SessionParams) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            store,
            clock: Arc::new(SystemClock),
            ids: Arc::new(OsIdGenerator),
            params,
            events,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn params(&self) -> SessionParams {
        self.params
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Receive every successful transition from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn session_count(&self) -> Result<u64, SessionError> {
        Ok(self.store.session_count()?)
    }

    /// Allocate a new `Pending` session for `subject_ref`.
    pub fn create_session(&self, subject_ref: SubjectRef) -> Result<KycSession, SessionError> {
        let session_id = self
            .ids
            .next_id()
            .map_err(|e| SessionError::AllocationError(e.to_string()))?;
        let session = KycSession::new(session_id, subject_ref, self.now(), self.params.ttl_secs);

        match self.store.insert(&session) {
            Ok(()) => {}
            Err(StoreError::Duplicate(id)) => {
                warn!(session = %id, "session id collision");
                return Err(SessionError::AllocationError(format!(
                    "session id {id} is already in use"
                )));
            }
            Err(e) => return Err(e.into()),
        }

        info!(
            session = %session.session_id,
            subject = %session.subject_ref,
            expires_at = session.expires_at.as_secs(),
            "session created"
        );
        Ok(session)
    }

    /// Read a session, expiring it first if its TTL has elapsed.
    pub fn get_status(&self, session_id: &SessionId) -> Result<KycSession, SessionError> {
        let session = self.load(session_id)?;
        let now = self.now();
        if session.needs_expiry(now) {
            return self.expire(session, now);
        }
        Ok(session)
    }

    /// Move a session from `from` to `to` as one compare-and-swap.
    ///
    /// Expiry cannot be requested here; it is applied from the clock only.
    pub fn transition(
        &self,
        session_id: &SessionId,
        from: SessionStatus,
        to: SessionStatus,
        payload: TransitionPayload,
    ) -> Result<KycSession, SessionError> {
        let session = self.load(session_id)?;
        let now = self.now();

        if session.needs_expiry(now) {
            self.expire(session, now)?;
            return Err(SessionError::SessionExpired(session_id.clone()));
        }
        if session.status == SessionStatus::Expired {
            return Err(SessionError::SessionExpired(session_id.clone()));
        }
        if session.status != from || to == SessionStatus::Expired || !from.can_transition_to(to) {
            warn!(session = %session_id, %from, %to, current = %session.status, "rejected transition");
            return Err(SessionError::InvalidTransition {
                session_id: session_id.clone(),
                from,
                to,
                current: session.status,
            });
        }
        payload.validate_for(to)?;

        let mut updated = session;
        updated.status = to;
        updated.updated_at = now;
        updated.result = payload.result;
        updated.failure_reason = payload.failure_reason;

        match self.cas(session_id, from, &updated)? {
            CasOutcome::Swapped => {
                info!(session = %session_id, %from, %to, "session transition");
                self.publish(SessionEvent::transition(from, &updated));
                Ok(updated)
            }
            CasOutcome::Conflict { current } => {
                warn!(session = %session_id, %from, %to, current = %current.status, "lost transition race");
                if current.status == SessionStatus::Expired || current.needs_expiry(now) {
                    Err(SessionError::SessionExpired(session_id.clone()))
                } else {
                    Err(SessionError::InvalidTransition {
                        session_id: session_id.clone(),
                        from,
                        to,
                        current: current.status,
                    })
                }
            }
        }
    }

    /// `Pending → InProgress`. Succeeds once per session.
    pub fn start(&self, session_id: &SessionId) -> Result<KycSession, SessionError> {
        self.transition(
            session_id,
            SessionStatus::Pending,
            SessionStatus::InProgress,
            TransitionPayload::default(),
        )
    }

    /// Score a submission and record the verdict.
    ///
    /// The submission is checked before the scorer is contacted. A scorer
    /// failure leaves the session `InProgress` so the device may retry.
    pub async fn verify(
        &self,
        session_id: &SessionId,
        submission: VerificationSubmission,
        scorer: &dyn VerificationScorer,
    ) -> Result<KycSession, SessionError> {
        let session = self.get_status(session_id)?;
        match session.status {
            SessionStatus::InProgress => {}
            SessionStatus::Expired => return Err(SessionError::SessionExpired(session_id.clone())),
            SessionStatus::Completed | SessionStatus::Failed => {
                return Err(SessionError::SessionNotPending {
                    session_id: session_id.clone(),
                    status: session.status,
                })
            }
            SessionStatus::Pending => {
                return Err(SessionError::InvalidTransition {
                    session_id: session_id.clone(),
                    from: SessionStatus::InProgress,
                    to: SessionStatus::Completed,
                    current: SessionStatus::Pending,
                })
            }
        }

        let request = submission.into_scoring_request(session_id.clone())?;
        debug!(session = %session_id, scorer = scorer.name(), "scoring submission");
        let result = scorer.score(request).await.map_err(|e| {
            warn!(session = %session_id, scorer = scorer.name(), error = %e, "scorer failed");
            SessionError::ScorerUnavailable(e.to_string())
        })?;
        if !result.has_valid_confidence() {
            warn!(session = %session_id, confidence = result.confidence, "scorer returned out-of-range confidence");
            return Err(SessionError::ScorerUnavailable(format!(
                "confidence {} is outside [0, 100]",
                result.confidence
            )));
        }

        let (to, payload) = if result.verified {
            (SessionStatus::Completed, TransitionPayload::completed(result))
        } else {
            (SessionStatus::Failed, TransitionPayload::rejected(result))
        };
        self.transition(session_id, SessionStatus::InProgress, to, payload)
    }

    /// Abandon a started capture. Sessions that never started, or have
    /// already ended, are returned unchanged.
    pub fn abort(&self, session_id: &SessionId, reason: &str) -> Result<KycSession, SessionError> {
        let session = self.get_status(session_id)?;
        if session.status != SessionStatus::InProgress {
            debug!(session = %session_id, status = %session.status, "abort ignored");
            return Ok(session);
        }
        self.transition(
            session_id,
            SessionStatus::InProgress,
            SessionStatus::Failed,
            TransitionPayload::aborted(reason),
        )
    }

    /// Expire overdue sessions and drop ended ones past the grace period.
    pub fn sweep(&self) -> Result<SweepReport, SessionError> {
        let now = self.now();
        let mut report = SweepReport::default();

        for session in self.store.iter_sessions()? {
            let session_id = session.session_id.clone();
            let session = if session.needs_expiry(now) {
                match self.expire(session, now) {
                    Ok(expired) => {
                        report.expired += 1;
                        expired
                    }
                    Err(SessionError::NotFound(_)) => continue,
                    Err(e) => return Err(e),
                }
            } else {
                session
            };

            let last_touched = session.updated_at.max(session.expires_at);
            if session.status.is_terminal()
                && last_touched.plus_secs(self.params.gc_grace_secs).is_passed(now)
            {
                if self.store.remove(&session_id)? {
                    debug!(session = %session_id, status = %session.status, "session collected");
                    report.removed += 1;
                }
            } else {
                report.retained += 1;
            }
        }

        if !report.is_noop() {
            info!(
                expired = report.expired,
                removed = report.removed,
                retained = report.retained,
                "session sweep"
            );
        }
        Ok(report)
    }

    fn load(&self, session_id: &SessionId) -> Result<KycSession, SessionError> {
        self.store
            .get(session_id)?
            .ok_or_else(|| SessionError::NotFound(session_id.clone()))
    }

    fn cas(
        &self,
        session_id: &SessionId,
        expected: SessionStatus,
        updated: &KycSession,
    ) -> Result<CasOutcome, SessionError> {
        self.store
            .compare_and_swap(session_id, expected, updated)
            .map_err(|e| match e {
                StoreError::NotFound(_) => SessionError::NotFound(session_id.clone()),
                other => {
                    if other.is_backend_failure() {
                        error!(session = %session_id, error = %other, "session write failed");
                    }
                    SessionError::Store(other)
                }
            })
    }

    /// Move an overdue session to `Expired`, retrying if another writer got
    /// there first. Terminates because statuses only move forward.
    fn expire(&self, mut session: KycSession, now: Timestamp) -> Result<KycSession, SessionError> {
        while session.needs_expiry(now) {
            let previous = session.status;
            let mut expired = session.clone();
            expired.status = SessionStatus::Expired;
            expired.updated_at = now;

            match self.cas(&session.session_id, previous, &expired)? {
                CasOutcome::Swapped => {
                    info!(session = %expired.session_id, from = %previous, "session expired");
                    self.publish(SessionEvent::transition(previous, &expired));
                    return Ok(expired);
                }
                CasOutcome::Conflict { current } => session = current,
            }
        }
        Ok(session)
    }

    fn publish(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kyc_nullables::{NullClock, NullIdGenerator, NullStore};

    struct Harness {
        clock: Arc<NullClock>,
        store: Arc<NullStore>,
        manager: SessionManager,
    }

    fn harness() -> Harness {
        let clock = Arc::new(NullClock::new(Timestamp::new(1_000)));
        let store = Arc::new(NullStore::new());
        let manager = SessionManager::new(store.clone(), SessionParams::new(900, 3_600))
            .with_clock(clock.clone())
            .with_id_generator(Arc::new(NullIdGenerator::sequential()));
        Harness {
            clock,
            store,
            manager,
        }
    }

    fn subject() -> SubjectRef {
        SubjectRef::new("APP-2041").unwrap()
    }

    // ── Creation and expiry ────────────────────────────────────────────

    #[test]
    fn created_session_is_pending_for_the_full_ttl() {
        let h = harness();
        let session = h.manager.create_session(subject()).unwrap();
        assert_eq!(session.status, SessionStatus::Pending);
        assert_eq!(session.expires_at.as_secs() - session.created_at.as_secs(), 900);
        assert_eq!(h.store.len(), 1);
    }

    #[test]
    fn id_collision_is_an_allocation_error() {
        let h = harness();
        let manager = h
            .manager
            .clone()
            .with_id_generator(Arc::new(NullIdGenerator::fixed("KYC_0000DEADBEEF")));
        manager.create_session(subject()).unwrap();
        let err = manager.create_session(subject()).unwrap_err();
        assert!(matches!(err, SessionError::AllocationError(_)));
    }

    #[test]
    fn expiry_is_applied_on_read() {
        let h = harness();
        let session = h.manager.create_session(subject()).unwrap();

        h.clock.advance(900);
        assert_eq!(
            h.manager.get_status(&session.session_id).unwrap().status,
            SessionStatus::Pending
        );

        h.clock.advance(1);
        let read = h.manager.get_status(&session.session_id).unwrap();
        assert_eq!(read.status, SessionStatus::Expired);
        assert_eq!(read.updated_at, h.clock.now());
    }

    #[test]
    fn unknown_session_is_not_found() {
        let h = harness();
        let id = SessionId::parse("KYC_FFFFFFFFFFFF").unwrap();
        assert!(matches!(h.manager.get_status(&id), Err(SessionError::NotFound(_))));
        assert!(matches!(h.manager.start(&id), Err(SessionError::NotFound(_))));
    }

    // ── Transitions ────────────────────────────────────────────────────

    #[test]
    fn second_start_is_rejected_without_side_effects() {
        let h = harness();
        let session = h.manager.create_session(subject()).unwrap();
        let started = h.manager.start(&session.session_id).unwrap();

        h.clock.advance(5);
        let err = h.manager.start(&session.session_id).unwrap_err();
        assert!(matches!(
            err,
            SessionError::InvalidTransition {
                current: SessionStatus::InProgress,
                ..
            }
        ));
        assert_eq!(h.manager.get_status(&session.session_id).unwrap(), started);
    }

    #[test]
    fn start_after_expiry_is_session_expired() {
        let h = harness();
        let session = h.manager.create_session(subject()).unwrap();
        h.clock.advance(901);

        let err = h.manager.start(&session.session_id).unwrap_err();
        assert!(matches!(err, SessionError::SessionExpired(_)));
        // The failed start left the session marked expired.
        let stored = h.store.get(&session.session_id).unwrap().unwrap();
        assert_eq!(stored.status, SessionStatus::Expired);

        let err = h.manager.start(&session.session_id).unwrap_err();
        assert!(matches!(err, SessionError::SessionExpired(_)));
    }

    #[test]
    fn expiry_cannot_be_requested_directly() {
        let h = harness();
        let session = h.manager.create_session(subject()).unwrap();
        let err = h
            .manager
            .transition(
                &session.session_id,
                SessionStatus::Pending,
                SessionStatus::Expired,
                TransitionPayload::default(),
            )
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidTransition { .. }));
    }

    #[test]
    fn failed_transition_requires_reason() {
        let h = harness();
        let session = h.manager.create_session(subject()).unwrap();
        h.manager.start(&session.session_id).unwrap();
        let err = h
            .manager
            .transition(
                &session.session_id,
                SessionStatus::InProgress,
                SessionStatus::Failed,
                TransitionPayload::default(),
            )
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidPayload(_)));
    }

    #[test]
    fn transitions_are_published() {
        let h = harness();
        let mut events = h.manager.subscribe();
        let session = h.manager.create_session(subject()).unwrap();
        h.manager.start(&session.session_id).unwrap();

        let event = events.try_recv().unwrap();
        assert_eq!(event.session_id, session.session_id);
        assert_eq!(event.previous, SessionStatus::Pending);
        assert_eq!(event.status, SessionStatus::InProgress);
        assert!(events.try_recv().is_err());
    }

    // ── Abort ──────────────────────────────────────────────────────────

    #[test]
    fn abort_fails_a_started_session() {
        let h = harness();
        let session = h.manager.create_session(subject()).unwrap();
        h.manager.start(&session.session_id).unwrap();
        let aborted = h.manager.abort(&session.session_id, "camera denied").unwrap();
        assert_eq!(aborted.status, SessionStatus::Failed);
        assert_eq!(
            aborted.failure_reason,
            Some(FailureReason::Aborted("camera denied".into()))
        );
    }

    #[test]
    fn abort_of_pending_session_is_a_noop() {
        let h = harness();
        let session = h.manager.create_session(subject()).unwrap();
        let unchanged = h.manager.abort(&session.session_id, "closed tab").unwrap();
        assert_eq!(unchanged, session);
    }

    // ── Sweep ──────────────────────────────────────────────────────────

    #[test]
    fn sweep_expires_then_collects() {
        let h = harness();
        let stale = h.manager.create_session(subject()).unwrap();
        h.clock.advance(600);
        let fresh = h.manager.create_session(subject()).unwrap();

        h.clock.advance(301);
        let report = h.manager.sweep().unwrap();
        assert_eq!(
            report,
            SweepReport {
                expired: 1,
                removed: 0,
                retained: 2
            }
        );
        assert_eq!(
            h.store.get(&stale.session_id).unwrap().unwrap().status,
            SessionStatus::Expired
        );

        // Grace runs from the later of expiry and the last update.
        h.clock.advance(3_600);
        assert_eq!(h.manager.sweep().unwrap().removed, 0);
        h.clock.advance(1);
        let report = h.manager.sweep().unwrap();
        assert_eq!(report.removed, 1);
        assert!(h.store.get(&stale.session_id).unwrap().is_none());
        assert!(h.store.get(&fresh.session_id).unwrap().is_some());
    }

    #[test]
    fn sweep_keeps_live_sessions() {
        let h = harness();
        let session = h.manager.create_session(subject()).unwrap();
        h.manager.start(&session.session_id).unwrap();
        h.clock.advance(100);
        assert!(h.manager.sweep().unwrap().is_noop());
        assert_eq!(h.manager.session_count().unwrap(), 1);
    }
}
