//! The initiating device's wait for a verdict.
//!
//! Polling only ever reads the session; walking away leaves it untouched.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use kyc_rpc::SessionStatusResponse;
use kyc_session::SessionManager;
use kyc_types::{FailureReason, SessionId, SessionStatus, VerificationResult};

use crate::{ClientError, HandoffClient};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Where the poller reads status from.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch_status(&self, session_id: &SessionId)
        -> Result<SessionStatusResponse, ClientError>;
}

#[async_trait]
impl StatusSource for HandoffClient {
    async fn fetch_status(
        &self,
        session_id: &SessionId,
    ) -> Result<SessionStatusResponse, ClientError> {
        self.status(session_id).await
    }
}

#[async_trait]
impl StatusSource for SessionManager {
    async fn fetch_status(
        &self,
        session_id: &SessionId,
    ) -> Result<SessionStatusResponse, ClientError> {
        let session = self.get_status(session_id)?;
        Ok(SessionStatusResponse::from_session(session, self.now()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    /// Local countdown. Shortened to the session's own expiry once known.
    pub countdown: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            countdown: Duration::from_secs(kyc_types::params::DEFAULT_SESSION_TTL_SECS),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum PollOutcome {
    Completed(VerificationResult),
    Failed {
        reason: Option<FailureReason>,
        result: Option<VerificationResult>,
    },
    /// Expired or no longer known to the server.
    Expired,
    /// The local countdown ran out first.
    TimedOut,
    Cancelled,
}

impl PollOutcome {
    /// Whether the initiating device should offer a fresh session.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::Expired | Self::TimedOut)
    }
}

pub struct StatusPoller {
    source: Arc<dyn StatusSource>,
    config: PollConfig,
}

impl StatusPoller {
    pub fn new(source: Arc<dyn StatusSource>, config: PollConfig) -> Self {
        Self { source, config }
    }

    pub fn config(&self) -> PollConfig {
        self.config
    }

    /// Poll until the session is terminal, the countdown elapses or `cancel`
    /// resolves. Transient read failures are logged and polling continues;
    /// any other failure is returned.
    pub async fn run<F>(&self, session_id: &SessionId, cancel: F) -> Result<PollOutcome, ClientError>
    where
        F: Future<Output = ()>,
    {
        let interval = self.config.interval;
        let mut deadline = Instant::now() + self.config.countdown;
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(cancel);

        loop {
            let fetched = tokio::select! {
                _ = &mut cancel => {
                    info!(session = %session_id, "polling cancelled");
                    return Ok(PollOutcome::Cancelled);
                }
                _ = sleep_until(deadline) => {
                    info!(session = %session_id, "polling countdown elapsed");
                    return Ok(PollOutcome::TimedOut);
                }
                fetched = async {
                    ticker.tick().await;
                    self.source.fetch_status(session_id).await
                } => fetched,
            };

            let snapshot = match fetched {
                Ok(snapshot) => snapshot,
                Err(e) if e.session_gone() => return Ok(PollOutcome::Expired),
                Err(e) if e.is_transient() => {
                    warn!(session = %session_id, error = %e, "status read failed, retrying");
                    continue;
                }
                Err(e) => return Err(e),
            };
            debug!(session = %session_id, status = %snapshot.status, "poll tick");

            match snapshot.status {
                SessionStatus::Completed => {
                    return snapshot.result.map(PollOutcome::Completed).ok_or_else(|| {
                        ClientError::Decode("completed session without a result".into())
                    })
                }
                SessionStatus::Failed => {
                    return Ok(PollOutcome::Failed {
                        reason: snapshot.failure_reason,
                        result: snapshot.result,
                    })
                }
                SessionStatus::Expired => return Ok(PollOutcome::Expired),
                SessionStatus::Pending | SessionStatus::InProgress => {
                    let session_end =
                        Instant::now() + Duration::from_secs(snapshot.expires_in_secs) + interval;
                    deadline = deadline.min(session_end);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use kyc_types::{ErrorCode, Timestamp};

    type Scripted = Result<SessionStatusResponse, ClientError>;

    /// Replays a script, then repeats its last step.
    struct ScriptedSource {
        script: Mutex<VecDeque<Scripted>>,
        fallback: fn() -> Scripted,
        calls: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(script: Vec<Scripted>, fallback: fn() -> Scripted) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                fallback,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl StatusSource for ScriptedSource {
        async fn fetch_status(&self, _session_id: &SessionId) -> Scripted {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop_front();
            next.unwrap_or_else(self.fallback)
        }
    }

    fn id() -> SessionId {
        SessionId::parse("KYC_ABCDEF012345").unwrap()
    }

    fn snapshot(status: SessionStatus, expires_in_secs: u64) -> Scripted {
        Ok(SessionStatusResponse {
            session_id: id(),
            status,
            expires_at: Timestamp::new(1_000),
            expires_in_secs,
            result: None,
            failure_reason: None,
        })
    }

    fn pending() -> Scripted {
        snapshot(SessionStatus::Pending, 900)
    }

    fn completed() -> Scripted {
        snapshot(SessionStatus::Completed, 600).map(|mut s| {
            s.result = Some(VerificationResult::new(true, 90.0));
            s
        })
    }

    fn poller(source: Arc<ScriptedSource>, countdown_secs: u64) -> StatusPoller {
        StatusPoller::new(
            source,
            PollConfig {
                interval: Duration::from_secs(2),
                countdown: Duration::from_secs(countdown_secs),
            },
        )
    }

    fn never() -> std::future::Pending<()> {
        std::future::pending()
    }

    #[tokio::test(start_paused = true)]
    async fn polls_until_completed() {
        let source = ScriptedSource::new(
            vec![pending(), snapshot(SessionStatus::InProgress, 880)],
            completed,
        );
        let started = Instant::now();
        let outcome = poller(source.clone(), 900).run(&id(), never()).await.unwrap();
        assert_eq!(outcome, PollOutcome::Completed(VerificationResult::new(true, 90.0)));
        assert_eq!(source.calls(), 3);
        // Ticks at 0s, 2s and 4s.
        assert_eq!(started.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_carries_reason() {
        let source = ScriptedSource::new(vec![pending()], || {
            snapshot(SessionStatus::Failed, 500).map(|mut s| {
                s.failure_reason = Some(FailureReason::VerificationRejected);
                s
            })
        });
        let outcome = poller(source, 900).run(&id(), never()).await.unwrap();
        assert!(outcome.is_retryable());
        assert_eq!(
            outcome,
            PollOutcome::Failed {
                reason: Some(FailureReason::VerificationRejected),
                result: None,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_elapses() {
        let source = ScriptedSource::new(vec![], pending);
        let started = Instant::now();
        let outcome = poller(source, 10).run(&id(), never()).await.unwrap();
        assert_eq!(outcome, PollOutcome::TimedOut);
        assert_eq!(started.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_shrinks_to_session_expiry() {
        let source = ScriptedSource::new(vec![], || snapshot(SessionStatus::Pending, 3));
        let started = Instant::now();
        let outcome = poller(source, 900).run(&id(), never()).await.unwrap();
        assert_eq!(outcome, PollOutcome::TimedOut);
        assert!(started.elapsed() <= Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn server_side_expiry_and_unknown_sessions() {
        let source = ScriptedSource::new(vec![pending()], || snapshot(SessionStatus::Expired, 0));
        assert_eq!(
            poller(source, 900).run(&id(), never()).await.unwrap(),
            PollOutcome::Expired
        );

        let source = ScriptedSource::new(vec![], || {
            Err(ClientError::Api {
                code: ErrorCode::NotFound,
                message: "Session not found or expired.".into(),
            })
        });
        assert_eq!(
            poller(source, 900).run(&id(), never()).await.unwrap(),
            PollOutcome::Expired
        );
    }

    #[tokio::test(start_paused = true)]
    async fn transport_errors_do_not_stop_polling() {
        let source = ScriptedSource::new(
            vec![
                Err(ClientError::Transport("connection refused".into())),
                Err(ClientError::Timeout),
            ],
            completed,
        );
        let outcome = poller(source.clone(), 900).run(&id(), never()).await.unwrap();
        assert!(matches!(outcome, PollOutcome::Completed(_)));
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn other_errors_are_returned() {
        let source = ScriptedSource::new(vec![], || {
            Err(ClientError::Api {
                code: ErrorCode::InvalidRequest,
                message: "bad id".into(),
            })
        });
        let err = poller(source, 900).run(&id(), never()).await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::InvalidRequest));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_walks_away() {
        let source = ScriptedSource::new(vec![], pending);
        let outcome = poller(source.clone(), 900)
            .run(&id(), tokio::time::sleep(Duration::from_secs(5)))
            .await
            .unwrap();
        assert_eq!(outcome, PollOutcome::Cancelled);
        assert!(!outcome.is_retryable());
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn reads_an_in_process_manager() {
        use kyc_nullables::{NullClock, NullStore};
        use kyc_types::{SessionParams, SubjectRef};

        let clock = Arc::new(NullClock::new(Timestamp::new(100)));
        let manager = SessionManager::new(Arc::new(NullStore::new()), SessionParams::default())
            .with_clock(clock.clone());
        let session = manager
            .create_session(SubjectRef::new("APP-7").unwrap())
            .unwrap();
        clock.advance(901);

        let poller = StatusPoller::new(Arc::new(manager), PollConfig::default());
        let outcome = poller.run(&session.session_id, never()).await.unwrap();
        assert_eq!(outcome, PollOutcome::Expired);
    }
}
