//! Nullable scorer: scripted verification verdicts.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use kyc_session::{ScorerError, ScoringRequest, VerificationScorer};
use kyc_types::VerificationResult;

enum Verdict {
    Result(VerificationResult),
    Unavailable,
}

/// A scorer that returns a pre-configured verdict and counts calls.
pub struct NullScorer {
    verdict: Mutex<Verdict>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    last_request: Mutex<Option<ScoringRequest>>,
}

impl NullScorer {
    fn with_verdict(verdict: Verdict) -> Self {
        Self {
            verdict: Mutex::new(verdict),
            delay: None,
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// Always return `result`.
    pub fn returning(result: VerificationResult) -> Self {
        Self::with_verdict(Verdict::Result(result))
    }

    /// Always fail as if the scoring service were down.
    pub fn unavailable() -> Self {
        Self::with_verdict(Verdict::Unavailable)
    }

    /// Wait this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Change the verdict for subsequent calls.
    pub fn set_result(&self, result: VerificationResult) {
        *self.verdict.lock().unwrap() = Verdict::Result(result);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<ScoringRequest> {
        self.last_request.lock().unwrap().clone()
    }
}

#[async_trait]
impl VerificationScorer for NullScorer {
    async fn score(&self, request: ScoringRequest) -> Result<VerificationResult, ScorerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &*self.verdict.lock().unwrap() {
            Verdict::Result(result) => Ok(result.clone()),
            Verdict::Unavailable => Err(ScorerError::Transport("null scorer is down".into())),
        }
    }

    fn name(&self) -> &str {
        "null"
    }
}
