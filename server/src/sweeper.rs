//! Periodic expiry and garbage collection.
//!
//! Lazy expiry on read keeps reported statuses correct on its own; the
//! sweeper additionally expires sessions nobody reads and removes terminal
//! sessions once their grace period has passed.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use kyc_rpc::RpcMetrics;
use kyc_session::{SessionError, SessionManager, SweepReport};

use crate::tracing_spans::sweep_span;

pub struct Sweeper {
    manager: SessionManager,
    interval: Duration,
    metrics: Option<Arc<RpcMetrics>>,
}

impl Sweeper {
    pub fn new(manager: SessionManager, interval: Duration) -> Self {
        Self {
            manager,
            interval,
            metrics: None,
        }
    }

    /// Keep the live-session gauge current after every pass.
    pub fn with_metrics(mut self, metrics: Arc<RpcMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// One pass.
    pub fn sweep_once(&self) -> Result<SweepReport, SessionError> {
        let _span = sweep_span().entered();
        let report = self.manager.sweep()?;
        if report.is_noop() {
            debug!(retained = report.retained, "sweep found nothing to do");
        }
        if let Some(metrics) = &self.metrics {
            let live = self.manager.session_count()?;
            metrics.live_sessions.set(i64::try_from(live).unwrap_or(i64::MAX));
        }
        Ok(report)
    }

    /// Sweep every interval until shutdown. A failed pass is logged and the
    /// next one runs on schedule.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    debug!("sweeper stopping");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_once() {
                        warn!(error = %e, "sweep failed");
                    }
                }
            }
        }
    }
}
