//! The assembled server: storage, lifecycle, HTTP API, push and sweeping.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use kyc_rpc::{RpcMetrics, RpcServer, RpcState};
use kyc_session::{
    HandoffIssuer, HttpScorer, SessionEvent, SessionGuard, SessionManager, UnavailableScorer,
    VerificationScorer,
};
use kyc_store_lmdb::{check_data_dir, check_integrity, LmdbEnvironment};
use kyc_websocket::{WebSocketServer, WsState};

use crate::shutdown::ShutdownController;
use crate::sweeper::Sweeper;
use crate::tracing_spans::{session_span, startup_span};
use crate::{ServerConfig, ServerError};

/// Named databases the environment may hold.
const MAX_DBS: u32 = 4;

/// How long [`KycServer::stop`] waits for background tasks.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

pub struct KycServer {
    config: ServerConfig,
    lmdb: LmdbEnvironment,
    manager: SessionManager,
    guard: SessionGuard,
    issuer: HandoffIssuer,
    scorer: Arc<dyn VerificationScorer>,
    metrics: Arc<RpcMetrics>,
    shutdown: Arc<ShutdownController>,
    rpc_addr: Option<SocketAddr>,
    ws_addr: Option<SocketAddr>,
    /// Handles for spawned background tasks (joined during shutdown).
    task_handles: Vec<JoinHandle<()>>,
}

impl KycServer {
    /// Validate `config`, open storage and build every subsystem. Nothing
    /// listens until [`start`](Self::start).
    pub fn new(config: ServerConfig) -> Result<Self, ServerError> {
        config.validate()?;
        let _span = startup_span(&config.data_dir).entered();

        check_data_dir(&config.data_dir).map_err(ServerError::DataDir)?;
        let lmdb = LmdbEnvironment::open(&config.data_dir, MAX_DBS, config.lmdb_map_size)?;

        let integrity = check_integrity(lmdb.env())?;
        if integrity.is_healthy() {
            info!(
                databases = integrity.databases_checked,
                entries = integrity.total_entries,
                "storage integrity check passed"
            );
        } else {
            for problem in &integrity.errors {
                warn!(problem = %problem, "storage integrity problem");
            }
        }

        let manager = SessionManager::new(Arc::new(lmdb.session_store()), config.session_params());
        let guard = SessionGuard::new(manager.clone(), config.guard_policy());
        let issuer = HandoffIssuer::new(&config.base_origin)?;

        let scorer: Arc<dyn VerificationScorer> = match &config.scorer_url {
            Some(url) => {
                info!(url = %url, "using HTTP verification scorer");
                Arc::new(HttpScorer::new(url.clone(), config.scorer_timeout())?)
            }
            None => {
                warn!("no scorer_url configured, every verification attempt will be refused");
                Arc::new(UnavailableScorer)
            }
        };

        let metrics = Arc::new(RpcMetrics::new());
        let live = manager.session_count()?;
        metrics
            .live_sessions
            .set(i64::try_from(live).unwrap_or(i64::MAX));

        Ok(Self {
            config,
            lmdb,
            manager,
            guard,
            issuer,
            scorer,
            metrics,
            shutdown: Arc::new(ShutdownController::new()),
            rpc_addr: None,
            ws_addr: None,
            task_handles: Vec::new(),
        })
    }

    /// Replace the scorer chosen from configuration.
    pub fn with_scorer(mut self, scorer: Arc<dyn VerificationScorer>) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn manager(&self) -> &SessionManager {
        &self.manager
    }

    pub fn metrics(&self) -> &Arc<RpcMetrics> {
        &self.metrics
    }

    /// Where the HTTP API listens, once started.
    pub fn rpc_addr(&self) -> Option<SocketAddr> {
        self.rpc_addr
    }

    /// Where the WebSocket server listens, once started and if enabled.
    pub fn ws_addr(&self) -> Option<SocketAddr> {
        self.ws_addr
    }

    /// Bind listeners and spawn every background task. Returns once all
    /// listeners are bound.
    pub async fn start(&mut self) -> Result<(), ServerError> {
        // ── HTTP API ──────────────────────────────────────────────────────
        let listener = TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], self.config.rpc_port)))
            .await?;
        self.rpc_addr = Some(listener.local_addr()?);

        let rpc_state = Arc::new(
            RpcState::new(
                self.manager.clone(),
                self.guard.clone(),
                self.issuer.clone(),
                self.scorer.clone(),
                self.metrics.clone(),
            )
            .with_allowed_origins(self.config.allowed_origins.clone())
            .with_metrics_endpoint(self.config.enable_metrics),
        );
        let rpc_shutdown = self.shutdown.signalled();
        self.task_handles.push(tokio::spawn(async move {
            if let Err(e) = RpcServer::serve(listener, rpc_state, rpc_shutdown).await {
                error!("RPC server error: {e}");
            }
        }));

        // ── WebSocket server (optional) ───────────────────────────────────
        if self.config.enable_websocket {
            let listener = TcpListener::bind(SocketAddr::from((
                [0, 0, 0, 0],
                self.config.websocket_port,
            )))
            .await?;
            self.ws_addr = Some(listener.local_addr()?);

            let ws_state = Arc::new(WsState::new(self.manager.clone()));
            let ws_shutdown = self.shutdown.signalled();
            self.task_handles.push(tokio::spawn(async move {
                if let Err(e) = WebSocketServer::serve(listener, ws_state, ws_shutdown).await {
                    error!("WebSocket server error: {e}");
                }
            }));
        }

        // ── Sweeper ───────────────────────────────────────────────────────
        let sweeper = Sweeper::new(self.manager.clone(), self.config.sweep_interval())
            .with_metrics(self.metrics.clone());
        self.task_handles
            .push(tokio::spawn(sweeper.run(self.shutdown.subscribe())));

        // ── Transition metrics ────────────────────────────────────────────
        self.task_handles.push(tokio::spawn(record_transitions(
            self.manager.subscribe(),
            self.metrics.clone(),
            self.shutdown.subscribe(),
        )));

        info!(
            rpc = ?self.rpc_addr,
            websocket = ?self.ws_addr,
            origin = %self.issuer.base_origin(),
            "KYC handoff server started"
        );
        Ok(())
    }

    /// Signal every task, flush storage and wait for the tasks to finish.
    pub async fn stop(&mut self) -> Result<(), ServerError> {
        info!("KYC handoff server stopping");
        self.shutdown.shutdown();

        let handles: Vec<JoinHandle<()>> = self.task_handles.drain(..).collect();
        let wait_all = async {
            for handle in handles {
                let _ = handle.await;
            }
        };
        let timed_out = tokio::time::timeout(SHUTDOWN_TIMEOUT, wait_all)
            .await
            .is_err();

        if let Err(e) = self.lmdb.sync() {
            warn!("LMDB sync failed: {e}");
        }

        if timed_out {
            warn!("shutdown timeout ({SHUTDOWN_TIMEOUT:?}), some tasks may still be running");
            return Err(ServerError::ShutdownTimeout);
        }
        info!("KYC handoff server stopped");
        Ok(())
    }

    /// Start, wait for SIGINT or SIGTERM, then stop.
    pub async fn run_until_signal(mut self) -> Result<(), ServerError> {
        self.start().await?;
        self.shutdown.wait_for_signal().await;
        self.stop().await
    }
}

/// Count every lifecycle transition until shutdown. Both receivers must be
/// created before the task is spawned.
async fn record_transitions(
    mut events: broadcast::Receiver<SessionEvent>,
    metrics: Arc<RpcMetrics>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            received = events.recv() => match received {
                Ok(event) => session_span(&event.session_id).in_scope(|| {
                    metrics.observe_event(&event);
                    debug!(from = %event.previous, to = %event.status, "session transition");
                }),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "transition metrics lagged behind");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
}
