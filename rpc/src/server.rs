//! Axum-based RPC server.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use kyc_session::{HandoffIssuer, SessionError, SessionGuard, SessionManager, VerificationScorer};
use kyc_types::{KycSession, SessionId};

use crate::error::RpcError;
use crate::handlers;
use crate::metrics::RpcMetrics;

/// Largest accepted request body. Two base64 camera frames fit well inside.
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Everything a handler needs, shared across requests.
pub struct RpcState {
    pub manager: SessionManager,
    pub guard: SessionGuard,
    /// Issuer for the configured origin.
    pub issuer: HandoffIssuer,
    pub scorer: Arc<dyn VerificationScorer>,
    pub metrics: Arc<RpcMetrics>,
    /// Origins a caller may substitute for the configured one.
    pub allowed_origins: Vec<String>,
    pub expose_metrics: bool,
}

impl RpcState {
    pub fn new(
        manager: SessionManager,
        guard: SessionGuard,
        issuer: HandoffIssuer,
        scorer: Arc<dyn VerificationScorer>,
        metrics: Arc<RpcMetrics>,
    ) -> Self {
        Self {
            manager,
            guard,
            issuer,
            scorer,
            metrics,
            allowed_origins: Vec::new(),
            expose_metrics: true,
        }
    }

    pub fn with_allowed_origins(mut self, origins: Vec<String>) -> Self {
        self.allowed_origins = origins
            .iter()
            .map(|origin| origin.trim().trim_end_matches('/').to_string())
            .collect();
        self
    }

    pub fn with_metrics_endpoint(mut self, expose: bool) -> Self {
        self.expose_metrics = expose;
        self
    }

    /// The issuer for a requested origin. Origins outside the allow list fall
    /// back to the configured one.
    pub(crate) fn issuer_for(&self, requested: Option<&str>) -> Result<HandoffIssuer, RpcError> {
        let Some(requested) = requested.filter(|origin| !origin.trim().is_empty()) else {
            return Ok(self.issuer.clone());
        };
        let candidate = HandoffIssuer::new(requested)?;
        if candidate == self.issuer
            || self
                .allowed_origins
                .iter()
                .any(|allowed| allowed == candidate.base_origin())
        {
            Ok(candidate)
        } else {
            warn!(requested, "origin override not allowed, using configured origin");
            Ok(self.issuer.clone())
        }
    }

    pub(crate) fn check_device(&self, headers: &HeaderMap) -> Result<(), RpcError> {
        let device = handlers::device_class(headers);
        self.guard
            .check_device(device)
            .map_err(|e| self.denied(e))
    }

    pub(crate) fn authorize(
        &self,
        session_id: &SessionId,
        headers: &HeaderMap,
    ) -> Result<KycSession, RpcError> {
        let device = handlers::device_class(headers);
        self.guard
            .authorize(session_id, device)
            .map_err(|e| self.denied(e))
    }

    fn denied(&self, error: SessionError) -> RpcError {
        if matches!(error, SessionError::DeviceClassRejected(_)) {
            self.metrics.guard_denials.inc();
        }
        error.into()
    }
}

/// The full HTTP surface.
pub fn router(state: Arc<RpcState>) -> Router {
    let mut router = Router::new()
        .route("/kyc/session", post(handlers::create_session))
        .route("/kyc/session/:id", get(handlers::session_info))
        .route("/kyc/session/:id/status", get(handlers::session_status))
        .route("/kyc/session/:id/qr", get(handlers::session_qr))
        .route("/kyc/session/:id/start", post(handlers::start_session))
        .route("/kyc/session/:id/verify", post(handlers::verify_session))
        .route("/kyc/session/:id/abort", post(handlers::abort_session))
        .route("/health", get(handlers::health));
    if state.expose_metrics {
        router = router.route("/metrics", get(handlers::metrics));
    }
    router
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub struct RpcServer {
    pub port: u16,
    state: Arc<RpcState>,
}

impl RpcServer {
    pub fn new(port: u16, state: Arc<RpcState>) -> Self {
        Self { port, state }
    }

    /// Bind all interfaces on the configured port and serve until `shutdown`
    /// resolves.
    pub async fn start<F>(self, shutdown: F) -> Result<(), RpcError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| RpcError::Server(format!("failed to bind {addr}: {e}")))?;
        Self::serve(listener, self.state, shutdown).await
    }

    /// Serve on an already bound listener.
    pub async fn serve<F>(
        listener: TcpListener,
        state: Arc<RpcState>,
        shutdown: F,
    ) -> Result<(), RpcError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener
            .local_addr()
            .map_err(|e| RpcError::Server(e.to_string()))?;
        info!(%addr, "RPC server listening");
        axum::serve(listener, router(state))
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| RpcError::Server(e.to_string()))?;
        info!("RPC server stopped");
        Ok(())
    }
}
