//! HTTP API for the KYC handoff service.
//!
//! Provides endpoints for:
//! - Session creation and the handoff QR code (initiating device)
//! - Status polling (initiating device)
//! - Guarded start, verify and abort (completing device)
//! - Prometheus metrics and a health probe

pub mod error;
pub mod handlers;
pub mod metrics;
pub mod server;

pub use error::RpcError;
pub use handlers::{
    AbortRequest, CreateSessionRequest, CreateSessionResponse, ErrorBody, SessionStatusResponse,
    TransitionResponse, VerifyResponse,
};
pub use metrics::RpcMetrics;
pub use server::{router, RpcServer, RpcState};
