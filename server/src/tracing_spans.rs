//! Span constructors shared by the server's background tasks.
//!
//! HTTP requests get their spans from the RPC layer's trace middleware.

use std::path::Path;

use tracing::{info_span, Span};

use kyc_types::SessionId;

/// Span covering server start-up against one data directory.
pub fn startup_span(data_dir: &Path) -> Span {
    info_span!("startup", data_dir = %data_dir.display())
}

/// Span covering one expiry and garbage-collection pass.
pub fn sweep_span() -> Span {
    info_span!("sweep")
}

/// Span for work attributed to a single session.
pub fn session_span(session_id: &SessionId) -> Span {
    info_span!("session", id = %session_id)
}
