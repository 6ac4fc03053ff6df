//! The KYC handoff server.
//!
//! Opens LMDB storage, builds the lifecycle manager and guard, and runs the
//! HTTP API, the optional WebSocket push server and the expiry sweeper until
//! shutdown.

pub mod config;
pub mod error;
pub mod logging;
pub mod server;
pub mod shutdown;
pub mod sweeper;
pub mod tracing_spans;

pub use config::ServerConfig;
pub use error::ServerError;
pub use logging::{init_logging, LogFormat};
pub use server::KycServer;
pub use shutdown::ShutdownController;
pub use sweeper::Sweeper;
