//! Shared helpers for the KYC handoff tools.

pub mod logging;
pub mod time;

pub use logging::init_tracing;
pub use time::{format_duration, format_remaining};
