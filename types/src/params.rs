//! Session lifecycle parameters.

use serde::{Deserialize, Serialize};

/// Default session time-to-live: 15 minutes.
pub const DEFAULT_SESSION_TTL_SECS: u64 = 15 * 60;

/// Default time a terminal session is retained before garbage collection.
pub const DEFAULT_GC_GRACE_SECS: u64 = 60 * 60;

/// Timing parameters shared by the lifecycle manager and the sweeper.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionParams {
    /// Lifetime of a session from creation. Never extended.
    pub ttl_secs: u64,
    /// How long a terminal (or overdue) session stays readable before removal.
    pub gc_grace_secs: u64,
}

impl SessionParams {
    pub fn new(ttl_secs: u64, gc_grace_secs: u64) -> Self {
        Self {
            ttl_secs,
            gc_grace_secs,
        }
    }
}

impl Default for SessionParams {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_TTL_SECS, DEFAULT_GC_GRACE_SECS)
    }
}
