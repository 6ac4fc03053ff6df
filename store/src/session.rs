//! Session storage trait.

use crate::StoreError;
use kyc_types::{KycSession, SessionId, SessionStatus};

/// Result of a compare-and-swap on a session's status.
#[derive(Clone, Debug, PartialEq)]
pub enum CasOutcome {
    /// The stored status matched and the new record was written.
    Swapped,
    /// The stored status differed; nothing was written.
    Conflict { current: KycSession },
}

/// Persistent map from session id to session record.
///
/// Implementations must make [`SessionStore::compare_and_swap`] atomic with
/// respect to every other write: of two callers racing on the same session
/// with the same expected status, exactly one observes
/// [`CasOutcome::Swapped`].
pub trait SessionStore: Send + Sync {
    /// Insert a new session. Fails with [`StoreError::Duplicate`] if the id
    /// is already present.
    fn insert(&self, session: &KycSession) -> Result<(), StoreError>;

    /// Fetch a session by id.
    fn get(&self, id: &SessionId) -> Result<Option<KycSession>, StoreError>;

    /// Replace the stored session with `updated` only if its current status
    /// equals `expected`. Fails with [`StoreError::NotFound`] if the id is unknown.
    fn compare_and_swap(
        &self,
        id: &SessionId,
        expected: SessionStatus,
        updated: &KycSession,
    ) -> Result<CasOutcome, StoreError>;

    /// Remove a session. Returns whether it existed.
    fn remove(&self, id: &SessionId) -> Result<bool, StoreError>;

    /// All stored sessions, in id order.
    fn iter_sessions(&self) -> Result<Vec<KycSession>, StoreError>;

    /// Number of stored sessions.
    fn session_count(&self) -> Result<u64, StoreError>;
}
