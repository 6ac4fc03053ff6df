//! Abstract storage traits for the KYC handoff.
//!
//! Every storage backend (LMDB, in-memory for testing) implements these
//! traits. The lifecycle manager depends only on the traits.

pub mod error;
pub mod session;

pub use error::StoreError;
pub use session::{CasOutcome, SessionStore};
