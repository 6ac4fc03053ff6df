//! Session lifecycle for the cross-device KYC handoff.
//!
//! - [`SessionManager`]: creates sessions, applies status transitions as
//!   compare-and-swap operations, and observes expiry lazily.
//! - [`SessionGuard`]: admits a completing device to a session.
//! - [`HandoffIssuer`]: turns a session into a URL and QR code.
//! - [`VerificationScorer`]: the external biometric scorer, behind a trait.
//!
//! The scorer is deliberately opaque: this crate never computes a score, it
//! only validates what a scorer returns and records it.

pub mod error;
pub mod events;
pub mod guard;
pub mod issuer;
pub mod manager;
pub mod scorer;
pub mod submission;
pub mod sweep;

pub use error::SessionError;
pub use events::SessionEvent;
pub use guard::{GuardPolicy, SessionGuard};
pub use issuer::{HandoffIssuer, HandoffPayload, Locator, HANDOFF_INSTRUCTIONS, HANDOFF_KIND, HANDOFF_PATH};
pub use manager::{SessionManager, TransitionPayload};
pub use scorer::{HttpScorer, ScorerError, ScoringRequest, UnavailableScorer, VerificationScorer};
pub use submission::VerificationSubmission;
pub use sweep::SweepReport;
