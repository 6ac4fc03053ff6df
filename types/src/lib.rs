//! Fundamental types for the cross-device KYC handoff.
//!
//! This crate defines the core types shared across every other crate in the workspace:
//! session identifiers, statuses, capture artifacts, verification results,
//! timestamps, device classes, and lifecycle parameters.

pub mod artifact;
pub mod code;
pub mod device;
pub mod error;
pub mod params;
pub mod result;
pub mod session;
pub mod state;
pub mod time;

pub use artifact::{decode_image_payload, encode_image_payload, ArtifactKind, CaptureArtifact};
pub use code::ErrorCode;
pub use device::DeviceClass;
pub use error::TypeError;
pub use params::SessionParams;
pub use result::{ScoreDetail, VerificationResult};
pub use session::{IdGenerator, KycSession, OsIdGenerator, SessionId, SubjectRef};
pub use state::{FailureReason, SessionStatus};
pub use time::{Clock, SystemClock, Timestamp};
