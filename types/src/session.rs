//! Session identifiers and the session record itself.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{FailureReason, SessionStatus, Timestamp, TypeError, VerificationResult};

/// Number of random bytes behind a generated session id.
pub const SESSION_ID_ENTROPY_BYTES: usize = 16;

/// An opaque session identifier, always prefixed with `KYC_`.
///
/// The id is the only capability needed to open a session on the completing
/// device, so generated ids carry 128 bits of OS randomness.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    /// The standard prefix for all session ids.
    pub const PREFIX: &'static str = "KYC_";

    /// Parse and validate a session id.
    ///
    /// The body after the prefix must be 8 to 64 ASCII alphanumerics so the id
    /// is safe to embed in a URL path segment without escaping.
    pub fn parse(raw: impl Into<String>) -> Result<Self, TypeError> {
        let s = raw.into();
        let body = s
            .strip_prefix(Self::PREFIX)
            .ok_or_else(|| TypeError::InvalidSessionId(s.clone()))?;
        if !(8..=64).contains(&body.len()) || !body.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(TypeError::InvalidSessionId(s));
        }
        Ok(Self(s))
    }

    /// Build an id from raw entropy.
    pub fn from_entropy(bytes: &[u8]) -> Self {
        Self(format!("{}{}", Self::PREFIX, hex::encode_upper(bytes)))
    }

    /// Return the raw id string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for SessionId {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}

/// Allocates fresh session ids.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> Result<SessionId, TypeError>;
}

/// Generates ids from the operating system's CSPRNG.
#[derive(Clone, Copy, Debug, Default)]
pub struct OsIdGenerator;

impl IdGenerator for OsIdGenerator {
    fn next_id(&self) -> Result<SessionId, TypeError> {
        let mut bytes = [0u8; SESSION_ID_ENTROPY_BYTES];
        getrandom::getrandom(&mut bytes).map_err(|e| TypeError::Randomness(e.to_string()))?;
        Ok(SessionId::from_entropy(&bytes))
    }
}

/// Opaque reference to the person or application a session verifies.
///
/// Never personal data itself; typically an application number.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SubjectRef(String);

impl SubjectRef {
    pub const MAX_LEN: usize = 128;

    pub fn new(raw: impl Into<String>) -> Result<Self, TypeError> {
        let s = raw.into();
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed.len() > Self::MAX_LEN {
            return Err(TypeError::InvalidSubjectRef(s));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for SubjectRef {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<SubjectRef> for String {
    fn from(subject: SubjectRef) -> Self {
        subject.0
    }
}

/// A single verification attempt.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KycSession {
    pub session_id: SessionId,
    pub subject_ref: SubjectRef,
    pub created_at: Timestamp,
    /// Fixed at creation; never extended.
    pub expires_at: Timestamp,
    /// Time of the most recent status change.
    pub updated_at: Timestamp,
    pub status: SessionStatus,
    /// Present once the scorer has produced a result.
    pub result: Option<VerificationResult>,
    /// Present only when `status` is `Failed`.
    pub failure_reason: Option<FailureReason>,
}

impl KycSession {
    /// A fresh `Pending` session living for `ttl_secs` from `now`.
    pub fn new(session_id: SessionId, subject_ref: SubjectRef, now: Timestamp, ttl_secs: u64) -> Self {
        Self {
            session_id,
            subject_ref,
            created_at: now,
            expires_at: now.plus_secs(ttl_secs),
            updated_at: now,
            status: SessionStatus::Pending,
            result: None,
            failure_reason: None,
        }
    }

    /// Whether the TTL has elapsed at `now`.
    pub fn is_past_expiry(&self, now: Timestamp) -> bool {
        self.expires_at.is_passed(now)
    }

    /// Whether the session should be reported as `Expired` at `now`.
    pub fn needs_expiry(&self, now: Timestamp) -> bool {
        !self.status.is_terminal() && self.is_past_expiry(now)
    }

    pub fn ttl_secs(&self) -> u64 {
        self.expires_at.as_secs().saturating_sub(self.created_at.as_secs())
    }
}
