//! Session status and failure reasons.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::TypeError;

/// The lifecycle status of a verification session.
///
/// Legal edges are `Pending → InProgress → {Completed | Failed}`, plus
/// `* → Expired` from any non-terminal status. Terminal statuses never change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    /// Created and waiting for a completing device to open it.
    Pending,
    /// A completing device has started the capture sequence.
    InProgress,
    /// Verification finished and the scorer accepted the subject.
    Completed,
    /// The TTL elapsed before the session reached a terminal status.
    Expired,
    /// Verification was rejected or the capture was aborted.
    Failed,
}

impl SessionStatus {
    pub const ALL: [SessionStatus; 5] = [
        Self::Pending,
        Self::InProgress,
        Self::Completed,
        Self::Expired,
        Self::Failed,
    ];

    /// Whether no further transition is permitted.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Expired | Self::Failed)
    }

    /// Whether `self → to` is an edge of the lifecycle graph.
    pub fn can_transition_to(&self, to: SessionStatus) -> bool {
        match (self, to) {
            (Self::Pending, Self::InProgress) => true,
            (Self::InProgress, Self::Completed) | (Self::InProgress, Self::Failed) => true,
            (from, Self::Expired) => !from.is_terminal(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Expired => "EXPIRED",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| TypeError::UnknownStatus(s.to_string()))
    }
}

/// Why a session ended in [`SessionStatus::Failed`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureReason {
    /// The scorer returned `verified = false`.
    VerificationRejected,
    /// The completing device abandoned the capture sequence.
    Aborted(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VerificationRejected => f.write_str("verification rejected"),
            Self::Aborted(detail) => write!(f, "aborted: {detail}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_documented_edges_are_allowed() {
        let allowed = [
            (SessionStatus::Pending, SessionStatus::InProgress),
            (SessionStatus::InProgress, SessionStatus::Completed),
            (SessionStatus::InProgress, SessionStatus::Failed),
            (SessionStatus::Pending, SessionStatus::Expired),
            (SessionStatus::InProgress, SessionStatus::Expired),
        ];
        for from in SessionStatus::ALL {
            for to in SessionStatus::ALL {
                assert_eq!(
                    from.can_transition_to(to),
                    allowed.contains(&(from, to)),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn status_string_round_trip() {
        for status in SessionStatus::ALL {
            assert_eq!(status.as_str().parse::<SessionStatus>().unwrap(), status);
        }
        assert!("NOT_FOUND".parse::<SessionStatus>().is_err());
    }

    #[test]
    fn json_uses_screaming_case() {
        let json = serde_json::to_string(&SessionStatus::InProgress).unwrap();
        assert_eq!(json, "\"IN_PROGRESS\"");
    }
}
