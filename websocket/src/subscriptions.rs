//! Subscription management for WebSocket clients.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use kyc_session::SessionEvent;
use kyc_types::{SessionId, SessionStatus};

/// Sessions a single connection may watch at once.
pub const MAX_SUBSCRIPTIONS_PER_CLIENT: usize = 16;

/// Available subscription topics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionTopic {
    /// Status transitions of one session.
    SessionStatus,
}

impl fmt::Display for SubscriptionTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SessionStatus => f.write_str("session_status"),
        }
    }
}

/// A message from the client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientMessage {
    Subscribe { session_id: SessionId },
    Unsubscribe { session_id: SessionId },
    Ping,
}

/// A control message to the client. Events are sent as [`SubscriptionEvent`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Ack {
        action: String,
        session_id: SessionId,
        /// Status at the time of subscribing, so nothing before the first
        /// pushed event is missed.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<SessionStatus>,
    },
    Error {
        message: String,
    },
    Pong,
}

/// An event sent to subscribed clients.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionEvent {
    pub topic: SubscriptionTopic,
    pub data: SessionEvent,
    pub timestamp: u64,
}

/// The sessions one connection is watching.
#[derive(Debug, Default)]
pub struct ClientSubscriptions {
    sessions: HashSet<SessionId>,
}

impl ClientSubscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when the per-client limit is reached. Re-subscribing
    /// to a watched session always succeeds.
    pub fn subscribe(&mut self, session_id: SessionId) -> bool {
        if !self.sessions.contains(&session_id) && self.sessions.len() >= MAX_SUBSCRIPTIONS_PER_CLIENT
        {
            return false;
        }
        self.sessions.insert(session_id);
        true
    }

    pub fn unsubscribe(&mut self, session_id: &SessionId) -> bool {
        self.sessions.remove(session_id)
    }

    pub fn is_subscribed(&self, session_id: &SessionId) -> bool {
        self.sessions.contains(session_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
