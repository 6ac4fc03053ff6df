//! WebSocket push of session status changes.
//!
//! An alternative to polling for the initiating device: clients subscribe to
//! individual sessions on the `session_status` topic and receive every
//! transition as it happens.

pub mod error;
pub mod server;
pub mod subscriptions;

pub use error::WsError;
pub use server::{router, WebSocketServer, WsState};
pub use subscriptions::{
    ClientMessage, ClientSubscriptions, ServerMessage, SubscriptionEvent, SubscriptionTopic,
    MAX_SUBSCRIPTIONS_PER_CLIENT,
};
