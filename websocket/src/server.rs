//! WebSocket server implementation.
//!
//! Accepts WebSocket connections at `/ws`. Each subscribed session gets a
//! forwarder task reading the lifecycle manager's event channel and sending
//! that session's transitions to the client. A forwarder ends after the
//! session's terminal event.

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::State,
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use kyc_session::{SessionEvent, SessionManager};
use kyc_types::{SessionId, Timestamp};

use crate::error::WsError;
use crate::subscriptions::{
    ClientMessage, ClientSubscriptions, ServerMessage, SubscriptionEvent, SubscriptionTopic,
    MAX_SUBSCRIPTIONS_PER_CLIENT,
};

type WsSender = Arc<Mutex<SplitSink<WebSocket, Message>>>;

/// Shared state for the WebSocket server.
pub struct WsState {
    manager: SessionManager,
}

impl WsState {
    pub fn new(manager: SessionManager) -> Self {
        Self { manager }
    }
}

pub fn router(state: Arc<WsState>) -> Router {
    Router::new().route("/ws", get(ws_handler)).with_state(state)
}

/// The WebSocket server, configured with a port and shared state.
pub struct WebSocketServer {
    pub port: u16,
    pub state: Arc<WsState>,
}

impl WebSocketServer {
    pub fn new(port: u16, state: Arc<WsState>) -> Self {
        Self { port, state }
    }

    /// Listen on all interfaces until `shutdown` resolves.
    pub async fn start<F>(self, shutdown: F) -> Result<(), WsError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| WsError::Bind {
            addr: addr.to_string(),
            reason: e.to_string(),
        })?;
        Self::serve(listener, self.state, shutdown).await
    }

    pub async fn serve<F>(
        listener: TcpListener,
        state: Arc<WsState>,
        shutdown: F,
    ) -> Result<(), WsError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener
            .local_addr()
            .map_err(|e| WsError::Serve(e.to_string()))?;
        info!(%addr, "WebSocket server listening");
        axum::serve(listener, router(state))
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| WsError::Serve(e.to_string()))?;
        info!("WebSocket server stopped");
        Ok(())
    }
}

/// Axum handler that upgrades an HTTP request to a WebSocket connection.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<WsState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle a single WebSocket connection.
///
/// Listens for client messages and keeps one forwarder per subscribed
/// session. All forwarders are aborted when the client disconnects.
async fn handle_socket(socket: WebSocket, state: Arc<WsState>) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let ws_sender: WsSender = Arc::new(Mutex::new(ws_sender));

    let mut client_subs = ClientSubscriptions::new();
    let mut forwarders: HashMap<SessionId, JoinHandle<()>> = HashMap::new();

    debug!("WebSocket client connected");

    while let Some(msg_result) = ws_receiver.next().await {
        let msg = match msg_result {
            Ok(msg) => msg,
            Err(e) => {
                warn!(error = %e, "WebSocket receive error");
                break;
            }
        };

        match msg {
            Message::Text(text) => {
                handle_text_message(&text, &state, &mut client_subs, &mut forwarders, &ws_sender)
                    .await;
            }
            Message::Close(_) => {
                debug!("client sent close frame");
                break;
            }
            Message::Ping(data) => {
                let mut sender = ws_sender.lock().await;
                let _ = sender.send(Message::Pong(data)).await;
            }
            _ => {}
        }
    }

    for (session_id, handle) in forwarders.drain() {
        debug!(session = %session_id, "aborting forwarder");
        handle.abort();
    }
    debug!("WebSocket client disconnected");
}

async fn handle_text_message(
    text: &str,
    state: &Arc<WsState>,
    client_subs: &mut ClientSubscriptions,
    forwarders: &mut HashMap<SessionId, JoinHandle<()>>,
    ws_sender: &WsSender,
) {
    let client_msg: ClientMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => {
            send_control(
                ws_sender,
                &ServerMessage::Error {
                    message: format!("Invalid message: {e}"),
                },
            )
            .await;
            return;
        }
    };

    let reply = match client_msg {
        ClientMessage::Subscribe { session_id } => {
            subscribe(state, client_subs, forwarders, ws_sender, session_id)
        }
        ClientMessage::Unsubscribe { session_id } => {
            let was_subscribed = client_subs.unsubscribe(&session_id);
            if let Some(handle) = forwarders.remove(&session_id) {
                handle.abort();
            }
            if was_subscribed {
                debug!(session = %session_id, "client unsubscribed");
                ServerMessage::Ack {
                    action: "unsubscribe".to_string(),
                    session_id,
                    status: None,
                }
            } else {
                ServerMessage::Error {
                    message: format!("Not subscribed to {session_id}"),
                }
            }
        }
        ClientMessage::Ping => ServerMessage::Pong,
    };
    send_control(ws_sender, &reply).await;
}

fn subscribe(
    state: &Arc<WsState>,
    client_subs: &mut ClientSubscriptions,
    forwarders: &mut HashMap<SessionId, JoinHandle<()>>,
    ws_sender: &WsSender,
    session_id: SessionId,
) -> ServerMessage {
    // Subscribe to the channel before reading the status so no transition
    // falls between the two.
    let rx = state.manager.subscribe();
    let session = match state.manager.get_status(&session_id) {
        Ok(session) => session,
        Err(e) => {
            return ServerMessage::Error {
                message: e.user_message(),
            }
        }
    };
    if !client_subs.subscribe(session_id.clone()) {
        return ServerMessage::Error {
            message: format!("At most {MAX_SUBSCRIPTIONS_PER_CLIENT} sessions per connection"),
        };
    }

    if let Some(handle) = forwarders.remove(&session_id) {
        handle.abort();
    }
    if !session.status.is_terminal() {
        let sender = ws_sender.clone();
        let watched = session_id.clone();
        let handle = tokio::spawn(async move {
            forward_events(rx, sender, watched).await;
        });
        forwarders.insert(session_id.clone(), handle);
    }

    debug!(session = %session_id, status = %session.status, "client subscribed");
    ServerMessage::Ack {
        action: "subscribe".to_string(),
        session_id,
        status: Some(session.status),
    }
}

/// Forwarder task: sends the watched session's events to the client.
async fn forward_events(
    mut rx: broadcast::Receiver<SessionEvent>,
    ws_sender: WsSender,
    session_id: SessionId,
) {
    loop {
        match rx.recv().await {
            Ok(event) if event.session_id == session_id => {
                let terminal = event.is_terminal();
                let envelope = SubscriptionEvent {
                    topic: SubscriptionTopic::SessionStatus,
                    data: event,
                    timestamp: Timestamp::now().as_secs(),
                };
                let Ok(text) = serde_json::to_string(&envelope) else {
                    continue;
                };
                let mut sender = ws_sender.lock().await;
                if sender.send(Message::Text(text)).await.is_err() || terminal {
                    break;
                }
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(session = %session_id, skipped = n, "client lagged behind");
            }
            Err(broadcast::error::RecvError::Closed) => {
                debug!(session = %session_id, "event channel closed");
                break;
            }
        }
    }
}

async fn send_control(ws_sender: &WsSender, message: &ServerMessage) {
    let Ok(text) = serde_json::to_string(message) else {
        return;
    };
    let mut sender = ws_sender.lock().await;
    let _ = sender.send(Message::Text(text)).await;
}
