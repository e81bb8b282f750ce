//! WebSocket gateway — viewer subscriptions and event forwarding.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade with a one-time ticket → connection id + outbound channel,
//!    registered with the group registry; client receives `connected`.
//! 2. Client sends `join`/`leave` commands. Join authorizes against the
//!    board's workspace before the registry is touched; a board that is
//!    missing and a board the caller may not see produce the same error.
//! 3. Events delivered to the channel are forwarded as `event` messages.
//! 4. Close → implicit removal from every joined group.
//!
//! Commands and replies are closed serde enums; there is no string-keyed
//! method dispatch on either side of the wire.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::event::BoardEvent;
use crate::registry::CONNECTION_CHANNEL_CAPACITY;
use crate::services::live::LiveError;
use crate::services::session;
use crate::state::AppState;

// =============================================================================
// WIRE TYPES
// =============================================================================

/// Commands a connected client may send.
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum ClientCommand {
    Join { board_id: Uuid },
    Leave { board_id: Uuid },
}

/// Messages the gateway sends to a client.
#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum ServerMessage {
    Connected {
        conn_id: Uuid,
        user_id: Uuid,
    },
    Joined {
        board_id: Uuid,
    },
    Left {
        board_id: Uuid,
    },
    Event {
        #[serde(flatten)]
        event: BoardEvent,
    },
    Error {
        code: &'static str,
        message: String,
    },
}

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(ticket) = params.get("ticket") else {
        return (StatusCode::UNAUTHORIZED, "ticket required").into_response();
    };

    let user_id = match session::consume_ws_ticket(&state.pool, ticket).await {
        Ok(Some(uid)) => uid,
        Ok(None) => return (StatusCode::UNAUTHORIZED, "invalid or expired ticket").into_response(),
        Err(e) => {
            tracing::error!(error = %e, "ws ticket validation failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "ticket validation error").into_response();
        }
    };

    ws.on_upgrade(move |socket| run_ws(socket, state, user_id))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState, user_id: Uuid) {
    let conn_id = Uuid::new_v4();

    // Per-connection channel the registry delivers into.
    let (tx, mut rx) = mpsc::channel::<BoardEvent>(CONNECTION_CHANNEL_CAPACITY);
    state.registry.register(conn_id, tx);

    let welcome = ServerMessage::Connected { conn_id, user_id };
    if send_message(&mut socket, &welcome).await.is_err() {
        state.registry.disconnect(conn_id);
        return;
    }

    info!(%conn_id, %user_id, "ws: client connected");

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { break };
                match msg {
                    Message::Text(text) => {
                        let reply = handle_command(&state, conn_id, user_id, &text).await;
                        if send_message(&mut socket, &reply).await.is_err() {
                            break;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            Some(event) = rx.recv() => {
                if send_message(&mut socket, &ServerMessage::Event { event }).await.is_err() {
                    break;
                }
            }
        }
    }

    // Implicit cleanup: the client never leaves group-by-group.
    state.registry.disconnect(conn_id);
    info!(%conn_id, "ws: client disconnected");
}

// =============================================================================
// COMMAND DISPATCH
// =============================================================================

/// Parse and apply one inbound command, returning the reply for the sender.
/// Split from the socket loop so tests can drive the gateway directly.
async fn handle_command(state: &AppState, conn_id: Uuid, user_id: Uuid, text: &str) -> ServerMessage {
    let command: ClientCommand = match serde_json::from_str(text) {
        Ok(command) => command,
        Err(e) => {
            warn!(%conn_id, error = %e, "ws: invalid inbound command");
            return ServerMessage::Error { code: "bad_request", message: format!("invalid command: {e}") };
        }
    };

    match command {
        ClientCommand::Join { board_id } => match state.live.authorize_view(board_id, user_id).await {
            Ok(()) => {
                if state.registry.join(board_id, conn_id) {
                    ServerMessage::Joined { board_id }
                } else {
                    ServerMessage::Error { code: "gone", message: "connection no longer registered".into() }
                }
            }
            Err(LiveError::AccessDenied) => {
                warn!(%conn_id, %board_id, "ws: join denied");
                ServerMessage::Error { code: "access_denied", message: "board not found or access denied".into() }
            }
            Err(e) => {
                tracing::error!(error = %e, %board_id, "ws: join failed");
                ServerMessage::Error { code: "internal", message: "join failed".into() }
            }
        },
        ClientCommand::Leave { board_id } => {
            state.registry.leave(board_id, conn_id);
            ServerMessage::Left { board_id }
        }
    }
}

// =============================================================================
// HELPERS
// =============================================================================

async fn send_message(socket: &mut WebSocket, message: &ServerMessage) -> Result<(), ()> {
    let json = match serde_json::to_string(message) {
        Ok(json) => json,
        Err(e) => {
            warn!(error = %e, "ws: failed to serialize message");
            return Err(());
        }
    };
    socket.send(Message::Text(json.into())).await.map_err(|_| ())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
