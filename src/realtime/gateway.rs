//! Push-channel gateway: authenticates upgrade requests against the session
//! manager and bridges registry events onto the socket.

use axum::{
    extract::{
        ws::{CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{
    realtime::message::{ClientMessage, ServerMessage},
    state::AppState,
};

/// Close code for an upgrade with no token at all.
const CLOSE_POLICY_VIOLATION: u16 = 1008;
/// Close code for a token the session manager rejected.
const CLOSE_UNAUTHENTICATED: u16 = 4401;

/// The query parameters of an upgrade request. The token travels as a query
/// parameter because the push channel opens before any API call, so no
/// header from a prior request can be assumed.
#[derive(Debug, Deserialize)]
pub struct UpgradeParams {
    pub token: Option<String>,
}

enum UpgradeAuth {
    MissingToken,
    InvalidToken,
    Valid(Uuid),
}

/// Handles `GET /ws`.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<UpgradeParams>,
    State(state): State<AppState>,
) -> Response {
    let auth = match params.token {
        None => {
            tracing::warn!("Push upgrade without a token");
            UpgradeAuth::MissingToken
        }
        Some(token) => match state.sessions.validate(&token).await {
            Ok(Some(user_id)) => UpgradeAuth::Valid(user_id),
            Ok(None) => {
                tracing::warn!("Push upgrade with an invalid session token");
                UpgradeAuth::InvalidToken
            }
            Err(e) => {
                // fail closed
                tracing::error!("Session validation failed during upgrade: {}", e);
                UpgradeAuth::InvalidToken
            }
        },
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state, auth))
}

async fn handle_socket(socket: WebSocket, state: AppState, auth: UpgradeAuth) {
    let user_id = match auth {
        UpgradeAuth::MissingToken => {
            return reject(socket, CLOSE_POLICY_VIOLATION, "missing token").await;
        }
        UpgradeAuth::InvalidToken => {
            return reject(socket, CLOSE_UNAUTHENTICATED, "invalid session").await;
        }
        UpgradeAuth::Valid(user_id) => user_id,
    };

    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let connection_id = state.registry.register(user_id, tx.clone());
    tracing::info!(
        "Push connection opened for user {} ({} live)",
        user_id,
        state.registry.connection_count()
    );

    // The acknowledgement goes through the same channel as notifications so
    // it is always the first frame the client sees.
    let ack = ServerMessage::Connected {
        uid: user_id,
        timestamp: Utc::now(),
    };
    match sonic_rs::to_string(&ack) {
        Ok(text) => {
            let _ = tx.send(Message::Text(text.into()));
        }
        Err(e) => {
            tracing::error!("Failed to serialize connection acknowledgement: {}", e);
        }
    }

    let (mut sink, mut stream) = socket.split();

    let mut send_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if sink.send(message).await.is_err() {
                break;
            }
        }
    });

    let idle_timeout = Duration::from_secs(state.config.ws_idle_timeout_secs);
    let mut recv_task = tokio::spawn(async move {
        loop {
            match tokio::time::timeout(idle_timeout, stream.next()).await {
                // No inbound frame inside the window: the peer is dead.
                Err(_) => {
                    tracing::debug!("Push connection for user {} idled out", user_id);
                    break;
                }
                Ok(None) | Ok(Some(Err(_))) => break,
                Ok(Some(Ok(Message::Close(_)))) => break,
                Ok(Some(Ok(Message::Text(text)))) => {
                    // The only meaningful inbound message is the liveness
                    // ping; anything else, malformed included, is ignored.
                    if let Ok(ClientMessage::Ping) =
                        sonic_rs::from_str::<ClientMessage>(text.as_str())
                    {
                        if let Ok(pong) = sonic_rs::to_string(&ServerMessage::Pong) {
                            let _ = tx.send(Message::Text(pong.into()));
                        }
                    }
                }
                // Binary and protocol-level frames are ignored.
                Ok(Some(Ok(_))) => {}
            }
        }
    });

    // Whichever side finishes first, the other is torn down with it.
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    // Runs exactly once per connection lifecycle, whichever event ended it:
    // client close, transport error, idle timeout, or server shutdown.
    state.registry.unregister(&connection_id);
    tracing::info!("Push connection closed for user {}", user_id);
}

async fn reject(mut socket: WebSocket, code: u16, reason: &'static str) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: Utf8Bytes::from_static(reason),
        })))
        .await;
}
