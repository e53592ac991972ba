//! The real-time surface: one WebSocket endpoint per client
//!
//! The handshake makes the connection's single trust decision; afterwards
//! the socket task owns the identity and one subscription for the whole
//! connection lifetime. Token expiry is checked at the handshake only, not
//! re-checked while the connection stays open.

use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{
        ws::{Message, Utf8Bytes, WebSocket},
        OriginalUri, State, WebSocketUpgrade,
    },
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use serde::{Deserialize, Serialize};

use crate::auth::AuthRequest;
use crate::error::Error;
use crate::model::{Identity, NotificationId};
use crate::server::AppState;

/// Interval between keep-alive pings on an otherwise idle connection.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Messages a connected client may send
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum ClientMessage {
    MarkRead { id: NotificationId },
}

/// Error frame answered to a rejected client message
#[derive(Serialize)]
struct ErrorFrame {
    #[serde(rename = "type")]
    kind: &'static str,
    error: String,
}

impl ErrorFrame {
    fn new(error: &Error) -> Self {
        Self {
            kind: "error",
            error: error.to_string(),
        }
    }
}

/// GET /cable
pub async fn cable_connect(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    OriginalUri(uri): OriginalUri,
) -> Response {
    let request = AuthRequest::new(headers, uri);
    let identity = match state.authenticator.authenticate_handshake(&request).await {
        Ok(identity) => identity,
        Err(error) => {
            tracing::warn!("WebSocket handshake refused");
            return error.into_response();
        }
    };
    ws.on_upgrade(move |socket| client_session(state, socket, identity))
}

async fn client_session(state: AppState, socket: WebSocket, identity: Identity) {
    let (handle, mut events) = state.broadcaster.subscribe(&identity);
    tracing::info!(user_id = identity.id, "WebSocket connected");

    let (mut outbound, mut inbound) = socket.split();
    let mut ping = tokio::time::interval(PING_INTERVAL);

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                let frame = match serde_json::to_string(&event.payload) {
                    Ok(json) => json,
                    Err(error) => {
                        tracing::error!(%error, "Event serialization failed");
                        continue;
                    }
                };
                if outbound.send(Message::Text(frame.into())).await.is_err() {
                    break;
                }
            }
            message = inbound.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        if handle_client_message(&state, &identity, &text, &mut outbound)
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    // Pings and pongs are handled by the transport
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
            _ = ping.tick() => {
                if outbound.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
            }
        }
    }

    state.broadcaster.unsubscribe(&handle);
    tracing::info!(user_id = identity.id, "WebSocket disconnected");
}

/// Err means the socket is gone and the session should end.
async fn handle_client_message(
    state: &AppState,
    identity: &Identity,
    text: &Utf8Bytes,
    outbound: &mut SplitSink<WebSocket, Message>,
) -> Result<(), ()> {
    let message: ClientMessage = match serde_json::from_str(text.as_str()) {
        Ok(message) => message,
        Err(error) => {
            tracing::debug!(%error, "Unrecognized client message ignored");
            return Ok(());
        }
    };

    match message {
        ClientMessage::MarkRead { id } => {
            // Same gateway mutation as the REST endpoint; the published
            // event is the success signal, errors get an answer frame.
            if let Err(error) = state.gateway.mark_read(Some(identity), id).await {
                tracing::debug!(user_id = identity.id, id, %error, "mark_read rejected");
                let frame =
                    serde_json::to_string(&ErrorFrame::new(&error)).unwrap_or_default();
                if outbound.send(Message::Text(frame.into())).await.is_err() {
                    return Err(());
                }
            }
        }
    }
    Ok(())
}
