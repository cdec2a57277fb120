//! WebSocket upgrade handler with JWT authentication
//!
//! One physical connection is one session: the JWT is verified once at
//! upgrade time and yields the user identifier for every subsequent message
//! on the connection. Handlers for a single connection run sequentially;
//! different connections run concurrently.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Extension, Query,
    },
    http::HeaderMap,
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use unison_protocol::{ClientMessage, ConnectedPayload, ErrorPayload, ServerMessage};

use crate::services::auth::AuthService;

use super::connection::ConnectionManager;
use super::store::PlaybackStore;
use super::sync::SessionHandler;

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct WsQueryParams {
    /// JWT access token for authentication
    token: String,
}

/// WebSocket upgrade handler
///
/// Authenticates the connection via JWT token in query parameter, then
/// upgrades to WebSocket and manages the connection. An unauthenticated
/// caller is terminated before any operation executes.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsQueryParams>,
    Extension(auth_service): Extension<AuthService>,
    Extension(manager): Extension<ConnectionManager>,
    Extension(store): Extension<PlaybackStore>,
    headers: HeaderMap,
) -> Response {
    // Verify JWT token
    let claims = match auth_service.verify_access_token(&params.token) {
        Ok(claims) => claims,
        Err(e) => {
            tracing::warn!(error = %e, "WebSocket auth failed");
            return ws.on_upgrade(|mut socket| async move {
                let error_msg = ServerMessage::Error(ErrorPayload::auth_failed(e.to_string()));
                if let Ok(json) = serde_json::to_string(&error_msg) {
                    let _ = socket.send(Message::Text(json)).await;
                }
                let _ = socket.close().await;
            });
        }
    };

    let user_id = claims.sub;

    let user_agent = headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown");

    tracing::info!(
        user_id = %user_id,
        user_agent = %user_agent,
        "WebSocket connection authenticated"
    );

    ws.on_upgrade(move |socket| handle_socket(socket, user_id, manager, store))
}

/// Handle an established WebSocket connection
async fn handle_socket(
    socket: WebSocket,
    user_id: Uuid,
    manager: ConnectionManager,
    store: PlaybackStore,
) {
    let connection_id = Uuid::new_v4();

    // Channel for messages bound for this connection
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    let session = SessionHandler::new(
        user_id,
        connection_id,
        tx.clone(),
        manager.clone(),
        store.clone(),
    );

    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Greeting: the connection's identity and the current active pointer
    let connected = ServerMessage::Connected(ConnectedPayload {
        connection_id,
        active_device_id: manager.active_device(user_id),
    });
    if let Ok(json) = serde_json::to_string(&connected) {
        if ws_sender.send(Message::Text(json)).await.is_err() {
            tracing::warn!(
                user_id = %user_id,
                connection_id = %connection_id,
                "Failed to send connected message"
            );
            return;
        }
    }

    // Pump: forward queued server messages onto the socket
    let send_connection_id = connection_id;
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json)).await.is_err() {
                        tracing::debug!(connection_id = %send_connection_id, "WebSocket send failed");
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize message");
                }
            }
        }
    });

    // Handle incoming messages
    let recv_connection_id = connection_id;
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = ws_receiver.next().await {
            match result {
                Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(msg) => session.handle_message(msg).await,
                    Err(e) => {
                        tracing::debug!(
                            error = %e,
                            connection_id = %recv_connection_id,
                            "Failed to parse client message"
                        );
                        session.send_error(ErrorPayload::invalid_message(e.to_string()));
                    }
                },
                Ok(Message::Binary(_)) => {
                    // Binary frames are not part of the sync protocol
                    tracing::debug!(
                        connection_id = %recv_connection_id,
                        "Received unsupported binary message"
                    );
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                    tracing::trace!(connection_id = %recv_connection_id, "Keep-alive frame");
                }
                Ok(Message::Close(_)) => {
                    tracing::debug!(connection_id = %recv_connection_id, "WebSocket close received");
                    break;
                }
                Err(e) => {
                    tracing::debug!(
                        error = %e,
                        connection_id = %recv_connection_id,
                        "WebSocket error"
                    );
                    break;
                }
            }
        }
    });

    // Wait for either task to complete, then abort the other
    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
        }
        _ = &mut recv_task => {
            send_task.abort();
        }
    }

    // Teardown: drop the device entry and notify the remaining connections.
    // The active pointer is deliberately not reassigned.
    let teardown = SessionHandler::new(user_id, connection_id, tx, manager, store);
    teardown.handle_disconnect();

    tracing::info!(
        user_id = %user_id,
        connection_id = %connection_id,
        "WebSocket connection closed"
    );
}
