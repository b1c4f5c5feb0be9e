//! WebSocket handler for live monitor updates.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;

use crate::server::state::AppState;

/// WebSocket upgrade handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handles an individual WebSocket connection.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before the snapshot so no update falls between the two.
    let rx = state.subscribe();

    if let Some(initial_state) = initial_state(&state).await {
        if sender.send(Message::Text(initial_state)).await.is_err() {
            return;
        }
    }

    let send_task = tokio::spawn(async move {
        let Some(mut rx) = rx else {
            return;
        };
        loop {
            match rx.recv().await {
                Ok(msg) => {
                    if sender.send(Message::Text(msg)).await.is_err() {
                        break;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "WebSocket client lagging, updates dropped");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // The feed is read-only; incoming messages are only watched for close.
    let recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    tracing::debug!("WebSocket connection closed");
}

/// First message on every connection: the current status snapshot.
async fn initial_state(state: &AppState) -> Option<String> {
    let ctx = state.ctx.clone();
    let snapshot = tokio::task::spawn_blocking(move || ctx.snapshot()).await.ok()?;

    let message = serde_json::json!({
        "type": "initial_state",
        "data": snapshot,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    serde_json::to_string(&message).ok()
}
