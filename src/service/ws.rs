//! Event WebSocket endpoint (SPEC_FULL.md §4.8, §6.1, §10.6).
//!
//! Grounded line-for-line on `amoljassal-sis-kernel-showcase/apps/daemon/
//! src/api/ws.rs`'s `events_handler`/`handle_socket`: a `tokio::select!` loop
//! racing the broadcast receiver against the socket's own `recv()` so a
//! client disconnect is noticed promptly instead of leaking the task.

use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::service::routes::AppState;

pub async fn events_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    ws: WebSocketUpgrade,
) -> Response {
    match state.sessions.get(id).await {
        Some(session) => ws.on_upgrade(move |socket| handle_socket(socket, session)),
        None => axum::http::StatusCode::NOT_FOUND.into_response(),
    }
}

/// `{subscribe: [...]}` client frame (SPEC_FULL.md §6.1): a list of event
/// `kind` tags to restrict delivery to. Absent or empty means "everything".
#[derive(Debug, Deserialize)]
struct SubscribeFrame {
    subscribe: Vec<String>,
}

async fn handle_socket(mut socket: WebSocket, session: Arc<crate::core::session::Session>) {
    let mut rx = session.events.subscribe();
    let mut filter: Option<HashSet<String>> = None;
    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(event) => {
                        let payload = match serde_json::to_value(&event) {
                            Ok(value) => value,
                            Err(err) => {
                                warn!(?err, "failed to serialize event");
                                continue;
                            }
                        };
                        if let Some(kinds) = &filter {
                            let matches = payload.get("kind").and_then(|k| k.as_str()).is_some_and(|k| kinds.contains(k));
                            if !matches {
                                continue;
                            }
                        }
                        if socket.send(Message::Text(payload.to_string())).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, session_id = %session.id, "event subscriber lagged, frames dropped");
                        continue;
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<SubscribeFrame>(&text) {
                            Ok(frame) if frame.subscribe.is_empty() => filter = None,
                            Ok(frame) => filter = Some(frame.subscribe.into_iter().collect()),
                            Err(_) => debug!(session_id = %session.id, "ignoring unrecognized client websocket frame"),
                        }
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(_)) => break,
                }
            }
        }
    }
}
