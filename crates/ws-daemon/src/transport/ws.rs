// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `/ws`: a single upgrade endpoint multiplexing both streaming
//! channels spec.md §6.1 defines — `workspace:chat` (subscribe +
//! history replay + live tail) and `workspace:metadata` (tail only).
//! The first client frame selects which.

use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use ws_core::WorkspaceId;
use ws_session::{hub::recv_or_overflow, hub::RecvOutcome, project_message};

use super::AppState;

#[derive(Debug, Deserialize)]
struct SubscribeRequest {
    #[serde(default)]
    channel: String,
    #[serde(rename = "workspaceId", default)]
    workspace_id: Option<String>,
}

pub async fn handle_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    let request = match read_subscribe_request(&mut socket).await {
        Some(request) => request,
        None => return,
    };

    match request.channel.as_str() {
        "workspace:chat" => {
            let Some(id) = request.workspace_id else {
                send_error(&mut socket, "workspace:chat subscribe requires workspaceId").await;
                return;
            };
            stream_chat(&mut socket, &state, WorkspaceId::from_string(id)).await;
        }
        "workspace:metadata" => stream_metadata(&mut socket, &state).await,
        other => {
            send_error(&mut socket, &format!("unknown subscribe channel {other:?}")).await;
        }
    }
}

async fn read_subscribe_request(socket: &mut WebSocket) -> Option<SubscribeRequest> {
    loop {
        match socket.recv().await {
            Some(Ok(WsMessage::Text(text))) => {
                return match serde_json::from_str(&text) {
                    Ok(request) => Some(request),
                    Err(e) => {
                        send_error(socket, &format!("invalid subscribe frame: {e}")).await;
                        None
                    }
                };
            }
            Some(Ok(WsMessage::Close(_))) | None => return None,
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                debug!(error = %e, "websocket recv failed while awaiting subscribe frame");
                return None;
            }
        }
    }
}

/// Subscribes before replaying (per `SubscriptionHub::subscribe_chat`'s
/// documented ordering rule), then sends the live init-progress view if
/// this workspace's creation hook ran in this process, then full
/// history, then tails the live channel until overflow or disconnect.
async fn stream_chat(socket: &mut WebSocket, state: &Arc<AppState>, workspace_id: WorkspaceId) {
    let mut rx = state.hub.subscribe_chat(&workspace_id);

    if let Some(session) = state.sessions.get(&workspace_id) {
        if let Some(init) = session.init_snapshot() {
            if send_frame(socket, "workspace:chat", &init).await.is_err() {
                return;
            }
        }
    }

    let history = match state.history.get(&workspace_id) {
        Ok(history) => history,
        Err(e) => {
            send_error(socket, &format!("failed to load history: {e}")).await;
            return;
        }
    };
    for message in &history {
        for displayed in project_message(message) {
            if send_frame(socket, "workspace:chat", &displayed).await.is_err() {
                return;
            }
        }
    }

    loop {
        tokio::select! {
            biased;
            incoming = socket.recv() => {
                match incoming {
                    None | Some(Ok(WsMessage::Close(_))) => break,
                    Some(Err(_)) => break,
                    Some(Ok(_)) => continue,
                }
            }
            outcome = recv_or_overflow(&mut rx) => {
                match outcome {
                    RecvOutcome::Event(displayed) => {
                        if send_frame(socket, "workspace:chat", &displayed).await.is_err() {
                            break;
                        }
                    }
                    RecvOutcome::Overflowed(skipped) => {
                        send_error(socket, &format!("subscriber fell {skipped} events behind")).await;
                        break;
                    }
                    RecvOutcome::Closed => break,
                }
            }
        }
    }
}

async fn stream_metadata(socket: &mut WebSocket, state: &Arc<AppState>) {
    let mut rx = state.hub.subscribe_metadata();

    loop {
        tokio::select! {
            biased;
            incoming = socket.recv() => {
                match incoming {
                    None | Some(Ok(WsMessage::Close(_))) => break,
                    Some(Err(_)) => break,
                    Some(Ok(_)) => continue,
                }
            }
            outcome = recv_or_overflow(&mut rx) => {
                match outcome {
                    RecvOutcome::Event(event) => {
                        if send_frame(socket, "workspace:metadata", &event).await.is_err() {
                            break;
                        }
                    }
                    RecvOutcome::Overflowed(skipped) => {
                        send_error(socket, &format!("subscriber fell {skipped} events behind")).await;
                        break;
                    }
                    RecvOutcome::Closed => break,
                }
            }
        }
    }
}

async fn send_frame<T: serde::Serialize>(
    socket: &mut WebSocket,
    channel: &str,
    payload: &T,
) -> Result<(), axum::Error> {
    let frame = json!({"channel": channel, "args": [payload]});
    socket.send(WsMessage::Text(frame.to_string())).await
}

async fn send_error(socket: &mut WebSocket, message: &str) {
    let frame = json!({"channel": "error", "args": [message]});
    let _ = socket.send(WsMessage::Text(frame.to_string())).await;
}
