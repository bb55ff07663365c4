// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP + WebSocket IPC transport (spec.md §6.1). Re-expresses the
//! teacher's shared `ListenCtx` pattern as an axum `AppState`: one
//! struct every handler borrows instead of threading collaborators
//! through function signatures by hand.

pub mod channels;
pub mod ws;

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;
use tracing::warn;

use ws_core::{ErrorKind, HasErrorKind};
use ws_storage::{ConfigStore, HistoryStore, PartialStore};
use ws_session::SubscriptionHub;

use crate::lifecycle::WorkspaceLifecycle;
use crate::session_registry::SessionRegistry;

/// Shared daemon context every handler borrows (spec.md §6.1's
/// channel table + the `workspace:chat`/`workspace:metadata` WS
/// channels share the same collaborators).
pub struct AppState {
    pub config: Arc<ConfigStore>,
    pub history: Arc<HistoryStore>,
    pub partial: Arc<PartialStore>,
    pub sessions: Arc<SessionRegistry>,
    pub hub: Arc<SubscriptionHub>,
    pub lifecycle: Arc<WorkspaceLifecycle>,
    /// `None` means the daemon is running unauthenticated (dev mode);
    /// [`crate::env::auth_token`] already logs a warning for that case.
    pub auth_token: Option<String>,
}

pub fn router(state: Arc<AppState>) -> Router {
    let auth_state = Arc::clone(&state);
    Router::new()
        .route("/ipc/:channel", post(handle_ipc))
        .route("/ws", get(ws::handle_upgrade))
        .layer(middleware::from_fn_with_state(auth_state, require_auth))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bearer-token gate mirroring the teacher's `auth_token` check in
/// `ListenCtx`/`handle_connection`, re-expressed as an axum extractor
/// instead of a raw byte protocol. A missing configured token means
/// unauthenticated access is allowed (dev mode).
async fn require_auth(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = &state.auth_token else {
        return next.run(request).await;
    };

    let bearer = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    let query_token = request.uri().query().and_then(|q| {
        q.split('&').find_map(|pair| pair.strip_prefix("token=").map(str::to_string))
    });

    let presented = bearer.map(str::to_string).or(query_token);
    if presented.as_deref() == Some(expected.as_str()) {
        next.run(request).await
    } else {
        (StatusCode::UNAUTHORIZED, Json(json!({"success": false, "error": "unauthorized"}))).into_response()
    }
}

#[derive(serde::Deserialize)]
struct IpcRequest {
    #[serde(default)]
    args: Vec<Value>,
}

async fn handle_ipc(
    State(state): State<Arc<AppState>>,
    axum::extract::Path(channel): axum::extract::Path<String>,
    body: Option<Json<IpcRequest>>,
) -> impl IntoResponse {
    let args = body.map(|Json(r)| r.args).unwrap_or_default();
    match channels::dispatch(&channel, args, &state).await {
        Ok(data) => (StatusCode::OK, Json(json!({"success": true, "data": data}))),
        Err(err) => {
            let status = status_for(err.kind());
            warn!(channel = %channel, error = %err, "ipc channel failed");
            (status, Json(json!({"success": false, "error": err.to_string()})))
        }
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict | ErrorKind::Busy => StatusCode::CONFLICT,
        ErrorKind::Runtime | ErrorKind::Stream => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
