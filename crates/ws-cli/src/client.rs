// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Thin HTTP+WS client speaking the daemon's `/ipc/<channel>` envelope
//! and `/ws` subscribe protocol. One `call()` per request channel,
//! plus a streaming `subscribe_*` pair for the two WS channels.

use futures_util::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use thiserror::Error;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use ws_core::{Secret, Workspace};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("could not reach the daemon at {0}")]
    DaemonNotRunning(String),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("daemon rejected the request: {0}")]
    Daemon(String),
}

/// `WS_DAEMON_URL`, else `http://127.0.0.1:8787`. Kept separate from
/// `ws-daemon`'s own `env.rs` — the CLI only ever speaks to a daemon
/// over the network, never shares its config/session directories.
fn base_url() -> String {
    std::env::var("WS_DAEMON_URL").unwrap_or_else(|_| "http://127.0.0.1:8787".to_string())
}

fn auth_token() -> Option<String> {
    std::env::var("WS_AUTH_TOKEN").ok().filter(|s| !s.is_empty())
}

pub struct DaemonClient {
    http: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
}

impl DaemonClient {
    /// Builds a client from the environment. Connectivity isn't
    /// checked here — the first `call()` surfaces `DaemonNotRunning`
    /// if the daemon isn't listening.
    pub fn connect() -> Result<Self, ClientError> {
        Ok(Self { http: reqwest::Client::new(), base_url: base_url(), auth_token: auth_token() })
    }

    async fn call(&self, channel: &str, args: Vec<Value>) -> Result<Value, ClientError> {
        let url = format!("{}/ipc/{channel}", self.base_url);
        let mut request = self.http.post(&url).json(&json!({ "args": args }));
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_connect() {
                ClientError::DaemonNotRunning(self.base_url.clone())
            } else {
                ClientError::Request(e)
            }
        })?;

        let body: Value = response.json().await?;
        let success = body.get("success").and_then(Value::as_bool).unwrap_or(false);
        if !success {
            let message = body.get("error").and_then(Value::as_str).unwrap_or("unknown error").to_string();
            return Err(ClientError::Daemon(message));
        }
        Ok(body.get("data").cloned().unwrap_or(Value::Null))
    }

    async fn call_as<T: DeserializeOwned>(&self, channel: &str, args: Vec<Value>) -> Result<T, ClientError> {
        Ok(serde_json::from_value(self.call(channel, args).await?)?)
    }

    pub async fn list_workspaces(&self) -> Result<Vec<Workspace>, ClientError> {
        self.call_as("workspace:list", vec![]).await
    }

    pub async fn get_workspace(&self, id: &str) -> Result<Option<Workspace>, ClientError> {
        self.call_as("workspace:getInfo", vec![json!(id)]).await
    }

    pub async fn create_workspace(
        &self,
        project_path: &str,
        name: &str,
        trunk: &str,
        runtime_config: Option<Value>,
    ) -> Result<Value, ClientError> {
        self.call("workspace:create", vec![json!(project_path), json!(name), json!(trunk), runtime_config.unwrap_or(Value::Null)])
            .await
    }

    pub async fn rename_workspace(&self, id: &str, new_name: &str) -> Result<Value, ClientError> {
        self.call("workspace:rename", vec![json!(id), json!(new_name)]).await
    }

    pub async fn remove_workspace(&self, id: &str, force: bool) -> Result<(), ClientError> {
        self.call("workspace:remove", vec![json!(id), json!({ "force": force })]).await.map(|_| ())
    }

    pub async fn send_message(
        &self,
        id: &str,
        text: &str,
        model: Option<&str>,
        edit_message_id: Option<&str>,
    ) -> Result<(), ClientError> {
        let opts = json!({ "model": model, "editMessageId": edit_message_id });
        self.call("workspace:sendMessage", vec![json!(id), json!(text), opts]).await.map(|_| ())
    }

    pub async fn interrupt_stream(&self, id: &str) -> Result<(), ClientError> {
        self.call("workspace:interruptStream", vec![json!(id)]).await.map(|_| ())
    }

    pub async fn execute_bash(
        &self,
        id: &str,
        command: &str,
        timeout_secs: Option<u64>,
        niceness: Option<i32>,
    ) -> Result<Value, ClientError> {
        let opts = json!({ "timeoutSecs": timeout_secs, "niceness": niceness });
        self.call("workspace:executeBash", vec![json!(id), json!(command), opts]).await
    }

    pub async fn get_history(&self, id: &str) -> Result<Vec<ws_core::Message>, ClientError> {
        self.call_as("workspace:chat:getHistory", vec![json!(id)]).await
    }

    pub async fn replace_history(&self, id: &str, summary: Value) -> Result<(), ClientError> {
        self.call("workspace:replaceHistory", vec![json!(id), summary]).await.map(|_| ())
    }

    pub async fn list_projects(&self) -> Result<Vec<String>, ClientError> {
        // `project:list` returns `(project_path, ProjectConfig)` pairs;
        // the CLI only needs the path.
        let raw: Vec<Value> = self.call_as("project:list", vec![]).await?;
        Ok(raw.into_iter().filter_map(|entry| entry.get(0)?.as_str().map(str::to_string)).collect())
    }

    pub async fn list_branches(&self, project_path: &str) -> Result<Value, ClientError> {
        self.call("project:listBranches", vec![json!(project_path)]).await
    }

    pub async fn get_secrets(&self, project_path: &str) -> Result<Vec<Secret>, ClientError> {
        self.call_as("project:secrets:get", vec![json!(project_path)]).await
    }

    pub async fn update_secrets(&self, project_path: &str, secrets: Vec<Secret>) -> Result<(), ClientError> {
        self.call("project:secrets:update", vec![json!(project_path), json!(secrets)]).await.map(|_| ())
    }

    fn ws_url(&self) -> String {
        format!("{}/ws", self.base_url.replacen("http", "ws", 1))
    }

    /// Opens `/ws`, sends the `workspace:chat` subscribe frame, and
    /// hands back a stream of decoded payload frames. History replay
    /// and live events arrive on the same stream, in order.
    pub async fn subscribe_chat(&self, workspace_id: &str) -> Result<WsEventStream, ClientError> {
        let subscribe = json!({ "channel": "workspace:chat", "workspaceId": workspace_id });
        self.open_subscription(subscribe).await
    }

    pub async fn subscribe_metadata(&self) -> Result<WsEventStream, ClientError> {
        let subscribe = json!({ "channel": "workspace:metadata" });
        self.open_subscription(subscribe).await
    }

    async fn open_subscription(&self, subscribe: Value) -> Result<WsEventStream, ClientError> {
        let (mut socket, _response) = tokio_tungstenite::connect_async(self.ws_url()).await?;
        socket.send(WsMessage::Text(subscribe.to_string())).await?;
        Ok(WsEventStream { socket })
    }
}

pub struct WsEventStream {
    socket: tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
}

/// One decoded `{"channel": ..., "args": [...]}` frame from the
/// daemon's side of a subscription.
pub struct ChannelFrame {
    pub channel: String,
    pub args: Vec<Value>,
}

impl WsEventStream {
    /// `None` once the daemon closes the socket.
    pub async fn next_frame(&mut self) -> Result<Option<ChannelFrame>, ClientError> {
        loop {
            match self.socket.next().await {
                Some(Ok(WsMessage::Text(text))) => {
                    let value: Value = serde_json::from_str(&text)?;
                    let channel = value.get("channel").and_then(Value::as_str).unwrap_or_default().to_string();
                    let args = value.get("args").and_then(Value::as_array).cloned().unwrap_or_default();
                    return Ok(Some(ChannelFrame { channel, args }));
                }
                Some(Ok(WsMessage::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }
}
