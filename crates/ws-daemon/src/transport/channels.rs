// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One handler function per channel in spec.md §6.1's table, dispatched
//! by a `match` on the channel string — a closed set, validated here
//! rather than left open-ended.

use futures::StreamExt;
use serde_json::{json, Value};
use thiserror::Error;

use ws_core::{
    validate_command, validate_message_text, ErrorKind, HasErrorKind, Message, MessageId,
    MessageMetadata, Part, Role, RuntimeConfig, Secret, ValidationError, WorkspaceId,
};
use ws_runtime::{ExecOpts, ExitOutcome};
use ws_session::SendOptions;
use ws_storage::StorageError;

use super::AppState;
use crate::lifecycle::LifecycleError;

const MAX_BASH_OUTPUT_BYTES: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("{0}")]
    BadRequest(String),
    #[error("unknown channel {0:?}")]
    UnknownChannel(String),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Send(#[from] ws_session::SendMessageError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

impl HasErrorKind for ChannelError {
    fn kind(&self) -> ErrorKind {
        match self {
            ChannelError::BadRequest(_) | ChannelError::UnknownChannel(_) | ChannelError::Serde(_) => {
                ErrorKind::Validation
            }
            ChannelError::Lifecycle(e) => e.kind(),
            ChannelError::Storage(e) => e.kind(),
            ChannelError::Send(e) => e.kind(),
            ChannelError::Validation(_) => ErrorKind::Validation,
        }
    }
}

pub async fn dispatch(channel: &str, args: Vec<Value>, state: &AppState) -> Result<Value, ChannelError> {
    match channel {
        "workspace:list" => workspace_list(state),
        "workspace:create" => workspace_create(args, state).await,
        "workspace:rename" => workspace_rename(args, state).await,
        "workspace:remove" => workspace_remove(args, state).await,
        "workspace:getInfo" => workspace_get_info(&args, state),
        "workspace:sendMessage" => workspace_send_message(args, state).await,
        "workspace:interruptStream" => workspace_interrupt_stream(&args, state),
        "workspace:executeBash" => workspace_execute_bash(args, state).await,
        "workspace:chat:getHistory" => workspace_get_history(&args, state),
        "workspace:replaceHistory" => workspace_replace_history(&args, state),
        "project:list" => project_list(state),
        "project:listBranches" => project_list_branches(args).await,
        "project:secrets:get" => project_secrets_get(&args, state),
        "project:secrets:update" => project_secrets_update(&args, state),
        other => Err(ChannelError::UnknownChannel(other.to_string())),
    }
}

fn arg(args: &[Value], i: usize) -> Result<&Value, ChannelError> {
    args.get(i).ok_or_else(|| ChannelError::BadRequest(format!("missing argument at position {i}")))
}

fn arg_str(args: &[Value], i: usize) -> Result<String, ChannelError> {
    arg(args, i)?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| ChannelError::BadRequest(format!("argument {i} must be a string")))
}

fn arg_workspace_id(args: &[Value], i: usize) -> Result<WorkspaceId, ChannelError> {
    Ok(WorkspaceId::from_string(arg_str(args, i)?))
}

fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0)
}

fn workspace_list(state: &AppState) -> Result<Value, ChannelError> {
    Ok(serde_json::to_value(state.config.get_all_workspace_metadata()?)?)
}

async fn workspace_create(args: Vec<Value>, state: &AppState) -> Result<Value, ChannelError> {
    let project_path = arg_str(&args, 0)?;
    let name = arg_str(&args, 1)?;
    let trunk = arg_str(&args, 2)?;
    let runtime_config = match args.get(3) {
        Some(v) if !v.is_null() => Some(serde_json::from_value::<RuntimeConfig>(v.clone())?),
        _ => None,
    };
    let workspace = state.lifecycle.create(project_path, name, trunk, runtime_config).await?;
    Ok(json!({"success": true, "metadata": workspace}))
}

async fn workspace_rename(args: Vec<Value>, state: &AppState) -> Result<Value, ChannelError> {
    let id = arg_workspace_id(&args, 0)?;
    let new_name = arg_str(&args, 1)?;
    let renamed = state.lifecycle.rename(&id, new_name).await?;
    Ok(json!({"newWorkspaceId": renamed.id}))
}

async fn workspace_remove(args: Vec<Value>, state: &AppState) -> Result<Value, ChannelError> {
    let id = arg_workspace_id(&args, 0)?;
    let force = args.get(1).and_then(|v| v.get("force")).and_then(Value::as_bool).unwrap_or(false);
    // not-found is idempotent success for delete (spec.md §7).
    match state.lifecycle.delete(&id, force).await {
        Ok(()) | Err(LifecycleError::NotFound(_)) => Ok(json!("ok")),
        Err(e) => Err(e.into()),
    }
}

fn workspace_get_info(args: &[Value], state: &AppState) -> Result<Value, ChannelError> {
    let id = arg_workspace_id(args, 0)?;
    Ok(match state.config.find_workspace(&id)? {
        Some(workspace) => serde_json::to_value(workspace)?,
        None => Value::Null,
    })
}

async fn workspace_send_message(args: Vec<Value>, state: &AppState) -> Result<Value, ChannelError> {
    let id = arg_workspace_id(&args, 0)?;
    let text = arg_str(&args, 1)?;
    validate_message_text(&text)?;

    let opts = args.get(2);
    let model = opts.and_then(|v| v.get("model")).and_then(Value::as_str).map(str::to_string);
    let edit_message_id = opts
        .and_then(|v| v.get("editMessageId"))
        .and_then(Value::as_str)
        .map(MessageId::from_string);

    let session = state.sessions.get_or_create(&id);
    session.send_message(text, SendOptions { model, edit_message_id }, now_ms()).await?;
    Ok(json!("ok"))
}

fn workspace_interrupt_stream(args: &[Value], state: &AppState) -> Result<Value, ChannelError> {
    let id = arg_workspace_id(args, 0)?;
    if let Some(session) = state.sessions.get(&id) {
        session.interrupt_stream();
    }
    Ok(json!("ok"))
}

async fn workspace_execute_bash(args: Vec<Value>, state: &AppState) -> Result<Value, ChannelError> {
    use ws_runtime::Runtime;

    let id = arg_workspace_id(&args, 0)?;
    let command = arg_str(&args, 1)?;
    validate_command(&command)?;

    let workspace = state
        .config
        .find_workspace(&id)?
        .ok_or_else(|| ChannelError::BadRequest(format!("workspace {id} not found")))?;

    let opts = args.get(2);
    let timeout_secs = opts.and_then(|v| v.get("timeoutSecs")).and_then(Value::as_u64);
    let niceness = opts.and_then(|v| v.get("niceness")).and_then(Value::as_i64).map(|n| n as i32);

    let runtime = ws_runtime::runtime_for(&workspace.runtime_config);
    let exec_opts = ExecOpts { cwd: workspace.path.clone(), timeout_secs, niceness, ..Default::default() };
    let mut stream = runtime.exec(&command, exec_opts).await.map_err(LifecycleError::from)?;

    let (stdout, stderr) = tokio::join!(
        drain_capped(&mut stream.stdout, MAX_BASH_OUTPUT_BYTES),
        drain_capped(&mut stream.stderr, MAX_BASH_OUTPUT_BYTES),
    );
    let exit = stream.exit_code.await;

    let mut output = String::from_utf8_lossy(&stdout.0).into_owned();
    output.push_str(&String::from_utf8_lossy(&stderr.0));
    let truncated = stdout.1 || stderr.1;
    let success = matches!(exit, ExitOutcome::Code(0));

    Ok(json!({"success": success, "output": output, "truncated": truncated}))
}

/// Drains a process output stream up to `cap` bytes, discarding the
/// remainder so a runaway command can't exhaust memory. The process is
/// still drained to completion either way — dropping the stream early
/// would leave it blocked writing to a full pipe.
async fn drain_capped(stream: &mut ws_runtime::ByteStream, cap: usize) -> (Vec<u8>, bool) {
    let mut buf = Vec::new();
    let mut truncated = false;
    while let Some(chunk) = stream.next().await {
        if buf.len() >= cap {
            truncated = true;
            continue;
        }
        let remaining = cap - buf.len();
        if chunk.len() > remaining {
            buf.extend_from_slice(&chunk[..remaining]);
            truncated = true;
        } else {
            buf.extend_from_slice(&chunk);
        }
    }
    (buf, truncated)
}

fn workspace_get_history(args: &[Value], state: &AppState) -> Result<Value, ChannelError> {
    let id = arg_workspace_id(args, 0)?;
    Ok(serde_json::to_value(state.history.get(&id)?)?)
}

fn workspace_replace_history(args: &[Value], state: &AppState) -> Result<Value, ChannelError> {
    let id = arg_workspace_id(args, 0)?;
    let raw = arg(args, 1)?;
    let summary = if let Some(text) = raw.as_str() {
        Message {
            id: MessageId::new(),
            role: Role::Assistant,
            parts: vec![Part::Text { text: text.to_string(), ts: Some(now_ms()) }],
            metadata: MessageMetadata { timestamp: now_ms(), compacted: Some(true), ..Default::default() },
        }
    } else {
        serde_json::from_value(raw.clone())?
    };
    state.history.replace(&id, summary)?;
    Ok(json!("ok"))
}

fn project_list(state: &AppState) -> Result<Value, ChannelError> {
    Ok(serde_json::to_value(state.config.list_projects()?)?)
}

async fn project_list_branches(args: Vec<Value>) -> Result<Value, ChannelError> {
    let project_path = arg_str(&args, 0)?;
    let output = tokio::process::Command::new("git")
        .args(["branch", "--format=%(refname:short)"])
        .current_dir(&project_path)
        .output()
        .await
        .map_err(|e| ChannelError::BadRequest(format!("git branch: {e}")))?;
    if !output.status.success() {
        return Err(ChannelError::BadRequest(format!(
            "git branch failed: {}",
            String::from_utf8_lossy(&output.stderr)
        )));
    }
    let branches: Vec<String> = String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    let recommended_trunk = branches
        .iter()
        .find(|b| b.as_str() == "main")
        .or_else(|| branches.iter().find(|b| b.as_str() == "master"))
        .or_else(|| branches.first())
        .cloned();
    Ok(json!({"branches": branches, "recommendedTrunk": recommended_trunk}))
}

fn project_secrets_get(args: &[Value], state: &AppState) -> Result<Value, ChannelError> {
    let project_path = arg_str(args, 0)?;
    Ok(serde_json::to_value(state.config.get_project_secrets(&project_path)?)?)
}

fn project_secrets_update(args: &[Value], state: &AppState) -> Result<Value, ChannelError> {
    let project_path = arg_str(args, 0)?;
    let secrets: Vec<Secret> = serde_json::from_value(arg(args, 1)?.clone())?;
    state.config.update_project_secrets(&project_path, secrets)?;
    Ok(json!("ok"))
}
