// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `ws workspace` — lifecycle, chat, and bash-exec commands against a
//! single workspace.

use anyhow::Result;
use clap::{Args, Subcommand};
use serde_json::json;

use crate::client::DaemonClient;
use crate::color;
use crate::exit_error::ExitError;
use crate::output::{format_or_json, format_time_ago, handle_list_with_limit, OutputFormat};
use crate::table::{Column, Table};

const DEFAULT_LIST_LIMIT: usize = 20;

#[derive(Args)]
pub struct WorkspaceArgs {
    #[command(subcommand)]
    pub command: WorkspaceCommand,
}

#[derive(Subcommand)]
pub enum WorkspaceCommand {
    /// List known workspaces
    List {
        #[arg(long, default_value_t = DEFAULT_LIST_LIMIT)]
        limit: usize,
        #[arg(long)]
        no_limit: bool,
    },
    /// Show a single workspace's metadata
    Show { id: String },
    /// Create a new workspace
    Create {
        project_path: String,
        name: String,
        /// Base branch the workspace's worktree is created from
        trunk: String,
        /// Run commands over SSH instead of the local runtime
        #[arg(long)]
        ssh_host: Option<String>,
        #[arg(long)]
        ssh_src_base_dir: Option<String>,
        #[arg(long)]
        ssh_identity_file: Option<String>,
        #[arg(long)]
        ssh_port: Option<u16>,
    },
    /// Rename a workspace
    Rename { id: String, new_name: String },
    /// Delete a workspace and its worktree
    Remove {
        id: String,
        /// Force removal even if the underlying worktree is dirty
        #[arg(long)]
        force: bool,
    },
    /// Send a chat message and start (or resume) a model stream
    Send {
        id: String,
        text: String,
        #[arg(long)]
        model: Option<String>,
        /// Truncate history to this message and resend in its place
        #[arg(long)]
        edit_message_id: Option<String>,
    },
    /// Cancel the workspace's in-flight model stream, if any
    Interrupt { id: String },
    /// Run a one-off shell command inside the workspace
    Exec {
        id: String,
        command: String,
        #[arg(long)]
        timeout_secs: Option<u64>,
        #[arg(long)]
        niceness: Option<i32>,
    },
    /// Print the chat history
    History { id: String },
    /// Replay history then tail live chat events until interrupted
    Watch { id: String },
    /// Replace history with a single summary message (compaction)
    ReplaceHistory { id: String, summary: String },
}

pub async fn handle(command: WorkspaceCommand, client: &DaemonClient, format: OutputFormat) -> Result<()> {
    match command {
        WorkspaceCommand::List { limit, no_limit } => handle_list(client, limit, no_limit, format).await,
        WorkspaceCommand::Show { id } => handle_show(client, &id, format).await,
        WorkspaceCommand::Create { project_path, name, trunk, ssh_host, ssh_src_base_dir, ssh_identity_file, ssh_port } => {
            handle_create(client, &project_path, &name, &trunk, ssh_host, ssh_src_base_dir, ssh_identity_file, ssh_port, format)
                .await
        }
        WorkspaceCommand::Rename { id, new_name } => handle_rename(client, &id, &new_name, format).await,
        WorkspaceCommand::Remove { id, force } => handle_remove(client, &id, force).await,
        WorkspaceCommand::Send { id, text, model, edit_message_id } => {
            client.send_message(&id, &text, model.as_deref(), edit_message_id.as_deref()).await?;
            println!("{}", color::context("message queued"));
            Ok(())
        }
        WorkspaceCommand::Interrupt { id } => {
            client.interrupt_stream(&id).await?;
            Ok(())
        }
        WorkspaceCommand::Exec { id, command, timeout_secs, niceness } => {
            handle_exec(client, &id, &command, timeout_secs, niceness, format).await
        }
        WorkspaceCommand::History { id } => handle_history(client, &id, format).await,
        WorkspaceCommand::Watch { id } => handle_watch(client, &id).await,
        WorkspaceCommand::ReplaceHistory { id, summary } => {
            client.replace_history(&id, json!(summary)).await?;
            Ok(())
        }
    }
}

async fn handle_list(client: &DaemonClient, limit: usize, no_limit: bool, format: OutputFormat) -> Result<()> {
    let workspaces = client.list_workspaces().await?;
    handle_list_with_limit(workspaces, limit, no_limit, format, |rows| {
        let mut table = Table::new(vec![
            Column::muted("ID").with_max(12),
            Column::left("NAME"),
            Column::left("PROJECT"),
            Column::right("CREATED"),
        ]);
        for w in rows {
            table.row(vec![w.id.to_string(), w.name.clone(), w.project_path.clone(), format_time_ago(w.created_at)]);
        }
        table.render()
    })
}

async fn handle_show(client: &DaemonClient, id: &str, format: OutputFormat) -> Result<()> {
    match client.get_workspace(id).await? {
        Some(workspace) => format_or_json(&workspace, format, |w| {
            format!(
                "{}\n  name: {}\n  project: {}\n  path: {}\n  created: {}",
                color::header(&w.id.to_string()),
                w.name,
                w.project_path,
                w.path,
                format_time_ago(w.created_at)
            )
        }),
        None => Err(ExitError::new(3, format!("workspace {id} not found")).into()),
    }
}

#[allow(clippy::too_many_arguments)]
async fn handle_create(
    client: &DaemonClient,
    project_path: &str,
    name: &str,
    trunk: &str,
    ssh_host: Option<String>,
    ssh_src_base_dir: Option<String>,
    ssh_identity_file: Option<String>,
    ssh_port: Option<u16>,
    format: OutputFormat,
) -> Result<()> {
    let runtime_config = ssh_host.map(|host| {
        json!({
            "type": "ssh",
            "host": host,
            "srcBaseDir": ssh_src_base_dir.unwrap_or_default(),
            "identityFile": ssh_identity_file,
            "port": ssh_port,
        })
    });
    let result = client.create_workspace(project_path, name, trunk, runtime_config).await?;
    format_or_json(&result, format, |_| format!("created workspace {}", color::header(name)))
}

async fn handle_rename(client: &DaemonClient, id: &str, new_name: &str, format: OutputFormat) -> Result<()> {
    let result = client.rename_workspace(id, new_name).await?;
    format_or_json(&result, format, |_| format!("renamed to {}", color::header(new_name)))
}

async fn handle_remove(client: &DaemonClient, id: &str, force: bool) -> Result<()> {
    client.remove_workspace(id, force).await?;
    println!("removed {id}");
    Ok(())
}

async fn handle_exec(
    client: &DaemonClient,
    id: &str,
    command: &str,
    timeout_secs: Option<u64>,
    niceness: Option<i32>,
    format: OutputFormat,
) -> Result<()> {
    let result = client.execute_bash(id, command, timeout_secs, niceness).await?;
    let success = result.get("success").and_then(serde_json::Value::as_bool).unwrap_or(false);
    let output = result.get("output").and_then(serde_json::Value::as_str).unwrap_or_default();
    format_or_json(&result, format, |_| output.to_string())?;
    if !success {
        return Err(ExitError::new(1, format!("command failed in workspace {id}")).into());
    }
    Ok(())
}

/// Subscribes to `workspace:chat` and prints every frame (history
/// replay followed by live events) until the daemon closes the
/// socket or the process is interrupted.
async fn handle_watch(client: &DaemonClient, id: &str) -> Result<()> {
    let mut stream = client.subscribe_chat(id).await?;
    loop {
        tokio::select! {
            frame = stream.next_frame() => {
                match frame? {
                    Some(frame) if frame.channel == "error" => {
                        let message = frame.args.first().and_then(serde_json::Value::as_str).unwrap_or_default();
                        eprintln!("{} {message}", color::muted("error:"));
                    }
                    Some(frame) => {
                        for arg in &frame.args {
                            println!("{}", serde_json::to_string(arg)?);
                        }
                    }
                    None => break,
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    Ok(())
}

async fn handle_history(client: &DaemonClient, id: &str, format: OutputFormat) -> Result<()> {
    let history = client.get_history(id).await?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&history)?),
        OutputFormat::Text => {
            for message in &history {
                let role = color::muted(match message.role {
                    ws_core::Role::User => "user",
                    ws_core::Role::Assistant => "assistant",
                });
                println!("{role}  {}", message.text_content());
            }
        }
    }
    Ok(())
}
