// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `ws project` — project-scoped branch listing and secrets.

use anyhow::Result;
use clap::{Args, Subcommand};
use serde_json::json;

use crate::client::DaemonClient;
use crate::output::{format_or_json, OutputFormat};

#[derive(Args)]
pub struct ProjectArgs {
    #[command(subcommand)]
    pub command: ProjectCommand,
}

#[derive(Subcommand)]
pub enum ProjectCommand {
    /// List projects with at least one workspace
    List,
    /// List git branches in a project, with a recommended trunk
    ListBranches { project_path: String },
    /// Print a project's stored secrets (values included)
    SecretsGet { project_path: String },
    /// Replace a project's secrets with `key=value` pairs
    SecretsSet {
        project_path: String,
        /// `key=value`; repeat per secret. Passing none clears all secrets.
        #[arg(value_parser = parse_secret)]
        secret: Vec<(String, String)>,
    },
}

fn parse_secret(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=').map(|(k, v)| (k.to_string(), v.to_string())).ok_or_else(|| format!("expected key=value, got {raw:?}"))
}

pub async fn handle(command: ProjectCommand, client: &DaemonClient, format: OutputFormat) -> Result<()> {
    match command {
        ProjectCommand::List => {
            let paths = client.list_projects().await?;
            format_or_json(&paths, format, |paths| paths.join("\n"))
        }
        ProjectCommand::ListBranches { project_path } => {
            let result = client.list_branches(&project_path).await?;
            format_or_json(&result, format, |result| {
                let branches = result.get("branches").and_then(serde_json::Value::as_array).cloned().unwrap_or_default();
                let recommended = result.get("recommendedTrunk").and_then(serde_json::Value::as_str).unwrap_or("(none)");
                let mut out = format!("recommended trunk: {recommended}\n");
                for b in branches {
                    if let Some(b) = b.as_str() {
                        out.push_str(b);
                        out.push('\n');
                    }
                }
                out
            })
        }
        ProjectCommand::SecretsGet { project_path } => {
            let secrets = client.get_secrets(&project_path).await?;
            format_or_json(&secrets, format, |secrets| {
                secrets.iter().map(|s| format!("{}={}", s.key, s.value)).collect::<Vec<_>>().join("\n")
            })
        }
        ProjectCommand::SecretsSet { project_path, secret } => {
            let secrets = secret.into_iter().map(|(key, value)| ws_core::Secret { key, value }).collect();
            client.update_secrets(&project_path, secrets).await?;
            format_or_json(&json!("ok"), format, |_| "secrets updated".to_string())
        }
    }
}
