// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace identity, runtime binding, and materialized metadata.
//!
//! A workspace is an isolated (project, branch, runtime) triple with
//! its own chat history (spec.md §3, glossary). `id` is chosen at
//! creation and never changes; `name` is the user-visible label and
//! also the directory name under the project's worktree root.

use crate::id::WorkspaceId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a workspace's processes and files actually run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RuntimeConfig {
    Local,
    Ssh {
        host: String,
        #[serde(rename = "srcBaseDir")]
        src_base_dir: String,
        #[serde(rename = "identityFile", skip_serializing_if = "Option::is_none")]
        identity_file: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        port: Option<u16>,
    },
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig::Local
    }
}

/// Materialized workspace metadata: the single source of truth shape
/// returned by `ConfigStore::getAllWorkspaceMetadata` and the
/// `workspace:list` / `workspace:getInfo` IPC channels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: WorkspaceId,
    pub name: String,
    #[serde(rename = "projectPath")]
    pub project_path: String,
    /// Computed via `getWorkspacePath(projectPath, name)`; always kept
    /// in sync by `ConfigStore` on create/rename.
    pub path: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "runtimeConfig")]
    pub runtime_config: RuntimeConfig,
}

#[cfg(test)]
#[path = "workspace_tests.rs"]
mod tests;
