// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transient per-workspace init-hook status (spec.md §3).

use serde::{Deserialize, Serialize};

/// Reserved history sequence the `workspace-init` displayable sorts
/// under: it must precede every real message.
pub const INIT_HISTORY_SEQUENCE: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InitStatus {
    Running,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitState {
    pub status: InitStatus,
    #[serde(rename = "hookPath")]
    pub hook_path: Option<String>,
    pub lines: Vec<String>,
    #[serde(rename = "exitCode")]
    pub exit_code: Option<i32>,
}

impl InitState {
    pub fn running(hook_path: Option<String>) -> Self {
        Self { status: InitStatus::Running, hook_path, lines: Vec::new(), exit_code: None }
    }

    pub fn push_line(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    pub fn finish(&mut self, exit_code: Option<i32>) {
        self.exit_code = exit_code;
        self.status = match exit_code {
            Some(0) | None => InitStatus::Success,
            Some(_) => InitStatus::Error,
        };
    }
}
