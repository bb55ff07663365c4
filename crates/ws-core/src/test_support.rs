// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test builders and proptest strategies shared by other crates' test
//! suites. Gated behind `test-support` so production builds never pay
//! for it.

use crate::id::WorkspaceId;
use crate::workspace::{RuntimeConfig, Workspace};
use chrono::Utc;

/// Build a `Workspace` with sensible test defaults, overriding only
/// what the test cares about.
pub struct WorkspaceBuilder {
    id: WorkspaceId,
    name: String,
    project_path: String,
    runtime_config: RuntimeConfig,
}

impl Default for WorkspaceBuilder {
    fn default() -> Self {
        Self {
            id: WorkspaceId::new(),
            name: "test-workspace".to_string(),
            project_path: "/tmp/project".to_string(),
            runtime_config: RuntimeConfig::Local,
        }
    }
}

impl WorkspaceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn project_path(mut self, path: impl Into<String>) -> Self {
        self.project_path = path.into();
        self
    }

    pub fn runtime_config(mut self, cfg: RuntimeConfig) -> Self {
        self.runtime_config = cfg;
        self
    }

    pub fn build(self) -> Workspace {
        let path = crate::project::workspace_path(&self.project_path, &self.name);
        Workspace {
            id: self.id,
            name: self.name,
            project_path: self.project_path,
            path,
            created_at: Utc::now(),
            runtime_config: self.runtime_config,
        }
    }
}

#[cfg(feature = "proptest")]
pub mod strategies {
    use proptest::prelude::*;

    /// Strategy generating strings that satisfy
    /// `[A-Za-z0-9][A-Za-z0-9._-]{0,62}`.
    pub fn valid_workspace_name() -> impl Strategy<Value = String> {
        "[A-Za-z0-9][A-Za-z0-9._-]{0,20}".prop_map(|s| s)
    }
}
