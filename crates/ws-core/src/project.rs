// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Project identity and per-project secrets.

use serde::{Deserialize, Serialize};

/// A project: a filesystem path containing a git repository, unique
/// key, plus per-project secrets available to workspace init hooks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub path: String,
    #[serde(default)]
    pub secrets: std::collections::BTreeMap<String, String>,
}

/// A single named secret, as exchanged over `project:secrets:*`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret {
    pub key: String,
    pub value: String,
}

/// Canonical workspace-directory path for `(projectPath, name)`.
///
/// All components MUST agree on this function (spec.md §4.2): it is
/// the single definition of where a workspace's worktree/clone lives.
/// Canonicalization is posix-style join with the trailing slash
/// stripped from `project_path`.
pub fn workspace_path(project_path: &str, name: &str) -> String {
    let trimmed = project_path.trim_end_matches('/');
    format!("{trimmed}/{name}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_trailing_slash_from_project_path() {
        assert_eq!(workspace_path("/p/", "feat"), "/p/feat");
        assert_eq!(workspace_path("/p", "feat"), "/p/feat");
    }
}
