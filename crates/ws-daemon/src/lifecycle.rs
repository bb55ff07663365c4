// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `WorkspaceLifecycle`: create/rename/delete, the only code path that
//! touches both a `Runtime` and `ConfigStore` for a single workspace
//! (spec.md §4.8).

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::warn;

use ws_core::{
    validate_trunk, validate_workspace_name, Clock, ErrorKind, HasErrorKind, RuntimeConfig,
    StreamEvent, ValidationError, Workspace, WorkspaceId,
};
use ws_runtime::{ChannelInitLogger, CreateWorkspaceParams, InitWorkspaceParams, Runtime, RuntimeError};
use ws_storage::{ConfigStore, StorageError, WorkspaceRecord};

use crate::session_registry::SessionRegistry;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("workspace {0} not found")]
    NotFound(String),
    #[error("workspace {0} is streaming")]
    Busy(String),
    #[error("a workspace named {0:?} already exists in this project")]
    Conflict(String),
    #[error("validation: {0}")]
    Validation(#[from] ValidationError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),
}

impl HasErrorKind for LifecycleError {
    fn kind(&self) -> ErrorKind {
        match self {
            LifecycleError::NotFound(_) => ErrorKind::NotFound,
            LifecycleError::Busy(_) => ErrorKind::Busy,
            LifecycleError::Conflict(_) => ErrorKind::Conflict,
            LifecycleError::Validation(_) => ErrorKind::Validation,
            LifecycleError::Storage(e) => e.kind(),
            LifecycleError::Runtime(e) => e.kind(),
        }
    }
}

pub struct WorkspaceLifecycle {
    config: Arc<ConfigStore>,
    sessions: Arc<SessionRegistry>,
    clock: Arc<dyn Clock>,
}

impl WorkspaceLifecycle {
    pub fn new(config: Arc<ConfigStore>, sessions: Arc<SessionRegistry>, clock: Arc<dyn Clock>) -> Self {
        Self { config, sessions, clock }
    }

    /// Validates inputs, runs `Runtime::create_workspace` +
    /// `init_workspace`, and only touches `ConfigStore` once both
    /// succeed. The workspace's `AgentSession` is created up front
    /// (rather than on first subscription) so init-hook progress has
    /// somewhere to land: a brand-new subscriber's replay picks it up
    /// via `AgentSession::init_snapshot`.
    pub async fn create(
        &self,
        project_path: String,
        name: String,
        trunk: String,
        runtime_config: Option<RuntimeConfig>,
    ) -> Result<Workspace, LifecycleError> {
        validate_workspace_name(&name)?;
        validate_trunk(&trunk)?;

        if self.find_in_project(&project_path, &name)?.is_some() {
            return Err(LifecycleError::Conflict(name));
        }

        let runtime_config = runtime_config.unwrap_or_default();
        let runtime = ws_runtime::runtime_for(&runtime_config);
        let id = self.config.generate_stable_id();
        let workspace_path = self.config.get_workspace_path(&project_path, &name);
        let session = self.sessions.get_or_create(&id);

        let create_result = runtime
            .create_workspace(CreateWorkspaceParams {
                project_path: project_path.clone(),
                workspace_name: name.clone(),
                branch: name.clone(),
                trunk: trunk.clone(),
            })
            .await;
        if let Err(e) = create_result {
            self.sessions.dispose(&id);
            return Err(e.into());
        }

        session.apply_and_publish(&StreamEvent::InitStart);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let forwarder_session = Arc::clone(&session);
        let forwarder = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                forwarder_session.apply_and_publish(&event);
            }
        });
        let logger = ChannelInitLogger::new(tx);
        let init_result = runtime
            .init_workspace(
                InitWorkspaceParams {
                    project_path: project_path.clone(),
                    workspace_path: workspace_path.clone(),
                    branch: name.clone(),
                    trunk: trunk.clone(),
                },
                &logger,
            )
            .await;
        drop(logger);
        let _ = forwarder.await;

        if let Err(e) = init_result {
            self.sessions.dispose(&id);
            if let Err(cleanup_err) = runtime.delete_workspace(&project_path, &name, true).await {
                warn!(workspace_id = %id, error = %cleanup_err, "failed to roll back workspace directory after init failure");
            }
            return Err(e.into());
        }

        let created_at = self.clock.now();
        self.config.edit_config(|doc| {
            doc.projects.entry(project_path.clone()).or_default().workspaces.push(WorkspaceRecord {
                id: id.clone(),
                name: name.clone(),
                created_at,
                runtime_config: runtime_config.clone(),
            });
        })?;

        let workspace = Workspace {
            id,
            name,
            project_path,
            path: workspace_path,
            created_at,
            runtime_config,
        };
        session.emit_metadata(Some(workspace.clone()));
        Ok(workspace)
    }

    /// Renames the workspace's worktree/directory and its `ConfigStore`
    /// record; the id is preserved. Rejected while a stream is active
    /// (spec.md §5).
    pub async fn rename(&self, id: &WorkspaceId, new_name: String) -> Result<Workspace, LifecycleError> {
        let workspace = self.require(id)?;

        if let Some(session) = self.sessions.get(id) {
            if session.is_streaming() {
                return Err(LifecycleError::Busy(id.to_string()));
            }
        }

        validate_workspace_name(&new_name)?;
        if let Some(existing) = self.find_in_project(&workspace.project_path, &new_name)? {
            if &existing.id != id {
                return Err(LifecycleError::Conflict(new_name));
            }
        }

        let runtime = ws_runtime::runtime_for(&workspace.runtime_config);
        runtime.rename_workspace(&workspace.project_path, &workspace.name, &new_name).await?;

        self.config.edit_config(|doc| -> Result<(), StorageError> {
            let project = doc
                .projects
                .get_mut(&workspace.project_path)
                .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
            let record = project
                .workspaces
                .iter_mut()
                .find(|r| &r.id == id)
                .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
            record.name = new_name.clone();
            Ok(())
        })??;

        let path = self.config.get_workspace_path(&workspace.project_path, &new_name);
        let renamed = Workspace { id: id.clone(), name: new_name, path, ..workspace };
        if let Some(session) = self.sessions.get(id) {
            session.emit_metadata(Some(renamed.clone()));
        }
        Ok(renamed)
    }

    /// Removes the workspace's worktree/directory, drops its
    /// `AgentSession`, and removes its `ConfigStore` record. Any
    /// in-flight stream is interrupted first so the runtime delete
    /// doesn't race a process still writing into the worktree.
    pub async fn delete(&self, id: &WorkspaceId, force: bool) -> Result<(), LifecycleError> {
        let workspace = self.require(id)?;

        if let Some(session) = self.sessions.get(id) {
            session.interrupt_stream();
        }

        let runtime = ws_runtime::runtime_for(&workspace.runtime_config);
        runtime.delete_workspace(&workspace.project_path, &workspace.name, force).await?;

        self.sessions.dispose(id);
        self.config.edit_config(|doc| {
            if let Some(project) = doc.projects.get_mut(&workspace.project_path) {
                project.workspaces.retain(|r| &r.id != id);
            }
        })?;

        Ok(())
    }

    fn require(&self, id: &WorkspaceId) -> Result<Workspace, LifecycleError> {
        self.config
            .find_workspace(id)?
            .ok_or_else(|| LifecycleError::NotFound(id.to_string()))
    }

    fn find_in_project(
        &self,
        project_path: &str,
        name: &str,
    ) -> Result<Option<Workspace>, LifecycleError> {
        Ok(self
            .config
            .get_all_workspace_metadata()?
            .into_iter()
            .find(|w| w.project_path == project_path && w.name == name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ws_core::SystemClock;
    use ws_session::model::fake::FakeModelStreamFactory;
    use ws_session::{ModelStreamFactory, SubscriptionHub};
    use ws_storage::{HistoryStore, PartialStore};

    fn lifecycle() -> (tempfile::TempDir, tempfile::TempDir, WorkspaceLifecycle) {
        let config_dir = tempfile::tempdir().expect("tempdir");
        let session_dir = tempfile::tempdir().expect("tempdir");
        let config = Arc::new(ConfigStore::new(config_dir.path()));
        let history = Arc::new(HistoryStore::new(session_dir.path()));
        let partial = Arc::new(PartialStore::new(session_dir.path()));
        let hub = Arc::new(SubscriptionHub::new());
        let factory: Arc<dyn ModelStreamFactory> = Arc::new(FakeModelStreamFactory::new(vec![]));
        let sessions = Arc::new(SessionRegistry::new(history, partial, hub, factory));
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        (config_dir, session_dir, WorkspaceLifecycle::new(config, sessions, clock))
    }

    fn project_repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("tempdir");
        let run = |args: &[&str]| {
            std::process::Command::new("git")
                .args(args)
                .current_dir(dir.path())
                .output()
                .expect("git")
        };
        run(&["init", "-q"]);
        run(&["config", "user.email", "test@example.com"]);
        run(&["config", "user.name", "test"]);
        std::fs::write(dir.path().join("README.md"), "hi").expect("write");
        run(&["add", "."]);
        run(&["commit", "-q", "-m", "init"]);
        run(&["branch", "-M", "main"]);
        dir
    }

    #[tokio::test]
    async fn create_rejects_invalid_name_without_touching_config() {
        let (_cfg, _sess, lifecycle) = lifecycle();
        let result = lifecycle.create("/p".to_string(), "".to_string(), "main".to_string(), None).await;
        assert!(matches!(result, Err(LifecycleError::Validation(_))));
    }

    #[tokio::test]
    async fn create_then_rename_then_delete_roundtrips() {
        let (_cfg, _sess, lifecycle) = lifecycle();
        let repo = project_repo();
        let project_path = repo.path().to_string_lossy().to_string();

        let workspace = lifecycle
            .create(project_path.clone(), "feat".to_string(), "main".to_string(), None)
            .await
            .expect("create");
        assert_eq!(workspace.name, "feat");
        assert!(std::path::Path::new(&workspace.path).exists());

        let renamed = lifecycle.rename(&workspace.id, "feat2".to_string()).await.expect("rename");
        assert_eq!(renamed.name, "feat2");
        assert!(std::path::Path::new(&renamed.path).exists());

        lifecycle.delete(&workspace.id, true).await.expect("delete");
        assert!(lifecycle.require(&workspace.id).is_err());
    }

    #[tokio::test]
    async fn create_stamps_created_at_from_the_injected_clock() {
        let config_dir = tempfile::tempdir().expect("tempdir");
        let session_dir = tempfile::tempdir().expect("tempdir");
        let config = Arc::new(ConfigStore::new(config_dir.path()));
        let history = Arc::new(HistoryStore::new(session_dir.path()));
        let partial = Arc::new(PartialStore::new(session_dir.path()));
        let hub = Arc::new(SubscriptionHub::new());
        let factory: Arc<dyn ModelStreamFactory> = Arc::new(FakeModelStreamFactory::new(vec![]));
        let sessions = Arc::new(SessionRegistry::new(history, partial, hub, factory));
        let fake = ws_core::FakeClock::new();
        let frozen_at = chrono::DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .expect("valid timestamp")
            .with_timezone(&chrono::Utc);
        fake.set(frozen_at);
        let clock: Arc<dyn Clock> = Arc::new(fake);
        let lifecycle = WorkspaceLifecycle::new(config, sessions, clock);

        let repo = project_repo();
        let project_path = repo.path().to_string_lossy().to_string();
        let workspace = lifecycle
            .create(project_path, "feat".to_string(), "main".to_string(), None)
            .await
            .expect("create");

        assert_eq!(workspace.created_at, frozen_at);
    }

    #[tokio::test]
    async fn create_rejects_duplicate_name_in_same_project() {
        let (_cfg, _sess, lifecycle) = lifecycle();
        let repo = project_repo();
        let project_path = repo.path().to_string_lossy().to_string();

        lifecycle
            .create(project_path.clone(), "feat".to_string(), "main".to_string(), None)
            .await
            .expect("create");
        let second = lifecycle.create(project_path, "feat".to_string(), "main".to_string(), None).await;
        assert!(matches!(second, Err(LifecycleError::Conflict(_))));
    }
}
