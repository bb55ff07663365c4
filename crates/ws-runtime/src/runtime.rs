// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `Runtime` trait: a uniform streaming interface for process
//! execution and file I/O, implemented by [`crate::local::LocalRuntime`]
//! and [`crate::ssh::SshRuntime`] (spec.md §4.1).

use crate::error::RuntimeError;
use crate::exec::{ExecOpts, ExecStream};
use crate::init_logger::InitLogger;
use async_trait::async_trait;

#[derive(Debug, Clone)]
pub struct FileStat {
    pub size: u64,
    pub modified_time: chrono::DateTime<chrono::Utc>,
    pub is_directory: bool,
}

#[derive(Debug, Clone)]
pub struct CreateWorkspaceParams {
    pub project_path: String,
    pub workspace_name: String,
    pub branch: String,
    pub trunk: String,
}

#[derive(Debug, Clone)]
pub struct CreateWorkspaceResult {
    pub workspace_path: String,
}

#[derive(Debug, Clone)]
pub struct InitWorkspaceParams {
    pub project_path: String,
    pub workspace_path: String,
    pub branch: String,
    pub trunk: String,
}

/// Capability surface for exec / file-io / workspace-lifecycle on some
/// host (glossary). Owns no persistent state of its own.
#[async_trait]
pub trait Runtime: Send + Sync {
    async fn exec(&self, cmd: &str, opts: ExecOpts) -> Result<ExecStream, RuntimeError>;

    async fn read_file(&self, path: &str) -> Result<crate::exec::ByteStream, RuntimeError>;

    async fn write_file(&self, path: &str) -> Result<crate::exec::ByteSink, RuntimeError>;

    async fn stat(&self, path: &str) -> Result<FileStat, RuntimeError>;

    /// Idempotent guard: fails cleanly if the target path already
    /// exists (spec.md §4.1).
    async fn create_workspace(
        &self,
        params: CreateWorkspaceParams,
    ) -> Result<CreateWorkspaceResult, RuntimeError>;

    /// Runs project sync (SSH only), checks out the requested branch,
    /// and invokes the optional `.cmux/init` hook. Never fails solely
    /// because the hook failed (spec.md §4.1.3) — hook failure is
    /// reported through `logger.log_complete`, not via `Err`.
    async fn init_workspace(
        &self,
        params: InitWorkspaceParams,
        logger: &dyn InitLogger,
    ) -> Result<(), RuntimeError>;

    async fn rename_workspace(
        &self,
        project_path: &str,
        old_name: &str,
        new_name: &str,
    ) -> Result<(), RuntimeError>;

    async fn delete_workspace(
        &self,
        project_path: &str,
        name: &str,
        force: bool,
    ) -> Result<(), RuntimeError>;
}
