// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local and SSH process/file-I/O runtimes (spec.md §4.1).

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod error;
pub mod exec;
pub mod init_logger;
pub mod local;
pub mod runtime;
pub mod ssh;

pub use error::RuntimeError;
pub use exec::{non_interactive_env_mask, ByteSink, ByteStream, ExecOpts, ExecStream, ExitOutcome, EXIT_ABORTED, EXIT_TIMED_OUT};
pub use init_logger::{ChannelInitLogger, InitLogger, NoopInitLogger};
pub use local::LocalRuntime;
pub use runtime::{CreateWorkspaceParams, CreateWorkspaceResult, FileStat, InitWorkspaceParams, Runtime};
pub use ssh::mux::SshConnectionConfig;
pub use ssh::SshRuntime;

#[cfg(any(test, feature = "test-support"))]
pub use init_logger::CollectingInitLogger;

/// Builds the appropriate `Runtime` for a workspace's stored
/// `RuntimeConfig` (spec.md §3, §4.1).
pub fn runtime_for(config: &ws_core::RuntimeConfig) -> std::sync::Arc<dyn Runtime> {
    match config {
        ws_core::RuntimeConfig::Local => std::sync::Arc::new(LocalRuntime::new()),
        ws_core::RuntimeConfig::Ssh { host, src_base_dir, identity_file, port } => {
            std::sync::Arc::new(SshRuntime::new(SshConnectionConfig {
                host: host.clone(),
                port: *port,
                src_base_dir: src_base_dir.clone(),
                identity_file: identity_file.clone(),
            }))
        }
    }
}
