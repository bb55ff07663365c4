// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SSH `Runtime`: every operation shells out to the system `ssh`/`scp`
//! binaries with connection multiplexing, rather than linking an SSH
//! client library (spec.md §4.1.2).

pub mod mux;
pub mod quote;
pub mod sync;

use crate::error::RuntimeError;
use crate::exec::{non_interactive_env_mask, ByteSink, ByteStream, ExecOpts, ExecStream, ExitOutcome};
use crate::init_logger::InitLogger;
use crate::runtime::{
    CreateWorkspaceParams, CreateWorkspaceResult, FileStat, InitWorkspaceParams, Runtime,
};
use async_trait::async_trait;
use futures_util::StreamExt;
use mux::{get_control_path, SshConnectionConfig};
use quote::{escape_for_shell, expand_tilde_for_remote, wrap_remote_command};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;

/// Default timeouts used where `ExecOpts` doesn't specify one
/// (spec.md §5).
pub const DEFAULT_RW_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_STAT_TIMEOUT_SECS: u64 = 10;
pub const INIT_HOOK_TIMEOUT_SECS: u64 = 3600;

pub struct SshRuntime {
    cfg: SshConnectionConfig,
    tmpdir: String,
}

impl SshRuntime {
    pub fn new(cfg: SshConnectionConfig) -> Self {
        let tmpdir = std::env::var("TMPDIR").unwrap_or_else(|_| "/tmp".to_string());
        Self { cfg, tmpdir }
    }

    fn control_path(&self) -> String {
        get_control_path(&self.tmpdir, &self.cfg)
    }

    fn ssh_args(&self) -> Vec<String> {
        let mut args = mux::control_master_args(&self.control_path());
        if let Some(port) = self.cfg.port {
            args.push("-p".to_string());
            args.push(port.to_string());
        }
        if let Some(identity) = &self.cfg.identity_file {
            args.push("-i".to_string());
            args.push(identity.clone());
        }
        args.push(self.cfg.host.clone());
        args
    }

    fn resolve_path(&self, path: &str) -> String {
        format!("{}/{}", self.cfg.src_base_dir.trim_end_matches('/'), path.trim_start_matches('/'))
    }

    /// `readlink -m <path>` on the remote to canonicalize a path
    /// without requiring it to exist.
    pub async fn canonicalize_remote(&self, path: &str) -> Result<String, RuntimeError> {
        let expanded = expand_tilde_for_remote(path);
        let mut args = self.ssh_args();
        args.push(format!("readlink -m {}", escape_for_shell(&expanded)));
        let output = Command::new("ssh")
            .args(&args)
            .output()
            .await
            .map_err(|e| RuntimeError::network(format!("ssh readlink -m: {e}")))?;
        if !output.status.success() {
            return Err(RuntimeError::network(format!(
                "readlink -m failed: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[cfg(unix)]
fn classify_status(status: std::process::ExitStatus) -> ExitOutcome {
    use std::os::unix::process::ExitStatusExt;
    match status.code() {
        Some(code) => ExitOutcome::Code(code),
        None => ExitOutcome::Signalled(status.signal().unwrap_or(0)),
    }
}

#[cfg(not(unix))]
fn classify_status(status: std::process::ExitStatus) -> ExitOutcome {
    ExitOutcome::Code(status.code().unwrap_or(-1))
}

async fn wait_for_ssh_exit(
    mut child: Child,
    cancel: Option<CancellationToken>,
    timeout: Option<Duration>,
    start: Instant,
) -> (ExitOutcome, Duration) {
    let cancel = cancel.unwrap_or_default();
    let timeout_fut: futures::future::BoxFuture<'static, ()> = match timeout {
        Some(d) => Box::pin(tokio::time::sleep(d)),
        None => Box::pin(futures::future::pending()),
    };
    tokio::pin!(timeout_fut);

    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            let _ = child.start_kill();
            let _ = child.wait().await;
            ExitOutcome::Aborted
        }
        _ = &mut timeout_fut => {
            let _ = child.start_kill();
            let _ = child.wait().await;
            ExitOutcome::TimedOut
        }
        status = child.wait() => {
            match status {
                Ok(status) => classify_status(status),
                Err(_) => ExitOutcome::Signalled(0),
            }
        }
    };
    (outcome, start.elapsed())
}

fn reader_to_byte_stream<R>(reader: R) -> ByteStream
where
    R: tokio::io::AsyncRead + Send + 'static,
{
    Box::pin(ReaderStream::new(reader).filter_map(|chunk| async move { chunk.ok() }))
}

#[async_trait]
impl Runtime for SshRuntime {
    async fn exec(&self, cmd: &str, opts: ExecOpts) -> Result<ExecStream, RuntimeError> {
        let start = Instant::now();
        let env: Vec<(String, String)> = opts
            .env
            .iter()
            .chain(non_interactive_env_mask().iter())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let remote_cmd = wrap_remote_command(&opts.cwd, &env, cmd);

        let mut args = self.ssh_args();
        args.push(remote_cmd);

        let mut child = Command::new("ssh")
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| RuntimeError::network(format!("ssh exec spawn: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RuntimeError::exec("spawned ssh child is missing its piped stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| RuntimeError::exec("spawned ssh child is missing its piped stderr"))?;
        let stdin = child.stdin.take().map(|s| Box::pin(s) as ByteSink);

        let cancel = opts.cancel.clone();
        let timeout = opts.timeout_secs.map(Duration::from_secs);
        let (outcome_tx, outcome_rx) = tokio::sync::oneshot::channel();
        let (duration_tx, duration_rx) = tokio::sync::oneshot::channel();

        tokio::spawn(async move {
            let (outcome, duration) = wait_for_ssh_exit(child, cancel, timeout, start).await;
            let _ = outcome_tx.send(outcome);
            let _ = duration_tx.send(duration);
        });

        Ok(ExecStream {
            stdout: reader_to_byte_stream(stdout),
            stderr: reader_to_byte_stream(stderr),
            stdin,
            exit_code: Box::pin(async move { outcome_rx.await.unwrap_or(ExitOutcome::Signalled(0)) }),
            duration: Box::pin(async move { duration_rx.await.unwrap_or_default() }),
        })
    }

    async fn read_file(&self, path: &str) -> Result<ByteStream, RuntimeError> {
        let remote_path = expand_tilde_for_remote(path);
        let mut args = self.ssh_args();
        args.push(format!("cat {}", escape_for_shell(&remote_path)));
        let output = Command::new("ssh")
            .args(&args)
            .output()
            .await
            .map_err(|e| RuntimeError::network(format!("ssh cat: {e}")))?;
        if !output.status.success() {
            return Err(RuntimeError::file_io(format!(
                "{path}: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        let bytes = bytes::Bytes::from(output.stdout);
        Ok(Box::pin(tokio_stream::once(bytes)))
    }

    async fn write_file(&self, path: &str) -> Result<ByteSink, RuntimeError> {
        let remote_path = expand_tilde_for_remote(path);
        let nonce = {
            use std::time::{SystemTime, UNIX_EPOCH};
            SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos()
        };
        let tmp_path = format!("{remote_path}.tmp.{nonce:x}");

        let mkdir_parent = format!(
            "mkdir -p $(dirname {}) && cat > {}",
            escape_for_shell(&remote_path),
            escape_for_shell(&tmp_path),
        );
        let mut args = self.ssh_args();
        args.push(mkdir_parent);

        let child = Command::new("ssh")
            .args(&args)
            .stdin(Stdio::piped())
            .spawn()
            .map_err(|e| RuntimeError::network(format!("ssh cat > spawn: {e}")))?;

        Ok(Box::pin(RemoteAtomicWriteSink {
            child: Some(child),
            remote_path,
            tmp_path,
            ssh_args: self.ssh_args(),
            finished: false,
        }))
    }

    async fn stat(&self, path: &str) -> Result<FileStat, RuntimeError> {
        let remote_path = expand_tilde_for_remote(path);
        let mut args = self.ssh_args();
        args.push(format!(
            "stat -c '%s %Y %F' {} 2>/dev/null || stat -f '%z %m %HT' {}",
            escape_for_shell(&remote_path),
            escape_for_shell(&remote_path)
        ));
        let output = Command::new("ssh")
            .args(&args)
            .output()
            .await
            .map_err(|e| RuntimeError::network(format!("ssh stat: {e}")))?;
        if !output.status.success() {
            return Err(RuntimeError::file_io(format!("{path}: not found")));
        }
        let text = String::from_utf8_lossy(&output.stdout);
        let mut fields = text.split_whitespace();
        let size: u64 = fields.next().and_then(|s| s.parse().ok()).unwrap_or(0);
        let mtime_secs: i64 = fields.next().and_then(|s| s.parse().ok()).unwrap_or(0);
        let kind = fields.collect::<Vec<_>>().join(" ").to_lowercase();
        let is_directory = kind.contains("directory");
        let modified_time = chrono::DateTime::<chrono::Utc>::from_timestamp(mtime_secs, 0)
            .unwrap_or_else(chrono::Utc::now);
        Ok(FileStat { size, modified_time, is_directory })
    }

    async fn create_workspace(
        &self,
        params: CreateWorkspaceParams,
    ) -> Result<CreateWorkspaceResult, RuntimeError> {
        let workspace_path = self.resolve_path(&params.workspace_name);
        let check = {
            let mut args = self.ssh_args();
            args.push(format!("test -e {}", escape_for_shell(&workspace_path)));
            Command::new("ssh").args(&args).status().await
        };
        if matches!(check, Ok(status) if status.success()) {
            return Err(RuntimeError::exec(format!(
                "workspace path already exists: {workspace_path}"
            )));
        }
        Ok(CreateWorkspaceResult { workspace_path })
    }

    async fn init_workspace(
        &self,
        params: InitWorkspaceParams,
        logger: &dyn InitLogger,
    ) -> Result<(), RuntimeError> {
        logger.log_step("syncing project to remote");
        let real_origin = {
            let output = Command::new("git")
                .args(["remote", "get-url", "origin"])
                .current_dir(&params.project_path)
                .output()
                .await
                .ok();
            output.and_then(|o| {
                if o.status.success() {
                    Some(String::from_utf8_lossy(&o.stdout).trim().to_string())
                } else {
                    None
                }
            })
        };

        sync::sync_project_to_remote(
            &self.cfg,
            &self.control_path(),
            &params.project_path,
            &params.workspace_path,
            real_origin.as_deref(),
        )
        .await?;

        logger.log_step("checking out branch");
        let checkout_cmd = format!(
            "git checkout {branch} 2>/dev/null || git checkout -b {branch} {trunk}",
            branch = escape_for_shell(&params.branch),
            trunk = escape_for_shell(&params.trunk),
        );
        let mut args = self.ssh_args();
        args.push(wrap_remote_command(&params.workspace_path, &[], &checkout_cmd));
        let _ = Command::new("ssh").args(&args).status().await;

        let hook_path = std::path::Path::new(&params.project_path).join(".cmux/init");
        if !hook_path.exists() {
            logger.log_complete(None);
            return Ok(());
        }

        logger.log_step("running .cmux/init");
        let exit_code = self.run_remote_init_hook(&params.workspace_path, logger).await;
        logger.log_complete(Some(exit_code));
        Ok(())
    }

    async fn rename_workspace(
        &self,
        _project_path: &str,
        old_name: &str,
        new_name: &str,
    ) -> Result<(), RuntimeError> {
        let old_path = self.resolve_path(old_name);
        let new_path = self.resolve_path(new_name);
        let mut args = self.ssh_args();
        args.push(format!("mv {} {}", escape_for_shell(&old_path), escape_for_shell(&new_path)));
        let output = Command::new("ssh")
            .args(&args)
            .output()
            .await
            .map_err(|e| RuntimeError::network(format!("ssh mv: {e}")))?;
        if !output.status.success() {
            return Err(RuntimeError::exec(format!(
                "remote rename failed: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(())
    }

    async fn delete_workspace(
        &self,
        _project_path: &str,
        name: &str,
        _force: bool,
    ) -> Result<(), RuntimeError> {
        let path = self.resolve_path(name);
        let nonce = {
            use std::time::{SystemTime, UNIX_EPOCH};
            SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos()
        };
        let tmp_path = format!("{path}.deleted.{nonce:x}");
        let remote_cmd = format!(
            "mv {} {} && nohup rm -rf {} >/dev/null 2>&1 &",
            escape_for_shell(&path),
            escape_for_shell(&tmp_path),
            escape_for_shell(&tmp_path),
        );
        let mut args = self.ssh_args();
        args.push(remote_cmd);
        let output = Command::new("ssh")
            .args(&args)
            .output()
            .await
            .map_err(|e| RuntimeError::network(format!("ssh rm: {e}")))?;
        if !output.status.success() {
            return Err(RuntimeError::exec(format!(
                "remote delete failed: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(())
    }
}

impl SshRuntime {
    async fn run_remote_init_hook(&self, workspace_path: &str, logger: &dyn InitLogger) -> i32 {
        let hook_cmd = "bash .cmux/init";
        let env: Vec<(String, String)> = non_interactive_env_mask().into_iter().collect();
        let remote_cmd = wrap_remote_command(workspace_path, &env, hook_cmd);
        let mut args = self.ssh_args();
        args.push(remote_cmd);

        let mut child = match Command::new("ssh")
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(c) => c,
            Err(e) => {
                logger.log_stderr(&format!("failed to spawn remote init hook: {e}"));
                return -1;
            }
        };

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let stdout_task = stdout.map(|s| {
            tokio::spawn(async move {
                use tokio::io::AsyncBufReadExt;
                let mut lines = tokio::io::BufReader::new(s).lines();
                let mut out = Vec::new();
                while let Ok(Some(line)) = lines.next_line().await {
                    out.push(line);
                }
                out
            })
        });
        let stderr_task = stderr.map(|s| {
            tokio::spawn(async move {
                use tokio::io::AsyncBufReadExt;
                let mut lines = tokio::io::BufReader::new(s).lines();
                let mut out = Vec::new();
                while let Ok(Some(line)) = lines.next_line().await {
                    out.push(line);
                }
                out
            })
        });

        let status = tokio::time::timeout(
            Duration::from_secs(INIT_HOOK_TIMEOUT_SECS),
            child.wait(),
        )
        .await;

        if let Some(task) = stdout_task {
            if let Ok(lines) = task.await {
                for line in lines {
                    logger.log_stdout(&line);
                }
            }
        }
        if let Some(task) = stderr_task {
            if let Ok(lines) = task.await {
                for line in lines {
                    logger.log_stderr(&line);
                }
            }
        }

        match status {
            Ok(Ok(status)) => status.code().unwrap_or(-1),
            Ok(Err(e)) => {
                logger.log_stderr(&format!("remote init hook wait failed: {e}"));
                -1
            }
            Err(_) => {
                logger.log_stderr("remote init hook timed out after 3600s");
                -1
            }
        }
    }
}

/// Atomic write-file sink for the SSH runtime: bytes stream into
/// `<path>.tmp.<nonce>` via piped `ssh ... cat >`, and a separate `mv`
/// round-trip finalizes on success or unlinks on abort.
struct RemoteAtomicWriteSink {
    child: Option<Child>,
    remote_path: String,
    tmp_path: String,
    ssh_args: Vec<String>,
    finished: bool,
}

impl RemoteAtomicWriteSink {
    pub async fn finish(mut self) -> Result<(), RuntimeError> {
        if let Some(mut child) = self.child.take() {
            if let Some(mut stdin) = child.stdin.take() {
                let _ = stdin.shutdown().await;
            }
            let status = child
                .wait()
                .await
                .map_err(|e| RuntimeError::network(format!("ssh cat > wait: {e}")))?;
            if !status.success() {
                return Err(RuntimeError::file_io("remote write failed"));
            }
        }
        self.finished = true;
        let mut args = self.ssh_args.clone();
        args.push(format!(
            "mv {} {}",
            escape_for_shell(&self.tmp_path),
            escape_for_shell(&self.remote_path)
        ));
        let status = Command::new("ssh")
            .args(&args)
            .status()
            .await
            .map_err(|e| RuntimeError::network(format!("ssh mv: {e}")))?;
        if !status.success() {
            return Err(RuntimeError::file_io("remote atomic rename failed"));
        }
        Ok(())
    }

    pub async fn abort(mut self: std::pin::Pin<&mut Self>, _reason: &str) {
        self.finished = true;
        if let Some(mut child) = self.child.take() {
            let _ = child.start_kill();
            let _ = child.wait().await;
        }
        let mut args = self.ssh_args.clone();
        args.push(format!("rm -f {}", escape_for_shell(&self.tmp_path)));
        let _ = Command::new("ssh").args(&args).status().await;
    }
}

impl tokio::io::AsyncWrite for RemoteAtomicWriteSink {
    fn poll_write(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> std::task::Poll<std::io::Result<usize>> {
        let this = self.get_mut();
        match this.child.as_mut().and_then(|c| c.stdin.as_mut()) {
            Some(stdin) => std::pin::Pin::new(stdin).poll_write(cx, buf),
            None => std::task::Poll::Ready(Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "write after close/abort",
            ))),
        }
    }

    fn poll_flush(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        let this = self.get_mut();
        match this.child.as_mut().and_then(|c| c.stdin.as_mut()) {
            Some(stdin) => std::pin::Pin::new(stdin).poll_flush(cx),
            None => std::task::Poll::Ready(Ok(())),
        }
    }

    fn poll_shutdown(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        let this = self.get_mut();
        if this.finished {
            return std::task::Poll::Ready(Ok(()));
        }
        match this.child.as_mut().and_then(|c| c.stdin.as_mut()) {
            Some(stdin) => std::pin::Pin::new(stdin).poll_shutdown(cx),
            None => std::task::Poll::Ready(Ok(())),
        }
    }
}
