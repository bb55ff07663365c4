// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local-host `Runtime`: bash-invoked subprocess execution, direct
//! filesystem I/O, and `git worktree`-backed workspace lifecycle
//! (spec.md §4.1.1).

use crate::error::RuntimeError;
use crate::exec::{non_interactive_env_mask, ByteSink, ByteStream, ExecOpts, ExecStream, ExitOutcome};
use crate::init_logger::InitLogger;
use crate::runtime::{
    CreateWorkspaceParams, CreateWorkspaceResult, FileStat, InitWorkspaceParams, Runtime,
};
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures_util::StreamExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;

pub struct LocalRuntime;

impl LocalRuntime {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LocalRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the `bash`/`nice` invocation for `cmd` (spec.md §4.1.1):
/// when `niceness` is set, `nice` is invoked directly with the nice
/// level as an argument (no shell quoting), then `bash -c <cmd>`.
fn build_command(cmd: &str, opts: &ExecOpts) -> Command {
    let mut command = if let Some(niceness) = opts.niceness {
        let mut c = Command::new("nice");
        c.arg("-n").arg(niceness.to_string()).arg("bash").arg("-c").arg(cmd);
        c
    } else {
        let mut c = Command::new("bash");
        c.arg("-c").arg(cmd);
        c
    };

    if !opts.cwd.is_empty() {
        command.current_dir(&opts.cwd);
    }

    // Environment: process-env ∪ caller env ∪ fixed non-interactive mask.
    // Later insertions win, so the mask is applied last to guarantee it
    // forces tools into non-interactive mode.
    for (k, v) in &opts.env {
        command.env(k, v);
    }
    for (k, v) in non_interactive_env_mask() {
        command.env(k, v);
    }

    command.stdin(Stdio::piped());
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        // New process group so cancellation/timeout kill the whole tree.
        command.process_group(0);
    }

    command
}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;
    let _ = kill(Pid::from_raw(-(pid as i32)), Signal::SIGKILL);
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}

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

/// Drive a spawned child to completion, racing cancel > timeout >
/// natural exit in that priority order (spec.md §4.1).
async fn wait_for_exit(
    mut child: Child,
    cancel: Option<CancellationToken>,
    timeout: Option<Duration>,
    start: Instant,
) -> (ExitOutcome, Duration) {
    let pid = child.id();
    let cancel = cancel.unwrap_or_default();

    let timeout_fut: BoxFuture<'static, ()> = match timeout {
        Some(d) => Box::pin(tokio::time::sleep(d)),
        None => Box::pin(futures::future::pending()),
    };
    tokio::pin!(timeout_fut);

    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            if let Some(pid) = pid { kill_process_group(pid); }
            let _ = child.wait().await;
            ExitOutcome::Aborted
        }
        _ = &mut timeout_fut => {
            if let Some(pid) = pid { kill_process_group(pid); }
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
impl Runtime for LocalRuntime {
    async fn exec(&self, cmd: &str, opts: ExecOpts) -> Result<ExecStream, RuntimeError> {
        let start = Instant::now();
        let mut command = build_command(cmd, &opts);
        let mut child = command.spawn().map_err(|e| {
            RuntimeError::exec(format!("failed to spawn command: {e}")).with_cause(e)
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RuntimeError::exec("spawned child is missing its piped stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| RuntimeError::exec("spawned child is missing its piped stderr"))?;
        let stdin = child.stdin.take().map(|s| Box::pin(s) as ByteSink);

        let cancel = opts.cancel.clone();
        let timeout = opts.timeout_secs.map(Duration::from_secs);
        let (outcome_tx, outcome_rx) = tokio::sync::oneshot::channel();
        let (duration_tx, duration_rx) = tokio::sync::oneshot::channel();

        tokio::spawn(async move {
            let (outcome, duration) = wait_for_exit(child, cancel, timeout, start).await;
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
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| RuntimeError::file_io(format!("{path}: {e}")))?;
        Ok(reader_to_byte_stream(file))
    }

    async fn write_file(&self, path: &str) -> Result<ByteSink, RuntimeError> {
        let path = PathBuf::from(path);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| RuntimeError::file_io(format!("{}: {e}", parent.display())))?;
        }
        let nonce = uuid_like_nonce();
        let tmp_path = tmp_sibling(&path, &nonce);
        let file = tokio::fs::File::create(&tmp_path)
            .await
            .map_err(|e| RuntimeError::file_io(format!("{}: {e}", tmp_path.display())))?;
        Ok(Box::pin(AtomicWriteSink { file: Some(file), tmp_path, target_path: path, finished: false }))
    }

    async fn stat(&self, path: &str) -> Result<FileStat, RuntimeError> {
        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|e| RuntimeError::file_io(format!("{path}: {e}")))?;
        let modified_time = meta
            .modified()
            .map(chrono::DateTime::<chrono::Utc>::from)
            .unwrap_or_else(|_| chrono::Utc::now());
        Ok(FileStat { size: meta.len(), modified_time, is_directory: meta.is_dir() })
    }

    async fn create_workspace(
        &self,
        params: CreateWorkspaceParams,
    ) -> Result<CreateWorkspaceResult, RuntimeError> {
        let workspace_path = ws_core::workspace_path(&params.project_path, &params.workspace_name);
        if Path::new(&workspace_path).exists() {
            return Err(RuntimeError::exec(format!(
                "workspace path already exists: {workspace_path}"
            )));
        }

        let branch_exists = run_git(&params.project_path, &["rev-parse", "--verify", &params.branch])
            .await
            .is_ok();

        let args: Vec<String> = if branch_exists {
            vec!["worktree".into(), "add".into(), workspace_path.clone(), params.branch.clone()]
        } else {
            vec![
                "worktree".into(),
                "add".into(),
                "-b".into(),
                params.branch.clone(),
                workspace_path.clone(),
                params.trunk.clone(),
            ]
        };
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        run_git(&params.project_path, &arg_refs).await?;

        Ok(CreateWorkspaceResult { workspace_path })
    }

    async fn init_workspace(
        &self,
        params: InitWorkspaceParams,
        logger: &dyn InitLogger,
    ) -> Result<(), RuntimeError> {
        // No remote sync step for the local runtime; the workspace
        // already exists via `create_workspace`'s `git worktree add`.
        logger.log_step("checking out branch");
        let _ = run_git(&params.workspace_path, &["checkout", &params.branch]).await;

        let hook_path = Path::new(&params.project_path).join(".cmux/init");
        if !hook_path.exists() {
            logger.log_complete(None);
            return Ok(());
        }

        logger.log_step("running .cmux/init");
        let exit_code = run_init_hook(&hook_path, &params.workspace_path, logger).await;
        logger.log_complete(Some(exit_code));
        Ok(())
    }

    async fn rename_workspace(
        &self,
        project_path: &str,
        old_name: &str,
        new_name: &str,
    ) -> Result<(), RuntimeError> {
        let old_path = ws_core::workspace_path(project_path, old_name);
        let new_path = ws_core::workspace_path(project_path, new_name);
        run_git(project_path, &["worktree", "move", &old_path, &new_path]).await?;
        Ok(())
    }

    async fn delete_workspace(
        &self,
        project_path: &str,
        name: &str,
        force: bool,
    ) -> Result<(), RuntimeError> {
        let workspace_path = ws_core::workspace_path(project_path, name);
        let args: Vec<&str> = if force {
            vec!["worktree", "remove", "--force", &workspace_path]
        } else {
            vec!["worktree", "remove", &workspace_path]
        };
        match run_git(project_path, &args).await {
            Ok(_) => Ok(()),
            Err(e) if e.message.contains("is not a working tree") => {
                let _ = run_git(project_path, &["worktree", "prune"]).await;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

async fn run_git(cwd: &str, args: &[&str]) -> Result<String, RuntimeError> {
    let output = Command::new("git")
        .args(args)
        .current_dir(cwd)
        .output()
        .await
        .map_err(|e| RuntimeError::exec(format!("git {}: {e}", args.join(" "))))?;
    if !output.status.success() {
        return Err(RuntimeError::exec(format!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr)
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

async fn run_init_hook(hook_path: &Path, workspace_path: &str, logger: &dyn InitLogger) -> i32 {
    let mut command = Command::new(hook_path);
    command.current_dir(workspace_path);
    for (k, v) in non_interactive_env_mask() {
        command.env(k, v);
    }
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());

    let mut child = match command.spawn() {
        Ok(c) => c,
        Err(e) => {
            logger.log_stderr(&format!("failed to spawn init hook: {e}"));
            return -1;
        }
    };

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let stdout_task = stdout.map(|s| {
        tokio::spawn(async move {
            let mut lines = BufReader::new(s).lines();
            let mut out = Vec::new();
            while let Ok(Some(line)) = lines.next_line().await {
                out.push(line);
            }
            out
        })
    });
    let stderr_task = stderr.map(|s| {
        tokio::spawn(async move {
            let mut lines = BufReader::new(s).lines();
            let mut out = Vec::new();
            while let Ok(Some(line)) = lines.next_line().await {
                out.push(line);
            }
            out
        })
    });

    let timeout = Duration::from_secs(3600);
    let status = tokio::time::timeout(timeout, child.wait()).await;

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
            logger.log_stderr(&format!("init hook wait failed: {e}"));
            -1
        }
        Err(_) => {
            logger.log_stderr("init hook timed out after 3600s");
            -1
        }
    }
}

fn uuid_like_nonce() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos();
    format!("{nanos:x}")
}

fn tmp_sibling(path: &Path, nonce: &str) -> PathBuf {
    let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("file");
    path.with_file_name(format!("{file_name}.tmp.{nonce}"))
}

/// Atomic file write: bytes land in `path.tmp.<nonce>` and are renamed
/// over `path` only on successful `poll_shutdown`; `abort` unlinks the
/// temp file instead (spec.md §4.1, §8 property 6).
struct AtomicWriteSink {
    file: Option<tokio::fs::File>,
    tmp_path: PathBuf,
    target_path: PathBuf,
    finished: bool,
}

impl AtomicWriteSink {
    /// Explicit abort path used by callers that want to discard the
    /// write rather than relying on `Drop` (which cannot be async).
    pub async fn abort(mut self: std::pin::Pin<&mut Self>, _reason: &str) -> std::io::Result<()> {
        self.finished = true;
        self.file = None;
        tokio::fs::remove_file(&self.tmp_path).await.or_else(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Ok(())
            } else {
                Err(e)
            }
        })
    }
}

impl tokio::io::AsyncWrite for AtomicWriteSink {
    fn poll_write(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> std::task::Poll<std::io::Result<usize>> {
        let this = self.get_mut();
        match &mut this.file {
            Some(f) => std::pin::Pin::new(f).poll_write(cx, buf),
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
        match &mut this.file {
            Some(f) => std::pin::Pin::new(f).poll_flush(cx),
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
        let file = match &mut this.file {
            Some(f) => f,
            None => return std::task::Poll::Ready(Ok(())),
        };
        match std::pin::Pin::new(&mut *file).poll_shutdown(cx) {
            std::task::Poll::Ready(Ok(())) => {
                this.finished = true;
                this.file = None;
                // Rename happens synchronously on shutdown completion;
                // callers that need to observe the rename error should
                // use `finish()` instead of relying on `AsyncWriteExt::shutdown`.
                if let Err(e) = std::fs::rename(&this.tmp_path, &this.target_path) {
                    return std::task::Poll::Ready(Err(e));
                }
                std::task::Poll::Ready(Ok(()))
            }
            other => other,
        }
    }
}

impl AtomicWriteSink {
    /// Preferred completion path: flush, rename, and surface any
    /// rename error directly instead of through `poll_shutdown`.
    pub async fn finish(mut self) -> std::io::Result<()> {
        if let Some(mut f) = self.file.take() {
            f.flush().await?;
            f.sync_all().await?;
        }
        self.finished = true;
        tokio::fs::rename(&self.tmp_path, &self.target_path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tmp_sibling_keeps_parent_directory() {
        let path = Path::new("/a/b/file.json");
        let tmp = tmp_sibling(path, "abc123");
        assert_eq!(tmp, Path::new("/a/b/file.json.tmp.abc123"));
    }

    #[tokio::test]
    async fn write_file_then_finish_is_atomic_and_visible() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("out.txt");
        let runtime = LocalRuntime::new();

        let mut sink = runtime.write_file(target.to_str().unwrap()).await.expect("write_file");
        sink.write_all(b"hello").await.expect("write");
        sink.shutdown().await.expect("shutdown");

        let content = tokio::fs::read_to_string(&target).await.expect("read back");
        assert_eq!(content, "hello");

        let mut entries = tokio::fs::read_dir(dir.path()).await.expect("read_dir");
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.expect("next_entry") {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        assert_eq!(names, vec!["out.txt".to_string()]);
    }

    #[tokio::test]
    async fn stat_reports_size_and_kind() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file_path = dir.path().join("f.txt");
        tokio::fs::write(&file_path, b"1234").await.expect("write");

        let runtime = LocalRuntime::new();
        let stat = runtime.stat(file_path.to_str().unwrap()).await.expect("stat");
        assert_eq!(stat.size, 4);
        assert!(!stat.is_directory);

        let dir_stat = runtime.stat(dir.path().to_str().unwrap()).await.expect("stat dir");
        assert!(dir_stat.is_directory);
    }

    #[tokio::test]
    async fn exec_reports_natural_exit_code() {
        let runtime = LocalRuntime::new();
        let stream = runtime.exec("exit 3", ExecOpts::default()).await.expect("exec");
        let outcome = stream.exit_code.await;
        assert_eq!(outcome.as_code(), 3);
    }

    #[tokio::test]
    async fn exec_cancel_reports_aborted() {
        let runtime = LocalRuntime::new();
        let cancel = CancellationToken::new();
        let mut opts = ExecOpts::default();
        opts.cancel = Some(cancel.clone());
        let stream = runtime.exec("sleep 30", opts).await.expect("exec");
        cancel.cancel();
        let outcome = stream.exit_code.await;
        assert_eq!(outcome, ExitOutcome::Aborted);
    }
}
