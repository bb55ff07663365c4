// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `syncProjectToRemote`: bundles the local project repo and clones it
//! into place on the remote host (spec.md §4.1.2).

use crate::error::RuntimeError;
use crate::ssh::mux::{control_master_args, SshConnectionConfig};
use crate::ssh::quote::escape_for_shell;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

fn ssh_base_args(cfg: &SshConnectionConfig, control_path: &str) -> Vec<String> {
    let mut args = control_master_args(control_path);
    if let Some(port) = cfg.port {
        args.push("-p".to_string());
        args.push(port.to_string());
    }
    if let Some(identity) = &cfg.identity_file {
        args.push("-i".to_string());
        args.push(identity.clone());
    }
    args.push(cfg.host.clone());
    args
}

/// Pushes a full bundle of `local_project_path` to a temp file on the
/// remote, clones it into `workspace_path`, rewires tracking branches
/// for every `refs/remotes/origin/*`, fixes up (or removes) `origin`,
/// and always cleans up the bundle file.
pub async fn sync_project_to_remote(
    cfg: &SshConnectionConfig,
    control_path: &str,
    local_project_path: &str,
    workspace_path: &str,
    real_origin_url: Option<&str>,
) -> Result<(), RuntimeError> {
    let remote_bundle_path = format!("/tmp/ws-bundle-{}.bundle", nonce());

    let bundle_result =
        push_bundle(cfg, control_path, local_project_path, &remote_bundle_path).await;
    if let Err(e) = bundle_result {
        let _ = remove_remote_file(cfg, control_path, &remote_bundle_path).await;
        return Err(e);
    }

    let clone_result =
        clone_and_finalize(cfg, control_path, &remote_bundle_path, workspace_path, real_origin_url)
            .await;

    let _ = remove_remote_file(cfg, control_path, &remote_bundle_path).await;
    clone_result
}

async fn push_bundle(
    cfg: &SshConnectionConfig,
    control_path: &str,
    local_project_path: &str,
    remote_bundle_path: &str,
) -> Result<(), RuntimeError> {
    let mut bundle_cmd = Command::new("git")
        .args(["bundle", "create", "-", "--all"])
        .current_dir(local_project_path)
        .stdout(Stdio::piped())
        .spawn()
        .map_err(|e| RuntimeError::exec(format!("git bundle create: {e}")))?;

    let bundle_stdout = bundle_cmd
        .stdout
        .take()
        .ok_or_else(|| RuntimeError::exec("spawned git bundle child is missing its piped stdout"))?;

    let mut ssh_args = ssh_base_args(cfg, control_path);
    ssh_args.push(format!("cat > {}", escape_for_shell(remote_bundle_path)));

    let mut ssh_cmd = Command::new("ssh")
        .args(&ssh_args)
        .stdin(Stdio::piped())
        .spawn()
        .map_err(|e| RuntimeError::network(format!("ssh cat >: {e}")))?;

    let mut ssh_stdin = ssh_cmd
        .stdin
        .take()
        .ok_or_else(|| RuntimeError::network("spawned ssh child is missing its piped stdin"))?;

    let mut reader = bundle_stdout;
    tokio::io::copy(&mut reader, &mut ssh_stdin)
        .await
        .map_err(|e| RuntimeError::network(format!("piping bundle to remote: {e}")))?;
    ssh_stdin
        .shutdown()
        .await
        .map_err(|e| RuntimeError::network(format!("closing remote stdin: {e}")))?;
    drop(ssh_stdin);

    let bundle_status = bundle_cmd
        .wait()
        .await
        .map_err(|e| RuntimeError::exec(format!("git bundle create wait: {e}")))?;
    if !bundle_status.success() {
        return Err(RuntimeError::exec("git bundle create failed"));
    }

    let ssh_status = ssh_cmd
        .wait()
        .await
        .map_err(|e| RuntimeError::network(format!("ssh cat > wait: {e}")))?;
    if !ssh_status.success() {
        return Err(RuntimeError::network("writing bundle to remote failed"));
    }

    Ok(())
}

async fn clone_and_finalize(
    cfg: &SshConnectionConfig,
    control_path: &str,
    remote_bundle_path: &str,
    workspace_path: &str,
    real_origin_url: Option<&str>,
) -> Result<(), RuntimeError> {
    let mut remote_script = format!(
        "git clone --quiet {} {}",
        escape_for_shell(remote_bundle_path),
        escape_for_shell(workspace_path),
    );
    remote_script.push_str(&format!(
        " && cd {} && for ref in $(git for-each-ref --format='%(refname:short)' refs/remotes/origin/); do \
         branch=${{ref#origin/}}; git show-ref --verify --quiet refs/heads/$branch || git branch $branch $ref; done",
        escape_for_shell(workspace_path),
    ));
    match real_origin_url {
        Some(url) => {
            remote_script.push_str(&format!(" && git remote set-url origin {}", escape_for_shell(url)));
        }
        None => {
            remote_script.push_str(" && git remote remove origin");
        }
    }

    let mut ssh_args = ssh_base_args(cfg, control_path);
    ssh_args.push(remote_script);

    let output = Command::new("ssh")
        .args(&ssh_args)
        .output()
        .await
        .map_err(|e| RuntimeError::network(format!("ssh clone: {e}")))?;
    if !output.status.success() {
        return Err(RuntimeError::network(format!(
            "remote clone/finalize failed: {}",
            String::from_utf8_lossy(&output.stderr)
        )));
    }
    Ok(())
}

async fn remove_remote_file(
    cfg: &SshConnectionConfig,
    control_path: &str,
    remote_path: &str,
) -> Result<(), RuntimeError> {
    let mut ssh_args = ssh_base_args(cfg, control_path);
    ssh_args.push(format!("rm -f {}", escape_for_shell(remote_path)));
    let status = Command::new("ssh")
        .args(&ssh_args)
        .status()
        .await
        .map_err(|e| RuntimeError::network(format!("ssh rm -f: {e}")))?;
    if !status.success() {
        return Err(RuntimeError::network("failed to remove remote bundle file"));
    }
    Ok(())
}

fn nonce() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos();
    format!("{nanos:x}")
}
