// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end scenarios driven against a real `wsd` process over its
//! HTTP transport — the one layer unit tests inside each crate can't
//! reach, since it's where routing, auth, and (de)serialization meet.
//!
//! Each test spawns its own daemon on a unique port pointed at a
//! fresh temp `WS_CONFIG_HOME`/`WS_SESSION_DIR`, so tests run fully
//! in parallel without `#[serial]`.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tempfile::TempDir;

static NEXT_PORT: AtomicU16 = AtomicU16::new(23_000);

fn next_port() -> u16 {
    NEXT_PORT.fetch_add(1, Ordering::SeqCst)
}

struct Daemon {
    child: Child,
    addr: String,
    _config_home: TempDir,
    _session_dir: TempDir,
    _project_dir: TempDir,
}

impl Daemon {
    fn spawn() -> Self {
        let port = next_port();
        let addr = format!("127.0.0.1:{port}");
        let config_home = tempfile::tempdir().expect("tempdir");
        let session_dir = tempfile::tempdir().expect("tempdir");
        let project_dir = tempfile::tempdir().expect("tempdir");

        let child = Command::new(assert_cmd::cargo::cargo_bin("wsd"))
            .env("WS_LISTEN_ADDR", &addr)
            .env("WS_CONFIG_HOME", config_home.path())
            .env("WS_SESSION_DIR", session_dir.path())
            .env_remove("WS_AUTH_TOKEN")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn wsd");

        let daemon = Daemon { child, addr, _config_home: config_home, _session_dir: session_dir, _project_dir: project_dir };
        daemon.wait_until_listening();
        daemon
    }

    fn wait_until_listening(&self) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if TcpStream::connect(&self.addr).is_ok() {
                return;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        panic!("wsd did not start listening on {}", self.addr);
    }

    fn project_path(&self) -> String {
        self._project_dir.path().to_string_lossy().into_owned()
    }

    /// `POST /ipc/<channel>` with a `Connection: close` request,
    /// returning the decoded `{success, data|error}` envelope.
    fn call(&self, channel: &str, args: Vec<Value>) -> Value {
        let body = json!({ "args": args }).to_string();
        let request = format!(
            "POST /ipc/{channel} HTTP/1.1\r\n\
             Host: {host}\r\n\
             Content-Type: application/json\r\n\
             Content-Length: {len}\r\n\
             Connection: close\r\n\r\n\
             {body}",
            host = self.addr,
            len = body.len(),
        );

        let mut stream = TcpStream::connect(&self.addr).expect("connect");
        stream.write_all(request.as_bytes()).expect("write request");
        let mut response = String::new();
        stream.read_to_string(&mut response).expect("read response");

        let body = response.split("\r\n\r\n").nth(1).expect("response has a body");
        serde_json::from_str(body).expect("response body is JSON")
    }
}

impl Drop for Daemon {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// S1 — create then delete.
#[test]
fn create_then_delete_removes_workspace_from_list() {
    let daemon = Daemon::spawn();
    let project = daemon.project_path();

    let created = daemon.call("workspace:create", vec![json!(project), json!("feat"), json!("main")]);
    assert_eq!(created["success"], json!(true));
    let id = created["data"]["metadata"]["id"].as_str().expect("metadata.id").to_string();
    assert_eq!(created["data"]["metadata"]["name"], json!("feat"));

    let listed = daemon.call("workspace:list", vec![]);
    assert!(listed["data"].as_array().expect("list is an array").iter().any(|w| w["id"] == json!(id)));

    let removed = daemon.call("workspace:remove", vec![json!(id)]);
    assert_eq!(removed["success"], json!(true));

    let listed_after = daemon.call("workspace:list", vec![]);
    assert!(!listed_after["data"].as_array().expect("list is an array").iter().any(|w| w["id"] == json!(id)));
}

/// S1 (idempotency clause, spec.md §7) — removing an already-missing
/// workspace still reports success rather than `not_found`.
#[test]
fn remove_is_idempotent_for_unknown_workspace() {
    let daemon = Daemon::spawn();
    let removed = daemon.call("workspace:remove", vec![json!("ws_does_not_exist")]);
    assert_eq!(removed["success"], json!(true));
}

/// S5 — name validation rejects a path-like name without any
/// filesystem side effect.
#[test]
fn create_rejects_invalid_name_without_side_effects() {
    let daemon = Daemon::spawn();
    let project = daemon.project_path();

    let result = daemon.call("workspace:create", vec![json!(project), json!("/etc"), json!("main")]);
    assert_eq!(result["success"], json!(false));
    let error = result["error"].as_str().expect("error message").to_lowercase();
    assert!(error.contains("invalid") || error.contains("name"), "unexpected error message: {error}");

    let projects = daemon.call("project:list", vec![]);
    assert_eq!(projects["data"], json!([]));
}

/// Renaming preserves the workspace id (spec.md §8 property 8).
#[test]
fn rename_preserves_workspace_id() {
    let daemon = Daemon::spawn();
    let project = daemon.project_path();

    let created = daemon.call("workspace:create", vec![json!(project), json!("feat"), json!("main")]);
    let id = created["data"]["metadata"]["id"].as_str().expect("metadata.id").to_string();

    let renamed = daemon.call("workspace:rename", vec![json!(id), json!("feat-renamed")]);
    assert_eq!(renamed["success"], json!(true));
    assert_eq!(renamed["data"]["newWorkspaceId"], json!(id));

    let info = daemon.call("workspace:getInfo", vec![json!(id)]);
    assert_eq!(info["data"]["name"], json!("feat-renamed"));
    assert_eq!(info["data"]["id"], json!(id));
}

/// An unknown channel is a validation error, not a panic or a 5xx.
#[test]
fn unknown_channel_is_a_clean_error() {
    let daemon = Daemon::spawn();
    let result = daemon.call("workspace:doesNotExist", vec![]);
    assert_eq!(result["success"], json!(false));
}

/// `workspace:executeBash` runs inside the created workspace's worktree.
#[test]
fn execute_bash_runs_in_workspace_directory() {
    let daemon = Daemon::spawn();
    let project = daemon.project_path();

    let created = daemon.call("workspace:create", vec![json!(project), json!("feat"), json!("main")]);
    let id = created["data"]["metadata"]["id"].as_str().expect("metadata.id").to_string();

    let result = daemon.call("workspace:executeBash", vec![json!(id), json!("pwd")]);
    assert_eq!(result["success"], json!(true));
    let output = result["data"]["output"].as_str().expect("output");
    let workspace_path = created["data"]["metadata"]["path"].as_str().expect("metadata.path");
    assert!(output.trim().ends_with(workspace_path.trim_end_matches('/')), "output={output:?} path={workspace_path:?}");
}
