// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate
//! (spec.md §6.3).

use std::net::SocketAddr;
use std::path::PathBuf;

const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8787";

/// `<configHome>`: `WS_CONFIG_HOME` if set, else the platform config
/// directory (e.g. `~/.config/ws`).
pub fn config_home() -> PathBuf {
    if let Ok(dir) = std::env::var("WS_CONFIG_HOME") {
        return PathBuf::from(dir);
    }
    dirs::config_dir().unwrap_or_else(|| PathBuf::from(".")).join("ws")
}

/// `<sessionDir>`: `WS_SESSION_DIR` if set, else the platform data
/// directory (e.g. `~/.local/share/ws`). Holds `history/` and
/// `partials/` (spec.md §6.2).
pub fn session_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("WS_SESSION_DIR") {
        return PathBuf::from(dir);
    }
    dirs::data_dir().unwrap_or_else(|| PathBuf::from(".")).join("ws")
}

/// HTTP/WS bind address, default `127.0.0.1:8787`.
pub fn listen_addr() -> SocketAddr {
    std::env::var("WS_LISTEN_ADDR")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(SocketAddr::new(std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST), 8787))
}

/// Bearer token every request/WS connection must present. `None` means
/// the daemon is running unauthenticated — dev-mode only, and callers
/// must log a warning when this is the case.
pub fn auth_token() -> Option<String> {
    std::env::var("WS_AUTH_TOKEN").ok().filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn listen_addr_defaults_when_unset() {
        std::env::remove_var("WS_LISTEN_ADDR");
        assert_eq!(listen_addr(), DEFAULT_LISTEN_ADDR.parse().expect("parses"));
    }

    #[test]
    #[serial]
    fn listen_addr_honors_override() {
        std::env::set_var("WS_LISTEN_ADDR", "0.0.0.0:9000");
        assert_eq!(listen_addr(), "0.0.0.0:9000".parse().expect("parses"));
        std::env::remove_var("WS_LISTEN_ADDR");
    }

    #[test]
    #[serial]
    fn auth_token_treats_empty_as_unset() {
        std::env::set_var("WS_AUTH_TOKEN", "");
        assert_eq!(auth_token(), None);
        std::env::remove_var("WS_AUTH_TOKEN");
    }

    #[test]
    #[serial]
    fn config_home_honors_override() {
        std::env::set_var("WS_CONFIG_HOME", "/tmp/ws-config-test");
        assert_eq!(config_home(), PathBuf::from("/tmp/ws-config-test"));
        std::env::remove_var("WS_CONFIG_HOME");
    }
}
