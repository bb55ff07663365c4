// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SSH connection multiplexing: control-socket path derivation
//! (spec.md §4.1.2, property 7).

use sha2::{Digest, Sha256};

/// Identity inputs for a control socket. Two configs that canonicalize
/// identically share a socket.
#[derive(Debug, Clone)]
pub struct SshConnectionConfig {
    pub host: String,
    pub port: Option<u16>,
    pub src_base_dir: String,
    pub identity_file: Option<String>,
}

/// Canonicalizes `port -> "22"` default and `identityFile -> "default"`
/// default, then hashes `host:port:srcBaseDir:identityFile` with
/// SHA-256 and returns the first 12 lowercase-hex characters.
fn control_hash12(cfg: &SshConnectionConfig) -> String {
    let port = cfg.port.unwrap_or(22).to_string();
    let identity = cfg.identity_file.as_deref().unwrap_or("default");
    let key = format!("{}:{}:{}:{}", cfg.host, port, cfg.src_base_dir, identity);
    let digest = Sha256::digest(key.as_bytes());
    hex::encode(digest)[..12].to_string()
}

/// `<tmpdir>/cmux-ssh-<hash12>`, per the `ControlPath` directive
/// required in every multiplexed connection (spec.md §4.1.2).
pub fn get_control_path(tmpdir: &str, cfg: &SshConnectionConfig) -> String {
    format!("{}/cmux-ssh-{}", tmpdir.trim_end_matches('/'), control_hash12(cfg))
}

/// The three `-o` flags that must accompany every `ssh`/`scp` invocation
/// against a given control path.
pub fn control_master_args(control_path: &str) -> Vec<String> {
    vec![
        "-o".to_string(),
        "ControlMaster=auto".to_string(),
        "-o".to_string(),
        format!("ControlPath={control_path}"),
        "-o".to_string(),
        "ControlPersist=60".to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(port: Option<u16>, identity: Option<&str>) -> SshConnectionConfig {
        SshConnectionConfig {
            host: "h".to_string(),
            port,
            src_base_dir: "~/c".to_string(),
            identity_file: identity.map(str::to_string),
        }
    }

    #[test]
    fn default_port_and_identity_are_equivalent_to_explicit_absence() {
        let a = get_control_path("/tmp", &cfg(Some(22), None));
        let b = get_control_path("/tmp", &cfg(None, None));
        assert_eq!(a, b);
    }

    #[test]
    fn differing_identity_file_changes_path() {
        let a = get_control_path("/tmp", &cfg(None, None));
        let b = get_control_path("/tmp", &cfg(None, Some("/k")));
        assert_ne!(a, b);
    }

    #[test]
    fn path_has_expected_shape() {
        let path = get_control_path("/tmp", &cfg(None, None));
        assert!(path.starts_with("/tmp/cmux-ssh-"));
        assert_eq!(path.len(), "/tmp/cmux-ssh-".len() + 12);
    }
}
