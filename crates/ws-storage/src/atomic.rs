// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Write-to-temp-then-rename durability, shared by every on-disk store
//! (spec.md §4.2 "all writes are atomic").

use crate::error::StorageError;
use std::path::{Path, PathBuf};

fn tmp_path(path: &Path) -> PathBuf {
    let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("file");
    let nonce = nanoid::nanoid!(8);
    path.with_file_name(format!("{file_name}.tmp.{nonce}"))
}

/// Writes `bytes` to a sibling temp file and renames it over `path`.
/// Creates the parent directory if absent.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = tmp_path(path);
    std::fs::write(&tmp, bytes).map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        e
    })?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Same as [`write_atomic`] but sets the file's mode to `0600` before
/// the rename, for secrets (spec.md §6.2).
#[cfg(unix)]
pub fn write_atomic_private(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    use std::os::unix::fs::PermissionsExt;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = tmp_path(path);
    std::fs::write(&tmp, bytes).map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        e
    })?;
    std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(not(unix))]
pub fn write_atomic_private(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    write_atomic(path, bytes)
}

/// Appends a single line to `path`, creating it (and its parent) if
/// absent. Not itself atomic across the whole file — callers relying
/// on monotonic sequencing serialize calls through their own lock.
pub fn append_line(path: &Path, line: &str) -> Result<(), StorageError> {
    use std::io::Write;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{line}")?;
    file.sync_all()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn write_atomic_leaves_no_temp_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("x.json");
        write_atomic(&path, b"{}").expect("write");
        assert_eq!(fs::read_to_string(&path).expect("read"), "{}");
        let leftover: Vec<_> = fs::read_dir(dir.path())
            .expect("read_dir")
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp."))
            .collect();
        assert!(leftover.is_empty());
    }

    #[test]
    fn write_atomic_overwrites_existing_content() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("x.json");
        write_atomic(&path, b"one").expect("write");
        write_atomic(&path, b"two").expect("write");
        assert_eq!(fs::read_to_string(&path).expect("read"), "two");
    }

    #[cfg(unix)]
    #[test]
    fn write_atomic_private_sets_0600() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("secrets.json");
        write_atomic_private(&path, b"{}").expect("write");
        let mode = fs::metadata(&path).expect("metadata").permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }
}
