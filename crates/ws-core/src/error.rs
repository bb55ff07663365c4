// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared error taxonomy (spec.md §7).
//!
//! Every crate boundary defines its own `thiserror` enum for its own
//! failure modes, but implements [`HasErrorKind`] so transport code
//! can translate any error into the right wire shape without
//! string-matching messages.

use serde::{Deserialize, Serialize};

/// Kind-level error taxonomy, carried as a tagged value rather than a
/// string so callers can branch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// Empty name, bad name format, empty message, empty command.
    Validation,
    /// Workspace id unknown, path missing.
    NotFound,
    /// Rename collision, workspace already exists.
    Conflict,
    /// Operation blocked by an active stream.
    Busy,
    /// Runtime-level failure (exec/file_io/network/unknown sub-kind).
    Runtime,
    /// Normalized provider/stream failure.
    Stream,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not-found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Busy => "busy",
            ErrorKind::Runtime => "runtime",
            ErrorKind::Stream => "stream",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Implemented by every crate-boundary error enum so the transport
/// layer can classify a failure without matching on message text.
pub trait HasErrorKind {
    fn kind(&self) -> ErrorKind;
}

/// Sub-kind for [`ErrorKind::Runtime`] failures (spec.md §4.1.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeErrorKind {
    Exec,
    FileIo,
    Network,
    Unknown,
}

impl std::fmt::Display for RuntimeErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RuntimeErrorKind::Exec => "exec",
            RuntimeErrorKind::FileIo => "file_io",
            RuntimeErrorKind::Network => "network",
            RuntimeErrorKind::Unknown => "unknown",
        };
        f.write_str(s)
    }
}
