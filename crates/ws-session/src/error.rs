// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy for sending and streaming a message (spec.md §4.5, §7).

use thiserror::Error;
use ws_core::{ErrorKind, HasErrorKind};
use ws_storage::StorageError;

use crate::model::ModelError;

#[derive(Debug, Error)]
pub enum SendMessageError {
    /// A stream is already live for this workspace (spec.md §5,
    /// one-live-stream-per-workspace rule).
    #[error("workspace {0} already has a stream in progress")]
    AlreadyStreaming(String),

    /// `editMessageId` did not name a message in this workspace's
    /// history.
    #[error("message {0} not found in history")]
    EditTargetNotFound(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("model stream error: {0}")]
    Model(#[from] ModelError),
}

impl SendMessageError {
    pub fn error_type(&self) -> &'static str {
        match self {
            SendMessageError::AlreadyStreaming(_) => "busy",
            SendMessageError::EditTargetNotFound(_) => "not-found",
            SendMessageError::Storage(_) => "storage",
            SendMessageError::Model(e) => e.kind.as_error_type(),
        }
    }
}

impl HasErrorKind for SendMessageError {
    fn kind(&self) -> ErrorKind {
        match self {
            SendMessageError::AlreadyStreaming(_) => ErrorKind::Busy,
            SendMessageError::EditTargetNotFound(_) => ErrorKind::NotFound,
            SendMessageError::Storage(e) => e.kind(),
            SendMessageError::Model(_) => ErrorKind::Stream,
        }
    }
}
