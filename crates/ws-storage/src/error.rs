// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Storage failure taxonomy (spec.md §4.2-4.4, §7).

use ws_core::{Breadcrumb, ErrorKind, HasErrorKind};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("busy: {0}")]
    Busy(String),
    #[error("validation: {0}")]
    Validation(String),
    #[error("io: {message}")]
    Io {
        message: String,
        breadcrumb: Breadcrumb,
        #[source]
        cause: Option<std::io::Error>,
    },
    #[error("serialization: {0}")]
    Serde(#[from] serde_json::Error),
}

impl StorageError {
    pub fn io(message: impl Into<String>, cause: std::io::Error) -> Self {
        StorageError::Io { message: message.into(), breadcrumb: Breadcrumb::new(), cause: Some(cause) }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        StorageError::Io { message: e.to_string(), breadcrumb: Breadcrumb::new(), cause: Some(e) }
    }
}

impl From<ws_core::ValidationError> for StorageError {
    fn from(e: ws_core::ValidationError) -> Self {
        StorageError::Validation(e.to_string())
    }
}

impl HasErrorKind for StorageError {
    fn kind(&self) -> ErrorKind {
        match self {
            StorageError::NotFound(_) => ErrorKind::NotFound,
            StorageError::Conflict(_) => ErrorKind::Conflict,
            StorageError::Busy(_) => ErrorKind::Busy,
            StorageError::Validation(_) => ErrorKind::Validation,
            StorageError::Io { .. } | StorageError::Serde(_) => ErrorKind::Runtime,
        }
    }
}
