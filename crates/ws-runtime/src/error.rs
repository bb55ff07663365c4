// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime failure taxonomy (spec.md §4.1.3).

use ws_core::{Breadcrumb, ErrorKind, HasErrorKind, RuntimeErrorKind};

#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct RuntimeError {
    pub kind: RuntimeErrorKind,
    pub message: String,
    pub breadcrumb: Breadcrumb,
    #[source]
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl RuntimeError {
    pub fn new(kind: RuntimeErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), breadcrumb: Breadcrumb::new(), cause: None }
    }

    pub fn exec(message: impl Into<String>) -> Self {
        Self::new(RuntimeErrorKind::Exec, message)
    }

    pub fn file_io(message: impl Into<String>) -> Self {
        Self::new(RuntimeErrorKind::FileIo, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(RuntimeErrorKind::Network, message)
    }

    pub fn with_breadcrumb(mut self, breadcrumb: Breadcrumb) -> Self {
        self.breadcrumb = breadcrumb;
        self
    }

    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }
}

impl From<std::io::Error> for RuntimeError {
    fn from(e: std::io::Error) -> Self {
        RuntimeError::file_io(e.to_string())
    }
}

impl HasErrorKind for RuntimeError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Runtime
    }
}
