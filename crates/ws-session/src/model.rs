// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `ModelStream`: the external collaborator boundary to whatever LLM
//! provider client is wired in (spec.md §4.5, §7 "stream" error kind).
//! This crate never talks to a real provider; callers supply an
//! implementation.

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use ws_core::{Message, StreamEvent, WorkspaceId};

/// Parameters influencing a single provider turn.
#[derive(Debug, Clone, Default)]
pub struct StreamOpts {
    pub model: Option<String>,
    /// Set when resuming a previously-interrupted turn rather than
    /// starting a fresh one (spec.md §4.5 `resumeStream`).
    pub resume: bool,
}

/// Normalized provider failure kinds (spec.md §7's `stream` error
/// taxonomy, surfaced to clients via `StreamEvent::StreamError`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelErrorKind {
    RateLimit,
    Auth,
    Network,
    Unknown,
}

impl ModelErrorKind {
    pub fn as_error_type(&self) -> &'static str {
        match self {
            ModelErrorKind::RateLimit => "provider-rate-limit",
            ModelErrorKind::Auth => "provider-auth",
            ModelErrorKind::Network => "network",
            ModelErrorKind::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Error)]
#[error("{kind:?}: {message}")]
pub struct ModelError {
    pub kind: ModelErrorKind,
    pub message: String,
}

impl ModelError {
    pub fn new(kind: ModelErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }
}

/// Boundary to a model/agent provider. Implementations turn full chat
/// history into a stream of `StreamEvent`s; `AgentSession` pumps the
/// stream and never inspects provider internals.
#[async_trait]
pub trait ModelStream: Send + Sync {
    async fn stream(
        &self,
        history: &[Message],
        opts: &StreamOpts,
        cancel: CancellationToken,
    ) -> Result<BoxStream<'static, StreamEvent>, ModelError>;
}

/// Constructs the provider boundary for a workspace (spec.md §6.4): "no
/// concrete vendor client ships in this repository; the daemon is
/// constructed generically over `Arc<dyn ModelStreamFactory>` so a real
/// provider crate can be plugged in without touching the core." A
/// single factory instance is shared by every `AgentSession` the
/// daemon owns; `for_workspace` lets an implementation scope
/// credentials or per-workspace config (e.g. a project secret) without
/// threading that lookup through `AgentSession` itself.
pub trait ModelStreamFactory: Send + Sync {
    fn for_workspace(&self, workspace_id: &WorkspaceId) -> Arc<dyn ModelStream>;
}

/// Deterministic test double: replays a fixed script of `StreamEvent`s
/// for every call, ignoring `history`/`opts` beyond recording them.
#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    use super::*;
    use parking_lot::Mutex;

    pub struct FakeModelStream {
        script: Vec<StreamEvent>,
        pub calls: Mutex<Vec<(Vec<Message>, StreamOpts)>>,
    }

    impl FakeModelStream {
        pub fn new(script: Vec<StreamEvent>) -> Self {
            Self { script, calls: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl ModelStream for FakeModelStream {
        async fn stream(
            &self,
            history: &[Message],
            opts: &StreamOpts,
            _cancel: CancellationToken,
        ) -> Result<BoxStream<'static, StreamEvent>, ModelError> {
            self.calls.lock().push((history.to_vec(), opts.clone()));
            let events = self.script.clone();
            Ok(Box::pin(tokio_stream::iter(events)))
        }
    }

    /// Hands every workspace the same script-replaying `FakeModelStream`.
    pub struct FakeModelStreamFactory {
        script: Vec<StreamEvent>,
    }

    impl FakeModelStreamFactory {
        pub fn new(script: Vec<StreamEvent>) -> Self {
            Self { script }
        }
    }

    impl ModelStreamFactory for FakeModelStreamFactory {
        fn for_workspace(&self, _workspace_id: &WorkspaceId) -> Arc<dyn ModelStream> {
            Arc::new(FakeModelStream::new(self.script.clone()))
        }
    }
}
