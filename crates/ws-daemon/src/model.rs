// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Default [`ModelStreamFactory`] wired into the binary when no vendor
//! provider client is configured. Every call fails with
//! `ModelErrorKind::Unknown` — the daemon is otherwise fully
//! functional (workspace lifecycle, history, bash exec) without one
//! (spec.md §6.4).

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

use ws_core::{Message, StreamEvent, WorkspaceId};
use ws_session::{ModelError, ModelErrorKind, ModelStream, ModelStreamFactory, StreamOpts};

pub struct UnconfiguredModelStreamFactory;

struct UnconfiguredModelStream;

#[async_trait]
impl ModelStream for UnconfiguredModelStream {
    async fn stream(
        &self,
        _history: &[Message],
        _opts: &StreamOpts,
        _cancel: CancellationToken,
    ) -> Result<BoxStream<'static, StreamEvent>, ModelError> {
        Err(ModelError::new(ModelErrorKind::Unknown, "no model provider configured"))
    }
}

impl ModelStreamFactory for UnconfiguredModelStreamFactory {
    fn for_workspace(&self, _workspace_id: &WorkspaceId) -> Arc<dyn ModelStream> {
        Arc::new(UnconfiguredModelStream)
    }
}
