// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `AgentSession`: one per workspace, owning the
//! `Idle -> UserAppended -> Streaming -> Idle` turn lifecycle
//! (spec.md §4.5, §5).

use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use ws_core::{Message, MessageMetadata, Part, Role, StreamEvent, ToolCallId, ToolCallState, WorkspaceId};
use ws_storage::{HistoryStore, PartialStore};

use crate::error::SendMessageError;
use crate::expander::EventExpander;
use crate::hub::SubscriptionHub;
use crate::model::{ModelStream, StreamOpts};

#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    pub model: Option<String>,
    /// Resubmit editing an earlier turn: history from this message
    /// onward is dropped before the new user message is appended
    /// (spec.md §4.5 `editMessageId`).
    pub edit_message_id: Option<ws_core::MessageId>,
}

/// Accumulates one assistant turn's `Part`s as raw `StreamEvent`s
/// arrive, independent of the expander's presentation-oriented view —
/// this is the shape that gets durably committed to history.
#[derive(Debug, Clone, Default)]
struct AssembledTurn {
    text: String,
    reasoning: String,
    tool_order: Vec<ToolCallId>,
    tools: HashMap<ToolCallId, AssembledTool>,
}

#[derive(Debug, Clone, Default)]
struct AssembledTool {
    tool_name: String,
    input: serde_json::Value,
    output: Option<serde_json::Value>,
    state: ToolCallState,
}

impl AssembledTurn {
    fn accumulate(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::StreamDelta { delta, .. } => self.text.push_str(delta),
            StreamEvent::ReasoningDelta { delta, .. } => self.reasoning.push_str(delta),
            StreamEvent::ToolCallStart { tool_call_id, tool_name, input, .. } => {
                self.tool_order.push(tool_call_id.clone());
                self.tools.insert(
                    tool_call_id.clone(),
                    AssembledTool {
                        tool_name: tool_name.clone(),
                        input: input.clone(),
                        state: ToolCallState::InputAvailable,
                        ..Default::default()
                    },
                );
            }
            StreamEvent::ToolCallDelta { tool_call_id, delta, .. } => {
                if let Some(tool) = self.tools.get_mut(tool_call_id) {
                    tool.input = serde_json::Value::String(delta.clone());
                }
            }
            StreamEvent::ToolCallEnd { tool_call_id, output, .. } => {
                if let Some(tool) = self.tools.get_mut(tool_call_id) {
                    tool.output = Some(output.clone());
                    tool.state = ToolCallState::OutputAvailable;
                }
            }
            _ => {}
        }
    }

    fn into_parts(self, ts: i64) -> Vec<Part> {
        let mut parts = Vec::new();
        if !self.reasoning.is_empty() {
            parts.push(Part::Reasoning { text: self.reasoning, ts: Some(ts) });
        }
        for tool_call_id in &self.tool_order {
            if let Some(tool) = self.tools.get(tool_call_id) {
                parts.push(Part::DynamicTool {
                    tool_call_id: tool_call_id.clone(),
                    tool_name: tool.tool_name.clone(),
                    state: tool.state,
                    input: tool.input.clone(),
                    output: tool.output.clone(),
                    ts: Some(ts),
                });
            }
        }
        if !self.text.is_empty() || parts.is_empty() {
            parts.push(Part::Text { text: self.text, ts: Some(ts) });
        }
        parts
    }
}

struct ActiveStream {
    cancel: CancellationToken,
}

pub struct AgentSession {
    workspace_id: WorkspaceId,
    history: Arc<HistoryStore>,
    partial: Arc<PartialStore>,
    model: Arc<dyn ModelStream>,
    hub: Arc<SubscriptionHub>,
    expander: Mutex<EventExpander>,
    active: Mutex<Option<ActiveStream>>,
}

impl AgentSession {
    pub fn new(
        workspace_id: WorkspaceId,
        history: Arc<HistoryStore>,
        partial: Arc<PartialStore>,
        model: Arc<dyn ModelStream>,
        hub: Arc<SubscriptionHub>,
    ) -> Arc<Self> {
        Arc::new(Self {
            workspace_id,
            history,
            partial,
            model,
            hub,
            expander: Mutex::new(EventExpander::new()),
            active: Mutex::new(None),
        })
    }

    pub fn workspace_id(&self) -> &WorkspaceId {
        &self.workspace_id
    }

    pub fn is_streaming(&self) -> bool {
        self.active.lock().is_some()
    }

    /// Full chat history, oldest first — the snapshot a subscriber
    /// replays before switching to the hub's live tail (spec.md §4.7).
    pub fn replay_history(&self) -> Result<Vec<Message>, SendMessageError> {
        Ok(self.history.get(&self.workspace_id)?)
    }

    /// Appends a user message and opens a new provider stream. Rejects
    /// with [`SendMessageError::AlreadyStreaming`] if a turn is already
    /// in flight, unless `opts.edit_message_id` is present — an
    /// edit-resubmit interrupts the in-flight turn and proceeds
    /// (spec.md §4.5, §5).
    pub async fn send_message(
        self: &Arc<Self>,
        text: String,
        opts: SendOptions,
        now_ms: i64,
    ) -> Result<Message, SendMessageError> {
        let is_streaming = self.active.lock().is_some();
        if is_streaming {
            if opts.edit_message_id.is_none() {
                return Err(SendMessageError::AlreadyStreaming(self.workspace_id.to_string()));
            }
            self.interrupt_stream();
            self.wait_for_idle().await;
        }

        if let Some(edit_id) = &opts.edit_message_id {
            match self.history.truncate_from(&self.workspace_id, edit_id) {
                Ok(_) => {}
                Err(ws_storage::StorageError::NotFound(_)) => {
                    return Err(SendMessageError::EditTargetNotFound(edit_id.to_string()))
                }
                Err(e) => return Err(e.into()),
            }
        }

        // An unresolved partial from a previous crash or interruption
        // must land in history before the next turn opens, so it is
        // never silently dropped from context (spec.md §4.4).
        self.partial.commit_to_history(&self.workspace_id, &self.history)?;

        let user_message = self.history.append(&self.workspace_id, Message::new_user(text, now_ms))?;
        self.hub.publish_chat(
            &self.workspace_id,
            ws_core::DisplayedMessage::User {
                id: user_message.id.clone(),
                history_sequence: user_message.metadata.history_sequence,
                content: user_message.text_content(),
            },
        );

        self.spawn_stream(StreamOpts { model: opts.model, resume: false });
        Ok(user_message)
    }

    /// Restarts the provider stream for a turn left partial by a crash
    /// or interruption, without appending a new user message
    /// (spec.md §4.5 `resumeStream`).
    pub fn resume_stream(self: &Arc<Self>, model: Option<String>) -> Result<(), SendMessageError> {
        let active = self.active.lock();
        if active.is_some() {
            return Err(SendMessageError::AlreadyStreaming(self.workspace_id.to_string()));
        }
        drop(active);
        self.spawn_stream(StreamOpts { model, resume: true });
        Ok(())
    }

    /// Requests cancellation of the in-flight turn, if any. The turn's
    /// accumulated content is committed to history as a partial message
    /// once the stream task observes the cancellation (spec.md §4.5
    /// interrupt transition).
    pub fn interrupt_stream(&self) {
        if let Some(active) = self.active.lock().as_ref() {
            active.cancel.cancel();
        }
    }

    pub fn emit_metadata(&self, workspace: Option<ws_core::Workspace>) {
        self.hub.publish_metadata(workspace);
    }

    /// Routes a lifecycle-origin event (currently just the
    /// `workspace-init` trio `ws_runtime::ChannelInitLogger` emits
    /// while `Runtime::init_workspace` runs) through this session's
    /// expander and onto its chat channel, the same path a streaming
    /// turn's events take. Lets `WorkspaceLifecycle::create`/`rename`
    /// surface init progress without a separate fan-out mechanism
    /// (spec.md §4.8).
    pub fn apply_and_publish(&self, event: &StreamEvent) {
        let displayed = self.expander.lock().apply(event);
        self.publish_all(displayed);
    }

    /// The workspace-init view a brand-new subscriber should see before
    /// the live tail starts, if this workspace's creation hook ever ran
    /// in this process (spec.md §4.7 replay).
    pub fn init_snapshot(&self) -> Option<ws_core::DisplayedMessage> {
        self.expander.lock().init_snapshot()
    }

    fn spawn_stream(self: &Arc<Self>, opts: StreamOpts) {
        let cancel = CancellationToken::new();
        *self.active.lock() = Some(ActiveStream { cancel: cancel.clone() });
        self.history.begin_stream(&self.workspace_id);

        let session = Arc::clone(self);
        tokio::spawn(async move {
            session.run_stream(opts, cancel).await;
        });
    }

    async fn run_stream(self: Arc<Self>, opts: StreamOpts, cancel: CancellationToken) {
        let history = match self.history.get(&self.workspace_id) {
            Ok(h) => h,
            Err(e) => {
                warn!(workspace_id = %self.workspace_id, error = %e, "failed to read history before streaming");
                self.end_turn();
                return;
            }
        };

        let model_result = self.model.stream(&history, &opts, cancel.clone()).await;
        let mut provider_stream = match model_result {
            Ok(s) => s,
            Err(err) => {
                self.commit_provider_error(&err).await;
                self.end_turn();
                return;
            }
        };

        let mut turn = AssembledTurn::default();
        let mut turn_message_id: Option<ws_core::MessageId> = None;
        let mut ts = now_ms_placeholder();

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    if let Some(message_id) = turn_message_id.clone() {
                        let abort = StreamEvent::StreamAbort { message_id: message_id.clone() };
                        let displayed = self.expander.lock().apply(&abort);
                        self.commit_partial_turn(std::mem::take(&mut turn), ts, Some(message_id), displayed).await;
                    }
                    break;
                }
                next = provider_stream.next() => {
                    match next {
                        Some(event) => {
                            if turn_message_id.is_none() {
                                turn_message_id = event.message_id().cloned();
                            }
                            if let StreamEvent::StreamStart { .. } = &event {
                                ts = now_ms_placeholder();
                            }
                            turn.accumulate(&event);

                            let is_terminal = matches!(
                                event,
                                StreamEvent::StreamEnd { .. }
                                    | StreamEvent::StreamAbort { .. }
                                    | StreamEvent::StreamError { .. }
                            );
                            let displayed = self.expander.lock().apply(&event);

                            if !is_terminal {
                                self.publish_all(displayed);
                                if turn_message_id.is_some() {
                                    self.snapshot_partial(&turn, ts, turn_message_id.clone());
                                }
                                continue;
                            }

                            match &event {
                                StreamEvent::StreamEnd { .. } => {
                                    self.commit_final_turn(std::mem::take(&mut turn), ts, turn_message_id.clone(), displayed).await;
                                }
                                StreamEvent::StreamAbort { .. } | StreamEvent::StreamError { .. } => {
                                    self.commit_partial_turn(std::mem::take(&mut turn), ts, turn_message_id.clone(), displayed).await;
                                }
                                _ => unreachable!("is_terminal only matches the three arms above"),
                            }
                            break;
                        }
                        None => {
                            // Provider closed the stream without an explicit
                            // terminal event: treat whatever was received so
                            // far as an interrupted turn.
                            if let Some(message_id) = turn_message_id.clone() {
                                let abort = StreamEvent::StreamAbort { message_id: message_id.clone() };
                                let displayed = self.expander.lock().apply(&abort);
                                self.commit_partial_turn(turn, ts, Some(message_id), displayed).await;
                            }
                            break;
                        }
                    }
                }
            }
        }

        self.end_turn();
    }

    fn publish_all(&self, messages: Vec<ws_core::DisplayedMessage>) {
        for message in messages {
            self.hub.publish_chat(&self.workspace_id, message);
        }
    }

    fn snapshot_partial(&self, turn: &AssembledTurn, ts: i64, message_id: Option<ws_core::MessageId>) {
        let Some(id) = message_id else { return };
        let snapshot = Message {
            id,
            role: Role::Assistant,
            parts: turn.clone().into_parts(ts),
            metadata: MessageMetadata { timestamp: ts, partial: Some(true), ..Default::default() },
        };
        if let Err(e) = self.partial.write(&self.workspace_id, &snapshot) {
            warn!(workspace_id = %self.workspace_id, error = %e, "failed to persist in-flight turn snapshot");
        }
    }

    /// Commits the finished turn to history and publishes the
    /// expander's already-computed final view with its real
    /// `historySequence` patched in (spec.md §4.6).
    async fn commit_final_turn(
        &self,
        turn: AssembledTurn,
        ts: i64,
        message_id: Option<ws_core::MessageId>,
        mut displayed: Vec<ws_core::DisplayedMessage>,
    ) {
        let message = Message {
            id: message_id.unwrap_or_default(),
            role: Role::Assistant,
            parts: turn.into_parts(ts),
            metadata: MessageMetadata { timestamp: ts, ..Default::default() },
        };
        match self.history.append(&self.workspace_id, message) {
            Ok(committed) => {
                EventExpander::resolve_history_sequence(&mut displayed, committed.metadata.history_sequence);
                debug!(workspace_id = %self.workspace_id, sequence = committed.metadata.history_sequence, "assistant turn committed");
            }
            Err(e) => warn!(workspace_id = %self.workspace_id, error = %e, "failed to commit assistant turn"),
        }
        self.publish_all(displayed);
        if let Err(e) = self.partial.delete(&self.workspace_id) {
            warn!(workspace_id = %self.workspace_id, error = %e, "failed to clear partial after commit");
        }
    }

    /// Commits whatever the turn had accumulated as a `partial: true`
    /// history entry (interrupt, provider-reported error, or a stream
    /// that closed without a terminal event) and publishes the
    /// expander's view with its real `historySequence` patched in.
    async fn commit_partial_turn(
        &self,
        turn: AssembledTurn,
        ts: i64,
        message_id: Option<ws_core::MessageId>,
        mut displayed: Vec<ws_core::DisplayedMessage>,
    ) {
        let snapshot = Message {
            id: message_id.unwrap_or_default(),
            role: Role::Assistant,
            parts: turn.into_parts(ts),
            metadata: MessageMetadata { timestamp: ts, partial: Some(true), ..Default::default() },
        };
        if let Err(e) = self.partial.write(&self.workspace_id, &snapshot) {
            warn!(workspace_id = %self.workspace_id, error = %e, "failed to persist partial turn");
        }
        match self.partial.commit_to_history(&self.workspace_id, &self.history) {
            Ok(Some(committed)) => {
                EventExpander::resolve_history_sequence(&mut displayed, committed.metadata.history_sequence);
            }
            Ok(None) => {}
            Err(e) => warn!(workspace_id = %self.workspace_id, error = %e, "failed to commit partial turn to history"),
        }
        self.publish_all(displayed);
    }

    async fn commit_provider_error(&self, err: &crate::model::ModelError) {
        let message = Message {
            id: ws_core::MessageId::new(),
            role: Role::Assistant,
            parts: vec![Part::Text { text: String::new(), ts: None }],
            metadata: MessageMetadata {
                timestamp: now_ms_placeholder(),
                error: Some(err.message.clone()),
                error_type: Some(err.kind.as_error_type().to_string()),
                ..Default::default()
            },
        };
        let mut displayed = self.expander.lock().apply(&StreamEvent::StreamError {
            message_id: None,
            error_type: err.kind.as_error_type().to_string(),
            error: err.message.clone(),
        });
        match self.history.append(&self.workspace_id, message) {
            Ok(committed) => {
                EventExpander::resolve_history_sequence(&mut displayed, committed.metadata.history_sequence);
            }
            Err(e) => warn!(workspace_id = %self.workspace_id, error = %e, "failed to record provider error"),
        }
        self.publish_all(displayed);
    }

    fn end_turn(&self) {
        self.history.end_stream(&self.workspace_id);
        *self.active.lock() = None;
    }

    /// Polls for the in-flight turn's cancellation cleanup to land,
    /// bounded so a provider task stuck on I/O can't hang a resubmit
    /// forever — after the deadline, the edit proceeds regardless and
    /// the stale task's own commit (if it ever lands) is harmless,
    /// since `end_turn` is idempotent.
    async fn wait_for_idle(&self) {
        for _ in 0..200 {
            if self.active.lock().is_none() {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    }
}

/// Millisecond timestamp for newly-observed events. The expander and
/// history layer are otherwise pure; this is the one seam where wall
/// clock time enters a turn, kept narrow so tests can stub it by
/// constructing `Message`s directly instead of going through
/// `AgentSession`.
fn now_ms_placeholder() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fake::FakeModelStream;
    use ws_core::MessageId;

    fn new_session(script: Vec<StreamEvent>) -> (tempfile::TempDir, Arc<AgentSession>, WorkspaceId) {
        let dir = tempfile::tempdir().expect("tempdir");
        let history = Arc::new(HistoryStore::new(dir.path()));
        let partial = Arc::new(PartialStore::new(dir.path()));
        let model = Arc::new(FakeModelStream::new(script));
        let hub = Arc::new(SubscriptionHub::new());
        let workspace_id = WorkspaceId::new();
        let session = AgentSession::new(workspace_id.clone(), history, partial, model, hub);
        (dir, session, workspace_id)
    }

    #[tokio::test]
    async fn send_message_then_full_stream_commits_assistant_turn() {
        let message_id = MessageId::new();
        let script = vec![
            StreamEvent::StreamStart { message_id: message_id.clone() },
            StreamEvent::StreamDelta { message_id: message_id.clone(), delta: "Hi".to_string() },
            StreamEvent::StreamEnd { message_id: message_id.clone() },
        ];
        let (_dir, session, workspace_id) = new_session(script);

        session.send_message("hello".to_string(), SendOptions::default(), 0).await.expect("send");

        for _ in 0..50 {
            if !session.is_streaming() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(!session.is_streaming());

        let history = session.history.get(&workspace_id).expect("get");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[1].role, Role::Assistant);
        assert_eq!(history[1].text_content(), "Hi");
        assert_eq!(history[1].metadata.partial, None);
    }

    #[tokio::test]
    async fn second_send_while_streaming_is_rejected() {
        let message_id = MessageId::new();
        // No StreamEnd in the script: the stream stays open until the
        // fake's iterator is exhausted and `None` closes it, which is
        // itself treated as an interruption — but the busy check only
        // needs the window before that happens.
        let script = vec![StreamEvent::StreamStart { message_id }];
        let (_dir, session, _workspace_id) = new_session(script);

        session.send_message("first".to_string(), SendOptions::default(), 0).await.expect("send");
        let second = session.send_message("second".to_string(), SendOptions::default(), 1).await;
        assert!(matches!(second, Err(SendMessageError::AlreadyStreaming(_))));
    }

    #[tokio::test]
    async fn interrupt_commits_partial_text() {
        let message_id = MessageId::new();
        let script = vec![
            StreamEvent::StreamStart { message_id: message_id.clone() },
            StreamEvent::StreamDelta { message_id: message_id.clone(), delta: "Pending".to_string() },
        ];
        let (_dir, session, workspace_id) = new_session(script);

        session.send_message("hello".to_string(), SendOptions::default(), 0).await.expect("send");
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        session.interrupt_stream();

        for _ in 0..50 {
            if !session.is_streaming() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        let history = session.history.get(&workspace_id).expect("get");
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].metadata.partial, Some(true));
        assert_eq!(history[1].text_content(), "Pending");
    }

    /// A `ModelStream` that yields a couple of events and then stalls
    /// forever, so a test can observe `is_streaming() == true` for as
    /// long as it needs before interrupting.
    struct StallingModelStream {
        message_id: MessageId,
    }

    #[async_trait::async_trait]
    impl crate::model::ModelStream for StallingModelStream {
        async fn stream(
            &self,
            _history: &[Message],
            _opts: &StreamOpts,
            _cancel: CancellationToken,
        ) -> Result<futures::stream::BoxStream<'static, StreamEvent>, crate::model::ModelError> {
            let events = vec![
                StreamEvent::StreamStart { message_id: self.message_id.clone() },
                StreamEvent::StreamDelta { message_id: self.message_id.clone(), delta: "partial".to_string() },
            ];
            Ok(Box::pin(futures::stream::iter(events).chain(futures::stream::pending())))
        }
    }

    #[tokio::test]
    async fn edit_while_streaming_interrupts_then_resubmits() {
        let message_id = MessageId::new();
        let dir = tempfile::tempdir().expect("tempdir");
        let history = Arc::new(HistoryStore::new(dir.path()));
        let partial = Arc::new(PartialStore::new(dir.path()));
        let model = Arc::new(StallingModelStream { message_id });
        let hub = Arc::new(SubscriptionHub::new());
        let workspace_id = WorkspaceId::new();
        let session = AgentSession::new(workspace_id.clone(), history, partial, model, hub);

        session.send_message("first".to_string(), SendOptions::default(), 0).await.expect("send");
        for _ in 0..50 {
            if session.is_streaming() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(session.is_streaming(), "stalling model stream should still be active");

        let first_id = session.history.get(&workspace_id).expect("get")[0].id.clone();

        session
            .send_message("edited".to_string(), SendOptions { model: None, edit_message_id: Some(first_id) }, 1)
            .await
            .expect("edit while streaming should interrupt and resubmit, not reject as busy");

        let history = session.history.get(&workspace_id).expect("get");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].text_content(), "edited");
    }

    #[tokio::test]
    async fn edit_message_id_truncates_before_resubmitting() {
        let script = vec![];
        let (_dir, session, workspace_id) = new_session(script);

        session.send_message("first".to_string(), SendOptions::default(), 0).await.expect("send");
        for _ in 0..20 {
            if !session.is_streaming() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        let first_id = session.history.get(&workspace_id).expect("get")[0].id.clone();

        session
            .send_message(
                "edited".to_string(),
                SendOptions { model: None, edit_message_id: Some(first_id) },
                1,
            )
            .await
            .expect("send edited");

        let history = session.history.get(&workspace_id).expect("get");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].text_content(), "edited");
    }

    #[tokio::test]
    async fn init_events_are_published_and_leave_no_history_trace() {
        let (_dir, session, workspace_id) = new_session(vec![]);
        let mut rx = session.hub.subscribe_chat(&workspace_id);

        assert!(session.init_snapshot().is_none());

        session.apply_and_publish(&StreamEvent::InitStart);
        session.apply_and_publish(&StreamEvent::InitEnd { exit_code: Some(0) });

        assert!(session.init_snapshot().is_some());
        assert!(session.history.get(&workspace_id).expect("get").is_empty());

        let first = rx.recv().await.expect("recv");
        assert!(matches!(first, ws_core::DisplayedMessage::WorkspaceInit { .. }));
        let second = rx.recv().await.expect("recv");
        assert!(matches!(second, ws_core::DisplayedMessage::WorkspaceInit { .. }));
    }
}
