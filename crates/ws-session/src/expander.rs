// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `EventExpander`: pure reducer turning a `StreamEvent` sequence into
//! `DisplayedMessage`s (spec.md §4.6). One instance per workspace,
//! matching the one-live-stream-per-workspace rule (spec.md §5).

use serde_json::Value;
use std::collections::{HashMap, HashSet};
use ws_core::{InitState, Message, MessageId, Part, Role, StreamEvent, ToolCallId, ToolCallState};
use ws_core::DisplayedMessage;

/// Placeholder `historySequence` for an assistant turn still streaming
/// — the real value isn't known until `HistoryStore::append` resolves
/// it at `stream-end`. Callers patch it in via
/// [`EventExpander::resolve_history_sequence`].
pub const PENDING_HISTORY_SEQUENCE: i64 = 0;

#[derive(Debug, Clone, Default)]
struct ToolState {
    tool_name: String,
    input: Value,
    pending_input_delta: String,
    output: Option<Value>,
    state: Option<ToolCallState>,
}

#[derive(Debug, Default)]
struct TurnState {
    text: String,
    reasoning: String,
    tool_order: Vec<ToolCallId>,
    tools: HashMap<ToolCallId, ToolState>,
    stream_sequence: u32,
    error_counts: HashMap<String, u32>,
}

impl TurnState {
    fn next_sequence(&mut self) -> u32 {
        self.stream_sequence += 1;
        self.stream_sequence
    }
}

pub struct EventExpander {
    turns: HashMap<MessageId, TurnState>,
    init_state: Option<InitState>,
    warned_unknown_types: HashSet<String>,
}

impl Default for EventExpander {
    fn default() -> Self {
        Self::new()
    }
}

impl EventExpander {
    pub fn new() -> Self {
        Self { turns: HashMap::new(), init_state: None, warned_unknown_types: HashSet::new() }
    }

    /// Advance the reducer by one event, returning zero or more
    /// `DisplayedMessage`s to publish. Same input sequence always
    /// produces the same output sequence (spec.md §8, property 4).
    pub fn apply(&mut self, event: &StreamEvent) -> Vec<DisplayedMessage> {
        match event {
            StreamEvent::StreamStart { message_id } => {
                self.turns.entry(message_id.clone()).or_default();
                vec![]
            }
            StreamEvent::StreamDelta { message_id, delta } => {
                let turn = self.turns.entry(message_id.clone()).or_default();
                turn.text.push_str(delta);
                let seq = turn.next_sequence();
                vec![assistant_displayed(message_id, turn.text.clone(), seq, true, true, false)]
            }
            StreamEvent::ReasoningDelta { message_id, delta } => {
                let turn = self.turns.entry(message_id.clone()).or_default();
                turn.reasoning.push_str(delta);
                let seq = turn.next_sequence();
                vec![DisplayedMessage::Reasoning {
                    id: message_id.clone(),
                    history_sequence: PENDING_HISTORY_SEQUENCE,
                    stream_sequence: Some(seq),
                    content: turn.reasoning.clone(),
                    is_streaming: true,
                }]
            }
            StreamEvent::ReasoningEnd { .. } => vec![],
            StreamEvent::ToolCallStart { message_id, tool_call_id, tool_name, input } => {
                let turn = self.turns.entry(message_id.clone()).or_default();
                turn.tool_order.push(tool_call_id.clone());
                turn.tools.insert(
                    tool_call_id.clone(),
                    ToolState {
                        tool_name: tool_name.clone(),
                        input: input.clone(),
                        state: Some(ToolCallState::InputAvailable),
                        ..Default::default()
                    },
                );
                let seq = turn.next_sequence();
                let Some(tool) = turn.tools.get(tool_call_id) else { return vec![] };
                vec![tool_displayed(message_id, tool_call_id, tool, seq, true)]
            }
            StreamEvent::ToolCallDelta { message_id, tool_call_id, delta } => {
                let turn = self.turns.entry(message_id.clone()).or_default();
                let seq = turn.next_sequence();
                let Some(tool) = turn.tools.get_mut(tool_call_id) else { return vec![] };
                tool.pending_input_delta.push_str(delta);
                tool.input = Value::String(tool.pending_input_delta.clone());
                let Some(tool) = turn.tools.get(tool_call_id) else { return vec![] };
                vec![tool_displayed(message_id, tool_call_id, tool, seq, true)]
            }
            StreamEvent::ToolCallEnd { message_id, tool_call_id, output } => {
                let turn = self.turns.entry(message_id.clone()).or_default();
                let seq = turn.next_sequence();
                let Some(tool) = turn.tools.get_mut(tool_call_id) else { return vec![] };
                tool.output = Some(output.clone());
                tool.state = Some(ToolCallState::OutputAvailable);
                let Some(tool) = turn.tools.get(tool_call_id) else { return vec![] };
                vec![tool_displayed(message_id, tool_call_id, tool, seq, false)]
            }
            StreamEvent::StreamEnd { message_id } => self.finalize_turn(message_id),
            StreamEvent::StreamAbort { message_id } => self.abort_turn(message_id),
            StreamEvent::StreamError { message_id, error_type, error } => {
                let key = message_id.clone().unwrap_or_else(|| MessageId::from_string("pending"));
                let turn = self.turns.entry(key).or_default();
                let count = turn.error_counts.entry(error_type.clone()).or_insert(0);
                *count += 1;
                vec![DisplayedMessage::StreamError {
                    history_sequence: PENDING_HISTORY_SEQUENCE,
                    error_type: error_type.clone(),
                    error: error.clone(),
                    error_count: *count,
                }]
            }
            StreamEvent::InitStart => {
                self.init_state = Some(InitState::running(None));
                vec![self.init_displayed()]
            }
            StreamEvent::InitOutput { line, .. } => {
                let state = self.init_state.get_or_insert_with(|| InitState::running(None));
                state.push_line(line);
                vec![self.init_displayed()]
            }
            StreamEvent::InitEnd { exit_code } => {
                let state = self.init_state.get_or_insert_with(|| InitState::running(None));
                state.finish(*exit_code);
                vec![self.init_displayed()]
            }
            StreamEvent::Delete { history_sequences } => {
                history_sequences.iter().map(|seq| DisplayedMessage::HistoryHidden { history_sequence: *seq }).collect()
            }
            StreamEvent::Status { message } => {
                vec![DisplayedMessage::Status { history_sequence: PENDING_HISTORY_SEQUENCE, message: message.clone() }]
            }
            StreamEvent::CaughtUp => vec![],
            StreamEvent::Unknown => {
                if self.warned_unknown_types.insert("unknown".to_string()) {
                    vec![DisplayedMessage::Status {
                        history_sequence: PENDING_HISTORY_SEQUENCE,
                        message: "received an event of an unrecognized type; ignoring".to_string(),
                    }]
                } else {
                    vec![]
                }
            }
        }
    }

    /// Current workspace-init view, if `Runtime::init_workspace` has
    /// ever reported progress to this expander. `None` for a workspace
    /// whose creation hook already finished before this process started
    /// (spec.md §4.6, `WorkspaceInit` is never persisted to history —
    /// it is reconstructed from live state for a fresh subscriber).
    pub fn init_snapshot(&self) -> Option<DisplayedMessage> {
        self.init_state.as_ref().map(|_| self.init_displayed())
    }

    fn init_displayed(&self) -> DisplayedMessage {
        let state = self.init_state.clone().unwrap_or_else(|| InitState::running(None));
        DisplayedMessage::WorkspaceInit {
            status: state.status,
            hook_path: state.hook_path,
            lines: state.lines,
            exit_code: state.exit_code,
        }
    }

    /// Splits the accumulated turn into final parts (text, reasoning,
    /// tool calls in first-seen order), each a separate
    /// `DisplayedMessage` with the last content-bearing one flagged
    /// `isLastPartOfMessage`.
    fn finalize_turn(&mut self, message_id: &MessageId) -> Vec<DisplayedMessage> {
        let Some(mut turn) = self.turns.remove(message_id) else { return vec![] };
        let mut out = Vec::new();

        if !turn.reasoning.is_empty() {
            let seq = turn.next_sequence();
            out.push(DisplayedMessage::Reasoning {
                id: message_id.clone(),
                history_sequence: PENDING_HISTORY_SEQUENCE,
                stream_sequence: Some(seq),
                content: turn.reasoning.clone(),
                is_streaming: false,
            });
        }

        for tool_call_id in turn.tool_order.clone() {
            if turn.tools.contains_key(&tool_call_id) {
                let seq = turn.next_sequence();
                let tool = &turn.tools[&tool_call_id];
                out.push(tool_displayed(message_id, &tool_call_id, tool, seq, false));
            }
        }

        let seq = turn.next_sequence();
        out.push(assistant_displayed(message_id, turn.text.clone(), seq, false, false, true));

        if let Some(last) = out.last_mut() {
            mark_last_part(last);
        }
        out
    }

    /// Mid-stream interruption: emits one final partial assistant view
    /// reflecting whatever text had been received so far
    /// (spec.md §8, scenario S3).
    fn abort_turn(&mut self, message_id: &MessageId) -> Vec<DisplayedMessage> {
        let Some(mut turn) = self.turns.remove(message_id) else { return vec![] };
        let seq = turn.next_sequence();
        vec![assistant_displayed(message_id, turn.text.clone(), seq, false, true, true)]
    }

    /// Patches a finalized group's `historySequence` once
    /// `HistoryStore::append` assigns the real value (spec.md §4.6).
    pub fn resolve_history_sequence(messages: &mut [DisplayedMessage], sequence: i64) {
        for message in messages {
            set_history_sequence(message, sequence);
        }
    }
}

/// Projects one already-committed history entry into the same
/// `DisplayedMessage` shape a live turn would have produced, for the
/// snapshot a fresh subscriber replays before the hub's live tail
/// (spec.md §4.7). Unlike [`EventExpander::apply`] this never mutates
/// reducer state — history is already final.
pub fn project_message(message: &Message) -> Vec<DisplayedMessage> {
    let history_sequence = message.metadata.history_sequence;

    if message.role == Role::User {
        return vec![DisplayedMessage::User {
            id: message.id.clone(),
            history_sequence,
            content: message.text_content(),
        }];
    }

    let mut out = Vec::new();
    for part in &message.parts {
        match part {
            Part::Reasoning { text, .. } => out.push(DisplayedMessage::Reasoning {
                id: message.id.clone(),
                history_sequence,
                stream_sequence: None,
                content: text.clone(),
                is_streaming: false,
            }),
            Part::DynamicTool { tool_call_id, tool_name, state, input, output, .. } => {
                let failed = output
                    .as_ref()
                    .and_then(|o| o.get("success"))
                    .and_then(|v| v.as_bool())
                    .map(|success| !success)
                    .unwrap_or(false);
                out.push(DisplayedMessage::Tool {
                    id: message.id.clone(),
                    history_sequence,
                    stream_sequence: None,
                    tool_call_id: tool_call_id.clone(),
                    tool_name: tool_name.clone(),
                    state: *state,
                    input: input.clone(),
                    output: output.clone(),
                    failed,
                    is_streaming: false,
                });
            }
            Part::Text { text, .. } => out.push(DisplayedMessage::Assistant {
                id: message.id.clone(),
                history_sequence,
                stream_sequence: None,
                content: text.clone(),
                is_streaming: false,
                is_partial: message.is_partial(),
                is_last_part_of_message: true,
            }),
            Part::Image { .. } => {}
        }
    }

    if let Some(error) = &message.metadata.error {
        out.push(DisplayedMessage::StreamError {
            history_sequence,
            error_type: message.metadata.error_type.clone().unwrap_or_default(),
            error: error.clone(),
            error_count: 1,
        });
    }

    if out.is_empty() {
        out.push(DisplayedMessage::Assistant {
            id: message.id.clone(),
            history_sequence,
            stream_sequence: None,
            content: String::new(),
            is_streaming: false,
            is_partial: message.is_partial(),
            is_last_part_of_message: true,
        });
    }

    out
}

fn assistant_displayed(
    id: &MessageId,
    content: String,
    stream_sequence: u32,
    is_streaming: bool,
    is_partial: bool,
    is_last_part_of_message: bool,
) -> DisplayedMessage {
    DisplayedMessage::Assistant {
        id: id.clone(),
        history_sequence: PENDING_HISTORY_SEQUENCE,
        stream_sequence: Some(stream_sequence),
        content,
        is_streaming,
        is_partial,
        is_last_part_of_message,
    }
}

fn tool_displayed(
    message_id: &MessageId,
    tool_call_id: &ToolCallId,
    tool: &ToolState,
    stream_sequence: u32,
    is_streaming: bool,
) -> DisplayedMessage {
    let failed = tool
        .output
        .as_ref()
        .and_then(|o| o.get("success"))
        .and_then(|v| v.as_bool())
        .map(|success| !success)
        .unwrap_or(false);
    DisplayedMessage::Tool {
        id: message_id.clone(),
        history_sequence: PENDING_HISTORY_SEQUENCE,
        stream_sequence: Some(stream_sequence),
        tool_call_id: tool_call_id.clone(),
        tool_name: tool.tool_name.clone(),
        state: tool.state.unwrap_or(ToolCallState::InputAvailable),
        input: tool.input.clone(),
        output: tool.output.clone(),
        failed,
        is_streaming,
    }
}

fn mark_last_part(message: &mut DisplayedMessage) {
    if let DisplayedMessage::Assistant { is_last_part_of_message, .. } = message {
        *is_last_part_of_message = true;
    }
}

fn set_history_sequence(message: &mut DisplayedMessage, sequence: i64) {
    match message {
        DisplayedMessage::User { history_sequence, .. }
        | DisplayedMessage::Assistant { history_sequence, .. }
        | DisplayedMessage::Reasoning { history_sequence, .. }
        | DisplayedMessage::Tool { history_sequence, .. }
        | DisplayedMessage::StreamError { history_sequence, .. }
        | DisplayedMessage::HistoryHidden { history_sequence, .. }
        | DisplayedMessage::Status { history_sequence, .. } => *history_sequence = sequence,
        DisplayedMessage::WorkspaceInit { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ws_core::{InitStream, StreamEvent};

    fn mid() -> MessageId {
        MessageId::new()
    }

    #[test]
    fn stream_delta_then_end_merges_into_one_final_message() {
        let mut expander = EventExpander::new();
        let id = mid();
        expander.apply(&StreamEvent::StreamStart { message_id: id.clone() });
        expander.apply(&StreamEvent::StreamDelta { message_id: id.clone(), delta: "Hel".to_string() });
        expander.apply(&StreamEvent::StreamDelta { message_id: id.clone(), delta: "lo".to_string() });
        let finals = expander.apply(&StreamEvent::StreamEnd { message_id: id.clone() });

        assert_eq!(finals.len(), 1);
        match &finals[0] {
            DisplayedMessage::Assistant { content, is_streaming, is_partial, is_last_part_of_message, .. } => {
                assert_eq!(content, "Hello");
                assert!(!is_streaming);
                assert!(!is_partial);
                assert!(is_last_part_of_message);
            }
            other => panic!("expected Assistant, got {other:?}"),
        }
    }

    #[test]
    fn abort_mid_stream_preserves_partial_text() {
        let mut expander = EventExpander::new();
        let id = mid();
        expander.apply(&StreamEvent::StreamStart { message_id: id.clone() });
        expander.apply(&StreamEvent::StreamDelta { message_id: id.clone(), delta: "Hel".to_string() });
        let aborted = expander.apply(&StreamEvent::StreamAbort { message_id: id.clone() });

        assert_eq!(aborted.len(), 1);
        match &aborted[0] {
            DisplayedMessage::Assistant { content, is_partial, .. } => {
                assert_eq!(content, "Hel");
                assert!(is_partial);
            }
            other => panic!("expected Assistant, got {other:?}"),
        }
    }

    #[test]
    fn delete_emits_history_hidden_per_sequence() {
        let mut expander = EventExpander::new();
        let hidden = expander.apply(&StreamEvent::Delete { history_sequences: vec![3, 4] });
        assert_eq!(hidden.len(), 2);
        assert_eq!(hidden[0].history_sequence(), 3);
        assert_eq!(hidden[1].history_sequence(), 4);
    }

    #[test]
    fn unknown_event_warns_once() {
        let mut expander = EventExpander::new();
        let first = expander.apply(&StreamEvent::Unknown);
        let second = expander.apply(&StreamEvent::Unknown);
        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
    }

    #[test]
    fn same_input_sequence_is_deterministic() {
        let script = vec![
            StreamEvent::InitStart,
            StreamEvent::InitOutput { stream: InitStream::Stdout, line: "step 1".to_string() },
            StreamEvent::InitEnd { exit_code: Some(0) },
        ];

        let mut a = EventExpander::new();
        let mut b = EventExpander::new();
        let out_a: Vec<_> = script.iter().flat_map(|e| a.apply(e)).collect();
        let out_b: Vec<_> = script.iter().flat_map(|e| b.apply(e)).collect();
        assert_eq!(out_a, out_b);
    }

    #[test]
    fn project_message_splits_user_and_assistant_shapes() {
        let user = Message::new_user("hi", 0);
        let projected = project_message(&user);
        assert_eq!(projected.len(), 1);
        assert!(matches!(projected[0], DisplayedMessage::User { .. }));

        let assistant = Message {
            id: mid(),
            role: ws_core::Role::Assistant,
            parts: vec![ws_core::Part::Text { text: "hello".to_string(), ts: Some(0) }],
            metadata: ws_core::MessageMetadata { history_sequence: 2, timestamp: 0, ..Default::default() },
        };
        let projected = project_message(&assistant);
        assert_eq!(projected.len(), 1);
        match &projected[0] {
            DisplayedMessage::Assistant { content, is_streaming, is_last_part_of_message, .. } => {
                assert_eq!(content, "hello");
                assert!(!is_streaming);
                assert!(is_last_part_of_message);
            }
            other => panic!("expected Assistant, got {other:?}"),
        }
    }

    #[test]
    fn tool_call_end_marks_failed_on_unsuccessful_output() {
        let mut expander = EventExpander::new();
        let id = mid();
        let tool_call_id = ws_core::ToolCallId::new();
        expander.apply(&StreamEvent::StreamStart { message_id: id.clone() });
        expander.apply(&StreamEvent::ToolCallStart {
            message_id: id.clone(),
            tool_call_id: tool_call_id.clone(),
            tool_name: "bash".to_string(),
            input: serde_json::json!({"command": "false"}),
        });
        let events = expander.apply(&StreamEvent::ToolCallEnd {
            message_id: id.clone(),
            tool_call_id: tool_call_id.clone(),
            output: serde_json::json!({"success": false, "error": "exit 1"}),
        });
        match &events[0] {
            DisplayedMessage::Tool { failed, is_streaming, .. } => {
                assert!(*failed);
                assert!(!is_streaming);
            }
            other => panic!("expected Tool, got {other:?}"),
        }
    }
}
