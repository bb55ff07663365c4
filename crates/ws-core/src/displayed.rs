// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Output of the event expander: an ordered timeline of displayable
//! messages (spec.md §4.6).

use crate::id::{MessageId, ToolCallId};
use crate::init_state::{InitStatus, INIT_HISTORY_SEQUENCE};
use crate::message::ToolCallState;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum DisplayedMessage {
    User {
        id: MessageId,
        #[serde(rename = "historySequence")]
        history_sequence: i64,
        content: String,
    },
    Assistant {
        id: MessageId,
        #[serde(rename = "historySequence")]
        history_sequence: i64,
        #[serde(rename = "streamSequence", skip_serializing_if = "Option::is_none")]
        stream_sequence: Option<u32>,
        content: String,
        #[serde(rename = "isStreaming")]
        is_streaming: bool,
        #[serde(rename = "isPartial")]
        is_partial: bool,
        #[serde(rename = "isLastPartOfMessage")]
        is_last_part_of_message: bool,
    },
    Reasoning {
        id: MessageId,
        #[serde(rename = "historySequence")]
        history_sequence: i64,
        #[serde(rename = "streamSequence", skip_serializing_if = "Option::is_none")]
        stream_sequence: Option<u32>,
        content: String,
        #[serde(rename = "isStreaming")]
        is_streaming: bool,
    },
    Tool {
        id: MessageId,
        #[serde(rename = "historySequence")]
        history_sequence: i64,
        #[serde(rename = "streamSequence", skip_serializing_if = "Option::is_none")]
        stream_sequence: Option<u32>,
        #[serde(rename = "toolCallId")]
        tool_call_id: ToolCallId,
        #[serde(rename = "toolName")]
        tool_name: String,
        state: ToolCallState,
        input: Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        output: Option<Value>,
        /// `true` when `output.success == false` (spec.md §4.5).
        failed: bool,
        #[serde(rename = "isStreaming")]
        is_streaming: bool,
    },
    StreamError {
        #[serde(rename = "historySequence")]
        history_sequence: i64,
        #[serde(rename = "errorType")]
        error_type: String,
        error: String,
        #[serde(rename = "errorCount")]
        error_count: u32,
    },
    /// Emitted for a `delete` event: callers drop matching messages
    /// from their view instead of rendering anything here.
    HistoryHidden {
        #[serde(rename = "historySequence")]
        history_sequence: i64,
    },
    WorkspaceInit {
        status: InitStatus,
        #[serde(rename = "hookPath")]
        hook_path: Option<String>,
        lines: Vec<String>,
        #[serde(rename = "exitCode")]
        exit_code: Option<i32>,
    },
    /// Emitted by the expander for an unrecognized wire event type, so
    /// the wire format can evolve without crashing older clients
    /// (spec.md §4.6, §9).
    Status {
        #[serde(rename = "historySequence")]
        history_sequence: i64,
        message: String,
    },
}

impl DisplayedMessage {
    pub fn history_sequence(&self) -> i64 {
        match self {
            DisplayedMessage::User { history_sequence, .. }
            | DisplayedMessage::Assistant { history_sequence, .. }
            | DisplayedMessage::Reasoning { history_sequence, .. }
            | DisplayedMessage::Tool { history_sequence, .. }
            | DisplayedMessage::StreamError { history_sequence, .. }
            | DisplayedMessage::HistoryHidden { history_sequence, .. }
            | DisplayedMessage::Status { history_sequence, .. } => *history_sequence,
            DisplayedMessage::WorkspaceInit { .. } => INIT_HISTORY_SEQUENCE,
        }
    }

    pub fn stream_sequence(&self) -> Option<u32> {
        match self {
            DisplayedMessage::Assistant { stream_sequence, .. }
            | DisplayedMessage::Reasoning { stream_sequence, .. }
            | DisplayedMessage::Tool { stream_sequence, .. } => *stream_sequence,
            _ => None,
        }
    }

    /// Ordering key per spec.md §4.6: `(historySequence asc, streamSequence asc)`.
    pub fn order_key(&self) -> (i64, u32) {
        (self.history_sequence(), self.stream_sequence().unwrap_or(0))
    }

    /// Stable identity of the message this displayable derives from,
    /// for the dedup rule in spec.md §4.6 ("a later event with the
    /// same id and higher stream progress supersedes the earlier one").
    pub fn id(&self) -> Option<&MessageId> {
        match self {
            DisplayedMessage::User { id, .. }
            | DisplayedMessage::Assistant { id, .. }
            | DisplayedMessage::Reasoning { id, .. }
            | DisplayedMessage::Tool { id, .. } => Some(id),
            _ => None,
        }
    }
}
