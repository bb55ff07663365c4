// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Raw model-stream events (spec.md §3), the input to the event
//! expander. Closed sum type with a required `type` discriminator so
//! the wire format can version forward: unknown variants must parse
//! to `StreamEvent::Unknown` rather than fail, per spec.md §9.

use crate::id::{MessageId, ToolCallId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StreamEvent {
    StreamStart {
        #[serde(rename = "messageId")]
        message_id: MessageId,
    },
    StreamDelta {
        #[serde(rename = "messageId")]
        message_id: MessageId,
        delta: String,
    },
    ReasoningDelta {
        #[serde(rename = "messageId")]
        message_id: MessageId,
        delta: String,
    },
    ReasoningEnd {
        #[serde(rename = "messageId")]
        message_id: MessageId,
    },
    ToolCallStart {
        #[serde(rename = "messageId")]
        message_id: MessageId,
        #[serde(rename = "toolCallId")]
        tool_call_id: ToolCallId,
        #[serde(rename = "toolName")]
        tool_name: String,
        input: Value,
    },
    ToolCallDelta {
        #[serde(rename = "messageId")]
        message_id: MessageId,
        #[serde(rename = "toolCallId")]
        tool_call_id: ToolCallId,
        delta: String,
    },
    ToolCallEnd {
        #[serde(rename = "messageId")]
        message_id: MessageId,
        #[serde(rename = "toolCallId")]
        tool_call_id: ToolCallId,
        output: Value,
    },
    StreamEnd {
        #[serde(rename = "messageId")]
        message_id: MessageId,
    },
    StreamAbort {
        #[serde(rename = "messageId")]
        message_id: MessageId,
    },
    StreamError {
        #[serde(rename = "messageId")]
        message_id: Option<MessageId>,
        #[serde(rename = "errorType")]
        error_type: String,
        error: String,
    },
    InitStart,
    InitOutput {
        stream: InitStream,
        line: String,
    },
    InitEnd {
        #[serde(rename = "exitCode")]
        exit_code: Option<i32>,
    },
    Delete {
        #[serde(rename = "historySequences")]
        history_sequences: Vec<i64>,
    },
    Status {
        message: String,
    },
    CaughtUp,
    /// Forward-compatibility catch-all: any event whose `type` tag is
    /// not one of the above. Carries the raw tag so the expander can
    /// log a diagnostic once per unknown type (spec.md §4.6).
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InitStream {
    Stdout,
    Stderr,
}

impl StreamEvent {
    pub fn message_id(&self) -> Option<&MessageId> {
        match self {
            StreamEvent::StreamStart { message_id }
            | StreamEvent::StreamDelta { message_id, .. }
            | StreamEvent::ReasoningDelta { message_id, .. }
            | StreamEvent::ReasoningEnd { message_id }
            | StreamEvent::ToolCallStart { message_id, .. }
            | StreamEvent::ToolCallDelta { message_id, .. }
            | StreamEvent::ToolCallEnd { message_id, .. }
            | StreamEvent::StreamEnd { message_id }
            | StreamEvent::StreamAbort { message_id } => Some(message_id),
            StreamEvent::StreamError { message_id, .. } => message_id.as_ref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_type_tag_parses_to_unknown_variant() {
        let json = serde_json::json!({"type": "some-future-event", "payload": 1});
        let ev: StreamEvent = serde_json::from_value(json).unwrap();
        assert_eq!(ev, StreamEvent::Unknown);
    }

    #[test]
    fn stream_delta_round_trips() {
        let ev = StreamEvent::StreamDelta {
            message_id: MessageId::from_string("msg-1"),
            delta: "Hel".to_string(),
        };
        let json = serde_json::to_string(&ev).unwrap();
        let back: StreamEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(ev, back);
    }
}
