// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Chat history entries: messages, their parts, and append metadata.

use crate::id::{MessageId, ToolCallId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Lifecycle state of a [`Part::DynamicTool`]. Terminal state is
/// `OutputAvailable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolCallState {
    #[default]
    InputAvailable,
    OutputAvailable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Part {
    Text {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        ts: Option<i64>,
    },
    Reasoning {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        ts: Option<i64>,
    },
    Image {
        url: String,
        #[serde(rename = "mediaType")]
        media_type: String,
    },
    #[serde(rename = "dynamic-tool")]
    DynamicTool {
        #[serde(rename = "toolCallId")]
        tool_call_id: ToolCallId,
        #[serde(rename = "toolName")]
        tool_name: String,
        state: ToolCallState,
        input: Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        output: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        ts: Option<i64>,
    },
}

/// Append-time metadata attached to a [`Message`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageMetadata {
    /// Assigned by `HistoryStore` on append; -1 is reserved for the
    /// synthetic `workspace-init` displayable and never assigned here.
    #[serde(rename = "historySequence")]
    pub history_sequence: i64,
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compacted: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(rename = "errorType", skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub parts: Vec<Part>,
    pub metadata: MessageMetadata,
}

impl Message {
    pub fn new_user(text: impl Into<String>, now_ms: i64) -> Self {
        Self {
            id: MessageId::new(),
            role: Role::User,
            parts: vec![Part::Text { text: text.into(), ts: Some(now_ms) }],
            metadata: MessageMetadata { timestamp: now_ms, ..Default::default() },
        }
    }

    /// Concatenated text of every `Text` part, in order. Used to
    /// assert the "content equals concatenation of deltas" property
    /// (spec.md §8, property 3).
    pub fn text_content(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn is_partial(&self) -> bool {
        self.metadata.partial.unwrap_or(false)
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
