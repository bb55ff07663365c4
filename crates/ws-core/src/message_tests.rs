// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn new_user_message_carries_text_content() {
    let msg = Message::new_user("hi", 1000);
    assert_eq!(msg.text_content(), "hi");
    assert_eq!(msg.role, Role::User);
    assert!(!msg.is_partial());
}

#[test]
fn text_content_concatenates_multiple_parts() {
    let mut msg = Message::new_user("Hel", 1000);
    msg.parts.push(Part::Text { text: "lo".to_string(), ts: None });
    assert_eq!(msg.text_content(), "Hello");
}

#[test]
fn tool_call_state_serializes_kebab_case() {
    let json = serde_json::to_string(&ToolCallState::InputAvailable).unwrap();
    assert_eq!(json, "\"input-available\"");
    let json = serde_json::to_string(&ToolCallState::OutputAvailable).unwrap();
    assert_eq!(json, "\"output-available\"");
}
