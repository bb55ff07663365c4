// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn new_ids_carry_their_prefix() {
    let id = WorkspaceId::new();
    assert!(id.as_str().starts_with("wks-"));
}

#[test]
fn new_ids_are_unique() {
    let a = WorkspaceId::new();
    let b = WorkspaceId::new();
    assert_ne!(a, b);
}

#[test]
fn from_string_round_trips() {
    let id = WorkspaceId::from_string("wks-abc123");
    assert_eq!(id.as_str(), "wks-abc123");
    assert_eq!(id.to_string(), "wks-abc123");
}

#[test]
fn serde_round_trip() {
    let id = MessageId::new();
    let json = serde_json::to_string(&id).unwrap();
    let back: MessageId = serde_json::from_str(&json).unwrap();
    assert_eq!(id, back);
}
