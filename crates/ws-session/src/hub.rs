// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `SubscriptionHub`: per-workspace chat channels plus a global
//! metadata channel (spec.md §4.7). Producers never block on slow
//! consumers — a lagging subscriber is disconnected instead.

use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::broadcast;
use ws_core::{DisplayedMessage, Workspace, WorkspaceId};

/// Bounded per-channel capacity (spec.md §5 "subscriber queues are
/// bounded"). Once a subscriber falls this far behind, `tokio::sync::broadcast`
/// returns `Lagged` on its next `recv`, which the caller treats as an
/// overflow disconnect.
const CHANNEL_CAPACITY: usize = 1024;

/// `workspace:metadata` payload: `Some` on create/rename/update,
/// `None` on delete (spec.md §4.5 `emitMetadata`).
pub type MetadataEvent = Option<Workspace>;

pub struct SubscriptionHub {
    chat: Mutex<HashMap<WorkspaceId, broadcast::Sender<DisplayedMessage>>>,
    metadata: broadcast::Sender<MetadataEvent>,
}

impl Default for SubscriptionHub {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriptionHub {
    pub fn new() -> Self {
        let (metadata, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        Self { chat: Mutex::new(HashMap::new()), metadata }
    }

    fn chat_sender(&self, workspace_id: &WorkspaceId) -> broadcast::Sender<DisplayedMessage> {
        let mut chat = self.chat.lock();
        chat.entry(workspace_id.clone())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Publishes one already-expanded `DisplayedMessage` on
    /// `workspace:chat:<id>`, in emission order. No-op if nobody is
    /// subscribed.
    pub fn publish_chat(&self, workspace_id: &WorkspaceId, message: DisplayedMessage) {
        let sender = self.chat_sender(workspace_id);
        let _ = sender.send(message);
    }

    /// Publishes on `workspace:metadata`. No-op if nobody is
    /// subscribed.
    pub fn publish_metadata(&self, event: MetadataEvent) {
        let _ = self.metadata.send(event);
    }

    /// Subscribes to a workspace's chat channel. Callers should
    /// subscribe *before* replaying history to avoid a gap between the
    /// snapshot and the live tail (the expander's id-based dedup makes
    /// a small overlap harmless; a gap is not).
    pub fn subscribe_chat(&self, workspace_id: &WorkspaceId) -> broadcast::Receiver<DisplayedMessage> {
        self.chat_sender(workspace_id).subscribe()
    }

    pub fn subscribe_metadata(&self) -> broadcast::Receiver<MetadataEvent> {
        self.metadata.subscribe()
    }

    /// Drops the channel for a deleted workspace once no further
    /// events will be published on it.
    pub fn remove_workspace(&self, workspace_id: &WorkspaceId) {
        self.chat.lock().remove(workspace_id);
    }
}

/// Outcome of draining a subscriber's receiver for one tick.
pub enum RecvOutcome<T> {
    Event(T),
    /// The channel fell more than `CHANNEL_CAPACITY` events behind;
    /// the subscriber must be sent an error frame and disconnected
    /// (spec.md §4.7).
    Overflowed(u64),
    Closed,
}

/// Translates a `broadcast::Receiver` result into the overflow/closed
/// vocabulary callers (the WS transport) act on.
pub async fn recv_or_overflow<T: Clone>(rx: &mut broadcast::Receiver<T>) -> RecvOutcome<T> {
    match rx.recv().await {
        Ok(event) => RecvOutcome::Event(event),
        Err(broadcast::error::RecvError::Lagged(skipped)) => RecvOutcome::Overflowed(skipped),
        Err(broadcast::error::RecvError::Closed) => RecvOutcome::Closed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ws_core::MessageId;

    fn status(n: i64) -> DisplayedMessage {
        DisplayedMessage::Status { history_sequence: n, message: "tick".to_string() }
    }

    #[tokio::test]
    async fn publish_is_delivered_to_subscriber() {
        let hub = SubscriptionHub::new();
        let id = WorkspaceId::new();
        let mut rx = hub.subscribe_chat(&id);

        hub.publish_chat(
            &id,
            DisplayedMessage::User { id: MessageId::new(), history_sequence: 1, content: "hi".to_string() },
        );

        let event = rx.recv().await.expect("recv");
        assert!(matches!(event, DisplayedMessage::User { .. }));
    }

    #[tokio::test]
    async fn different_workspaces_are_isolated() {
        let hub = SubscriptionHub::new();
        let a = WorkspaceId::new();
        let b = WorkspaceId::new();
        let mut rx_b = hub.subscribe_chat(&b);

        hub.publish_chat(&a, status(1));

        let timeout = tokio::time::timeout(std::time::Duration::from_millis(50), rx_b.recv()).await;
        assert!(timeout.is_err(), "workspace b should not observe workspace a's events");
    }

    #[tokio::test]
    async fn overflow_is_reported_as_lagged() {
        let hub = SubscriptionHub::new();
        let id = WorkspaceId::new();
        let mut rx = hub.subscribe_chat(&id);

        for n in 0..(CHANNEL_CAPACITY as i64 + 10) {
            hub.publish_chat(&id, status(n));
        }

        let outcome = recv_or_overflow(&mut rx).await;
        assert!(matches!(outcome, RecvOutcome::Overflowed(_)));
    }

    #[tokio::test]
    async fn metadata_none_signals_deletion() {
        let hub = SubscriptionHub::new();
        let mut rx = hub.subscribe_metadata();
        hub.publish_metadata(None);
        assert_eq!(rx.recv().await.expect("recv"), None);
    }
}
