// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `HistoryStore`: one append-only `chat.jsonl` per workspace
//! (spec.md §4.3).

use crate::atomic::{append_line, write_atomic};
use crate::error::StorageError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use ws_core::{Message, MessageId, WorkspaceId};

/// Per-workspace state guarding append ordering and the
/// busy-while-streaming rule (spec.md §4.3, §5).
#[derive(Default)]
struct WorkspaceState {
    lock: Mutex<()>,
    streaming: std::sync::atomic::AtomicBool,
}

pub struct HistoryStore {
    session_dir: PathBuf,
    states: Mutex<HashMap<WorkspaceId, Arc<WorkspaceState>>>,
}

impl HistoryStore {
    pub fn new(session_dir: impl Into<PathBuf>) -> Self {
        Self { session_dir: session_dir.into(), states: Mutex::new(HashMap::new()) }
    }

    fn chat_path(&self, workspace_id: &WorkspaceId) -> PathBuf {
        self.session_dir.join(workspace_id.as_str()).join("chat.jsonl")
    }

    fn state_for(&self, workspace_id: &WorkspaceId) -> Arc<WorkspaceState> {
        self.states.lock().entry(workspace_id.clone()).or_default().clone()
    }

    /// Marks a workspace as actively streaming, rejecting `truncate`
    /// and `replace` until `end_stream` is called.
    pub fn begin_stream(&self, workspace_id: &WorkspaceId) {
        self.state_for(workspace_id).streaming.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn end_stream(&self, workspace_id: &WorkspaceId) {
        self.state_for(workspace_id).streaming.store(false, std::sync::atomic::Ordering::SeqCst);
    }

    fn is_streaming(&self, workspace_id: &WorkspaceId) -> bool {
        self.state_for(workspace_id).streaming.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Assigns the next `historySequence` (the workspace's current
    /// message count, so the first message ever appended gets `0`) and
    /// durably appends. Monotonic: never decreases, never duplicated
    /// (spec.md §8, property 1).
    pub fn append(&self, workspace_id: &WorkspaceId, mut msg: Message) -> Result<Message, StorageError> {
        let state = self.state_for(workspace_id);
        let _guard = state.lock.lock();

        msg.metadata.history_sequence = self.next_sequence_locked(workspace_id)?;

        let line = serde_json::to_string(&msg)?;
        append_line(&self.chat_path(workspace_id), &line)?;
        Ok(msg)
    }

    fn next_sequence_locked(&self, workspace_id: &WorkspaceId) -> Result<i64, StorageError> {
        let messages = self.read_all_locked(workspace_id)?;
        Ok(messages.len() as i64)
    }

    fn read_all_locked(&self, workspace_id: &WorkspaceId) -> Result<Vec<Message>, StorageError> {
        let path = self.chat_path(workspace_id);
        let contents = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut out = Vec::new();
        for line in contents.lines() {
            if line.trim().is_empty() {
                continue;
            }
            out.push(serde_json::from_str(line)?);
        }
        Ok(out)
    }

    /// Full replay in append order.
    pub fn get(&self, workspace_id: &WorkspaceId) -> Result<Vec<Message>, StorageError> {
        let state = self.state_for(workspace_id);
        let _guard = state.lock.lock();
        self.read_all_locked(workspace_id)
    }

    /// Removes the last `ceil(N * fraction)` messages, `fraction` in
    /// `(0,1]`. Forbidden while a stream is active.
    pub fn truncate(
        &self,
        workspace_id: &WorkspaceId,
        fraction: f64,
    ) -> Result<Vec<i64>, StorageError> {
        if self.is_streaming(workspace_id) {
            return Err(StorageError::Busy(format!(
                "cannot truncate {workspace_id}: a stream is active"
            )));
        }
        if !(0.0 < fraction && fraction <= 1.0) {
            return Err(StorageError::Validation("fraction must be in (0,1]".to_string()));
        }

        let state = self.state_for(workspace_id);
        let _guard = state.lock.lock();
        let mut messages = self.read_all_locked(workspace_id)?;
        let remove_count = ((messages.len() as f64) * fraction).ceil() as usize;
        let remove_count = remove_count.min(messages.len());
        let keep_len = messages.len() - remove_count;
        let deleted: Vec<i64> =
            messages.split_off(keep_len).into_iter().map(|m| m.metadata.history_sequence).collect();
        self.rewrite_locked(workspace_id, &messages)?;
        Ok(deleted)
    }

    /// Deletes all messages and appends exactly one new one (used by
    /// compaction). Forbidden while a non-compaction stream is active.
    pub fn replace(&self, workspace_id: &WorkspaceId, mut summary: Message) -> Result<(), StorageError> {
        if self.is_streaming(workspace_id) {
            return Err(StorageError::Busy(format!(
                "cannot replace history for {workspace_id}: a stream is active"
            )));
        }
        let state = self.state_for(workspace_id);
        let _guard = state.lock.lock();
        summary.metadata.history_sequence = 0;
        self.rewrite_locked(workspace_id, std::slice::from_ref(&summary))
    }

    /// Removes `message_id` and every message after it, for edit-resubmit
    /// (spec.md §4.5 `editMessageId`). Forbidden while a stream is
    /// active, same as [`HistoryStore::truncate`].
    pub fn truncate_from(
        &self,
        workspace_id: &WorkspaceId,
        message_id: &MessageId,
    ) -> Result<Vec<i64>, StorageError> {
        if self.is_streaming(workspace_id) {
            return Err(StorageError::Busy(format!(
                "cannot truncate {workspace_id}: a stream is active"
            )));
        }

        let state = self.state_for(workspace_id);
        let _guard = state.lock.lock();
        let mut messages = self.read_all_locked(workspace_id)?;
        let Some(idx) = messages.iter().position(|m| &m.id == message_id) else {
            return Err(StorageError::NotFound(format!("message {message_id} not found")));
        };
        let deleted: Vec<i64> =
            messages.split_off(idx).into_iter().map(|m| m.metadata.history_sequence).collect();
        self.rewrite_locked(workspace_id, &messages)?;
        Ok(deleted)
    }

    fn rewrite_locked(&self, workspace_id: &WorkspaceId, messages: &[Message]) -> Result<(), StorageError> {
        let mut buf = String::new();
        for m in messages {
            buf.push_str(&serde_json::to_string(m)?);
            buf.push('\n');
        }
        write_atomic(&self.chat_path(workspace_id), buf.as_bytes())
    }

    /// Rewrites embedded workspace references for `rename`. Optional
    /// per implementation; this implementation's `Message` carries no
    /// workspace id internally, so this is a filesystem move.
    pub fn migrate_workspace_id(&self, old: &WorkspaceId, new: &WorkspaceId) -> Result<(), StorageError> {
        let old_dir = self.session_dir.join(old.as_str());
        let new_dir = self.session_dir.join(new.as_str());
        if old_dir.exists() {
            if let Some(parent) = new_dir.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::rename(&old_dir, &new_dir)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ws_core::Message;

    fn store() -> (tempfile::TempDir, HistoryStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = HistoryStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn append_assigns_monotonic_sequences() {
        let (_dir, store) = store();
        let id = WorkspaceId::new();
        let m1 = store.append(&id, Message::new_user("hi", 0)).expect("append 1");
        let m2 = store.append(&id, Message::new_user("there", 1)).expect("append 2");
        assert_eq!(m1.metadata.history_sequence, 0);
        assert_eq!(m2.metadata.history_sequence, 1);
    }

    #[test]
    fn truncate_whole_fraction_clears_everything() {
        let (_dir, store) = store();
        let id = WorkspaceId::new();
        store.append(&id, Message::new_user("a", 0)).expect("append");
        store.append(&id, Message::new_user("b", 1)).expect("append");
        let deleted = store.truncate(&id, 1.0).expect("truncate");
        assert_eq!(deleted.len(), 2);
        assert!(store.get(&id).expect("get").is_empty());
    }

    #[test]
    fn truncate_rejected_while_streaming() {
        let (_dir, store) = store();
        let id = WorkspaceId::new();
        store.append(&id, Message::new_user("a", 0)).expect("append");
        store.begin_stream(&id);
        assert!(matches!(store.truncate(&id, 1.0), Err(StorageError::Busy(_))));
        store.end_stream(&id);
        assert!(store.truncate(&id, 1.0).is_ok());
    }

    #[test]
    fn replace_clears_and_appends_one() {
        let (_dir, store) = store();
        let id = WorkspaceId::new();
        store.append(&id, Message::new_user("a", 0)).expect("append");
        store.append(&id, Message::new_user("b", 1)).expect("append");
        store.replace(&id, Message::new_user("summary", 2)).expect("replace");
        let history = store.get(&id).expect("get");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].text_content(), "summary");
    }

    #[test]
    fn truncate_from_removes_target_and_everything_after() {
        let (_dir, store) = store();
        let id = WorkspaceId::new();
        let keep = store.append(&id, Message::new_user("keep", 0)).expect("append");
        let edited = store.append(&id, Message::new_user("edited", 1)).expect("append");
        store.append(&id, Message::new_user("reply", 2)).expect("append");

        let deleted = store.truncate_from(&id, &edited.id).expect("truncate_from");
        assert_eq!(deleted, vec![1, 2]);

        let remaining = store.get(&id).expect("get");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, keep.id);
    }

    #[test]
    fn truncate_from_missing_message_is_not_found() {
        let (_dir, store) = store();
        let id = WorkspaceId::new();
        store.append(&id, Message::new_user("a", 0)).expect("append");
        let missing = ws_core::MessageId::new();
        assert!(matches!(store.truncate_from(&id, &missing), Err(StorageError::NotFound(_))));
    }
}
