// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `PartialStore`: at most one in-flight message per workspace
//! (spec.md §4.4, §8 property 2).

use crate::atomic::write_atomic;
use crate::error::StorageError;
use crate::history::HistoryStore;
use parking_lot::Mutex;
use std::path::PathBuf;
use ws_core::{Message, WorkspaceId};

pub struct PartialStore {
    session_dir: PathBuf,
    lock: Mutex<()>,
}

impl PartialStore {
    pub fn new(session_dir: impl Into<PathBuf>) -> Self {
        Self { session_dir: session_dir.into(), lock: Mutex::new(()) }
    }

    fn partial_path(&self, workspace_id: &WorkspaceId) -> PathBuf {
        self.session_dir.join(workspace_id.as_str()).join("partial.json")
    }

    /// Overwrites atomically.
    pub fn write(&self, workspace_id: &WorkspaceId, partial: &Message) -> Result<(), StorageError> {
        let _guard = self.lock.lock();
        let bytes = serde_json::to_vec(partial)?;
        write_atomic(&self.partial_path(workspace_id), &bytes)
    }

    pub fn read(&self, workspace_id: &WorkspaceId) -> Result<Option<Message>, StorageError> {
        let _guard = self.lock.lock();
        match std::fs::read(self.partial_path(workspace_id)) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn delete(&self, workspace_id: &WorkspaceId) -> Result<(), StorageError> {
        let _guard = self.lock.lock();
        match std::fs::remove_file(self.partial_path(workspace_id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// If a partial exists, atomically appends it to history (retaining
    /// `partial=true`) and deletes it. Idempotent when no partial
    /// exists. Called before beginning any new stream so interrupted
    /// turns are never dropped from context.
    pub fn commit_to_history(
        &self,
        workspace_id: &WorkspaceId,
        history: &HistoryStore,
    ) -> Result<Option<Message>, StorageError> {
        let existing = self.read(workspace_id)?;
        let Some(partial) = existing else {
            return Ok(None);
        };
        let committed = history.append(workspace_id, partial)?;
        self.delete(workspace_id)?;
        Ok(Some(committed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ws_core::Message;

    #[test]
    fn read_missing_returns_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = PartialStore::new(dir.path());
        let id = WorkspaceId::new();
        assert!(store.read(&id).expect("read").is_none());
    }

    #[test]
    fn write_then_read_roundtrips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = PartialStore::new(dir.path());
        let id = WorkspaceId::new();
        let msg = Message::new_user("Hel", 0);
        store.write(&id, &msg).expect("write");
        let read_back = store.read(&id).expect("read").expect("present");
        assert_eq!(read_back.text_content(), "Hel");
    }

    #[test]
    fn commit_to_history_is_idempotent_without_partial() {
        let dir = tempfile::tempdir().expect("tempdir");
        let partial_store = PartialStore::new(dir.path());
        let history = HistoryStore::new(dir.path());
        let id = WorkspaceId::new();
        assert!(partial_store.commit_to_history(&id, &history).expect("commit").is_none());
    }

    #[test]
    fn commit_to_history_appends_and_clears_partial() {
        let dir = tempfile::tempdir().expect("tempdir");
        let partial_store = PartialStore::new(dir.path());
        let history = HistoryStore::new(dir.path());
        let id = WorkspaceId::new();

        let mut msg = Message::new_user("Hel", 0);
        msg.metadata.partial = Some(true);
        partial_store.write(&id, &msg).expect("write");

        let committed = partial_store.commit_to_history(&id, &history).expect("commit").expect("some");
        assert_eq!(committed.metadata.history_sequence, 1);
        assert!(partial_store.read(&id).expect("read").is_none());

        let stored = history.get(&id).expect("get");
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].metadata.partial, Some(true));
    }
}
