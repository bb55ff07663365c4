// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Owns every workspace's [`AgentSession`], lazily creating one on
//! first subscription or first message and disposing of it on
//! deletion (spec.md §4.5).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use ws_core::WorkspaceId;
use ws_session::{AgentSession, ModelStreamFactory, SubscriptionHub};
use ws_storage::{HistoryStore, PartialStore};

pub struct SessionRegistry {
    history: Arc<HistoryStore>,
    partial: Arc<PartialStore>,
    hub: Arc<SubscriptionHub>,
    model_factory: Arc<dyn ModelStreamFactory>,
    sessions: Mutex<HashMap<WorkspaceId, Arc<AgentSession>>>,
}

impl SessionRegistry {
    pub fn new(
        history: Arc<HistoryStore>,
        partial: Arc<PartialStore>,
        hub: Arc<SubscriptionHub>,
        model_factory: Arc<dyn ModelStreamFactory>,
    ) -> Self {
        Self { history, partial, hub, model_factory, sessions: Mutex::new(HashMap::new()) }
    }

    /// Returns the existing session for `workspace_id`, or creates and
    /// caches a fresh one. Never blocks on I/O: `AgentSession::new`
    /// only wires collaborators together.
    pub fn get_or_create(&self, workspace_id: &WorkspaceId) -> Arc<AgentSession> {
        let mut sessions = self.sessions.lock();
        if let Some(session) = sessions.get(workspace_id) {
            return Arc::clone(session);
        }
        let model = self.model_factory.for_workspace(workspace_id);
        let session = AgentSession::new(
            workspace_id.clone(),
            Arc::clone(&self.history),
            Arc::clone(&self.partial),
            model,
            Arc::clone(&self.hub),
        );
        sessions.insert(workspace_id.clone(), Arc::clone(&session));
        session
    }

    /// Looks up a session without creating one, for callers (e.g. a
    /// stream-interrupt request) that must not spin up a session for a
    /// workspace that has never streamed.
    pub fn get(&self, workspace_id: &WorkspaceId) -> Option<Arc<AgentSession>> {
        self.sessions.lock().get(workspace_id).cloned()
    }

    /// Drops the session and its chat broadcast channel (spec.md §4.8
    /// `delete`). The workspace's history/partial files are removed by
    /// the caller separately; this only disposes in-memory state.
    pub fn dispose(&self, workspace_id: &WorkspaceId) {
        self.sessions.lock().remove(workspace_id);
        self.hub.remove_workspace(workspace_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ws_session::ModelStreamFactory as _;

    fn registry() -> (tempfile::TempDir, SessionRegistry) {
        let dir = tempfile::tempdir().expect("tempdir");
        let history = Arc::new(HistoryStore::new(dir.path()));
        let partial = Arc::new(PartialStore::new(dir.path()));
        let hub = Arc::new(SubscriptionHub::new());
        let factory: Arc<dyn ModelStreamFactory> =
            Arc::new(ws_session::model::fake::FakeModelStreamFactory::new(vec![]));
        (dir, SessionRegistry::new(history, partial, hub, factory))
    }

    #[test]
    fn get_or_create_returns_same_instance_on_repeat_calls() {
        let (_dir, registry) = registry();
        let id = WorkspaceId::new();
        let first = registry.get_or_create(&id);
        let second = registry.get_or_create(&id);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn get_without_create_is_none_for_untouched_workspace() {
        let (_dir, registry) = registry();
        let id = WorkspaceId::new();
        assert!(registry.get(&id).is_none());
    }

    #[test]
    fn dispose_removes_cached_session() {
        let (_dir, registry) = registry();
        let id = WorkspaceId::new();
        registry.get_or_create(&id);
        registry.dispose(&id);
        assert!(registry.get(&id).is_none());
    }

    #[test]
    fn distinct_workspaces_get_distinct_sessions() {
        let (_dir, registry) = registry();
        let a = WorkspaceId::new();
        let b = WorkspaceId::new();
        let factory_a = registry.get_or_create(&a);
        let factory_b = registry.get_or_create(&b);
        assert!(!Arc::ptr_eq(&factory_a, &factory_b));
    }
}
