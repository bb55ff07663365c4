// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `ConfigStore`: `projects.json` + `secrets.json`, all mutation funneled
//! through `edit_config` (spec.md §4.2).

use crate::atomic::{write_atomic, write_atomic_private};
use crate::error::StorageError;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use ws_core::{Project, RuntimeConfig, Secret, Workspace, WorkspaceId};

/// One workspace entry as persisted under its owning project. `path`
/// and `project_path` are not stored — they're always recomputed via
/// `ws_core::workspace_path`, so the two can never drift apart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceRecord {
    pub id: WorkspaceId,
    pub name: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "runtimeConfig", default)]
    pub runtime_config: RuntimeConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub workspaces: Vec<WorkspaceRecord>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigDocument {
    #[serde(default)]
    pub projects: BTreeMap<String, ProjectConfig>,
}

type SecretsDocument = BTreeMap<String, Vec<Secret>>;

pub struct ConfigStore {
    config_home: PathBuf,
    // Serializes the whole read-modify-write cycle in-process; the
    // temp+rename dance guards against a half-written file on disk.
    lock: Mutex<()>,
}

impl ConfigStore {
    pub fn new(config_home: impl Into<PathBuf>) -> Self {
        Self { config_home: config_home.into(), lock: Mutex::new(()) }
    }

    fn projects_path(&self) -> PathBuf {
        self.config_home.join("projects.json")
    }

    fn secrets_path(&self) -> PathBuf {
        self.config_home.join("secrets.json")
    }

    fn load_document(&self) -> Result<ConfigDocument, StorageError> {
        load_json_or_default(&self.projects_path())
    }

    fn save_document(&self, doc: &ConfigDocument) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec_pretty(doc)?;
        write_atomic(&self.projects_path(), &bytes)
    }

    fn load_secrets(&self) -> Result<SecretsDocument, StorageError> {
        load_json_or_default(&self.secrets_path())
    }

    fn save_secrets(&self, doc: &SecretsDocument) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec_pretty(doc)?;
        write_atomic_private(&self.secrets_path(), &bytes)
    }

    /// Reads the document, applies `f`, and atomically writes the
    /// result back. The only path by which the document is ever
    /// mutated (spec.md §4.2).
    pub fn edit_config<F, T>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&mut ConfigDocument) -> T,
    {
        let _guard = self.lock.lock();
        let mut doc = self.load_document()?;
        let result = f(&mut doc);
        self.save_document(&doc)?;
        Ok(result)
    }

    /// Canonical `projectPath + "/" + name` join (spec.md §4.2). All
    /// components must agree on this function.
    pub fn get_workspace_path(&self, project_path: &str, name: &str) -> String {
        ws_core::workspace_path(project_path, name)
    }

    /// Single source of truth for "what workspaces exist", with
    /// computed paths filled in.
    pub fn get_all_workspace_metadata(&self) -> Result<Vec<Workspace>, StorageError> {
        let doc = self.load_document()?;
        let mut out = Vec::new();
        for (project_path, project) in &doc.projects {
            for record in &project.workspaces {
                out.push(Workspace {
                    id: record.id.clone(),
                    name: record.name.clone(),
                    project_path: project_path.clone(),
                    path: ws_core::workspace_path(project_path, &record.name),
                    created_at: record.created_at,
                    runtime_config: record.runtime_config.clone(),
                });
            }
        }
        Ok(out)
    }

    pub fn find_workspace(&self, id: &WorkspaceId) -> Result<Option<Workspace>, StorageError> {
        Ok(self.get_all_workspace_metadata()?.into_iter().find(|w| &w.id == id))
    }

    pub fn list_projects(&self) -> Result<Vec<(String, ProjectConfig)>, StorageError> {
        let doc = self.load_document()?;
        Ok(doc.projects.into_iter().collect())
    }

    pub fn get_project_secrets(&self, project_path: &str) -> Result<Vec<Secret>, StorageError> {
        let doc = self.load_secrets()?;
        Ok(doc.get(project_path).cloned().unwrap_or_default())
    }

    pub fn update_project_secrets(
        &self,
        project_path: &str,
        secrets: Vec<Secret>,
    ) -> Result<(), StorageError> {
        let _guard = self.lock.lock();
        let mut doc = self.load_secrets()?;
        if secrets.is_empty() {
            doc.remove(project_path);
        } else {
            doc.insert(project_path.to_string(), secrets);
        }
        self.save_secrets(&doc)
    }

    /// New nanoid-backed workspace id; never reused.
    pub fn generate_stable_id(&self) -> WorkspaceId {
        WorkspaceId::new()
    }
}

fn load_json_or_default<T: Default + for<'de> Deserialize<'de>>(
    path: &Path,
) -> Result<T, StorageError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(e.into()),
    }
}

/// Convenience projection used by `project:list` (spec.md §6.1).
pub fn project_summaries(store: &ConfigStore) -> Result<Vec<Project>, StorageError> {
    let projects = store.list_projects()?;
    let mut out = Vec::with_capacity(projects.len());
    for (path, _) in projects {
        let secrets = store
            .get_project_secrets(&path)?
            .into_iter()
            .map(|s| (s.key, s.value))
            .collect();
        out.push(Project { path, secrets });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> WorkspaceRecord {
        WorkspaceRecord {
            id: WorkspaceId::new(),
            name: "feat".to_string(),
            created_at: Utc::now(),
            runtime_config: RuntimeConfig::Local,
        }
    }

    #[test]
    fn edit_config_persists_across_instances() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ConfigStore::new(dir.path());
        let record = sample_record();
        let id = record.id.clone();
        store
            .edit_config(|doc| {
                doc.projects.entry("/p".to_string()).or_default().workspaces.push(record);
            })
            .expect("edit");

        let reopened = ConfigStore::new(dir.path());
        let found = reopened.find_workspace(&id).expect("find").expect("present");
        assert_eq!(found.name, "feat");
        assert_eq!(found.path, "/p/feat");
    }

    #[test]
    fn workspace_path_matches_get_workspace_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ConfigStore::new(dir.path());
        assert_eq!(store.get_workspace_path("/p/", "feat"), "/p/feat");
    }

    #[test]
    fn secrets_roundtrip_and_empty_removes_entry() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ConfigStore::new(dir.path());
        store
            .update_project_secrets(
                "/p",
                vec![Secret { key: "TOKEN".to_string(), value: "abc".to_string() }],
            )
            .expect("update");
        assert_eq!(store.get_project_secrets("/p").expect("get").len(), 1);

        store.update_project_secrets("/p", vec![]).expect("clear");
        assert!(store.get_project_secrets("/p").expect("get").is_empty());
    }

    #[test]
    fn missing_files_default_to_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ConfigStore::new(dir.path());
        assert!(store.get_all_workspace_metadata().expect("metadata").is_empty());
        assert!(store.get_project_secrets("/p").expect("secrets").is_empty());
    }
}
