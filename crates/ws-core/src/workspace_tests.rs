// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn local_runtime_config_round_trips() {
    let cfg = RuntimeConfig::Local;
    let json = serde_json::to_value(&cfg).unwrap();
    assert_eq!(json, serde_json::json!({"type": "local"}));
    let back: RuntimeConfig = serde_json::from_value(json).unwrap();
    assert_eq!(back, cfg);
}

#[test]
fn ssh_runtime_config_round_trips_with_optional_fields_omitted() {
    let cfg = RuntimeConfig::Ssh {
        host: "h".to_string(),
        src_base_dir: "~/c".to_string(),
        identity_file: None,
        port: None,
    };
    let json = serde_json::to_value(&cfg).unwrap();
    assert_eq!(
        json,
        serde_json::json!({"type": "ssh", "host": "h", "srcBaseDir": "~/c"})
    );
    let back: RuntimeConfig = serde_json::from_value(json).unwrap();
    assert_eq!(back, cfg);
}

#[test]
fn workspace_metadata_round_trips() {
    let ws = Workspace {
        id: WorkspaceId::from_string("wks-1"),
        name: "feat".to_string(),
        project_path: "/p".to_string(),
        path: "/p/feat".to_string(),
        created_at: Utc::now(),
        runtime_config: RuntimeConfig::Local,
    };
    let json = serde_json::to_string(&ws).unwrap();
    let back: Workspace = serde_json::from_str(&json).unwrap();
    assert_eq!(ws, back);
}
