//! Persisted record of provisioned resources
//!
//! Stored as JSON because recorded outputs may contain nulls.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use declarative::{Outputs, ResourceKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::paths;

pub const STATE_FILE: &str = "state.json";

const STATE_VERSION: u32 = 1;

// ============================================================================
// State Structures
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackState {
    pub version: u32,

    /// Provisioned resources keyed by declaration id
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceRecord>,

    /// Graph exports resolved by the last successful apply
    #[serde(default)]
    pub exports: BTreeMap<String, String>,

    pub last_run: Option<DateTime<Utc>>,
}

/// One provisioned resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub kind: ResourceKind,
    /// Fingerprint of the config it was last applied with
    pub fingerprint: String,
    #[serde(default)]
    pub outputs: Outputs,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Default for StackState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            resources: BTreeMap::new(),
            exports: BTreeMap::new(),
            last_run: None,
        }
    }
}

// ============================================================================
// StackState Implementation
// ============================================================================

impl StackState {
    /// Default state file location
    pub fn default_path() -> Result<PathBuf> {
        Ok(paths::state_dir()?.join(STATE_FILE))
    }

    /// Load state from `path`, or return default if the file doesn't exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("State file does not exist, using default state");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file: {}", path.display()))?;

        let state: StackState = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse state file: {}", path.display()))?;

        if state.version > STATE_VERSION {
            anyhow::bail!(
                "State file {} has version {}, this build understands up to {}",
                path.display(),
                state.version,
                STATE_VERSION
            );
        }

        log::debug!(
            "Loaded state with {} resources from {}",
            state.resources.len(),
            path.display()
        );
        Ok(state)
    }

    /// Save state to `path`, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create state directory: {}", dir.display()))?;
        }

        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize state to JSON")?;

        fs::write(path, content)
            .with_context(|| format!("Failed to write state file: {}", path.display()))?;

        log::debug!("Saved state to {}", path.display());
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&ResourceRecord> {
        self.resources.get(id)
    }

    /// Insert or refresh a record, keeping its creation time.
    ///
    /// Returns `true` if the resource was new.
    pub fn record(
        &mut self,
        id: &str,
        kind: ResourceKind,
        fingerprint: String,
        outputs: Outputs,
    ) -> bool {
        let now = Utc::now();
        match self.resources.get_mut(id) {
            Some(existing) => {
                existing.kind = kind;
                existing.fingerprint = fingerprint;
                existing.outputs = outputs;
                existing.updated_at = now;
                false
            }
            None => {
                self.resources.insert(
                    id.to_string(),
                    ResourceRecord {
                        kind,
                        fingerprint,
                        outputs,
                        created_at: now,
                        updated_at: now,
                    },
                );
                true
            }
        }
    }

    /// Records of one kind, in id order
    pub fn of_kind(&self, kind: ResourceKind) -> impl Iterator<Item = (&String, &ResourceRecord)> {
        self.resources
            .iter()
            .filter(move |(_, record)| record.kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn outputs(value: Value) -> Outputs {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let state = StackState::load(&dir.path().join(STATE_FILE)).unwrap();
        assert_eq!(state, StackState::default());
    }

    #[test]
    fn test_save_and_load_keeps_null_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(STATE_FILE);

        let mut state = StackState::default();
        state.record(
            "gitops",
            ResourceKind::Cluster,
            "abc".into(),
            outputs(json!({ "masterAuth": { "clientKey": null } })),
        );
        state.save(&path).unwrap();

        let loaded = StackState::load(&path).unwrap();
        assert_eq!(loaded, state);
        assert_eq!(
            loaded.get("gitops").unwrap().outputs["masterAuth"]["clientKey"],
            Value::Null
        );
    }

    #[test]
    fn test_record_keeps_creation_time() {
        let mut state = StackState::default();
        assert!(state.record("ns", ResourceKind::Namespace, "a".into(), Outputs::new()));
        let created = state.get("ns").unwrap().created_at;

        assert!(!state.record("ns", ResourceKind::Namespace, "b".into(), Outputs::new()));
        let record = state.get("ns").unwrap();
        assert_eq!(record.created_at, created);
        assert_eq!(record.fingerprint, "b");
    }

    #[test]
    fn test_newer_version_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(STATE_FILE);
        fs::write(&path, r#"{ "version": 99, "last_run": null }"#).unwrap();
        assert!(StackState::load(&path).is_err());
    }
}
