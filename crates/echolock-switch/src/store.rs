//! Persistence for switches.
//!
//! One JSON file per switch rather than one monolithic state file, so
//! a write to one switch never risks corrupting another's on-disk
//! record.

use crate::model::Switch;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("switch not found: {0}")]
    NotFound(String),
}

pub trait SwitchStore {
    fn get(&self, id: &str) -> Result<Switch, StoreError>;
    fn put(&mut self, switch: &Switch) -> Result<(), StoreError>;
    fn delete(&mut self, id: &str) -> Result<(), StoreError>;
    fn list_ids(&self) -> Result<Vec<String>, StoreError>;
}

/// In-memory store, for tests and for the daemon's transient working
/// set before it's synced to a [`FileSwitchStore`].
#[derive(Debug, Default)]
pub struct InMemorySwitchStore {
    switches: HashMap<String, Switch>,
}

impl InMemorySwitchStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SwitchStore for InMemorySwitchStore {
    fn get(&self, id: &str) -> Result<Switch, StoreError> {
        self.switches
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn put(&mut self, switch: &Switch) -> Result<(), StoreError> {
        self.switches.insert(switch.id.clone(), switch.clone());
        Ok(())
    }

    fn delete(&mut self, id: &str) -> Result<(), StoreError> {
        self.switches
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn list_ids(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.switches.keys().cloned().collect())
    }
}

/// File-backed store: one JSON file per switch under `dir`, named
/// `<id>.json`. Each `put` is a full-file rewrite — switches are small
/// enough that partial updates aren't worth the complexity.
pub struct FileSwitchStore {
    dir: PathBuf,
}

impl FileSwitchStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

impl SwitchStore for FileSwitchStore {
    fn get(&self, id: &str) -> Result<Switch, StoreError> {
        let path = self.path_for(id);
        if !path.exists() {
            return Err(StoreError::NotFound(id.to_string()));
        }
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn put(&mut self, switch: &Switch) -> Result<(), StoreError> {
        let contents = serde_json::to_string_pretty(switch)?;
        fs::write(self.path_for(&switch.id), contents)?;
        Ok(())
    }

    fn delete(&mut self, id: &str) -> Result<(), StoreError> {
        let path = self.path_for(id);
        if !path.exists() {
            return Err(StoreError::NotFound(id.to_string()));
        }
        fs::remove_file(path)?;
        Ok(())
    }

    fn list_ids(&self) -> Result<Vec<String>, StoreError> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if let Some(stem) = stem_if_json(&entry.path()) {
                ids.push(stem);
            }
        }
        Ok(ids)
    }
}

fn stem_if_json(path: &Path) -> Option<String> {
    if path.extension().and_then(|e| e.to_str()) == Some("json") {
        path.file_stem()
            .and_then(|s| s.to_str())
            .map(|s| s.to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample(id: &str) -> Switch {
        Switch::new(id, "alice", 3, 5, 86_400, vec![], vec![]).unwrap()
    }

    #[test]
    fn in_memory_roundtrip() {
        let mut store = InMemorySwitchStore::new();
        store.put(&sample("sw-1")).unwrap();
        assert_eq!(store.get("sw-1").unwrap().id, "sw-1");
        assert_eq!(store.list_ids().unwrap(), vec!["sw-1".to_string()]);
        store.delete("sw-1").unwrap();
        assert!(matches!(store.get("sw-1"), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn file_store_roundtrip() {
        let dir = tempdir().unwrap();
        let mut store = FileSwitchStore::new(dir.path()).unwrap();
        store.put(&sample("sw-a")).unwrap();
        store.put(&sample("sw-b")).unwrap();

        let mut ids = store.list_ids().unwrap();
        ids.sort();
        assert_eq!(ids, vec!["sw-a".to_string(), "sw-b".to_string()]);

        let loaded = store.get("sw-a").unwrap();
        assert_eq!(loaded.owner_label, "alice");

        store.delete("sw-a").unwrap();
        assert!(matches!(store.get("sw-a"), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn file_store_missing_switch_is_not_found() {
        let dir = tempdir().unwrap();
        let store = FileSwitchStore::new(dir.path()).unwrap();
        assert!(matches!(store.get("ghost"), Err(StoreError::NotFound(_))));
    }
}
