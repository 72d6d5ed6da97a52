//! File table and key-value pane, persisted as JSON.
//!
//! Writes go through a temp file + rename so a crash mid-save never
//! corrupts the table. The in-memory map is the source of truth between
//! saves; every mutating operation persists before returning.

use super::FileRecord;
use crate::error::{StoreError, StoreResult};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Serialize, Deserialize)]
struct MetaState {
    files: BTreeMap<String, FileRecord>,
    kv: BTreeMap<String, String>,
}

/// Persistent metadata store for one project.
#[derive(Debug)]
pub struct MetadataStore {
    path: PathBuf,
    state: RwLock<MetaState>,
}

impl MetadataStore {
    /// Open the store, loading existing state when present.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let state = if path.exists() {
            let json = fs::read_to_string(path).map_err(|e| StoreError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;
            serde_json::from_str(&json).map_err(|e| StoreError::Corrupted {
                reason: format!("file table unreadable: {e}"),
            })?
        } else {
            MetaState::default()
        };
        Ok(Self {
            path: path.to_path_buf(),
            state: RwLock::new(state),
        })
    }

    /// Insert or replace file records in bulk.
    pub fn upsert_files(&self, records: Vec<FileRecord>) -> StoreResult<()> {
        {
            let mut state = self.state.write();
            for r in records {
                state.files.insert(r.relative_path.clone(), r);
            }
        }
        self.save()
    }

    /// Remove file records in bulk. Unknown paths are ignored.
    pub fn delete_files(&self, paths: &[String]) -> StoreResult<()> {
        {
            let mut state = self.state.write();
            for p in paths {
                state.files.remove(p);
            }
        }
        self.save()
    }

    pub fn get(&self, relative_path: &str) -> Option<FileRecord> {
        self.state.read().files.get(relative_path).cloned()
    }

    pub fn all_paths(&self) -> Vec<String> {
        self.state.read().files.keys().cloned().collect()
    }

    pub fn all_records(&self) -> Vec<FileRecord> {
        self.state.read().files.values().cloned().collect()
    }

    /// Records whose indexed state differs from their contents.
    pub fn needs_reindex(&self) -> Vec<FileRecord> {
        self.state
            .read()
            .files
            .values()
            .filter(|r| r.is_dirty())
            .cloned()
            .collect()
    }

    /// Set (or clear, with `None`) the indexed hash for one file.
    pub fn set_vector_index_hash(
        &self,
        relative_path: &str,
        hash: Option<String>,
    ) -> StoreResult<()> {
        {
            let mut state = self.state.write();
            if let Some(record) = state.files.get_mut(relative_path) {
                record.vector_index_hash = hash;
            }
        }
        self.save()
    }

    /// Batched variant used at the end of a scan pass.
    pub fn set_vector_index_hashes(
        &self,
        updates: Vec<(String, Option<String>)>,
    ) -> StoreResult<()> {
        {
            let mut state = self.state.write();
            for (path, hash) in updates {
                if let Some(record) = state.files.get_mut(&path) {
                    record.vector_index_hash = hash;
                }
            }
        }
        self.save()
    }

    pub fn kv_get(&self, key: &str) -> Option<String> {
        self.state.read().kv.get(key).cloned()
    }

    pub fn kv_set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.state.write().kv.insert(key.to_string(), value.to_string());
        self.save()
    }

    pub fn file_count(&self) -> usize {
        self.state.read().files.len()
    }

    /// Drop all file records and KV entries.
    pub fn clear(&self) -> StoreResult<()> {
        {
            let mut state = self.state.write();
            state.files.clear();
            state.kv.clear();
        }
        self.save()
    }

    fn save(&self) -> StoreResult<()> {
        let json = {
            let state = self.state.read();
            serde_json::to_string_pretty(&*state).map_err(|e| StoreError::Serialization {
                reason: e.to_string(),
            })?
        };
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| StoreError::Io {
            path: tmp.clone(),
            source: e,
        })?;
        fs::rename(&tmp, &self.path).map_err(|e| StoreError::Io {
            path: self.path.clone(),
            source: e,
        })?;
        Ok(())
    }
}
