//! Checkpoint storage backends
//!
//! The store keeps digest and verification logic; repositories only move
//! records in and out of storage. Records are never overwritten or deleted.

use crate::error::{GovernanceError, GovernanceResult};
use crate::models::{Checkpoint, CheckpointRecord};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tempfile::NamedTempFile;
use walkdir::WalkDir;

/// Pluggable persistence for checkpoint records
pub trait CheckpointRepository: Send + Sync {
    /// Persist a new record. Fails with `CheckpointExists` if the id is taken.
    fn insert(&self, record: CheckpointRecord) -> GovernanceResult<()>;

    /// Fetch a full record (header and stored state)
    fn get(&self, id: &str) -> GovernanceResult<Option<CheckpointRecord>>;

    /// Checkpoint headers, optionally restricted to one owner, in no particular order
    fn headers(&self, owner_id: Option<&str>) -> GovernanceResult<Vec<Checkpoint>>;
}

fn poisoned() -> GovernanceError {
    GovernanceError::Io(std::io::Error::new(
        std::io::ErrorKind::Other,
        "checkpoint index lock poisoned",
    ))
}

// =============================================================================
// In-memory
// =============================================================================

/// Volatile repository for tests and embedded use
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    records: RwLock<HashMap<String, CheckpointRecord>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a stored state in place (test helper for tamper scenarios)
    #[cfg(test)]
    pub(crate) fn tamper_state(&self, id: &str, state: serde_json::Value) {
        if let Some(record) = self.records.write().unwrap().get_mut(id) {
            record.state = state;
        }
    }
}

impl CheckpointRepository for InMemoryRepository {
    fn insert(&self, record: CheckpointRecord) -> GovernanceResult<()> {
        let mut records = self.records.write().map_err(|_| poisoned())?;
        if records.contains_key(&record.checkpoint.id) {
            return Err(GovernanceError::CheckpointExists(record.checkpoint.id));
        }
        records.insert(record.checkpoint.id.clone(), record);
        Ok(())
    }

    fn get(&self, id: &str) -> GovernanceResult<Option<CheckpointRecord>> {
        let records = self.records.read().map_err(|_| poisoned())?;
        Ok(records.get(id).cloned())
    }

    fn headers(&self, owner_id: Option<&str>) -> GovernanceResult<Vec<Checkpoint>> {
        let records = self.records.read().map_err(|_| poisoned())?;
        Ok(records
            .values()
            .filter(|r| owner_id.map_or(true, |o| r.checkpoint.owner_id == o))
            .map(|r| r.checkpoint.clone())
            .collect())
    }
}

// =============================================================================
// File-backed
// =============================================================================

/// One `<id>.json` file per checkpoint.
///
/// Headers are indexed in memory when the directory is opened; full records
/// are read from disk on every `get`, so edits to a file after creation show
/// up as digest mismatches instead of being masked by the index.
#[derive(Debug)]
pub struct FileRepository {
    dir: PathBuf,
    index: RwLock<HashMap<String, Checkpoint>>,
}

impl FileRepository {
    /// Open (and create if needed) a checkpoint directory
    pub fn open(dir: impl Into<PathBuf>) -> GovernanceResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let mut index = HashMap::new();
        for entry in WalkDir::new(&dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().map_or(false, |ext| ext == "json"))
        {
            match read_record(entry.path()) {
                Ok(record) => {
                    index.insert(record.checkpoint.id.clone(), record.checkpoint);
                }
                Err(e) => {
                    tracing::warn!(
                        path = %entry.path().display(),
                        error = %e,
                        "Skipping unreadable checkpoint file"
                    );
                }
            }
        }

        tracing::debug!(dir = %dir.display(), count = index.len(), "Checkpoint index loaded");

        Ok(Self {
            dir,
            index: RwLock::new(index),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(id)))
    }
}

/// File name for a checkpoint id.
///
/// Owner ids are caller-supplied, so every byte outside `[A-Za-z0-9_-]` is
/// percent-encoded. The mapping is injective and never yields a path separator
/// or a dot segment.
fn file_stem(id: &str) -> String {
    let mut stem = String::with_capacity(id.len());
    for byte in id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' {
            stem.push(byte as char);
        } else {
            stem.push_str(&format!("%{:02X}", byte));
        }
    }
    stem
}

fn read_record(path: &Path) -> GovernanceResult<CheckpointRecord> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

impl CheckpointRepository for FileRepository {
    fn insert(&self, record: CheckpointRecord) -> GovernanceResult<()> {
        let id = record.checkpoint.id.clone();
        let path = self.record_path(&id);

        let mut index = self.index.write().map_err(|_| poisoned())?;
        if index.contains_key(&id) || path.exists() {
            return Err(GovernanceError::CheckpointExists(id));
        }

        let content = serde_json::to_string_pretty(&record)?;

        // Atomic write: temp file in the same directory, then persist without replacing
        let mut temp_file = NamedTempFile::new_in(&self.dir)?;
        temp_file.write_all(content.as_bytes())?;
        temp_file.flush()?;
        temp_file.persist_noclobber(&path).map_err(|e| {
            if e.error.kind() == std::io::ErrorKind::AlreadyExists {
                GovernanceError::CheckpointExists(id.clone())
            } else {
                GovernanceError::Io(e.error)
            }
        })?;

        index.insert(id, record.checkpoint);
        Ok(())
    }

    fn get(&self, id: &str) -> GovernanceResult<Option<CheckpointRecord>> {
        {
            let index = self.index.read().map_err(|_| poisoned())?;
            if !index.contains_key(id) {
                return Ok(None);
            }
        }

        let path = self.record_path(id);
        if !path.exists() {
            return Ok(None);
        }
        read_record(&path).map(Some)
    }

    fn headers(&self, owner_id: Option<&str>) -> GovernanceResult<Vec<Checkpoint>> {
        let index = self.index.read().map_err(|_| poisoned())?;
        Ok(index
            .values()
            .filter(|c| owner_id.map_or(true, |o| c.owner_id == o))
            .cloned()
            .collect())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::digest::state_digest;
    use crate::models::CheckpointType;
    use chrono::Utc;
    use serde_json::json;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn record(id: &str, owner: &str) -> CheckpointRecord {
        let state = json!({"owner": owner, "n": 1});
        CheckpointRecord {
            checkpoint: Checkpoint {
                id: id.to_string(),
                created_at: Utc::now(),
                owner_id: owner.to_string(),
                state_digest: state_digest(&state),
                alignment_score: 0.9,
                metadata: BTreeMap::new(),
                checkpoint_type: CheckpointType::Custom,
                chain: "default".to_string(),
                sequence: 1,
            },
            state,
        }
    }

    #[test]
    fn test_in_memory_insert_and_get() {
        let repo = InMemoryRepository::new();
        repo.insert(record("tcp_a_1", "a")).unwrap();
        repo.insert(record("tcp_b_1", "b")).unwrap();

        assert!(repo.get("tcp_a_1").unwrap().is_some());
        assert!(repo.get("missing").unwrap().is_none());
        assert_eq!(repo.headers(None).unwrap().len(), 2);
        assert_eq!(repo.headers(Some("a")).unwrap().len(), 1);
    }

    #[test]
    fn test_in_memory_refuses_overwrite() {
        let repo = InMemoryRepository::new();
        repo.insert(record("tcp_a_1", "a")).unwrap();
        let err = repo.insert(record("tcp_a_1", "a")).unwrap_err();
        assert!(matches!(err, GovernanceError::CheckpointExists(_)));
    }

    #[test]
    fn test_file_repository_persists_across_open() {
        let temp = TempDir::new().unwrap();
        {
            let repo = FileRepository::open(temp.path()).unwrap();
            repo.insert(record("tcp_a_1", "a")).unwrap();
        }

        assert!(temp.path().join("tcp_a_1.json").exists());

        let repo = FileRepository::open(temp.path()).unwrap();
        let loaded = repo.get("tcp_a_1").unwrap().unwrap();
        assert_eq!(loaded.checkpoint.owner_id, "a");
        assert_eq!(loaded.state["n"], 1);
    }

    #[test]
    fn test_file_repository_refuses_overwrite() {
        let temp = TempDir::new().unwrap();
        let repo = FileRepository::open(temp.path()).unwrap();
        repo.insert(record("tcp_a_1", "a")).unwrap();
        assert!(matches!(
            repo.insert(record("tcp_a_1", "a")),
            Err(GovernanceError::CheckpointExists(_))
        ));
    }

    #[test]
    fn test_file_stem_keeps_paths_inside_dir() {
        assert_eq!(file_stem("tcp_session_a_0f3c"), "tcp_session_a_0f3c");
        assert_eq!(file_stem("tcp_a/b_1"), "tcp_a%2Fb_1");
        assert_eq!(file_stem("tcp_../x_1"), "tcp_%2E%2E%2Fx_1");
        assert_ne!(file_stem("tcp_a/b_1"), file_stem("tcp_a%2Fb_1"));
    }

    #[test]
    fn test_file_repository_stores_owner_with_separators() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("checkpoints");
        {
            let repo = FileRepository::open(&dir).unwrap();
            repo.insert(record("tcp_../escaped_1", "../escaped")).unwrap();
            repo.insert(record("tcp_a/b_1", "a/b")).unwrap();
        }

        let files: Vec<_> = std::fs::read_dir(&dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().map_or(false, |ext| ext == "json"))
            .collect();
        assert_eq!(files.len(), 2);
        assert!(!temp.path().join("escaped_1.json").exists());

        let repo = FileRepository::open(&dir).unwrap();
        assert_eq!(repo.headers(Some("../escaped")).unwrap().len(), 1);
        let loaded = repo.get("tcp_a/b_1").unwrap().unwrap();
        assert_eq!(loaded.checkpoint.owner_id, "a/b");
    }

    #[test]
    fn test_file_repository_skips_corrupt_files() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("broken.json"), "{not json").unwrap();

        let repo = FileRepository::open(temp.path()).unwrap();
        assert!(repo.headers(None).unwrap().is_empty());
    }

    #[test]
    fn test_file_repository_reads_from_disk() {
        let temp = TempDir::new().unwrap();
        let repo = FileRepository::open(temp.path()).unwrap();
        repo.insert(record("tcp_a_1", "a")).unwrap();

        let path = temp.path().join("tcp_a_1.json");
        let mut on_disk: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        on_disk["state"]["n"] = json!(2);
        std::fs::write(&path, serde_json::to_string(&on_disk).unwrap()).unwrap();

        let loaded = repo.get("tcp_a_1").unwrap().unwrap();
        assert_eq!(loaded.state["n"], 2);
    }
}
