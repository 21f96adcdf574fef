//! CheckpointStore - creation, lookup and verification of Turing Checkpoints

use super::digest::{digest_matches, state_digest};
use super::repository::{CheckpointRepository, FileRepository, InMemoryRepository};
use crate::error::{GovernanceError, GovernanceResult};
use crate::models::{
    AlignmentPoint, Checkpoint, CheckpointRecord, CheckpointType, TrajectorySummary,
};
use chrono::Utc;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Append-only, content-addressed checkpoint store (TCP)
///
/// Shared between sessions behind an `Arc`. Creates for the same owner are
/// serialized by a per-owner lock; everything else only takes the
/// repository's own read/write locks.
pub struct CheckpointStore {
    repository: Box<dyn CheckpointRepository>,
    owner_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl CheckpointStore {
    pub fn new(repository: Box<dyn CheckpointRepository>) -> Self {
        Self {
            repository,
            owner_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Volatile store
    pub fn in_memory() -> Self {
        Self::new(Box::new(InMemoryRepository::new()))
    }

    /// Durable store rooted at `dir`
    pub fn open(dir: impl Into<PathBuf>) -> GovernanceResult<Self> {
        Ok(Self::new(Box::new(FileRepository::open(dir)?)))
    }

    fn owner_lock(&self, owner_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self
            .owner_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks
            .entry(owner_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    // =========================================================================
    // Creation
    // =========================================================================

    /// Create a custom checkpoint in the `default` chain
    pub fn create(
        &self,
        owner_id: &str,
        state_data: &Value,
        alignment_score: f64,
        metadata: BTreeMap<String, Value>,
    ) -> GovernanceResult<Checkpoint> {
        self.create_typed(
            owner_id,
            state_data,
            alignment_score,
            metadata,
            CheckpointType::Custom,
            "default",
        )
    }

    /// Create a checkpoint with an explicit type and chain
    pub fn create_typed(
        &self,
        owner_id: &str,
        state_data: &Value,
        alignment_score: f64,
        metadata: BTreeMap<String, Value>,
        checkpoint_type: CheckpointType,
        chain: &str,
    ) -> GovernanceResult<Checkpoint> {
        if alignment_score.is_nan() {
            return Err(GovernanceError::InvalidAlignmentScore(alignment_score));
        }
        let alignment_score = alignment_score.clamp(0.0, 1.0);
        let state_digest = state_digest(state_data);

        let lock = self.owner_lock(owner_id);
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        // Keep per-owner order total even if the wall clock steps backwards
        let previous = self.latest_header(owner_id)?;
        let now = Utc::now();
        let (created_at, sequence) = match &previous {
            Some(prev) => (now.max(prev.created_at), prev.sequence + 1),
            None => (now, 1),
        };

        let checkpoint = Checkpoint {
            id: format!("tcp_{}_{}", owner_id, Uuid::new_v4().simple()),
            created_at,
            owner_id: owner_id.to_string(),
            state_digest,
            alignment_score,
            metadata,
            checkpoint_type,
            chain: chain.to_string(),
            sequence,
        };

        self.repository.insert(CheckpointRecord {
            checkpoint: checkpoint.clone(),
            state: state_data.clone(),
        })?;

        tracing::debug!(
            id = %checkpoint.id,
            owner = owner_id,
            chain = chain,
            kind = %checkpoint_type,
            sequence,
            "Checkpoint created"
        );

        Ok(checkpoint)
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// Retrieve a checkpoint header by id
    pub fn get(&self, id: &str) -> GovernanceResult<Option<Checkpoint>> {
        Ok(self.repository.get(id)?.map(|r| r.checkpoint))
    }

    /// State stored alongside a checkpoint
    pub fn snapshot(&self, id: &str) -> GovernanceResult<Value> {
        self.repository
            .get(id)?
            .map(|r| r.state)
            .ok_or_else(|| GovernanceError::CheckpointNotFound(id.to_string()))
    }

    /// All checkpoints, optionally for one owner, newest first
    pub fn list(&self, owner_id: Option<&str>) -> GovernanceResult<Vec<Checkpoint>> {
        let mut checkpoints = self.repository.headers(owner_id)?;
        sort_newest_first(&mut checkpoints);
        Ok(checkpoints)
    }

    /// Checkpoints of one chain, newest first
    pub fn list_chain(&self, chain: &str) -> GovernanceResult<Vec<Checkpoint>> {
        let mut checkpoints: Vec<_> = self
            .repository
            .headers(None)?
            .into_iter()
            .filter(|c| c.chain == chain)
            .collect();
        sort_newest_first(&mut checkpoints);
        Ok(checkpoints)
    }

    fn latest_header(&self, owner_id: &str) -> GovernanceResult<Option<Checkpoint>> {
        Ok(self.list(Some(owner_id))?.into_iter().next())
    }

    /// Most recent checkpoint for an owner
    pub fn latest(&self, owner_id: &str) -> GovernanceResult<Option<Checkpoint>> {
        self.latest_header(owner_id)
    }

    /// Alignment score history for an owner, newest first
    pub fn alignment_history(&self, owner_id: &str) -> GovernanceResult<Vec<AlignmentPoint>> {
        Ok(self
            .list(Some(owner_id))?
            .into_iter()
            .map(|c| AlignmentPoint {
                timestamp: c.created_at,
                alignment_score: c.alignment_score,
                checkpoint_id: c.id,
            })
            .collect())
    }

    // =========================================================================
    // Verification
    // =========================================================================

    /// Whether `current_state` hashes to the checkpoint's digest
    pub fn verify(&self, checkpoint: &Checkpoint, current_state: &Value) -> bool {
        digest_matches(&checkpoint.state_digest, current_state)
    }

    /// Verify against a checkpoint id, surfacing mismatches as errors
    pub fn verify_id(&self, id: &str, current_state: &Value) -> GovernanceResult<()> {
        let checkpoint = self
            .get(id)?
            .ok_or_else(|| GovernanceError::CheckpointNotFound(id.to_string()))?;
        self.verify_strict(&checkpoint, current_state)
    }

    /// Verify against the owner's most recent checkpoint
    pub fn verify_latest(&self, owner_id: &str, current_state: &Value) -> GovernanceResult<()> {
        let checkpoint = self
            .latest(owner_id)?
            .ok_or_else(|| GovernanceError::CheckpointNotFound(format!("latest for {}", owner_id)))?;
        self.verify_strict(&checkpoint, current_state)
    }

    fn verify_strict(&self, checkpoint: &Checkpoint, current_state: &Value) -> GovernanceResult<()> {
        let actual = state_digest(current_state);
        if actual == checkpoint.state_digest {
            return Ok(());
        }

        tracing::warn!(
            id = %checkpoint.id,
            owner = %checkpoint.owner_id,
            "Checkpoint digest mismatch"
        );
        Err(GovernanceError::CheckpointDigestMismatch {
            id: checkpoint.id.clone(),
            expected: checkpoint.state_digest.clone(),
            actual,
        })
    }

    /// Whether the state stored with a checkpoint still matches its digest.
    ///
    /// A record that is gone or no longer parses fails verification.
    pub fn verify_stored(&self, checkpoint: &Checkpoint) -> GovernanceResult<bool> {
        match self.repository.get(&checkpoint.id) {
            Ok(Some(record)) => Ok(self.verify(checkpoint, &record.state)),
            Ok(None) => {
                tracing::warn!(id = %checkpoint.id, "Checkpoint record missing");
                Ok(false)
            }
            Err(e) => {
                tracing::warn!(id = %checkpoint.id, error = %e, "Checkpoint record unreadable");
                Ok(false)
            }
        }
    }

    /// Integrity summary of every checkpoint in a chain
    pub fn trajectory_summary(&self, chain: &str) -> GovernanceResult<TrajectorySummary> {
        let checkpoints = self.list_chain(chain)?;

        let mut failed = Vec::new();
        for checkpoint in &checkpoints {
            if !self.verify_stored(checkpoint)? {
                failed.push(checkpoint.id.clone());
            }
        }

        let average_alignment = if checkpoints.is_empty() {
            None
        } else {
            let total: f64 = checkpoints.iter().map(|c| c.alignment_score).sum();
            Some(total / checkpoints.len() as f64)
        };

        Ok(TrajectorySummary {
            chain: chain.to_string(),
            total_checkpoints: checkpoints.len(),
            verified_checkpoints: checkpoints.len() - failed.len(),
            first_checkpoint_at: checkpoints.last().map(|c| c.created_at),
            last_checkpoint_at: checkpoints.first().map(|c| c.created_at),
            average_alignment,
            integrity_verified: failed.is_empty(),
            failed_checkpoints: failed,
        })
    }

    /// Whether every checkpoint in a chain verifies
    pub fn verify_chain(&self, chain: &str) -> GovernanceResult<bool> {
        Ok(self.trajectory_summary(chain)?.integrity_verified)
    }
}

fn sort_newest_first(checkpoints: &mut [Checkpoint]) {
    checkpoints.sort_by(|a, b| b.order_key().cmp(&a.order_key()));
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::thread;

    fn store_with_repo() -> (CheckpointStore, Arc<InMemoryRepository>) {
        struct Shared(Arc<InMemoryRepository>);
        impl CheckpointRepository for Shared {
            fn insert(&self, record: CheckpointRecord) -> GovernanceResult<()> {
                self.0.insert(record)
            }
            fn get(&self, id: &str) -> GovernanceResult<Option<CheckpointRecord>> {
                self.0.get(id)
            }
            fn headers(&self, owner_id: Option<&str>) -> GovernanceResult<Vec<Checkpoint>> {
                self.0.headers(owner_id)
            }
        }

        let repo = Arc::new(InMemoryRepository::new());
        (CheckpointStore::new(Box::new(Shared(repo.clone()))), repo)
    }

    fn login_state() -> Value {
        json!({
            "user": "alice",
            "action": "login",
            "risk_score": 0.2,
            "timestamp": "2026-01-31T16:50:00Z"
        })
    }

    #[test]
    fn test_create_and_get() {
        let store = CheckpointStore::in_memory();
        let mut metadata = BTreeMap::new();
        metadata.insert("phase".to_string(), json!("authentication"));

        let cp = store
            .create("user_session_123", &login_state(), 0.95, metadata)
            .unwrap();

        assert!(cp.id.starts_with("tcp_user_session_123_"));
        assert_eq!(cp.sequence, 1);
        assert_eq!(cp.alignment_score, 0.95);

        let fetched = store.get(&cp.id).unwrap().unwrap();
        assert_eq!(fetched, cp);
        assert!(store.get("tcp_missing").unwrap().is_none());
    }

    #[test]
    fn test_alignment_score_is_clamped() {
        let store = CheckpointStore::in_memory();
        let high = store.create("o", &json!({}), 1.7, BTreeMap::new()).unwrap();
        let low = store.create("o", &json!({}), -0.2, BTreeMap::new()).unwrap();
        assert_eq!(high.alignment_score, 1.0);
        assert_eq!(low.alignment_score, 0.0);

        assert!(matches!(
            store.create("o", &json!({}), f64::NAN, BTreeMap::new()),
            Err(GovernanceError::InvalidAlignmentScore(_))
        ));
    }

    #[test]
    fn test_list_newest_first_and_filtered() {
        let store = CheckpointStore::in_memory();
        let first = store.create("a", &json!({"n": 1}), 0.5, BTreeMap::new()).unwrap();
        let second = store.create("a", &json!({"n": 2}), 0.6, BTreeMap::new()).unwrap();
        store.create("b", &json!({"n": 3}), 0.7, BTreeMap::new()).unwrap();

        let listed = store.list(Some("a")).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, second.id);
        assert_eq!(listed[1].id, first.id);
        assert_eq!(store.list(None).unwrap().len(), 3);
    }

    #[test]
    fn test_verify_detects_tampering() {
        let store = CheckpointStore::in_memory();
        let state = login_state();
        let cp = store.create("a", &state, 0.9, BTreeMap::new()).unwrap();

        assert!(store.verify(&cp, &state));

        let mut tampered = state.clone();
        tampered["user"] = json!("mallory");
        assert!(!store.verify(&cp, &tampered));

        let err = store.verify_id(&cp.id, &tampered).unwrap_err();
        assert!(err.is_tamper_signal());
        assert!(matches!(
            store.verify_id("tcp_unknown", &state),
            Err(GovernanceError::CheckpointNotFound(_))
        ));
    }

    #[test]
    fn test_verify_latest_uses_most_recent() {
        let store = CheckpointStore::in_memory();
        store.create("a", &json!({"v": 1}), 0.9, BTreeMap::new()).unwrap();
        store.create("a", &json!({"v": 2}), 0.9, BTreeMap::new()).unwrap();

        assert!(store.verify_latest("a", &json!({"v": 2})).is_ok());
        assert!(store.verify_latest("a", &json!({"v": 1})).is_err());
    }

    #[test]
    fn test_alignment_history() {
        let store = CheckpointStore::in_memory();
        store.create("a", &json!({"n": 1}), 0.4, BTreeMap::new()).unwrap();
        let last = store.create("a", &json!({"n": 2}), 0.8, BTreeMap::new()).unwrap();

        let history = store.alignment_history("a").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].checkpoint_id, last.id);
        assert_eq!(history[0].alignment_score, 0.8);
        assert!(store.alignment_history("nobody").unwrap().is_empty());
    }

    #[test]
    fn test_trajectory_summary_flags_tampered_snapshot() {
        let (store, repo) = store_with_repo();
        let a = store
            .create_typed("s", &json!({"n": 1}), 0.9, BTreeMap::new(), CheckpointType::HealthCheck, "health_check")
            .unwrap();
        store
            .create_typed("s", &json!({"n": 2}), 0.7, BTreeMap::new(), CheckpointType::HealthCheck, "health_check")
            .unwrap();

        let summary = store.trajectory_summary("health_check").unwrap();
        assert_eq!(summary.total_checkpoints, 2);
        assert!(summary.integrity_verified);
        assert!((summary.average_alignment.unwrap() - 0.8).abs() < 1e-9);

        repo.tamper_state(&a.id, json!({"n": 99}));
        let summary = store.trajectory_summary("health_check").unwrap();
        assert!(!summary.integrity_verified);
        assert_eq!(summary.failed_checkpoints, vec![a.id]);
        assert!(!store.verify_chain("health_check").unwrap());
    }

    #[test]
    fn test_empty_chain_summary() {
        let store = CheckpointStore::in_memory();
        let summary = store.trajectory_summary("nothing").unwrap();
        assert_eq!(summary.total_checkpoints, 0);
        assert!(summary.integrity_verified);
        assert!(summary.average_alignment.is_none());
    }

    #[test]
    fn test_concurrent_creates_same_owner_are_ordered() {
        let store = Arc::new(CheckpointStore::in_memory());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                thread::spawn(move || {
                    for j in 0..5 {
                        store
                            .create("shared", &json!({"t": i, "j": j}), 0.5, BTreeMap::new())
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let listed = store.list(Some("shared")).unwrap();
        assert_eq!(listed.len(), 40);

        let mut sequences: Vec<u64> = listed.iter().map(|c| c.sequence).collect();
        sequences.sort_unstable();
        assert_eq!(sequences, (1..=40).collect::<Vec<_>>());

        for pair in listed.windows(2) {
            assert!(pair[0].order_key() > pair[1].order_key());
        }
    }
}
