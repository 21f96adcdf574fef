//! Checkpoint record types (Trajectory Checkpoint Protocol)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Chain used for checkpoints created by the lifecycle CHECKPOINT state
pub const LIFECYCLE_CHAIN: &str = "lifecycle";

/// What produced a checkpoint
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointType {
    StateTransition,
    GovernanceDecision,
    ClassificationEvent,
    HealthCheck,
    ErrorCondition,
    Lifecycle,
    #[default]
    Custom,
}

impl CheckpointType {
    pub fn name(&self) -> &'static str {
        match self {
            CheckpointType::StateTransition => "state_transition",
            CheckpointType::GovernanceDecision => "governance_decision",
            CheckpointType::ClassificationEvent => "classification_event",
            CheckpointType::HealthCheck => "health_check",
            CheckpointType::ErrorCondition => "error_condition",
            CheckpointType::Lifecycle => "lifecycle",
            CheckpointType::Custom => "custom",
        }
    }
}

impl fmt::Display for CheckpointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Immutable, digest-verified snapshot header
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    /// Unique identifier (`tcp_<owner>_<uuid>`)
    pub id: String,

    pub created_at: DateTime<Utc>,

    /// Session the checkpoint belongs to
    pub owner_id: String,

    /// `sha256:<hex>` digest of the canonical state
    pub state_digest: String,

    /// Confidence in [0, 1] that the snapshot is compliant state
    pub alignment_score: f64,

    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,

    #[serde(default)]
    pub checkpoint_type: CheckpointType,

    /// Event chain (event type, or `lifecycle`)
    #[serde(default = "default_chain")]
    pub chain: String,

    /// Per-owner creation order, starting at 1
    #[serde(default)]
    pub sequence: u64,
}

fn default_chain() -> String {
    "default".to_string()
}

impl Checkpoint {
    /// Ordering key: newer checkpoints compare greater
    pub fn order_key(&self) -> (DateTime<Utc>, u64) {
        (self.created_at, self.sequence)
    }
}

/// Checkpoint as persisted: header plus the canonical state it was hashed from
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckpointRecord {
    #[serde(flatten)]
    pub checkpoint: Checkpoint,
    pub state: serde_json::Value,
}

/// One point of an owner's alignment history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AlignmentPoint {
    pub timestamp: DateTime<Utc>,
    pub alignment_score: f64,
    pub checkpoint_id: String,
}

/// Integrity summary of a checkpoint chain
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrajectorySummary {
    pub chain: String,
    pub total_checkpoints: usize,
    pub verified_checkpoints: usize,
    /// Checkpoints whose stored state no longer matches their digest
    pub failed_checkpoints: Vec<String>,
    pub first_checkpoint_at: Option<DateTime<Utc>>,
    pub last_checkpoint_at: Option<DateTime<Utc>>,
    pub average_alignment: Option<f64>,
    pub integrity_verified: bool,
}
