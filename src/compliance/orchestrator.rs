//! ComplianceOrchestrator - rule evaluation, checkpoint triggers and Protocol of Return

use super::rule::{default_rules, ComplianceRule};
use crate::checkpoint::CheckpointStore;
use crate::error::{GovernanceError, GovernanceResult};
use crate::models::{Checkpoint, CheckpointType, TrajectorySummary, LIFECYCLE_CHAIN};
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

/// Handler invoked after an event's checkpoints are created
///
/// Receives the event type, the event context and the ids of the checkpoints
/// the event produced.
pub type EventHandler = Box<dyn Fn(&str, &Value, &[String]) -> anyhow::Result<()> + Send + Sync>;

/// Overall verdict for a chain
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceVerdict {
    Compliant,
    IntegrityFailure,
}

/// How many registered rules have fired at least once
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleCoverage {
    pub fired_rules: usize,
    pub total_rules: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComplianceStatus {
    pub status: ComplianceVerdict,
    pub trajectory_summary: TrajectorySummary,
    pub rule_coverage: RuleCoverage,
}

/// Outcome of a successful Protocol of Return
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProtocolOfReturn {
    pub success: bool,
    pub restored_checkpoint_id: String,
    pub checkpoint: Checkpoint,
    /// Verified state stored with the checkpoint
    pub state: Value,
    /// Newer checkpoints that failed verification and were passed over
    pub skipped: Vec<String>,
}

/// Exported compliance report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub timestamp: DateTime<Utc>,
    pub chain_type: String,
    pub compliance_status: ComplianceStatus,
    pub rules: Vec<String>,
}

/// Trajectory Checkpoint Controller (TCPC)
pub struct ComplianceOrchestrator {
    store: Arc<CheckpointStore>,
    rules: RwLock<Vec<ComplianceRule>>,
    handlers: RwLock<HashMap<String, Vec<EventHandler>>>,
    rule_hits: Mutex<HashMap<String, u64>>,
    default_owner: String,
}

impl ComplianceOrchestrator {
    /// Orchestrator with no rules
    pub fn new(store: Arc<CheckpointStore>, default_owner: impl Into<String>) -> Self {
        Self {
            store,
            rules: RwLock::new(Vec::new()),
            handlers: RwLock::new(HashMap::new()),
            rule_hits: Mutex::new(HashMap::new()),
            default_owner: default_owner.into(),
        }
    }

    /// Orchestrator with the five standard governance rules installed
    pub fn with_default_rules(store: Arc<CheckpointStore>, default_owner: impl Into<String>) -> Self {
        let orchestrator = Self::new(store, default_owner);
        for rule in default_rules() {
            orchestrator.add_rule(rule);
        }
        orchestrator
    }

    pub fn store(&self) -> &Arc<CheckpointStore> {
        &self.store
    }

    // =========================================================================
    // Registration
    // =========================================================================

    pub fn add_rule(&self, rule: ComplianceRule) {
        self.rules
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(rule);
    }

    pub fn add_event_handler(
        &self,
        event_type: impl Into<String>,
        handler: impl Fn(&str, &Value, &[String]) -> anyhow::Result<()> + Send + Sync + 'static,
    ) {
        self.handlers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(event_type.into())
            .or_default()
            .push(Box::new(handler));
    }

    pub fn rule_ids(&self) -> Vec<String> {
        self.rules
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .map(|r| r.id.clone())
            .collect()
    }

    // =========================================================================
    // Event Processing
    // =========================================================================

    /// Evaluate every rule against an event and run the event's handlers.
    ///
    /// Returns the ids of the checkpoints created. A failing checkpoint write
    /// or handler is logged and skipped; it never aborts the remaining work.
    pub fn process_event(&self, event_type: &str, context: &Value) -> Vec<String> {
        let context = with_event_type(event_type, context);
        let owner = context
            .get("session_id")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .unwrap_or(self.default_owner.as_str())
            .to_string();
        let alignment = context
            .get("alignment_score")
            .and_then(Value::as_f64)
            .unwrap_or(1.0);

        let mut checkpoint_ids = Vec::new();
        {
            let rules = self.rules.read().unwrap_or_else(|poisoned| poisoned.into_inner());
            for rule in rules.iter() {
                if !rule.should_trigger(&context) {
                    continue;
                }

                let mut metadata = rule.extract_metadata(&context);
                metadata.insert("rule_id".to_string(), Value::String(rule.id.clone()));

                match self.store.create_typed(
                    &owner,
                    &context,
                    alignment,
                    metadata,
                    rule.checkpoint_type,
                    event_type,
                ) {
                    Ok(checkpoint) => {
                        self.record_hit(&rule.id);
                        checkpoint_ids.push(checkpoint.id);
                    }
                    Err(e) => {
                        tracing::warn!(rule = %rule.id, event_type, error = %e, "Compliance checkpoint failed");
                    }
                }
            }
        }

        self.dispatch_handlers(event_type, &context, &checkpoint_ids);
        checkpoint_ids
    }

    fn record_hit(&self, rule_id: &str) {
        let mut hits = self.rule_hits.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *hits.entry(rule_id.to_string()).or_insert(0) += 1;
    }

    fn dispatch_handlers(&self, event_type: &str, context: &Value, checkpoint_ids: &[String]) {
        let handlers = self.handlers.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        let Some(handlers) = handlers.get(event_type) else {
            return;
        };

        for (index, handler) in handlers.iter().enumerate() {
            match catch_unwind(AssertUnwindSafe(|| handler(event_type, context, checkpoint_ids))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(event_type, handler = index, error = %e, "Event handler failed");
                }
                Err(_) => {
                    tracing::warn!(event_type, handler = index, "Event handler panicked");
                }
            }
        }
    }

    /// Create the lifecycle checkpoint for a session
    pub fn checkpoint_session(
        &self,
        owner_id: &str,
        state: &Value,
        alignment_score: f64,
        metadata: BTreeMap<String, Value>,
    ) -> GovernanceResult<Checkpoint> {
        self.store.create_typed(
            owner_id,
            state,
            alignment_score,
            metadata,
            CheckpointType::Lifecycle,
            LIFECYCLE_CHAIN,
        )
    }

    // =========================================================================
    // Status
    // =========================================================================

    pub fn rule_coverage(&self) -> RuleCoverage {
        let ids = self.rule_ids();
        let hits = self.rule_hits.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let total_rules = ids.len();
        let fired_rules = ids
            .iter()
            .filter(|id| hits.get(*id).copied().unwrap_or(0) > 0)
            .count();
        let percentage = if total_rules == 0 {
            100.0
        } else {
            fired_rules as f64 / total_rules as f64 * 100.0
        };

        RuleCoverage {
            fired_rules,
            total_rules,
            percentage,
        }
    }

    /// Chain integrity plus rule coverage
    pub fn compliance_status(&self, chain: &str) -> GovernanceResult<ComplianceStatus> {
        let trajectory_summary = self.store.trajectory_summary(chain)?;
        let status = if trajectory_summary.integrity_verified {
            ComplianceVerdict::Compliant
        } else {
            ComplianceVerdict::IntegrityFailure
        };

        Ok(ComplianceStatus {
            status,
            trajectory_summary,
            rule_coverage: self.rule_coverage(),
        })
    }

    /// Write a JSON compliance report into `dir`
    pub fn export_compliance_report(&self, chain: &str, dir: &Path) -> anyhow::Result<PathBuf> {
        let now = Utc::now();
        let report = ComplianceReport {
            timestamp: now,
            chain_type: chain.to_string(),
            compliance_status: self.compliance_status(chain)?,
            rules: self.rule_ids(),
        };

        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create reports directory {}", dir.display()))?;

        let path = dir.join(format!(
            "compliance_report_{}_{}.json",
            chain,
            now.format("%Y%m%d_%H%M%S")
        ));
        let content = serde_json::to_string_pretty(&report)?;
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        Ok(path)
    }

    // =========================================================================
    // Protocol of Return
    // =========================================================================

    /// Restore target for an owner: the newest checkpoint whose stored state verifies
    pub fn execute_protocol_of_return(&self, owner_id: &str) -> GovernanceResult<ProtocolOfReturn> {
        self.protocol_of_return(owner_id, None)
    }

    /// Same as `execute_protocol_of_return`, restricted to one chain
    pub fn execute_protocol_of_return_in(
        &self,
        owner_id: &str,
        chain: &str,
    ) -> GovernanceResult<ProtocolOfReturn> {
        self.protocol_of_return(owner_id, Some(chain))
    }

    fn protocol_of_return(
        &self,
        owner_id: &str,
        chain: Option<&str>,
    ) -> GovernanceResult<ProtocolOfReturn> {
        let candidates: Vec<Checkpoint> = self
            .store
            .list(Some(owner_id))?
            .into_iter()
            .filter(|c| chain.map_or(true, |ch| c.chain == ch))
            .collect();

        if candidates.is_empty() {
            tracing::error!(owner = owner_id, "Protocol of Return: no checkpoints");
            return Err(GovernanceError::ProtocolOfReturnFailure {
                owner: owner_id.to_string(),
                reason: "no checkpoints recorded".to_string(),
            });
        }

        let mut skipped = Vec::new();
        for checkpoint in candidates {
            // A missing or unreadable record counts as a failed verification
            let state = match self.store.snapshot(&checkpoint.id) {
                Ok(state) => state,
                Err(e) => {
                    tracing::warn!(checkpoint = %checkpoint.id, error = %e, "Skipping checkpoint with unreadable state");
                    skipped.push(checkpoint.id);
                    continue;
                }
            };
            if self.store.verify(&checkpoint, &state) {
                tracing::info!(
                    owner = owner_id,
                    checkpoint = %checkpoint.id,
                    skipped = skipped.len(),
                    "Protocol of Return restored checkpoint"
                );
                return Ok(ProtocolOfReturn {
                    success: true,
                    restored_checkpoint_id: checkpoint.id.clone(),
                    checkpoint,
                    state,
                    skipped,
                });
            }

            tracing::warn!(checkpoint = %checkpoint.id, "Skipping checkpoint that fails verification");
            skipped.push(checkpoint.id);
        }

        tracing::error!(owner = owner_id, "Protocol of Return: no verifiable checkpoint");
        Err(GovernanceError::ProtocolOfReturnFailure {
            owner: owner_id.to_string(),
            reason: format!("none of {} checkpoints verify", skipped.len()),
        })
    }
}

fn with_event_type(event_type: &str, context: &Value) -> Value {
    match context {
        Value::Object(map) => {
            let mut map = map.clone();
            map.insert("event_type".to_string(), Value::String(event_type.to_string()));
            Value::Object(map)
        }
        other => serde_json::json!({
            "event_type": event_type,
            "payload": other,
        }),
    }
}

// =============================================================================
// Tests
// =============================================================================
