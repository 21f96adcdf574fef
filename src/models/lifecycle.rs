//! Lifecycle types: the 9 states, the per-run context and the audit history

use super::collaborator::{Classification, HealthReport, RiskLevel, ScenarioAnalysis};
use crate::error::GovernanceResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Lifecycle State
// =============================================================================

/// The 9 states of the governance lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    /// Session setup
    Preflight,
    /// System health verification
    Health,
    /// Risk classification of the request
    Classification,
    /// Approval gate (operator confirmation for risky requests)
    Approval,
    /// Execution of the approved action
    Execution,
    /// Telemetry and audit trail
    Witness,
    /// Trajectory checkpoint creation
    Checkpoint,
    /// Protocol of Return
    Recovery,
    /// Completion, loop-back possible via reset
    Final,
}

impl LifecycleState {
    /// All states in transition order
    pub const ALL: [LifecycleState; 9] = [
        LifecycleState::Preflight,
        LifecycleState::Health,
        LifecycleState::Classification,
        LifecycleState::Approval,
        LifecycleState::Execution,
        LifecycleState::Witness,
        LifecycleState::Checkpoint,
        LifecycleState::Recovery,
        LifecycleState::Final,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            LifecycleState::Preflight => "preflight",
            LifecycleState::Health => "health",
            LifecycleState::Classification => "classification",
            LifecycleState::Approval => "approval",
            LifecycleState::Execution => "execution",
            LifecycleState::Witness => "witness",
            LifecycleState::Checkpoint => "checkpoint",
            LifecycleState::Recovery => "recovery",
            LifecycleState::Final => "final",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            LifecycleState::Preflight => "🛫",
            LifecycleState::Health => "🩺",
            LifecycleState::Classification => "🏷️",
            LifecycleState::Approval => "🔐",
            LifecycleState::Execution => "🔨",
            LifecycleState::Witness => "👁️",
            LifecycleState::Checkpoint => "📌",
            LifecycleState::Recovery => "♻️",
            LifecycleState::Final => "✅",
        }
    }

    /// Static transition table.
    ///
    /// `recovery_needed` is only consulted at CHECKPOINT; FINAL has no successor.
    pub fn successor(&self, recovery_needed: bool) -> Option<LifecycleState> {
        match self {
            LifecycleState::Preflight => Some(LifecycleState::Health),
            LifecycleState::Health => Some(LifecycleState::Classification),
            LifecycleState::Classification => Some(LifecycleState::Approval),
            LifecycleState::Approval => Some(LifecycleState::Execution),
            LifecycleState::Execution => Some(LifecycleState::Witness),
            LifecycleState::Witness => Some(LifecycleState::Checkpoint),
            LifecycleState::Checkpoint => {
                if recovery_needed {
                    Some(LifecycleState::Recovery)
                } else {
                    Some(LifecycleState::Final)
                }
            }
            LifecycleState::Recovery => Some(LifecycleState::Final),
            LifecycleState::Final => None,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Per-state outputs
// =============================================================================

/// Final status values written by RECOVERY and FINAL
pub const STATUS_COMPLETED: &str = "completed";
pub const STATUS_RECOVERED: &str = "recovered";

/// Health output recorded by the HEALTH state
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthRecord {
    #[serde(flatten)]
    pub report: HealthReport,
    pub checked_at: DateTime<Utc>,
}

/// Approval decision, either automatic or supplied by an operator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApprovalDecision {
    pub approved: bool,
    /// Deeper scenario analysis is required before the action may run
    #[serde(default)]
    pub requires_csi: bool,
    /// Decision was supplied from outside the lifecycle
    #[serde(default)]
    pub manual_override: bool,
    #[serde(default)]
    pub approver: Option<String>,
    pub decided_at: DateTime<Utc>,
}

impl ApprovalDecision {
    pub fn automatic() -> Self {
        Self {
            approved: true,
            requires_csi: false,
            manual_override: false,
            approver: None,
            decided_at: Utc::now(),
        }
    }

    pub fn pending_review() -> Self {
        Self {
            approved: false,
            requires_csi: true,
            manual_override: false,
            approver: None,
            decided_at: Utc::now(),
        }
    }

    pub fn operator(approved: bool, approver: impl Into<String>) -> Self {
        Self {
            approved,
            requires_csi: false,
            manual_override: true,
            approver: Some(approver.into()),
            decided_at: Utc::now(),
        }
    }
}

/// Outcome recorded by the EXECUTION state
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionResult {
    pub success: bool,
    pub output: String,
    pub executed_at: DateTime<Utc>,
}

/// Reference to a witness event forwarded to the telemetry sink
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TelemetryRef {
    pub event_id: String,
    pub event_type: String,
    pub state: LifecycleState,
    /// False when the sink failed or timed out and the id is local only
    pub delivered: bool,
    pub recorded_at: DateTime<Utc>,
}

/// Reference to the checkpoint created at CHECKPOINT
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckpointRef {
    pub checkpoint_id: String,
    pub state_digest: String,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Lifecycle Context
// =============================================================================

/// Context threaded through one lifecycle run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LifecycleContext {
    pub session_id: String,
    pub user_query: String,
    #[serde(default)]
    pub health_status: Option<HealthRecord>,
    #[serde(default)]
    pub risk_classification: Option<Classification>,
    #[serde(default)]
    pub user_approval: Option<ApprovalDecision>,
    #[serde(default)]
    pub csi_analysis: Option<ScenarioAnalysis>,
    #[serde(default)]
    pub execution_result: Option<ExecutionResult>,
    #[serde(default)]
    pub telemetry_events: Vec<TelemetryRef>,
    #[serde(default)]
    pub checkpoint: Option<CheckpointRef>,
    #[serde(default)]
    pub recovery_needed: bool,
    /// Checkpoint the RECOVERY state restored from
    #[serde(default)]
    pub restored_from: Option<String>,
    #[serde(default)]
    pub final_status: Option<String>,
}

impl LifecycleContext {
    /// Fresh context; the session id is assigned by PREFLIGHT
    pub fn new(user_query: impl Into<String>) -> Self {
        Self {
            session_id: String::new(),
            user_query: user_query.into(),
            health_status: None,
            risk_classification: None,
            user_approval: None,
            csi_analysis: None,
            execution_result: None,
            telemetry_events: Vec::new(),
            checkpoint: None,
            recovery_needed: false,
            restored_from: None,
            final_status: None,
        }
    }

    /// Classified risk level, `None` when unclassified or not yet classified
    pub fn risk_level(&self) -> Option<RiskLevel> {
        match &self.risk_classification {
            Some(Classification::Classified { level, .. }) => Some(*level),
            _ => None,
        }
    }

    /// Whether the approval gate must wait for an operator
    ///
    /// Unclassified requests are gated like HIGH risk.
    pub fn requires_operator_approval(&self) -> bool {
        match &self.risk_classification {
            Some(Classification::Classified { level, .. }) => level.requires_approval(),
            Some(Classification::Unclassified { .. }) | None => true,
        }
    }

    pub fn is_approved(&self) -> bool {
        self.user_approval.as_ref().is_some_and(|a| a.approved)
    }

    pub fn is_recovered(&self) -> bool {
        self.final_status.as_deref() == Some(STATUS_RECOVERED)
    }

    /// Serialize for history snapshots and checkpoint digests
    pub fn to_value(&self) -> GovernanceResult<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Confidence that the context represents compliant state, in [0, 1]
    pub fn alignment_score(&self) -> f64 {
        let mut score: f64 = 1.0;

        if let Some(health) = &self.health_status {
            if health.report.status.is_degraded() {
                score -= 0.1;
            }
        }
        if self.user_approval.as_ref().is_some_and(|a| a.manual_override) {
            score -= 0.1;
        }
        match &self.execution_result {
            Some(result) if result.success => {}
            _ => score -= 0.4,
        }
        if self.recovery_needed {
            score -= 0.3;
        }

        score.clamp(0.0, 1.0)
    }

    /// Clear per-run outputs for a loop-back run in the same session
    pub fn clear_run_outputs(&mut self) {
        self.health_status = None;
        self.risk_classification = None;
        self.user_approval = None;
        self.csi_analysis = None;
        self.execution_result = None;
        self.telemetry_events.clear();
        self.checkpoint = None;
        self.recovery_needed = false;
        self.restored_from = None;
        self.final_status = None;
    }

    /// Restore state outputs from a recovered snapshot.
    ///
    /// Session identity, the request and the recovery flag stay as they are.
    pub fn restore_outputs_from(&mut self, snapshot: LifecycleContext) {
        self.health_status = snapshot.health_status;
        self.risk_classification = snapshot.risk_classification;
        self.user_approval = snapshot.user_approval;
        self.csi_analysis = snapshot.csi_analysis;
        self.execution_result = snapshot.execution_result;
        self.telemetry_events = snapshot.telemetry_events;
        if snapshot.checkpoint.is_some() {
            self.checkpoint = snapshot.checkpoint;
        }
    }
}

// =============================================================================
// History
// =============================================================================

/// One append-only audit entry per executed state
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub state: LifecycleState,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub success: bool,
    /// Context as it was when the state was entered
    pub context_snapshot: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::collaborator::HealthStatus;

    #[test]
    fn test_transition_table() {
        assert_eq!(
            LifecycleState::Preflight.successor(false),
            Some(LifecycleState::Health)
        );
        assert_eq!(
            LifecycleState::Checkpoint.successor(false),
            Some(LifecycleState::Final)
        );
        assert_eq!(
            LifecycleState::Checkpoint.successor(true),
            Some(LifecycleState::Recovery)
        );
        assert_eq!(
            LifecycleState::Recovery.successor(false),
            Some(LifecycleState::Final)
        );
        assert_eq!(LifecycleState::Final.successor(true), None);
    }

    #[test]
    fn test_recovery_flag_only_matters_at_checkpoint() {
        for state in LifecycleState::ALL {
            if state == LifecycleState::Checkpoint {
                continue;
            }
            assert_eq!(state.successor(true), state.successor(false), "{}", state);
        }
    }

    #[test]
    fn test_state_serializes_lowercase() {
        let json = serde_json::to_string(&LifecycleState::Classification).unwrap();
        assert_eq!(json, "\"classification\"");
        assert_eq!(LifecycleState::Witness.to_string(), "witness");
    }

    #[test]
    fn test_unclassified_requires_approval() {
        let mut ctx = LifecycleContext::new("query");
        assert!(ctx.requires_operator_approval());

        ctx.risk_classification = Some(Classification::Unclassified {
            reason: "empty".to_string(),
        });
        assert!(ctx.requires_operator_approval());

        ctx.risk_classification = Some(Classification::Classified {
            level: RiskLevel::Low,
            confidence: 0.9,
            reasoning: vec![],
        });
        assert!(!ctx.requires_operator_approval());
        assert_eq!(ctx.risk_level(), Some(RiskLevel::Low));
    }

    #[test]
    fn test_alignment_score_bounds() {
        let mut ctx = LifecycleContext::new("query");
        ctx.recovery_needed = true;
        ctx.health_status = Some(HealthRecord {
            report: HealthReport {
                status: HealthStatus::Warning,
                detail: "load".to_string(),
            },
            checked_at: Utc::now(),
        });
        let score = ctx.alignment_score();
        assert!((0.0..=1.0).contains(&score));

        ctx.clear_run_outputs();
        ctx.execution_result = Some(ExecutionResult {
            success: true,
            output: "ok".to_string(),
            executed_at: Utc::now(),
        });
        assert_eq!(ctx.alignment_score(), 1.0);
    }

    #[test]
    fn test_to_value_reads_back() {
        let mut ctx = LifecycleContext::new("show status");
        ctx.session_id = "session_abc".to_string();
        ctx.user_approval = Some(ApprovalDecision::automatic());

        let value = ctx.to_value().unwrap();
        assert_eq!(value["session_id"], serde_json::json!("session_abc"));

        let back: LifecycleContext = serde_json::from_value(value).unwrap();
        assert_eq!(back.session_id, ctx.session_id);
        assert_eq!(back.user_query, ctx.user_query);
        assert!(back.is_approved());
    }

    #[test]
    fn test_restore_keeps_identity() {
        let mut ctx = LifecycleContext::new("live");
        ctx.session_id = "session_live".to_string();
        ctx.recovery_needed = true;

        let mut snapshot = LifecycleContext::new("old");
        snapshot.session_id = "session_old".to_string();
        snapshot.user_approval = Some(ApprovalDecision::automatic());

        ctx.restore_outputs_from(snapshot);
        assert_eq!(ctx.session_id, "session_live");
        assert_eq!(ctx.user_query, "live");
        assert!(ctx.recovery_needed);
        assert!(ctx.is_approved());
    }
}
