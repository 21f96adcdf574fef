//! Compliance rules: when to checkpoint, and what to record

use crate::models::CheckpointType;
use serde_json::Value;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

pub type TriggerFn = Box<dyn Fn(&Value) -> bool + Send + Sync>;
pub type MetadataFn = Box<dyn Fn(&Value) -> BTreeMap<String, Value> + Send + Sync>;

/// Predicate plus checkpoint classification
pub struct ComplianceRule {
    pub id: String,
    pub checkpoint_type: CheckpointType,
    trigger: TriggerFn,
    metadata_extractor: Option<MetadataFn>,
}

impl ComplianceRule {
    pub fn new(
        id: impl Into<String>,
        checkpoint_type: CheckpointType,
        trigger: impl Fn(&Value) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            checkpoint_type,
            trigger: Box::new(trigger),
            metadata_extractor: None,
        }
    }

    pub fn with_metadata(
        mut self,
        extractor: impl Fn(&Value) -> BTreeMap<String, Value> + Send + Sync + 'static,
    ) -> Self {
        self.metadata_extractor = Some(Box::new(extractor));
        self
    }

    /// Rule that fires on one event type and copies the named context fields
    pub fn on_event(
        id: impl Into<String>,
        event_type: &str,
        checkpoint_type: CheckpointType,
        fields: &[&str],
    ) -> Self {
        let event_type = event_type.to_string();
        let fields: Vec<String> = fields.iter().map(|f| f.to_string()).collect();

        Self::new(id, checkpoint_type, move |ctx| {
            ctx.get("event_type").and_then(Value::as_str) == Some(event_type.as_str())
        })
        .with_metadata(move |ctx| {
            fields
                .iter()
                .map(|f| (f.clone(), ctx.get(f).cloned().unwrap_or(Value::Null)))
                .collect()
        })
    }

    /// Evaluate the predicate. A panicking predicate counts as not triggered.
    pub fn should_trigger(&self, context: &Value) -> bool {
        match catch_unwind(AssertUnwindSafe(|| (self.trigger)(context))) {
            Ok(triggered) => triggered,
            Err(_) => {
                tracing::warn!(rule = %self.id, "Compliance rule predicate panicked");
                false
            }
        }
    }

    /// Extract metadata. A panicking extractor yields no metadata.
    pub fn extract_metadata(&self, context: &Value) -> BTreeMap<String, Value> {
        let Some(extractor) = &self.metadata_extractor else {
            return BTreeMap::new();
        };

        match catch_unwind(AssertUnwindSafe(|| extractor(context))) {
            Ok(metadata) => metadata,
            Err(_) => {
                tracing::warn!(rule = %self.id, "Compliance metadata extractor panicked");
                BTreeMap::new()
            }
        }
    }
}

impl std::fmt::Debug for ComplianceRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComplianceRule")
            .field("id", &self.id)
            .field("checkpoint_type", &self.checkpoint_type)
            .field("has_metadata_extractor", &self.metadata_extractor.is_some())
            .finish()
    }
}

/// The five standard governance rules
pub fn default_rules() -> Vec<ComplianceRule> {
    vec![
        ComplianceRule::on_event(
            "state_transition",
            "state_change",
            CheckpointType::StateTransition,
            &["from_state", "to_state", "reason"],
        ),
        ComplianceRule::on_event(
            "governance_decision",
            "governance_decision",
            CheckpointType::GovernanceDecision,
            &["decision", "confidence", "escalated"],
        ),
        ComplianceRule::on_event(
            "classification_event",
            "classification_complete",
            CheckpointType::ClassificationEvent,
            &["risk_level", "confidence", "patterns_matched"],
        ),
        ComplianceRule::on_event(
            "health_check",
            "health_check",
            CheckpointType::HealthCheck,
            &["component", "status", "metrics"],
        ),
        ComplianceRule::on_event(
            "error_condition",
            "error_occurred",
            CheckpointType::ErrorCondition,
            &["error_type", "component", "recoverable"],
        ),
    ]
}
