//! Minimal collaborators for embedding hosts and the CLI
//!
//! These return fixed answers; real probing and classification live elsewhere.

use super::{HealthProbe, RiskClassifier, TelemetrySink};
use crate::models::{Classification, HealthReport, HealthStatus, RiskLevel};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Mutex;
use uuid::Uuid;

/// Health probe that always reports the same status
#[derive(Debug, Clone)]
pub struct FixedHealthProbe {
    report: HealthReport,
}

impl FixedHealthProbe {
    pub fn new(status: HealthStatus, detail: impl Into<String>) -> Self {
        Self {
            report: HealthReport {
                status,
                detail: detail.into(),
            },
        }
    }

    pub fn healthy() -> Self {
        Self::new(HealthStatus::Healthy, "all checks passed")
    }
}

#[async_trait]
impl HealthProbe for FixedHealthProbe {
    async fn check(&self) -> anyhow::Result<HealthReport> {
        Ok(self.report.clone())
    }
}

/// Classifier that assigns one risk level to every non-empty query
#[derive(Debug, Clone)]
pub struct FixedClassifier {
    level: RiskLevel,
}

impl FixedClassifier {
    pub fn new(level: RiskLevel) -> Self {
        Self { level }
    }
}

#[async_trait]
impl RiskClassifier for FixedClassifier {
    async fn classify(&self, query: &str) -> anyhow::Result<Classification> {
        if query.trim().is_empty() {
            return Ok(Classification::Unclassified {
                reason: "empty query".to_string(),
            });
        }

        Ok(Classification::Classified {
            level: self.level,
            confidence: 1.0,
            reasoning: vec![format!("risk level fixed to {}", self.level)],
        })
    }
}

/// Telemetry sink that writes witness events to the tracing subscriber
#[derive(Debug, Clone, Default)]
pub struct TracingTelemetry;

#[async_trait]
impl TelemetrySink for TracingTelemetry {
    async fn record(
        &self,
        event_type: &str,
        metadata: &Value,
        actor: &str,
        _context: &Value,
    ) -> anyhow::Result<String> {
        let event_id = format!("evt_{}", Uuid::new_v4().simple());
        tracing::info!(
            target: "governd::witness",
            event_id = %event_id,
            event_type,
            actor,
            metadata = %metadata,
            "Witness event"
        );
        Ok(event_id)
    }
}

/// Event captured by `MemoryTelemetry`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordedEvent {
    pub event_id: String,
    pub event_type: String,
    pub metadata: Value,
    pub actor: String,
    pub recorded_at: DateTime<Utc>,
}

/// Telemetry sink that keeps events in memory
#[derive(Debug, Default)]
pub struct MemoryTelemetry {
    events: Mutex<Vec<RecordedEvent>>,
}

impl MemoryTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl TelemetrySink for MemoryTelemetry {
    async fn record(
        &self,
        event_type: &str,
        metadata: &Value,
        actor: &str,
        _context: &Value,
    ) -> anyhow::Result<String> {
        let event = RecordedEvent {
            event_id: format!("evt_{}", Uuid::new_v4().simple()),
            event_type: event_type.to_string(),
            metadata: metadata.clone(),
            actor: actor.to_string(),
            recorded_at: Utc::now(),
        };
        let event_id = event.event_id.clone();
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
        Ok(event_id)
    }
}
