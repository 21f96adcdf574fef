//! External collaborators consumed by the lifecycle states
//!
//! Health probing, risk classification, telemetry storage and scenario
//! analysis live outside this crate. The lifecycle only sees these traits;
//! every call is bounded by the configured timeout.

mod builtin;

pub use builtin::{FixedClassifier, FixedHealthProbe, MemoryTelemetry, RecordedEvent, TracingTelemetry};

use crate::models::{Classification, HealthReport, ScenarioAnalysis};
use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Health collaborator used by HEALTH
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn check(&self) -> anyhow::Result<HealthReport>;
}

/// Risk classification collaborator used by CLASSIFICATION
#[async_trait]
pub trait RiskClassifier: Send + Sync {
    /// Classify a request. Unclassifiable input is `Classification::Unclassified`, not an error.
    async fn classify(&self, query: &str) -> anyhow::Result<Classification>;
}

/// Telemetry sink used by WITNESS
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    /// Record a witness event and return its id
    async fn record(
        &self,
        event_type: &str,
        metadata: &Value,
        actor: &str,
        context: &Value,
    ) -> anyhow::Result<String>;
}

/// Scenario (CSI) analysis, invoked by APPROVAL for HIGH/CRITICAL requests
#[async_trait]
pub trait ScenarioAnalyzer: Send + Sync {
    async fn analyze(&self, pipeline_config: &Value) -> anyhow::Result<ScenarioAnalysis>;
}

/// Failure of a bounded collaborator call
#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    #[error("{collaborator} did not respond within {timeout_ms}ms")]
    Timeout {
        collaborator: &'static str,
        timeout_ms: u128,
    },

    #[error("{collaborator} failed: {source}")]
    Failed {
        collaborator: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

/// Await a collaborator call with an upper bound
pub async fn bounded<T>(
    collaborator: &'static str,
    timeout: Duration,
    call: impl Future<Output = anyhow::Result<T>>,
) -> Result<T, CollaboratorError> {
    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(source)) => Err(CollaboratorError::Failed {
            collaborator,
            source,
        }),
        Err(_) => Err(CollaboratorError::Timeout {
            collaborator,
            timeout_ms: timeout.as_millis(),
        }),
    }
}

/// The set of collaborators a lifecycle run talks to
#[derive(Clone)]
pub struct Collaborators {
    pub health: Arc<dyn HealthProbe>,
    pub classifier: Arc<dyn RiskClassifier>,
    pub telemetry: Arc<dyn TelemetrySink>,
    pub analyzer: Option<Arc<dyn ScenarioAnalyzer>>,
    pub timeout: Duration,
}

impl Collaborators {
    pub fn new(
        health: Arc<dyn HealthProbe>,
        classifier: Arc<dyn RiskClassifier>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            health,
            classifier,
            telemetry,
            analyzer: None,
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_analyzer(mut self, analyzer: Arc<dyn ScenarioAnalyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bounded_passes_value_through() {
        let value = bounded("probe", Duration::from_millis(100), async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_bounded_times_out() {
        let result: Result<(), _> = bounded("probe", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        let err = result.unwrap_err();
        assert!(matches!(err, CollaboratorError::Timeout { timeout_ms: 10, .. }));
        assert!(err.to_string().contains("probe"));
    }

    #[tokio::test]
    async fn test_bounded_wraps_failures() {
        let result: Result<(), _> =
            bounded("classifier", Duration::from_millis(100), async {
                anyhow::bail!("backend offline")
            })
            .await;

        assert!(matches!(result, Err(CollaboratorError::Failed { .. })));
    }
}
