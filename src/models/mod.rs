pub mod checkpoint;
pub mod collaborator;
pub mod config;
pub mod lifecycle;

pub use checkpoint::{
    AlignmentPoint, Checkpoint, CheckpointRecord, CheckpointType, TrajectorySummary,
    LIFECYCLE_CHAIN,
};
pub use collaborator::{Classification, HealthReport, HealthStatus, RiskLevel, ScenarioAnalysis};
pub use config::GovernConfig;
pub use lifecycle::{
    ApprovalDecision, CheckpointRef, ExecutionResult, HealthRecord, HistoryEntry,
    LifecycleContext, LifecycleState, TelemetryRef, STATUS_COMPLETED, STATUS_RECOVERED,
};
