// Governd - governance lifecycle engine
// Drives requests through a fixed set of governance states and keeps a
// tamper-evident checkpoint trail that recovery can return to.

pub mod checkpoint;
pub mod cli;
pub mod collaborators;
pub mod compliance;
pub mod error;
pub mod lifecycle;
pub mod models;

pub use anyhow::{Context, Result};

// Re-export commonly used types
pub use checkpoint::CheckpointStore;
pub use compliance::ComplianceOrchestrator;
pub use error::{GovernanceError, GovernanceResult};
pub use lifecycle::{LifecycleManager, SessionStore};
pub use models::{Checkpoint, GovernConfig, LifecycleContext, LifecycleState};
