pub mod checkpoints;
pub mod recover;
pub mod report;
pub mod run;
pub mod status;

use crate::checkpoint::CheckpointStore;
use crate::compliance::ComplianceOrchestrator;
use crate::models::GovernConfig;
use crate::Result;
use anyhow::Context;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Project root plus its loaded configuration
pub(crate) fn load_project() -> Result<(PathBuf, GovernConfig)> {
    let project_root = std::env::current_dir()?;
    let config = GovernConfig::load(&project_root)?;
    Ok((project_root, config))
}

/// Orchestrator over the project's file-backed checkpoint store
pub(crate) fn open_orchestrator(
    project_root: &Path,
    config: &GovernConfig,
) -> Result<Arc<ComplianceOrchestrator>> {
    let dir = config.checkpoint_path(project_root);
    let store = CheckpointStore::open(&dir)
        .with_context(|| format!("Failed to open checkpoint store at {}", dir.display()))?;

    Ok(Arc::new(ComplianceOrchestrator::with_default_rules(
        Arc::new(store),
        config.default_owner.clone(),
    )))
}
