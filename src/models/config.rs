//! governd configuration (governd/config.toml)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_PATH: &str = "governd/config.toml";

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GovernConfig {
    /// Directory holding one JSON file per checkpoint
    #[serde(default = "default_checkpoint_dir")]
    pub checkpoint_dir: PathBuf,

    /// Directory for exported compliance reports
    #[serde(default = "default_reports_dir")]
    pub reports_dir: PathBuf,

    /// Upper bound for a single collaborator call
    #[serde(default = "default_collaborator_timeout_ms")]
    pub collaborator_timeout_ms: u64,

    /// Actor recorded on witness events
    #[serde(default = "default_actor")]
    pub actor: String,

    /// Owner for compliance checkpoints whose event carries no session id
    #[serde(default = "default_owner")]
    pub default_owner: String,
}

fn default_checkpoint_dir() -> PathBuf {
    PathBuf::from("governd/checkpoints")
}

fn default_reports_dir() -> PathBuf {
    PathBuf::from("governd/reports")
}

fn default_collaborator_timeout_ms() -> u64 {
    5_000
}

fn default_actor() -> String {
    "lifecycle_manager".to_string()
}

fn default_owner() -> String {
    "governd".to_string()
}

impl Default for GovernConfig {
    fn default() -> Self {
        Self {
            checkpoint_dir: default_checkpoint_dir(),
            reports_dir: default_reports_dir(),
            collaborator_timeout_ms: default_collaborator_timeout_ms(),
            actor: default_actor(),
            default_owner: default_owner(),
        }
    }
}

impl GovernConfig {
    /// Load config from governd/config.toml, defaults when absent
    pub fn load(project_root: &Path) -> anyhow::Result<Self> {
        let config_path = project_root.join(CONFIG_PATH);
        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&config_path)?;
        let config: GovernConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save config to governd/config.toml
    pub fn save(&self, project_root: &Path) -> anyhow::Result<()> {
        let config_path = project_root.join(CONFIG_PATH);
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn collaborator_timeout(&self) -> Duration {
        Duration::from_millis(self.collaborator_timeout_ms)
    }

    /// Checkpoint directory resolved against the project root
    pub fn checkpoint_path(&self, project_root: &Path) -> PathBuf {
        project_root.join(&self.checkpoint_dir)
    }

    pub fn reports_path(&self, project_root: &Path) -> PathBuf {
        project_root.join(&self.reports_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_missing_config_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let config = GovernConfig::load(temp.path()).unwrap();
        assert_eq!(config, GovernConfig::default());
        assert_eq!(config.collaborator_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let config = GovernConfig {
            collaborator_timeout_ms: 250,
            actor: "ops".to_string(),
            ..GovernConfig::default()
        };
        config.save(temp.path()).unwrap();

        let loaded = GovernConfig::load(temp.path()).unwrap();
        assert_eq!(loaded.collaborator_timeout_ms, 250);
        assert_eq!(loaded.actor, "ops");
    }

    #[test]
    fn test_partial_config() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("governd")).unwrap();
        std::fs::write(
            temp.path().join(CONFIG_PATH),
            "checkpoint_dir = \"var/tcp\"\n",
        )
        .unwrap();

        let config = GovernConfig::load(temp.path()).unwrap();
        assert_eq!(
            config.checkpoint_path(temp.path()),
            temp.path().join("var/tcp")
        );
        assert_eq!(config.default_owner, "governd");
    }
}
