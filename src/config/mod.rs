pub mod schema;

pub use schema::{
    CompletionConfig, OrchestratorConfig, ProviderConfig, ProviderKind, ScheduleConfig,
    TraceSink, TracingConfig, WorkflowConfig,
};

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Default orchestrator home directory (~/.orchestrator).
pub fn default_home_dir() -> PathBuf {
    directories::BaseDirs::new()
        .map(|d| d.home_dir().join(".orchestrator"))
        .unwrap_or_else(|| PathBuf::from(".orchestrator"))
}

/// Load config from the given path, or return defaults.
pub fn load_config(path: &Path) -> Result<OrchestratorConfig> {
    if path.exists() {
        let contents =
            std::fs::read_to_string(path).context("Failed to read orchestrator config file")?;
        let config: OrchestratorConfig =
            toml::from_str(&contents).context("Failed to parse orchestrator config (TOML)")?;
        Ok(config)
    } else {
        Ok(OrchestratorConfig::default())
    }
}

/// Save config to the given path (TOML format).
pub fn save_config(config: &OrchestratorConfig, path: &Path) -> Result<()> {
    let contents = toml::to_string_pretty(config).context("Failed to serialize config")?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, contents).context("Failed to write config file")?;
    Ok(())
}
