//! Configuration schema for orchestrator.toml.

use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Path to the SQLite database.
    pub db_path: String,

    /// Path to the schedule YAML file.
    pub schedule_config_path: String,

    /// Log level (debug, info, warn, error).
    pub log_level: String,

    /// Config version.
    pub version: u32,

    pub completion: CompletionConfig,

    /// Registered completion providers.
    pub providers: Vec<ProviderConfig>,

    pub tracing: TracingConfig,

    pub schedule: ScheduleConfig,

    pub workflow: WorkflowConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            db_path: "~/.orchestrator/state.db".into(),
            schedule_config_path: "~/.orchestrator/schedules.yml".into(),
            log_level: "info".into(),
            version: 1,
            completion: CompletionConfig::default(),
            providers: vec![ProviderConfig::default()],
            tracing: TracingConfig::default(),
            schedule: ScheduleConfig::default(),
            workflow: WorkflowConfig::default(),
        }
    }
}

/// Completion manager settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    /// Provider used when a call names none.
    pub default_provider: String,
    pub cache_enabled: bool,
    pub cache_ttl_secs: u64,
    /// Upper bound on cached responses; the oldest entry goes first.
    pub cache_max_entries: usize,
    pub max_retries: u32,
    pub backoff_multiplier: f64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            default_provider: "openai".into(),
            cache_enabled: true,
            cache_ttl_secs: 300,
            cache_max_entries: 1000,
            max_retries: 3,
            backoff_multiplier: 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// OpenAI-compatible `/v1/chat/completions` endpoint.
    OpenAi,
    /// Ollama `/api/chat` endpoint.
    Ollama,
}

/// One completion provider entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub name: String,
    pub kind: ProviderKind,
    pub base_url: String,
    /// Inline API key. Prefer `api_key_env`.
    pub api_key: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub model: String,
    pub embedding_model: String,
    pub request_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: "openai".into(),
            kind: ProviderKind::OpenAi,
            base_url: "https://api.openai.com".into(),
            api_key: String::new(),
            api_key_env: "OPENAI_API_KEY".into(),
            model: "gpt-4o-mini".into(),
            embedding_model: "text-embedding-3-small".into(),
            request_timeout_secs: 60,
        }
    }
}

impl ProviderConfig {
    /// The API key, falling back to the configured environment variable.
    pub fn resolved_api_key(&self) -> String {
        if !self.api_key.is_empty() {
            return self.api_key.clone();
        }
        if self.api_key_env.is_empty() {
            return String::new();
        }
        std::env::var(&self.api_key_env).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceSink {
    /// Emit trace events through `tracing`.
    Log,
    /// Persist trace events to the SQLite `traces` table.
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TracingConfig {
    pub enabled: bool,
    pub sink: TraceSink,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sink: TraceSink::Log,
        }
    }
}

/// Schedule handler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Agents loaded per `agent_cycle` tick.
    pub agent_batch_size: usize,
    pub memory_retention_days: i64,
    /// Baseline restored by `token_reset`.
    pub daily_action_budget: u32,
    /// Baseline restored by `token_reset`.
    pub baseline_heat: f32,
    /// Seconds between daemon ticks.
    pub tick_interval_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            agent_batch_size: 10,
            memory_retention_days: 30,
            daily_action_budget: 20,
            baseline_heat: 0.0,
            tick_interval_secs: 30,
        }
    }
}

/// Default workflow settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub decision_prompt: String,
    pub max_tokens: u32,
    pub max_tool_calls_per_cycle: usize,
    pub memory_window: usize,
    /// Agents at or above this heat skip side-effecting actions.
    pub heat_ceiling: f32,
    /// Heat added per executed action.
    pub heat_per_action: f32,
    /// Fraction of affinity removed per `relationship_sync`.
    pub relationship_decay: f32,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            decision_prompt: "agent.decision".into(),
            max_tokens: 1024,
            max_tool_calls_per_cycle: 5,
            memory_window: 10,
            heat_ceiling: 1.0,
            heat_per_action: 0.1,
            relationship_decay: 0.05,
        }
    }
}

impl OrchestratorConfig {
    /// Resolve a path that may contain `~` to an absolute path.
    pub fn resolve_path(&self, path: &str) -> String {
        shellexpand::tilde(path).into_owned()
    }

    /// Resolved database path.
    pub fn resolved_db_path(&self) -> String {
        self.resolve_path(&self.db_path)
    }

    /// Resolved schedule config path.
    pub fn resolved_schedule_path(&self) -> String {
        self.resolve_path(&self.schedule_config_path)
    }

    /// Look up a provider entry by name.
    pub fn provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.name == name)
    }
}
