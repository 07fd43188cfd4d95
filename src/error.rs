//! Error taxonomy for the orchestration core.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Completion error: {0}")]
    Completion(#[from] CompletionError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Prompt error: {0}")]
    Prompt(#[from] PromptError),

    #[error("Schedule error: {0}")]
    Schedule(#[from] ScheduleError),
}

/// Completion manager errors.
#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("Provider not found: {0}")]
    ProviderNotFound(String),

    #[error("Provider {0} is not configured (missing credentials or endpoint)")]
    ProviderMisconfigured(String),

    #[error("Completion via {provider} failed after {attempts} attempts: {last_error}")]
    CompletionExhausted {
        provider: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Provider {provider} failed: {reason}")]
    Provider { provider: String, reason: String },
}

/// Tool registry errors. Surfaced to callers only inside a failed `ToolResult`.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool {name} failed: {reason}")]
    ExecutionFailed { name: String, reason: String },
}

/// Prompt catalog errors.
#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    #[error("Prompt not found: {0}")]
    PromptNotFound(String),

    #[error("Invalid prompt definition: {0}")]
    InvalidPromptDefinition(String),

    #[error("Prompt {name} is missing variables: {}", missing.join(", "))]
    MissingVariables { name: String, missing: Vec<String> },
}

/// Schedule dispatcher errors.
#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("Unknown schedule type: {0}")]
    UnknownScheduleType(String),

    #[error("Schedule {schedule} failed: {reason}")]
    HandlerFailed { schedule: String, reason: String },
}
