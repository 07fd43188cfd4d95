//! Shared types used across the orchestration core.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ScheduleError;

// ---------------------------------------------------------------------------
// Completion types
// ---------------------------------------------------------------------------

/// A chat message in a completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

impl fmt::Display for ChatRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::Tool => write!(f, "tool"),
        }
    }
}

/// A request for one completion.
///
/// Built once with the `with_*` helpers and then only passed by reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    /// Overrides the provider's default model when set.
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: Option<f32>,
    /// Free-form tags forwarded to the tracer.
    pub metadata: BTreeMap<String, String>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            model: None,
            temperature: 0.7,
            max_tokens: 1024,
            top_p: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Why the provider stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    Unknown,
}

impl FinishReason {
    /// Map a provider's finish-reason string.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("stop") => Self::Stop,
            Some("length") => Self::Length,
            Some("tool_calls") | Some("function_call") => Self::ToolCalls,
            Some("content_filter") => Self::ContentFilter,
            _ => Self::Unknown,
        }
    }
}

/// Token usage from a completion call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Response produced by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub content: String,
    /// Model that actually served the request.
    pub model: String,
    pub usage: TokenUsage,
    pub finish_reason: FinishReason,
}

/// What a provider says it can do.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderCapabilities {
    pub completion: bool,
    pub embeddings: bool,
    pub function_calling: bool,
    pub streaming: bool,
    pub max_context_tokens: Option<u32>,
    pub models: Vec<String>,
}

// ---------------------------------------------------------------------------
// Tool types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    /// Reads game state.
    Data,
    /// Changes game state.
    Action,
    /// Pure computation over inputs.
    Reasoning,
}

impl fmt::Display for ToolCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Data => write!(f, "data"),
            Self::Action => write!(f, "action"),
            Self::Reasoning => write!(f, "reasoning"),
        }
    }
}

/// A tool call requested by the model or a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default, alias = "arguments", alias = "args")]
    pub input: serde_json::Value,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, input: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            input,
        }
    }
}

/// Outcome of a single tool execution: data on success, a message on failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolOutcome {
    Success(serde_json::Value),
    Failure(String),
}

/// Result of executing a tool. Never an error at the registry boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool: String,
    pub outcome: ToolOutcome,
    #[serde(with = "duration_ms")]
    pub duration: Duration,
}

impl ToolResult {
    pub fn success(tool: impl Into<String>, data: serde_json::Value, duration: Duration) -> Self {
        Self {
            tool: tool.into(),
            outcome: ToolOutcome::Success(data),
            duration,
        }
    }

    pub fn failure(tool: impl Into<String>, error: impl Into<String>, duration: Duration) -> Self {
        Self {
            tool: tool.into(),
            outcome: ToolOutcome::Failure(error.into()),
            duration,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ToolOutcome::Success(_))
    }

    pub fn data(&self) -> Option<&serde_json::Value> {
        match &self.outcome {
            ToolOutcome::Success(data) => Some(data),
            ToolOutcome::Failure(_) => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            ToolOutcome::Success(_) => None,
            ToolOutcome::Failure(e) => Some(e),
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

// ---------------------------------------------------------------------------
// Schedules
// ---------------------------------------------------------------------------

/// The fixed set of recurring trigger kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleType {
    AgentCycle,
    RelationshipSync,
    MemoryCleanup,
    TokenReset,
}

impl ScheduleType {
    pub const ALL: [ScheduleType; 4] = [
        Self::AgentCycle,
        Self::RelationshipSync,
        Self::MemoryCleanup,
        Self::TokenReset,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AgentCycle => "agent_cycle",
            Self::RelationshipSync => "relationship_sync",
            Self::MemoryCleanup => "memory_cleanup",
            Self::TokenReset => "token_reset",
        }
    }
}

impl fmt::Display for ScheduleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScheduleType {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ScheduleError::UnknownScheduleType(s.to_string()))
    }
}

/// Per-agent result inside a schedule report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRunResult {
    pub agent_id: String,
    pub success: bool,
    pub error: Option<String>,
    pub executed_actions: Vec<String>,
}

/// Aggregate result of one schedule invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleReport {
    pub schedule: ScheduleType,
    /// True when the batch itself completed; per-agent failures live in `results`.
    pub success: bool,
    pub results: Vec<AgentRunResult>,
    /// Rows touched by bulk operations.
    pub affected: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ScheduleReport {
    pub fn failed_agents(&self) -> usize {
        self.results.iter().filter(|r| !r.success).count()
    }
}

// ---------------------------------------------------------------------------
// Agents
// ---------------------------------------------------------------------------

/// Personality vector (five-factor model, each in 0.0..=1.0).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Personality {
    pub openness: f32,
    pub conscientiousness: f32,
    pub extraversion: f32,
    pub agreeableness: f32,
    pub neuroticism: f32,
}

impl Default for Personality {
    fn default() -> Self {
        Self {
            openness: 0.5,
            conscientiousness: 0.5,
            extraversion: 0.5,
            agreeableness: 0.5,
            neuroticism: 0.5,
        }
    }
}

impl fmt::Display for Personality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "openness={:.2}, conscientiousness={:.2}, extraversion={:.2}, agreeableness={:.2}, neuroticism={:.2}",
            self.openness, self.conscientiousness, self.extraversion, self.agreeableness, self.neuroticism
        )
    }
}

/// An agent row as held by the entity store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: String,
    pub name: String,
    pub is_bot: bool,
    pub active: bool,
    pub community_id: Option<String>,
    pub personality: Personality,
    pub morale: f32,
    /// Anti-spam cooldown signal; rises with each action.
    pub heat: f32,
    pub daily_actions_remaining: u32,
}

/// What started a workflow execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerScope {
    pub schedule: ScheduleType,
    pub triggered_at: DateTime<Utc>,
    pub actor: AgentRecord,
}

impl TriggerScope {
    pub fn new(schedule: ScheduleType, actor: AgentRecord) -> Self {
        Self {
            schedule,
            triggered_at: Utc::now(),
            actor,
        }
    }
}

/// A remembered fact or event for an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: String,
    pub agent_id: String,
    pub content: String,
    pub importance: f32,
    pub created_at: DateTime<Utc>,
}

/// The action an agent settled on for this cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub action: String,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default, alias = "tools")]
    pub tool_calls: Vec<ToolCall>,
}

impl Decision {
    pub fn idle(reasoning: impl Into<String>) -> Self {
        Self {
            action: "idle".into(),
            reasoning: reasoning.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn is_idle(&self) -> bool {
        self.tool_calls.is_empty()
    }
}

/// Working state of one agent for one cycle. Discarded after the cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    pub scope: TriggerScope,
    pub agent: AgentRecord,
    /// Counterpart id -> affinity in -1.0..=1.0.
    pub relationships: HashMap<String, f32>,
    pub perception: Option<String>,
    pub memories: Vec<MemoryRecord>,
    pub reasoning: Option<String>,
    pub decision: Option<Decision>,
    pub results: Vec<ToolResult>,
    pub errors: Vec<String>,
}

impl AgentState {
    pub fn new(scope: TriggerScope) -> Self {
        let agent = scope.actor.clone();
        Self {
            scope,
            agent,
            relationships: HashMap::new(),
            perception: None,
            memories: Vec::new(),
            reasoning: None,
            decision: None,
            results: Vec::new(),
            errors: Vec::new(),
        }
    }
}

/// What a workflow execution reports back to the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowOutcome {
    pub agent_id: String,
    pub errors: Vec<String>,
    pub executed_actions: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}
