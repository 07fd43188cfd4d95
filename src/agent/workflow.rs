//! Single-agent decision pipeline driven once per agent per schedule tick.
//!
//! For `agent_cycle`: perceive, retrieve memories and relationships, reason
//! through the completion manager, decide, execute the chosen tool chain.
//! For `relationship_sync`: decay the agent's relationships.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::context;
use super::decision;
use crate::completion::CompletionManager;
use crate::config::WorkflowConfig;
use crate::prompts::PromptCatalog;
use crate::state::AgentStore;
use crate::tools::{ToolContext, ToolRegistry};
use crate::types::*;

/// The workflow contract the schedule dispatcher drives.
#[async_trait]
pub trait WorkflowEngine: Send + Sync {
    fn create_initial_state(&self, scope: TriggerScope) -> AgentState {
        AgentState::new(scope)
    }

    /// Run one cycle. `Err` means the cycle itself broke; recoverable
    /// problems are reported in `WorkflowOutcome::errors`.
    async fn execute(&self, state: AgentState) -> Result<WorkflowOutcome>;
}

pub struct DefaultWorkflow {
    completions: Arc<CompletionManager>,
    tools: Arc<ToolRegistry>,
    prompts: Arc<PromptCatalog>,
    store: Arc<dyn AgentStore>,
    config: WorkflowConfig,
    provider: Option<String>,
}

impl DefaultWorkflow {
    pub fn new(
        completions: Arc<CompletionManager>,
        tools: Arc<ToolRegistry>,
        prompts: Arc<PromptCatalog>,
        store: Arc<dyn AgentStore>,
        config: WorkflowConfig,
    ) -> Self {
        Self {
            completions,
            tools,
            prompts,
            store,
            config,
            provider: None,
        }
    }

    /// Reason through a specific provider instead of the manager's default.
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    async fn retrieve(&self, state: &mut AgentState) -> Result<()> {
        let id = &state.agent.id;
        state.memories = self
            .store
            .recent_memories(id, self.config.memory_window)
            .await
            .context("loading memories")?;
        state.relationships = self
            .store
            .load_relationships(id)
            .await
            .context("loading relationships")?;
        Ok(())
    }

    async fn reason(&self, state: &mut AgentState) -> Result<()> {
        let declarations = self.tools.function_declarations(None);
        let built = self
            .prompts
            .build(&self.config.decision_prompt, &context::decision_vars(state, &declarations))?;

        let request = CompletionRequest::new(vec![ChatMessage::user(built.prompt)])
            .with_model(built.model)
            .with_temperature(built.temperature)
            .with_max_tokens(self.config.max_tokens)
            .with_tag("agent_id", state.agent.id.clone())
            .with_tag("schedule", state.scope.schedule.as_str());

        let response = self
            .completions
            .complete(&request, self.provider.as_deref())
            .await?;
        state.reasoning = Some(response.content.clone());
        Ok(())
    }

    /// Whether the agent may take side-effecting actions right now.
    fn may_act(&self, agent: &AgentRecord) -> bool {
        agent.daily_actions_remaining > 0 && agent.heat < self.config.heat_ceiling
    }

    async fn act(&self, state: &mut AgentState, outcome: &mut WorkflowOutcome) -> Result<()> {
        let Some(decision) = state.decision.clone() else {
            return Ok(());
        };
        if decision.is_idle() {
            debug!("{} stays idle: {}", state.agent.id, decision.reasoning);
            return Ok(());
        }
        if !self.may_act(&state.agent) {
            info!(
                "{} wanted to {} but is out of budget or too hot (budget {}, heat {:.2})",
                state.agent.id, decision.action, state.agent.daily_actions_remaining, state.agent.heat
            );
            return Ok(());
        }

        let limit = self
            .config
            .max_tool_calls_per_cycle
            .min(state.agent.daily_actions_remaining as usize);
        let calls = &decision.tool_calls[..decision.tool_calls.len().min(limit)];
        if calls.len() < decision.tool_calls.len() {
            debug!("{}: capped tool chain at {} calls", state.agent.id, calls.len());
        }

        let mut ctx = ToolContext::for_actor(state.agent.id.clone())
            .with_session(format!("{}:{}", state.scope.schedule, state.scope.triggered_at.timestamp()));
        if let Some(community) = &state.agent.community_id {
            ctx = ctx.with_community(community.clone());
        }

        state.results = self.tools.execute_tool_chain(calls, &ctx).await;

        for result in &state.results {
            match result.error() {
                None => {
                    outcome.executed_actions.push(result.tool.clone());
                    self.store
                        .consume_action(&state.agent.id, self.config.heat_per_action)
                        .await
                        .context("consuming action budget")?;
                }
                Some(err) => state.errors.push(format!("tool {}: {}", result.tool, err)),
            }
        }

        let memory = if outcome.executed_actions.is_empty() {
            format!("Tried to {} but it failed ({})", decision.action, decision.reasoning)
        } else {
            format!(
                "Did {} via {} ({})",
                decision.action,
                outcome.executed_actions.join(", "),
                decision.reasoning
            )
        };
        self.store
            .record_memory(&state.agent.id, &memory, 0.5)
            .await
            .context("recording memory")?;
        Ok(())
    }

    async fn run_cycle(&self, state: &mut AgentState, outcome: &mut WorkflowOutcome) -> Result<()> {
        state.perception = Some(context::perceive(state));
        self.retrieve(state).await?;
        self.reason(state).await?;

        let decision = decision::decide(state.reasoning.as_deref().unwrap_or_default());
        debug!("{} decided: {} ({} calls)", state.agent.id, decision.action, decision.tool_calls.len());
        state.decision = Some(decision);

        self.act(state, outcome).await
    }
}

#[async_trait]
impl WorkflowEngine for DefaultWorkflow {
    async fn execute(&self, mut state: AgentState) -> Result<WorkflowOutcome> {
        let mut outcome = WorkflowOutcome {
            agent_id: state.agent.id.clone(),
            errors: Vec::new(),
            executed_actions: Vec::new(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
        };

        match state.scope.schedule {
            ScheduleType::AgentCycle => self.run_cycle(&mut state, &mut outcome).await?,
            ScheduleType::RelationshipSync => {
                let n = self
                    .store
                    .decay_relationships(&state.agent.id, self.config.relationship_decay)
                    .await?;
                debug!("Decayed {} relationships for {}", n, state.agent.id);
            }
            other => warn!("Workflow has nothing to do for {}", other),
        }

        outcome.errors = state.errors;
        outcome.finished_at = Utc::now();
        Ok(outcome)
    }
}
