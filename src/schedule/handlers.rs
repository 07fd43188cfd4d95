//! Built-in schedule handlers.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::dispatcher::ScheduleHandler;
use crate::agent::WorkflowEngine;
use crate::config::ScheduleConfig;
use crate::state::AgentStore;
use crate::types::*;

/// Drive one workflow execution per agent, in order, isolating failures.
async fn run_agents(
    schedule: ScheduleType,
    agents: Vec<AgentRecord>,
    workflow: &dyn WorkflowEngine,
) -> Vec<AgentRunResult> {
    let mut results = Vec::with_capacity(agents.len());

    for agent in agents {
        let agent_id = agent.id.clone();
        let state = workflow.create_initial_state(TriggerScope::new(schedule, agent));

        let result = match workflow.execute(state).await {
            Ok(outcome) if outcome.errors.is_empty() => AgentRunResult {
                agent_id,
                success: true,
                error: None,
                executed_actions: outcome.executed_actions,
            },
            Ok(outcome) => AgentRunResult {
                agent_id,
                success: false,
                error: Some(outcome.errors.join("; ")),
                executed_actions: outcome.executed_actions,
            },
            Err(e) => AgentRunResult {
                agent_id,
                success: false,
                error: Some(format!("{:#}", e)),
                executed_actions: Vec::new(),
            },
        };

        if let Some(err) = &result.error {
            warn!("{} failed for agent {}: {}", schedule, result.agent_id, err);
        } else {
            debug!("{} done for agent {}", schedule, result.agent_id);
        }
        results.push(result);
    }

    results
}

/// Activates a bounded batch of bot agents.
pub struct AgentCycleHandler {
    store: Arc<dyn AgentStore>,
    workflow: Arc<dyn WorkflowEngine>,
    batch_size: usize,
}

impl AgentCycleHandler {
    pub fn new(store: Arc<dyn AgentStore>, workflow: Arc<dyn WorkflowEngine>, batch_size: usize) -> Self {
        Self {
            store,
            workflow,
            batch_size,
        }
    }
}

#[async_trait]
impl ScheduleHandler for AgentCycleHandler {
    async fn run(&self, schedule: ScheduleType) -> Result<ScheduleReport> {
        let started_at = Utc::now();
        let agents = self
            .store
            .list_active_bots(Some(self.batch_size))
            .await
            .context("loading active agents")?;
        info!("Agent cycle over {} agents", agents.len());

        let results = run_agents(schedule, agents, self.workflow.as_ref()).await;

        // Failing to stamp only skews the next batch; the results stand.
        let cycled: Vec<String> = results.iter().map(|r| r.agent_id.clone()).collect();
        if let Err(e) = self.store.mark_cycled(&cycled).await {
            warn!("Could not mark {} agents as cycled: {:#}", cycled.len(), e);
        }

        Ok(ScheduleReport {
            schedule,
            success: true,
            results,
            affected: 0,
            started_at,
            finished_at: Utc::now(),
        })
    }
}

/// Applies relationship decay to every active bot.
pub struct RelationshipSyncHandler {
    store: Arc<dyn AgentStore>,
    workflow: Arc<dyn WorkflowEngine>,
}

impl RelationshipSyncHandler {
    pub fn new(store: Arc<dyn AgentStore>, workflow: Arc<dyn WorkflowEngine>) -> Self {
        Self { store, workflow }
    }
}

#[async_trait]
impl ScheduleHandler for RelationshipSyncHandler {
    async fn run(&self, schedule: ScheduleType) -> Result<ScheduleReport> {
        let started_at = Utc::now();
        let agents = self
            .store
            .list_active_bots(None)
            .await
            .context("loading active agents")?;
        info!("Relationship sync over {} agents", agents.len());

        let results = run_agents(schedule, agents, self.workflow.as_ref()).await;

        Ok(ScheduleReport {
            schedule,
            success: true,
            results,
            affected: 0,
            started_at,
            finished_at: Utc::now(),
        })
    }
}

/// Deletes memories past the retention window in one bulk operation.
pub struct MemoryCleanupHandler {
    store: Arc<dyn AgentStore>,
    retention_days: i64,
}

impl MemoryCleanupHandler {
    pub fn new(store: Arc<dyn AgentStore>, retention_days: i64) -> Self {
        Self {
            store,
            retention_days,
        }
    }
}

#[async_trait]
impl ScheduleHandler for MemoryCleanupHandler {
    async fn run(&self, schedule: ScheduleType) -> Result<ScheduleReport> {
        let started_at = Utc::now();
        let cutoff = started_at - Duration::days(self.retention_days);
        let deleted = self
            .store
            .delete_memories_before(cutoff)
            .await
            .context("deleting old memories")?;
        info!("Deleted {} memories older than {} days", deleted, self.retention_days);

        Ok(ScheduleReport {
            schedule,
            success: true,
            results: Vec::new(),
            affected: deleted,
            started_at,
            finished_at: Utc::now(),
        })
    }
}

/// Restores every bot's daily action budget and heat.
pub struct TokenResetHandler {
    store: Arc<dyn AgentStore>,
    budget: u32,
    heat: f32,
}

impl TokenResetHandler {
    pub fn new(store: Arc<dyn AgentStore>, budget: u32, heat: f32) -> Self {
        Self { store, budget, heat }
    }
}

#[async_trait]
impl ScheduleHandler for TokenResetHandler {
    async fn run(&self, schedule: ScheduleType) -> Result<ScheduleReport> {
        let started_at = Utc::now();
        let updated = self
            .store
            .reset_daily_budgets(self.budget, self.heat)
            .await
            .context("resetting daily budgets")?;
        info!("Reset daily budget to {} for {} agents", self.budget, updated);

        Ok(ScheduleReport {
            schedule,
            success: true,
            results: Vec::new(),
            affected: updated,
            started_at,
            finished_at: Utc::now(),
        })
    }
}

/// The four built-in handlers keyed by schedule kind.
pub fn builtin_handlers(
    store: Arc<dyn AgentStore>,
    workflow: Arc<dyn WorkflowEngine>,
    config: &ScheduleConfig,
) -> HashMap<ScheduleType, Arc<dyn ScheduleHandler>> {
    let mut handlers: HashMap<ScheduleType, Arc<dyn ScheduleHandler>> = HashMap::new();
    handlers.insert(
        ScheduleType::AgentCycle,
        Arc::new(AgentCycleHandler::new(
            store.clone(),
            workflow.clone(),
            config.agent_batch_size,
        )),
    );
    handlers.insert(
        ScheduleType::RelationshipSync,
        Arc::new(RelationshipSyncHandler::new(store.clone(), workflow)),
    );
    handlers.insert(
        ScheduleType::MemoryCleanup,
        Arc::new(MemoryCleanupHandler::new(store.clone(), config.memory_retention_days)),
    );
    handlers.insert(
        ScheduleType::TokenReset,
        Arc::new(TokenResetHandler::new(
            store,
            config.daily_action_budget,
            config.baseline_heat,
        )),
    );
    handlers
}
