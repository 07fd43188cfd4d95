//! End-to-end: a fully wired app runs schedules against a real SQLite database.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use orchestrator::completion::CompletionProvider;
use orchestrator::config::{OrchestratorConfig, TraceSink};
use orchestrator::state::Database;
use orchestrator::tools::FnTool;
use orchestrator::types::*;
use orchestrator::App;

/// Replies with the same decision to every request.
struct FixedReply {
    reply: String,
    calls: AtomicU32,
}

impl FixedReply {
    fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            calls: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl CompletionProvider for FixedReply {
    fn name(&self) -> &str {
        "fixed"
    }

    fn is_configured(&self) -> bool {
        true
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            completion: true,
            ..ProviderCapabilities::default()
        }
    }

    async fn complete(&self, _request: &CompletionRequest) -> Result<CompletionResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(CompletionResponse {
            content: self.reply.clone(),
            model: "fixed-1".into(),
            usage: TokenUsage::default(),
            finish_reason: FinishReason::Stop,
        })
    }

    async fn embeddings(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(anyhow!("embeddings not supported"))
    }

    async fn health_check(&self) -> bool {
        true
    }
}

fn bot(id: &str, budget: u32) -> AgentRecord {
    AgentRecord {
        id: id.into(),
        name: format!("Bot {}", id),
        is_bot: true,
        active: true,
        community_id: Some("c1".into()),
        personality: Personality::default(),
        morale: 0.5,
        heat: 0.0,
        daily_actions_remaining: budget,
    }
}

fn config() -> OrchestratorConfig {
    let mut config = OrchestratorConfig::default();
    config.completion.default_provider = "fixed".into();
    config.tracing.sink = TraceSink::Sqlite;
    config
}

fn app(reply: &str, agents: &[AgentRecord]) -> Result<(App, Arc<FixedReply>)> {
    let db = Database::open_memory()?;
    for agent in agents {
        db.upsert_agent(agent)?;
    }
    let provider = FixedReply::new(reply);
    let app = App::with_providers(config(), db, vec![provider.clone()]);
    Ok((app, provider))
}

const RECALL: &str = r#"Thinking it over.
{"action": "reflect", "reasoning": "remember the week", "tool_calls": [{"name": "recall_memories", "input": {"userId": "event.userId"}}]}"#;

#[tokio::test]
async fn agent_cycle_runs_every_active_bot() -> Result<()> {
    let (app, provider) = app(RECALL, &[bot("a1", 3), bot("a2", 3)])?;

    let report = app.dispatcher.handle_schedule(ScheduleType::AgentCycle).await?;

    assert!(report.success);
    assert_eq!(report.results.len(), 2);
    assert_eq!(report.failed_agents(), 0);
    for result in &report.results {
        assert_eq!(result.executed_actions, vec!["recall_memories".to_string()]);
    }
    assert_eq!(provider.calls.load(Ordering::SeqCst), 2);

    let db = app.db.clone();
    {
        let db = db.lock().await;
        let a1 = db.get_agent("a1")?.expect("a1 exists");
        assert_eq!(a1.daily_actions_remaining, 2);
        assert!(a1.heat > 0.0);
        let memories = db.recent_memories("a1", 10)?;
        assert_eq!(memories.len(), 1);
        assert!(memories[0].content.contains("reflect"));
    }

    app.shutdown().await;
    let db = db.lock().await;
    assert_eq!(db.trace_count("tool")?, 2);
    Ok(())
}

#[tokio::test]
async fn unknown_tool_fails_only_that_agent() -> Result<()> {
    let reply = r#"{"action": "post", "tool_calls": [{"name": "create_post", "input": {}}]}"#;
    let (app, _provider) = app(reply, &[bot("a1", 3)])?;

    let report = app.dispatcher.handle_schedule(ScheduleType::AgentCycle).await?;

    // The schedule itself completes; the failure is isolated to the agent.
    assert!(report.success);
    assert_eq!(report.failed_agents(), 1);
    let error = report.results[0].error.as_deref().unwrap_or_default();
    assert!(error.contains("Tool not found: create_post"), "{}", error);

    let db = app.db.lock().await;
    assert_eq!(db.get_agent("a1")?.expect("a1 exists").daily_actions_remaining, 3);
    Ok(())
}

#[tokio::test]
async fn token_reset_restores_budgets() -> Result<()> {
    let (app, _provider) = app(RECALL, &[bot("a1", 0), bot("a2", 1)])?;

    let report = app.dispatcher.handle_schedule_str("token_reset").await?;

    assert!(report.success);
    assert_eq!(report.affected, 2);
    let db = app.db.lock().await;
    assert_eq!(
        db.get_agent("a1")?.expect("a1 exists").daily_actions_remaining,
        app.config.schedule.daily_action_budget
    );
    Ok(())
}

#[tokio::test]
async fn unknown_schedule_is_rejected() -> Result<()> {
    let (app, provider) = app(RECALL, &[bot("a1", 3)])?;

    let err = app.dispatcher.handle_schedule_str("weekly_digest").await.unwrap_err();

    assert!(err.to_string().contains("weekly_digest"));
    assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn panicking_tool_fails_only_that_agent() -> Result<()> {
    let reply = r#"{"action": "poke", "tool_calls": [{"name": "poke", "input": {}}]}"#;
    let (app, _provider) = app(reply, &[bot("a1", 3), bot("a2", 3), bot("a3", 3)])?;
    app.tools.register_tool(Arc::new(FnTool::new(
        "poke",
        "poke the feed",
        ToolCategory::Action,
        json!({}),
        |_input, ctx| async move {
            if ctx.user_id.as_deref() == Some("a2") {
                panic!("feed unavailable for a2");
            }
            Ok(json!({"poked": true}))
        },
    )));

    let dispatcher = app.dispatcher.clone();
    let report = tokio::spawn(async move { dispatcher.handle_schedule(ScheduleType::AgentCycle).await })
        .await
        .expect("agent cycle task does not panic")?;

    assert_eq!(report.results.len(), 3);
    assert_eq!(report.failed_agents(), 1);
    let a2 = report.results.iter().find(|r| r.agent_id == "a2").expect("a2 ran");
    assert!(a2.error.as_deref().unwrap_or_default().contains("feed unavailable for a2"));

    let db = app.db.lock().await;
    assert_eq!(db.get_agent("a3")?.expect("a3 exists").daily_actions_remaining, 2);
    assert_eq!(db.get_agent("a2")?.expect("a2 exists").daily_actions_remaining, 3);
    Ok(())
}

#[tokio::test]
async fn idle_agents_still_rotate_through_bounded_batches() -> Result<()> {
    let reply = r#"{"action": "idle", "reasoning": "nothing worth saying"}"#;
    let agents: Vec<AgentRecord> = (0..12).map(|i| bot(&format!("a{:02}", i), 3)).collect();
    let (app, _provider) = app(reply, &agents)?;
    assert_eq!(app.config.schedule.agent_batch_size, 10);

    let mut seen = BTreeSet::new();
    for _ in 0..2 {
        let report = app.dispatcher.handle_schedule(ScheduleType::AgentCycle).await?;
        assert_eq!(report.results.len(), 10);
        seen.extend(report.results.into_iter().map(|r| r.agent_id));
    }

    assert_eq!(seen.len(), 12, "agents never activated: {:?}", seen);
    Ok(())
}
