//! Composition root: builds every component explicitly and wires them together.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::agent::{DefaultWorkflow, WorkflowEngine};
use crate::completion::{build_provider, CompletionManager, CompletionProvider};
use crate::config::{OrchestratorConfig, TraceSink};
use crate::prompts::PromptCatalog;
use crate::schedule::{builtin_handlers, load_schedule_entries, ScheduleDaemon, ScheduleDispatcher};
use crate::state::{AgentStore, Database, SqliteStore};
use crate::tools::{register_store_tools, ToolRegistry};
use crate::trace::{LogTracer, SqliteTracer, TraceBus, Tracer};

/// A fully wired orchestrator.
///
/// Must be built inside a tokio runtime when tracing is enabled.
pub struct App {
    pub config: OrchestratorConfig,
    pub db: Arc<Mutex<Database>>,
    pub store: Arc<dyn AgentStore>,
    pub completions: Arc<CompletionManager>,
    pub tools: Arc<ToolRegistry>,
    pub prompts: Arc<PromptCatalog>,
    pub workflow: Arc<dyn WorkflowEngine>,
    pub dispatcher: Arc<ScheduleDispatcher>,
    trace_task: Option<JoinHandle<()>>,
}

impl App {
    /// Build from config, creating providers from the `[[providers]]` entries.
    pub fn from_config(config: OrchestratorConfig, db: Database) -> Result<Self> {
        let mut providers = Vec::with_capacity(config.providers.len());
        for entry in &config.providers {
            let provider = build_provider(entry)
                .with_context(|| format!("Failed to build provider '{}'", entry.name))?;
            if !provider.is_configured() {
                warn!("Provider '{}' is not configured; calls to it will fail", entry.name);
            }
            providers.push(provider);
        }
        Ok(Self::with_providers(config, db, providers))
    }

    /// Build with caller-supplied providers.
    pub fn with_providers(
        config: OrchestratorConfig,
        db: Database,
        providers: Vec<Arc<dyn CompletionProvider>>,
    ) -> Self {
        let db = Arc::new(Mutex::new(db));

        let (trace, trace_task) = if config.tracing.enabled {
            let tracer: Arc<dyn Tracer> = match config.tracing.sink {
                TraceSink::Log => Arc::new(LogTracer),
                TraceSink::Sqlite => Arc::new(SqliteTracer::new(db.clone())),
            };
            let (bus, handle) = TraceBus::spawn(tracer);
            (bus, Some(handle))
        } else {
            (TraceBus::disabled(), None)
        };

        let mut completions = CompletionManager::new(&config.completion).with_tracer(trace.clone());
        for provider in providers {
            completions.register_provider(provider);
        }
        let completions = Arc::new(completions);

        let store: Arc<dyn AgentStore> = Arc::new(SqliteStore::new(db.clone()));

        let tools = ToolRegistry::new().with_tracer(trace);
        register_store_tools(&tools, store.clone());
        let tools = Arc::new(tools);

        let prompts = Arc::new(PromptCatalog::with_defaults());

        let workflow: Arc<dyn WorkflowEngine> = Arc::new(DefaultWorkflow::new(
            completions.clone(),
            tools.clone(),
            prompts.clone(),
            store.clone(),
            config.workflow.clone(),
        ));

        let dispatcher = Arc::new(ScheduleDispatcher::with_handlers(builtin_handlers(
            store.clone(),
            workflow.clone(),
            &config.schedule,
        )));

        info!(
            "Orchestrator ready: providers [{}], {} tools, {} prompts",
            completions.provider_names().join(", "),
            tools.len(),
            prompts.len()
        );

        Self {
            config,
            db,
            store,
            completions,
            tools,
            prompts,
            workflow,
            dispatcher,
            trace_task,
        }
    }

    /// A daemon over this app's dispatcher using the configured schedule file.
    pub fn daemon(&self) -> Result<ScheduleDaemon> {
        let path = self.config.resolved_schedule_path();
        let entries = load_schedule_entries(Path::new(&path))?;
        Ok(ScheduleDaemon::new(
            self.dispatcher.clone(),
            self.db.clone(),
            entries,
            self.config.schedule.tick_interval_secs,
        ))
    }

    /// Drop every component and wait briefly for queued trace events to flush.
    pub async fn shutdown(self) {
        let Self {
            trace_task,
            completions,
            tools,
            workflow,
            dispatcher,
            ..
        } = self;
        // The bus closes once the last sender goes away.
        drop((dispatcher, workflow, tools, completions));

        if let Some(handle) = trace_task {
            let flushed = tokio::time::timeout(std::time::Duration::from_secs(5), handle).await;
            if flushed.is_err() {
                warn!("Trace events still pending at shutdown");
            }
        }
    }
}
