//! Observability tracing for completions and tool executions.
//!
//! Callers never talk to a tracer directly. They push [`TraceEvent`]s onto a
//! [`TraceBus`], and a background task forwards them to the configured
//! [`Tracer`]. A tracer that errors or panics can therefore never change the
//! outcome of the call that produced the event.

pub mod sqlite;

pub use sqlite::SqliteTracer;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::types::{TokenUsage, ToolResult};

/// Opened before each provider attempt.
#[derive(Debug, Clone, Serialize)]
pub struct SpanStart {
    pub span_id: String,
    pub provider: String,
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: Option<f32>,
    pub attempt: u32,
    pub metadata: BTreeMap<String, String>,
    pub started_at: DateTime<Utc>,
}

/// Closes a span with the generation.
#[derive(Debug, Clone, Serialize)]
pub struct SpanEnd {
    pub span_id: String,
    pub model: String,
    pub output: String,
    pub usage: TokenUsage,
    pub elapsed_ms: u64,
}

/// Closes a span with the provider error.
#[derive(Debug, Clone, Serialize)]
pub struct SpanError {
    pub span_id: String,
    pub error: String,
    pub elapsed_ms: u64,
}

/// One tool execution, successful or not.
#[derive(Debug, Clone, Serialize)]
pub struct ToolTrace {
    pub name: String,
    pub input: serde_json::Value,
    pub result: ToolResult,
    pub duration_ms: u64,
    pub success: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TraceEvent {
    SpanStart(SpanStart),
    SpanEnd(SpanEnd),
    SpanError(SpanError),
    Tool(ToolTrace),
}

impl TraceEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SpanStart(_) => "span_start",
            Self::SpanEnd(_) => "span_end",
            Self::SpanError(_) => "span_error",
            Self::Tool(_) => "tool",
        }
    }

    /// Span id, or the tool name for tool events.
    pub fn key(&self) -> &str {
        match self {
            Self::SpanStart(s) => &s.span_id,
            Self::SpanEnd(s) => &s.span_id,
            Self::SpanError(s) => &s.span_id,
            Self::Tool(t) => &t.name,
        }
    }
}

/// Observability backend. Every hook defaults to a no-op.
#[async_trait]
pub trait Tracer: Send + Sync {
    async fn span_start(&self, _span: &SpanStart) -> Result<()> {
        Ok(())
    }

    async fn span_end(&self, _span: &SpanEnd) -> Result<()> {
        Ok(())
    }

    async fn span_error(&self, _span: &SpanError) -> Result<()> {
        Ok(())
    }

    async fn tool_executed(&self, _trace: &ToolTrace) -> Result<()> {
        Ok(())
    }
}

async fn dispatch(tracer: &dyn Tracer, event: &TraceEvent) -> Result<()> {
    match event {
        TraceEvent::SpanStart(s) => tracer.span_start(s).await,
        TraceEvent::SpanEnd(s) => tracer.span_end(s).await,
        TraceEvent::SpanError(s) => tracer.span_error(s).await,
        TraceEvent::Tool(t) => tracer.tool_executed(t).await,
    }
}

/// Fire-and-forget handle for emitting trace events.
///
/// Cloning is cheap. The forwarding task ends once every clone is dropped.
#[derive(Debug, Clone, Default)]
pub struct TraceBus {
    tx: Option<mpsc::UnboundedSender<TraceEvent>>,
}

impl TraceBus {
    /// A bus that drops every event.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Start forwarding events to `tracer` on a background task.
    pub fn spawn(tracer: Arc<dyn Tracer>) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<TraceEvent>();

        let handle = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let kind = event.kind();
                let key = event.key().to_string();
                // Each event runs on its own task so a panicking tracer loses one event, not the bus.
                let tracer = tracer.clone();
                match tokio::spawn(async move { dispatch(tracer.as_ref(), &event).await }).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!("Tracer failed on {} '{}': {}", kind, key, e),
                    Err(e) => warn!("Tracer panicked on {} '{}': {}", kind, key, e),
                }
            }
            debug!("Trace bus closed");
        });

        (Self { tx: Some(tx) }, handle)
    }

    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    /// Queue an event. Never blocks and never fails.
    pub fn emit(&self, event: TraceEvent) {
        if let Some(tx) = &self.tx {
            if tx.send(event).is_err() {
                debug!("Trace event dropped: tracer task is gone");
            }
        }
    }
}

/// Tracer that writes events to the `tracing` log.
#[derive(Debug, Default)]
pub struct LogTracer;

#[async_trait]
impl Tracer for LogTracer {
    async fn span_start(&self, span: &SpanStart) -> Result<()> {
        debug!(
            span = %span.span_id,
            provider = %span.provider,
            model = ?span.model,
            temperature = span.temperature,
            max_tokens = span.max_tokens,
            attempt = span.attempt,
            "generation started"
        );
        Ok(())
    }

    async fn span_end(&self, span: &SpanEnd) -> Result<()> {
        info!(
            span = %span.span_id,
            model = %span.model,
            tokens = span.usage.total_tokens,
            elapsed_ms = span.elapsed_ms,
            "generation finished"
        );
        Ok(())
    }

    async fn span_error(&self, span: &SpanError) -> Result<()> {
        warn!(span = %span.span_id, elapsed_ms = span.elapsed_ms, "generation failed: {}", span.error);
        Ok(())
    }

    async fn tool_executed(&self, trace: &ToolTrace) -> Result<()> {
        debug!(
            tool = %trace.name,
            success = trace.success,
            duration_ms = trace.duration_ms,
            "tool executed"
        );
        Ok(())
    }
}
