//! Tracer that persists events to the state database.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::{SpanEnd, SpanError, SpanStart, ToolTrace, TraceEvent, Tracer};
use crate::state::Database;

pub struct SqliteTracer {
    db: Arc<Mutex<Database>>,
}

impl SqliteTracer {
    pub fn new(db: Arc<Mutex<Database>>) -> Self {
        Self { db }
    }

    async fn persist(&self, event: TraceEvent) -> Result<()> {
        let payload = serde_json::to_string(&event)?;
        let db = self.db.lock().await;
        db.log_trace(event.kind(), event.key(), &payload)
    }
}

#[async_trait]
impl Tracer for SqliteTracer {
    async fn span_start(&self, span: &SpanStart) -> Result<()> {
        self.persist(TraceEvent::SpanStart(span.clone())).await
    }

    async fn span_end(&self, span: &SpanEnd) -> Result<()> {
        self.persist(TraceEvent::SpanEnd(span.clone())).await
    }

    async fn span_error(&self, span: &SpanError) -> Result<()> {
        self.persist(TraceEvent::SpanError(span.clone())).await
    }

    async fn tool_executed(&self, trace: &ToolTrace) -> Result<()> {
        self.persist(TraceEvent::Tool(trace.clone())).await
    }
}
