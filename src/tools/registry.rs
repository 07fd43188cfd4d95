//! Named tool catalog with normalized, traced execution.

use anyhow::anyhow;
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::time::Instant;
use tracing::{debug, warn};

use super::context::ToolContext;
use super::normalize::normalize_input;
use super::traits::{FunctionDeclaration, Tool};
use crate::error::ToolError;
use crate::trace::{ToolTrace, TraceBus, TraceEvent};
use crate::types::{ToolCall, ToolCategory, ToolResult};

/// Which tools to expose as function declarations.
#[derive(Debug, Clone, Default)]
pub struct ToolFilter {
    /// Only these categories, when set.
    pub categories: Option<Vec<ToolCategory>>,
    /// Only these names, when set.
    pub names: Option<Vec<String>>,
}

impl ToolFilter {
    pub fn categories(categories: &[ToolCategory]) -> Self {
        Self {
            categories: Some(categories.to_vec()),
            names: None,
        }
    }

    pub fn names<S: AsRef<str>>(names: &[S]) -> Self {
        Self {
            categories: None,
            names: Some(names.iter().map(|n| n.as_ref().to_string()).collect()),
        }
    }

    fn allows(&self, tool: &dyn Tool) -> bool {
        let category_ok = self
            .categories
            .as_ref()
            .map_or(true, |cats| cats.contains(&tool.category()));
        let name_ok = self
            .names
            .as_ref()
            .map_or(true, |names| names.iter().any(|n| n == tool.name()));
        category_ok && name_ok
    }
}

/// Catalog of tools keyed by name.
///
/// Locks are only held for map access; handlers run on an `Arc` snapshot.
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
    trace: TraceBus,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tracer(mut self, trace: TraceBus) -> Self {
        self.trace = trace;
        self
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<dyn Tool>>> {
        self.tools.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<dyn Tool>>> {
        self.tools.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a tool, replacing any tool with the same name.
    pub fn register_tool(&self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.write().insert(name.clone(), tool).is_some() {
            debug!("Replaced tool: {}", name);
        } else {
            debug!("Registered tool: {}", name);
        }
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.write().remove(name).is_some()
    }

    pub fn get_tool(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.read().get(name).cloned()
    }

    /// Tools in `category`, sorted by name.
    pub fn tools_by_category(&self, category: ToolCategory) -> Vec<Arc<dyn Tool>> {
        let mut tools: Vec<Arc<dyn Tool>> = self
            .read()
            .values()
            .filter(|t| t.category() == category)
            .cloned()
            .collect();
        tools.sort_by(|a, b| a.name().cmp(b.name()));
        tools
    }

    /// The catalog in function-calling form, sorted by name.
    pub fn function_declarations(&self, filter: Option<&ToolFilter>) -> Vec<FunctionDeclaration> {
        let mut decls: Vec<FunctionDeclaration> = self
            .read()
            .values()
            .filter(|t| filter.map_or(true, |f| f.allows(t.as_ref())))
            .map(|t| t.declaration())
            .collect();
        decls.sort_by(|a, b| a.name.cmp(&b.name));
        decls
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Drop every registered tool.
    pub fn reset(&self) {
        self.write().clear();
    }

    /// Execute one tool. Failures come back inside the result, never as `Err`.
    pub async fn execute_tool(
        &self,
        name: &str,
        input: Value,
        ctx: &ToolContext,
    ) -> ToolResult {
        let started = Instant::now();
        let input = normalize_input(name, input, ctx);

        let result = match self.get_tool(name) {
            None => {
                warn!("Unknown tool requested: {}", name);
                let err = ToolError::NotFound(name.to_string());
                ToolResult::failure(name, err.to_string(), started.elapsed())
            }
            Some(tool) => match run_isolated(tool, input.clone(), ctx).await {
                Ok(data) => ToolResult::success(name, data, started.elapsed()),
                Err(e) => {
                    let err = ToolError::ExecutionFailed {
                        name: name.to_string(),
                        reason: format!("{:#}", e),
                    };
                    warn!("{}", err);
                    ToolResult::failure(name, err.to_string(), started.elapsed())
                }
            },
        };

        self.trace.emit(TraceEvent::Tool(ToolTrace {
            name: name.to_string(),
            input,
            result: result.clone(),
            duration_ms: result.duration.as_millis() as u64,
            success: result.is_success(),
        }));

        result
    }

    /// Run `calls` in order, stopping after the first failure.
    pub async fn execute_tool_chain(&self, calls: &[ToolCall], ctx: &ToolContext) -> Vec<ToolResult> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            let result = self.execute_tool(&call.name, call.input.clone(), ctx).await;
            let failed = !result.is_success();
            results.push(result);
            if failed {
                debug!(
                    "Tool chain stopped at {} ({} of {})",
                    call.name,
                    results.len(),
                    calls.len()
                );
                break;
            }
        }
        results
    }
}

/// Run a handler on its own task so a panic comes back as an error instead of unwinding the caller.
async fn run_isolated(tool: Arc<dyn Tool>, input: Value, ctx: &ToolContext) -> anyhow::Result<Value> {
    let ctx = ctx.clone();
    match tokio::spawn(async move { tool.execute(input, &ctx).await }).await {
        Ok(result) => result,
        Err(join) if join.is_panic() => Err(anyhow!("handler panicked: {}", panic_message(join.into_panic()))),
        Err(join) => Err(anyhow!("handler aborted: {}", join)),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(msg) => *msg,
        Err(payload) => payload
            .downcast_ref::<&'static str>()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "non-string panic payload".to_string()),
    }
}
