//! Tool trait definition and a closure-backed implementation.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use super::context::ToolContext;
use crate::types::ToolCategory;

/// Declaration of a tool in the function-calling format models understand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// A named handler the registry can execute.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (registry key and function-call name).
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    fn category(&self) -> ToolCategory;

    /// JSON Schema for the tool's input.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Run the tool on already-normalized input.
    async fn execute(&self, input: serde_json::Value, ctx: &ToolContext) -> Result<serde_json::Value>;

    fn declaration(&self) -> FunctionDeclaration {
        FunctionDeclaration {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

pub type BoxedHandlerFuture = Pin<Box<dyn Future<Output = Result<serde_json::Value>> + Send>>;

type Handler = Arc<dyn Fn(serde_json::Value, ToolContext) -> BoxedHandlerFuture + Send + Sync>;

/// A tool whose behaviour is an async closure.
///
/// ```ignore
/// let tool = FnTool::new("get_feed", "Read the feed", ToolCategory::Data, schema, |input, ctx| async move {
///     Ok(json!({"items": []}))
/// });
/// ```
#[derive(Clone)]
pub struct FnTool {
    name: String,
    description: String,
    category: ToolCategory,
    schema: serde_json::Value,
    handler: Handler,
}

impl FnTool {
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        category: ToolCategory,
        schema: serde_json::Value,
        handler: F,
    ) -> Self
    where
        F: Fn(serde_json::Value, ToolContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<serde_json::Value>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            category,
            schema,
            handler: Arc::new(move |input, ctx| -> BoxedHandlerFuture { Box::pin(handler(input, ctx)) }),
        }
    }
}

impl std::fmt::Debug for FnTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnTool")
            .field("name", &self.name)
            .field("category", &self.category)
            .finish()
    }
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn category(&self) -> ToolCategory {
        self.category
    }

    fn parameters_schema(&self) -> serde_json::Value {
        self.schema.clone()
    }

    async fn execute(&self, input: serde_json::Value, ctx: &ToolContext) -> Result<serde_json::Value> {
        (self.handler)(input, ctx.clone()).await
    }
}
