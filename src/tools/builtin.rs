//! Read-only tools over the agent store, registered by the app.

use anyhow::{anyhow, Result};
use serde_json::json;
use std::sync::Arc;

use super::context::ToolContext;
use super::registry::ToolRegistry;
use super::traits::FnTool;
use crate::state::AgentStore;
use crate::types::ToolCategory;

fn actor(input: &serde_json::Value, ctx: &ToolContext) -> Result<String> {
    input
        .get("userId")
        .and_then(|v| v.as_str())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .or_else(|| ctx.user_id.clone())
        .ok_or_else(|| anyhow!("no userId given and no acting user in context"))
}

/// Register `recall_memories` and `get_relationships`.
pub fn register_store_tools(registry: &ToolRegistry, store: Arc<dyn AgentStore>) {
    let memories_store = store.clone();
    registry.register_tool(Arc::new(FnTool::new(
        "recall_memories",
        "Recall the acting agent's most recent memories.",
        ToolCategory::Data,
        json!({
            "type": "object",
            "properties": {
                "userId": { "type": "string", "description": "Whose memories (defaults to the acting agent)" },
                "limit": { "type": "integer", "description": "How many to return (default 5)" }
            }
        }),
        move |input, ctx| {
            let store = memories_store.clone();
            async move {
                let agent_id = actor(&input, &ctx)?;
                let limit = input.get("limit").and_then(|v| v.as_u64()).unwrap_or(5) as usize;
                let memories = store.recent_memories(&agent_id, limit).await?;
                let contents: Vec<&str> = memories.iter().map(|m| m.content.as_str()).collect();
                Ok(json!({ "userId": agent_id, "memories": contents }))
            }
        },
    )));

    registry.register_tool(Arc::new(FnTool::new(
        "get_relationships",
        "List how the acting agent feels about others (-1 to 1).",
        ToolCategory::Data,
        json!({
            "type": "object",
            "properties": {
                "userId": { "type": "string", "description": "Whose relationships (defaults to the acting agent)" }
            }
        }),
        move |input, ctx| {
            let store = store.clone();
            async move {
                let agent_id = actor(&input, &ctx)?;
                let relationships = store.load_relationships(&agent_id).await?;
                Ok(json!({ "userId": agent_id, "relationships": relationships }))
            }
        },
    )));
}
