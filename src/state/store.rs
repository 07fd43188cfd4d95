//! Entity-store contract the dispatcher and workflow depend on.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::Database;
use crate::types::{AgentRecord, MemoryRecord};

/// Game-state persistence used by the orchestration core.
#[async_trait]
pub trait AgentStore: Send + Sync {
    /// Active automated agents; `None` means no limit.
    async fn list_active_bots(&self, limit: Option<usize>) -> Result<Vec<AgentRecord>>;

    async fn recent_memories(&self, agent_id: &str, limit: usize) -> Result<Vec<MemoryRecord>>;

    async fn load_relationships(&self, agent_id: &str) -> Result<HashMap<String, f32>>;

    async fn record_memory(&self, agent_id: &str, content: &str, importance: f32) -> Result<()>;

    /// Spend one action from the daily budget and add heat.
    async fn consume_action(&self, agent_id: &str, heat_delta: f32) -> Result<()>;

    /// Stamp agents as just cycled so bounded batches rotate. Returns rows updated.
    async fn mark_cycled(&self, agent_ids: &[String]) -> Result<u64>;

    async fn decay_relationships(&self, agent_id: &str, factor: f32) -> Result<u64>;

    async fn delete_memories_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    async fn reset_daily_budgets(&self, budget: u32, heat: f32) -> Result<u64>;
}

/// [`AgentStore`] over the shared SQLite handle.
#[derive(Clone)]
pub struct SqliteStore {
    db: Arc<Mutex<Database>>,
}

impl SqliteStore {
    pub fn new(db: Arc<Mutex<Database>>) -> Self {
        Self { db }
    }

    pub fn database(&self) -> Arc<Mutex<Database>> {
        self.db.clone()
    }
}

#[async_trait]
impl AgentStore for SqliteStore {
    async fn list_active_bots(&self, limit: Option<usize>) -> Result<Vec<AgentRecord>> {
        self.db.lock().await.list_active_bots(limit)
    }

    async fn recent_memories(&self, agent_id: &str, limit: usize) -> Result<Vec<MemoryRecord>> {
        self.db.lock().await.recent_memories(agent_id, limit)
    }

    async fn load_relationships(&self, agent_id: &str) -> Result<HashMap<String, f32>> {
        self.db.lock().await.load_relationships(agent_id)
    }

    async fn record_memory(&self, agent_id: &str, content: &str, importance: f32) -> Result<()> {
        self.db.lock().await.record_memory(agent_id, content, importance)?;
        Ok(())
    }

    async fn consume_action(&self, agent_id: &str, heat_delta: f32) -> Result<()> {
        self.db.lock().await.consume_action(agent_id, heat_delta)
    }

    async fn mark_cycled(&self, agent_ids: &[String]) -> Result<u64> {
        self.db.lock().await.mark_cycled(agent_ids)
    }

    async fn decay_relationships(&self, agent_id: &str, factor: f32) -> Result<u64> {
        self.db.lock().await.decay_relationships(agent_id, factor)
    }

    async fn delete_memories_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        self.db.lock().await.delete_memories_before(cutoff)
    }

    async fn reset_daily_budgets(&self, budget: u32, heat: f32) -> Result<u64> {
        self.db.lock().await.reset_daily_budgets(budget, heat)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    use crate::types::Personality;

    pub fn bot(id: &str) -> AgentRecord {
        AgentRecord {
            id: id.into(),
            name: format!("Bot {}", id),
            is_bot: true,
            active: true,
            community_id: None,
            personality: Personality::default(),
            morale: 0.5,
            heat: 0.0,
            daily_actions_remaining: 5,
        }
    }

    /// In-memory store that counts every call.
    #[derive(Default)]
    pub struct MemoryStore {
        pub agents: Vec<AgentRecord>,
        pub calls: AtomicUsize,
        pub fail_bulk: bool,
        pub memories: StdMutex<Vec<(String, String)>>,
        pub decayed: StdMutex<Vec<String>>,
        pub list_limits: StdMutex<Vec<Option<usize>>>,
        pub cycled: StdMutex<Vec<String>>,
    }

    impl MemoryStore {
        pub fn with_agents(ids: &[&str]) -> Self {
            Self {
                agents: ids.iter().map(|id| bot(id)).collect(),
                ..Self::default()
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn touch(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl AgentStore for MemoryStore {
        async fn list_active_bots(&self, limit: Option<usize>) -> Result<Vec<AgentRecord>> {
            self.touch();
            self.list_limits.lock().unwrap().push(limit);
            let n = limit.unwrap_or(usize::MAX);
            Ok(self.agents.iter().take(n).cloned().collect())
        }

        async fn recent_memories(&self, _agent_id: &str, _limit: usize) -> Result<Vec<MemoryRecord>> {
            self.touch();
            Ok(Vec::new())
        }

        async fn load_relationships(&self, _agent_id: &str) -> Result<HashMap<String, f32>> {
            self.touch();
            Ok(HashMap::new())
        }

        async fn record_memory(&self, agent_id: &str, content: &str, _importance: f32) -> Result<()> {
            self.touch();
            self.memories
                .lock()
                .unwrap()
                .push((agent_id.to_string(), content.to_string()));
            Ok(())
        }

        async fn consume_action(&self, _agent_id: &str, _heat_delta: f32) -> Result<()> {
            self.touch();
            Ok(())
        }

        async fn mark_cycled(&self, agent_ids: &[String]) -> Result<u64> {
            self.touch();
            self.cycled.lock().unwrap().extend(agent_ids.iter().cloned());
            Ok(agent_ids.len() as u64)
        }

        async fn decay_relationships(&self, agent_id: &str, _factor: f32) -> Result<u64> {
            self.touch();
            self.decayed.lock().unwrap().push(agent_id.to_string());
            Ok(1)
        }

        async fn delete_memories_before(&self, _cutoff: DateTime<Utc>) -> Result<u64> {
            self.touch();
            if self.fail_bulk {
                anyhow::bail!("database is locked");
            }
            Ok(4)
        }

        async fn reset_daily_budgets(&self, _budget: u32, _heat: f32) -> Result<u64> {
            self.touch();
            if self.fail_bulk {
                anyhow::bail!("database is locked");
            }
            Ok(self.agents.len() as u64)
        }
    }
}
