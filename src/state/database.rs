//! SQLite database wrapper with WAL mode and migration support.

use crate::state::schema;
use crate::types::*;
use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

/// Timestamps are stored as fixed-width RFC 3339 so text comparison orders them.
pub(crate) fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Read a timestamp column; a malformed value is a conversion error, not "now".
fn ts_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// A row of the schedule run log.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleRun {
    pub id: String,
    pub schedule: String,
    pub success: bool,
    pub agents: u32,
    pub failed_agents: u32,
    pub affected: u64,
    pub detail: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// The orchestrator state database.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the database at the given path and run migrations.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path).context("Failed to open SQLite database")?;

        // Enable WAL mode for better concurrency
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let mut db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let mut db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Run schema creation and migrations.
    fn migrate(&mut self) -> Result<()> {
        let version = self.schema_version();

        if version == 0 {
            info!("Creating database schema v{}", schema::SCHEMA_VERSION);
            self.conn
                .execute_batch(schema::CREATE_SCHEMA)
                .context("Failed to create schema")?;
            self.conn.execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                params![schema::SCHEMA_VERSION],
            )?;
        } else {
            if version < 2 {
                info!("Migrating database v1 -> v2");
                self.conn.execute_batch(schema::MIGRATE_V1_TO_V2)?;
            }
            if version < schema::SCHEMA_VERSION {
                self.conn.execute(
                    "UPDATE schema_version SET version = ?1",
                    params![schema::SCHEMA_VERSION],
                )?;
            }
        }

        Ok(())
    }

    /// Get the current schema version (0 if uninitialized).
    fn schema_version(&self) -> u32 {
        self.conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .unwrap_or(0)
    }

    // -----------------------------------------------------------------------
    // Agents
    // -----------------------------------------------------------------------

    /// Insert or replace an agent row.
    pub fn upsert_agent(&self, agent: &AgentRecord) -> Result<()> {
        let personality_json = serde_json::to_string(&agent.personality)?;
        self.conn.execute(
            "INSERT INTO agents (id, name, is_bot, active, community_id, personality_json, morale, heat, daily_actions_remaining)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(id) DO UPDATE SET
                name = ?2, is_bot = ?3, active = ?4, community_id = ?5, personality_json = ?6,
                morale = ?7, heat = ?8, daily_actions_remaining = ?9",
            params![
                agent.id,
                agent.name,
                agent.is_bot as i32,
                agent.active as i32,
                agent.community_id,
                personality_json,
                agent.morale,
                agent.heat,
                agent.daily_actions_remaining,
            ],
        )?;
        Ok(())
    }

    pub fn get_agent(&self, id: &str) -> Result<Option<AgentRecord>> {
        let agent = self
            .conn
            .query_row(
                "SELECT id, name, is_bot, active, community_id, personality_json, morale, heat, daily_actions_remaining
                 FROM agents WHERE id = ?1",
                params![id],
                agent_from_row,
            )
            .optional()?;
        Ok(agent)
    }

    /// Active bot agents, least recently active first.
    pub fn list_active_bots(&self, limit: Option<usize>) -> Result<Vec<AgentRecord>> {
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let mut stmt = self.conn.prepare(
            "SELECT id, name, is_bot, active, community_id, personality_json, morale, heat, daily_actions_remaining
             FROM agents WHERE is_bot = 1 AND active = 1
             ORDER BY COALESCE(last_active_at, ''), id
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], agent_from_row)?;
        let mut agents = Vec::new();
        for row in rows {
            agents.push(row?);
        }
        Ok(agents)
    }

    /// Spend one action and add heat. The budget never goes below zero.
    pub fn consume_action(&self, agent_id: &str, heat_delta: f32) -> Result<()> {
        self.conn.execute(
            "UPDATE agents SET
                daily_actions_remaining = MAX(daily_actions_remaining - 1, 0),
                heat = heat + ?2,
                last_active_at = ?3
             WHERE id = ?1",
            params![agent_id, heat_delta, ts(Utc::now())],
        )?;
        Ok(())
    }

    /// Stamp `last_active_at` for agents a cycle just processed, whatever the outcome.
    pub fn mark_cycled(&self, agent_ids: &[String]) -> Result<u64> {
        let now = ts(Utc::now());
        let mut stmt = self
            .conn
            .prepare("UPDATE agents SET last_active_at = ?2 WHERE id = ?1")?;
        let mut n = 0;
        for id in agent_ids {
            n += stmt.execute(params![id, now])? as u64;
        }
        Ok(n)
    }

    /// Restore every bot's daily budget and heat. Returns rows updated.
    pub fn reset_daily_budgets(&self, budget: u32, heat: f32) -> Result<u64> {
        let n = self.conn.execute(
            "UPDATE agents SET daily_actions_remaining = ?1, heat = ?2 WHERE is_bot = 1",
            params![budget, heat],
        )?;
        Ok(n as u64)
    }

    // -----------------------------------------------------------------------
    // Memories
    // -----------------------------------------------------------------------

    pub fn record_memory(&self, agent_id: &str, content: &str, importance: f32) -> Result<String> {
        self.record_memory_at(agent_id, content, importance, Utc::now())
    }

    pub fn record_memory_at(
        &self,
        agent_id: &str,
        content: &str,
        importance: f32,
        at: DateTime<Utc>,
    ) -> Result<String> {
        let id = ulid::Ulid::new().to_string();
        self.conn.execute(
            "INSERT INTO memories (id, agent_id, content, importance, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, agent_id, content, importance, ts(at)],
        )?;
        Ok(id)
    }

    /// Newest first.
    pub fn recent_memories(&self, agent_id: &str, limit: usize) -> Result<Vec<MemoryRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, agent_id, content, importance, created_at FROM memories
             WHERE agent_id = ?1 ORDER BY created_at DESC, id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![agent_id, limit as i64], |row| {
            Ok(MemoryRecord {
                id: row.get(0)?,
                agent_id: row.get(1)?,
                content: row.get(2)?,
                importance: row.get(3)?,
                created_at: ts_column(row, 4)?,
            })
        })?;
        let mut memories = Vec::new();
        for row in rows {
            memories.push(row?);
        }
        Ok(memories)
    }

    /// Bulk-delete memories created before `cutoff`. Returns rows deleted.
    pub fn delete_memories_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let n = self
            .conn
            .execute("DELETE FROM memories WHERE created_at < ?1", params![ts(cutoff)])?;
        Ok(n as u64)
    }

    pub fn memory_count(&self) -> Result<u64> {
        let count: u64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))?;
        Ok(count)
    }

    // -----------------------------------------------------------------------
    // Relationships
    // -----------------------------------------------------------------------

    pub fn set_relationship(&self, agent_id: &str, other_id: &str, affinity: f32) -> Result<()> {
        self.conn.execute(
            "INSERT INTO relationships (agent_id, other_id, affinity, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(agent_id, other_id) DO UPDATE SET affinity = ?3, updated_at = ?4",
            params![agent_id, other_id, affinity.clamp(-1.0, 1.0), ts(Utc::now())],
        )?;
        Ok(())
    }

    pub fn load_relationships(&self, agent_id: &str) -> Result<HashMap<String, f32>> {
        let mut stmt = self
            .conn
            .prepare("SELECT other_id, affinity FROM relationships WHERE agent_id = ?1")?;
        let rows = stmt.query_map(params![agent_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, f32>(1)?))
        })?;
        let mut map = HashMap::new();
        for row in rows {
            let (other, affinity) = row?;
            map.insert(other, affinity);
        }
        Ok(map)
    }

    /// Pull every affinity of `agent_id` toward zero by `factor`.
    pub fn decay_relationships(&self, agent_id: &str, factor: f32) -> Result<u64> {
        let keep = (1.0 - factor).clamp(0.0, 1.0);
        let n = self.conn.execute(
            "UPDATE relationships SET affinity = affinity * ?2, updated_at = ?3 WHERE agent_id = ?1",
            params![agent_id, keep, ts(Utc::now())],
        )?;
        Ok(n as u64)
    }

    // -----------------------------------------------------------------------
    // Traces
    // -----------------------------------------------------------------------

    pub fn log_trace(&self, kind: &str, key: &str, payload_json: &str) -> Result<()> {
        let id = ulid::Ulid::new().to_string();
        self.conn.execute(
            "INSERT INTO traces (id, kind, key, payload_json) VALUES (?1, ?2, ?3, ?4)",
            params![id, kind, key, payload_json],
        )?;
        Ok(())
    }

    pub fn trace_count(&self, kind: &str) -> Result<u64> {
        let count: u64 = self.conn.query_row(
            "SELECT COUNT(*) FROM traces WHERE kind = ?1",
            params![kind],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // -----------------------------------------------------------------------
    // Schedule runs
    // -----------------------------------------------------------------------

    pub fn log_schedule_run(&self, report: &ScheduleReport) -> Result<()> {
        let id = ulid::Ulid::new().to_string();
        let failures: Vec<String> = report
            .results
            .iter()
            .filter_map(|r| r.error.as_ref().map(|e| format!("{}: {}", r.agent_id, e)))
            .collect();
        let detail = (!failures.is_empty()).then(|| failures.join("\n"));

        self.conn.execute(
            "INSERT INTO schedule_runs (id, schedule, success, agents, failed_agents, affected, detail, started_at, finished_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                id,
                report.schedule.as_str(),
                report.success as i32,
                report.results.len() as i64,
                report.failed_agents() as i64,
                report.affected as i64,
                detail,
                ts(report.started_at),
                ts(report.finished_at),
            ],
        )?;
        Ok(())
    }

    /// Log a schedule invocation that failed as a whole.
    pub fn log_schedule_failure(&self, schedule: &str, error: &str, started_at: DateTime<Utc>) -> Result<()> {
        let id = ulid::Ulid::new().to_string();
        self.conn.execute(
            "INSERT INTO schedule_runs (id, schedule, success, detail, started_at, finished_at)
             VALUES (?1, ?2, 0, ?3, ?4, ?5)",
            params![id, schedule, error, ts(started_at), ts(Utc::now())],
        )?;
        Ok(())
    }

    /// Most recent first.
    pub fn recent_schedule_runs(&self, limit: usize) -> Result<Vec<ScheduleRun>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, schedule, success, agents, failed_agents, affected, detail, started_at, finished_at
             FROM schedule_runs ORDER BY started_at DESC, id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(ScheduleRun {
                id: row.get(0)?,
                schedule: row.get(1)?,
                success: row.get::<_, i32>(2)? != 0,
                agents: row.get(3)?,
                failed_agents: row.get(4)?,
                affected: row.get::<_, i64>(5)? as u64,
                detail: row.get(6)?,
                started_at: ts_column(row, 7)?,
                finished_at: ts_column(row, 8)?,
            })
        })?;
        let mut runs = Vec::new();
        for row in rows {
            runs.push(row?);
        }
        Ok(runs)
    }
}

fn agent_from_row(row: &Row<'_>) -> rusqlite::Result<AgentRecord> {
    let personality_json: String = row.get(5)?;
    Ok(AgentRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        is_bot: row.get::<_, i32>(2)? != 0,
        active: row.get::<_, i32>(3)? != 0,
        community_id: row.get(4)?,
        personality: serde_json::from_str(&personality_json).unwrap_or_default(),
        morale: row.get(6)?,
        heat: row.get(7)?,
        daily_actions_remaining: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn bot(id: &str) -> AgentRecord {
        AgentRecord {
            id: id.into(),
            name: format!("Bot {}", id),
            is_bot: true,
            active: true,
            community_id: None,
            personality: Personality::default(),
            morale: 0.5,
            heat: 0.0,
            daily_actions_remaining: 3,
        }
    }

    #[test]
    fn test_open_memory() {
        let db = Database::open_memory().unwrap();
        assert_eq!(db.schema_version(), schema::SCHEMA_VERSION);
        assert_eq!(db.memory_count().unwrap(), 0);
    }

    #[test]
    fn test_active_bots_skip_humans_and_inactive() {
        let db = Database::open_memory().unwrap();
        db.upsert_agent(&bot("a")).unwrap();
        db.upsert_agent(&bot("b")).unwrap();
        db.upsert_agent(&AgentRecord { is_bot: false, ..bot("human") }).unwrap();
        db.upsert_agent(&AgentRecord { active: false, ..bot("off") }).unwrap();

        let all = db.list_active_bots(None).unwrap();
        assert_eq!(all.iter().map(|a| a.id.as_str()).collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(db.list_active_bots(Some(1)).unwrap().len(), 1);
        assert_eq!(all[0].personality, Personality::default());
    }

    #[test]
    fn test_consume_action_floors_budget() {
        let db = Database::open_memory().unwrap();
        db.upsert_agent(&AgentRecord { daily_actions_remaining: 1, ..bot("a") }).unwrap();

        db.consume_action("a", 0.25).unwrap();
        db.consume_action("a", 0.25).unwrap();

        let a = db.get_agent("a").unwrap().unwrap();
        assert_eq!(a.daily_actions_remaining, 0);
        assert!((a.heat - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_reset_daily_budgets_only_touches_bots() {
        let db = Database::open_memory().unwrap();
        db.upsert_agent(&AgentRecord { daily_actions_remaining: 0, heat: 0.9, ..bot("a") }).unwrap();
        db.upsert_agent(&AgentRecord { is_bot: false, daily_actions_remaining: 0, ..bot("h") }).unwrap();

        assert_eq!(db.reset_daily_budgets(20, 0.0).unwrap(), 1);
        let a = db.get_agent("a").unwrap().unwrap();
        assert_eq!(a.daily_actions_remaining, 20);
        assert_eq!(a.heat, 0.0);
        assert_eq!(db.get_agent("h").unwrap().unwrap().daily_actions_remaining, 0);
    }

    #[test]
    fn test_memory_retention_cutoff() {
        let db = Database::open_memory().unwrap();
        db.upsert_agent(&bot("a")).unwrap();
        let now = Utc::now();
        db.record_memory_at("a", "ancient", 0.5, now - Duration::days(45)).unwrap();
        db.record_memory_at("a", "recent", 0.5, now - Duration::days(2)).unwrap();
        db.record_memory("a", "today", 0.9).unwrap();

        let deleted = db.delete_memories_before(now - Duration::days(30)).unwrap();
        assert_eq!(deleted, 1);

        let left = db.recent_memories("a", 10).unwrap();
        assert_eq!(left.iter().map(|m| m.content.as_str()).collect::<Vec<_>>(), vec!["today", "recent"]);
    }

    #[test]
    fn test_relationship_decay() {
        let db = Database::open_memory().unwrap();
        db.upsert_agent(&bot("a")).unwrap();
        db.set_relationship("a", "b", 0.8).unwrap();
        db.set_relationship("a", "c", -0.4).unwrap();

        assert_eq!(db.decay_relationships("a", 0.5).unwrap(), 2);
        let rel = db.load_relationships("a").unwrap();
        assert!((rel["b"] - 0.4).abs() < 1e-6);
        assert!((rel["c"] + 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_schedule_run_log() {
        let db = Database::open_memory().unwrap();
        let now = Utc::now();
        db.log_schedule_run(&ScheduleReport {
            schedule: ScheduleType::AgentCycle,
            success: true,
            results: vec![
                AgentRunResult {
                    agent_id: "a".into(),
                    success: true,
                    error: None,
                    executed_actions: vec![],
                },
                AgentRunResult {
                    agent_id: "b".into(),
                    success: false,
                    error: Some("provider down".into()),
                    executed_actions: vec![],
                },
            ],
            affected: 0,
            started_at: now,
            finished_at: now,
        })
        .unwrap();
        db.log_schedule_failure("memory_cleanup", "disk full", now + Duration::seconds(1))
            .unwrap();

        let runs = db.recent_schedule_runs(10).unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].schedule, "memory_cleanup");
        assert!(!runs[0].success);
        assert_eq!(runs[1].agents, 2);
        assert_eq!(runs[1].failed_agents, 1);
        assert_eq!(runs[1].detail.as_deref(), Some("b: provider down"));
    }

    #[test]
    fn test_corrupt_timestamp_is_an_error() {
        let db = Database::open_memory().unwrap();
        db.upsert_agent(&bot("a")).unwrap();
        db.conn
            .execute(
                "INSERT INTO memories (id, agent_id, content, importance, created_at)
                 VALUES ('m1', 'a', 'hello', 0.5, 'yesterday-ish')",
                [],
            )
            .unwrap();

        let err = db.recent_memories("a", 5).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<rusqlite::Error>(),
            Some(rusqlite::Error::FromSqlConversionFailure(4, Type::Text, _))
        ));
    }

    #[test]
    fn test_cycled_agents_rotate_to_the_back() {
        let db = Database::open_memory().unwrap();
        for i in 0..12 {
            db.upsert_agent(&bot(&format!("a{:02}", i))).unwrap();
        }

        let ids = |agents: Vec<AgentRecord>| -> Vec<String> { agents.into_iter().map(|a| a.id).collect() };
        let first = ids(db.list_active_bots(Some(10)).unwrap());
        assert_eq!(first.first().map(String::as_str), Some("a00"));
        assert_eq!(db.mark_cycled(&first).unwrap(), 10);

        let second = ids(db.list_active_bots(Some(10)).unwrap());
        assert_eq!(second[..2], ["a10", "a11"]);

        let mut seen: Vec<String> = first.into_iter().chain(second).collect();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 12);
    }
}
