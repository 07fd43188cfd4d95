//! Database schema definitions and migrations.

/// Current schema version.
pub const SCHEMA_VERSION: u32 = 2;

/// Full DDL for the orchestrator state database.
pub const CREATE_SCHEMA: &str = r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);

-- Simulated community members (bots and humans)
CREATE TABLE IF NOT EXISTS agents (
    id                      TEXT PRIMARY KEY,
    name                    TEXT NOT NULL,
    is_bot                  INTEGER NOT NULL DEFAULT 1,
    active                  INTEGER NOT NULL DEFAULT 1,
    community_id            TEXT,
    personality_json        TEXT NOT NULL DEFAULT '{}',
    morale                  REAL NOT NULL DEFAULT 0.5,
    heat                    REAL NOT NULL DEFAULT 0.0,
    daily_actions_remaining INTEGER NOT NULL DEFAULT 0,
    last_active_at          TEXT,
    created_at              TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

-- Agent memories
CREATE TABLE IF NOT EXISTS memories (
    id          TEXT PRIMARY KEY,
    agent_id    TEXT NOT NULL REFERENCES agents(id),
    content     TEXT NOT NULL,
    importance  REAL NOT NULL DEFAULT 0.5,
    created_at  TEXT NOT NULL
);

-- Directed affinity between two agents, -1.0..=1.0
CREATE TABLE IF NOT EXISTS relationships (
    agent_id    TEXT NOT NULL REFERENCES agents(id),
    other_id    TEXT NOT NULL,
    affinity    REAL NOT NULL DEFAULT 0.0,
    updated_at  TEXT NOT NULL,
    PRIMARY KEY (agent_id, other_id)
);

-- Observability events (generation spans, tool executions)
CREATE TABLE IF NOT EXISTS traces (
    id           TEXT PRIMARY KEY,
    kind         TEXT NOT NULL,
    key          TEXT NOT NULL,
    payload_json TEXT NOT NULL,
    created_at   TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

-- Schedule invocations
CREATE TABLE IF NOT EXISTS schedule_runs (
    id            TEXT PRIMARY KEY,
    schedule      TEXT NOT NULL,
    success       INTEGER NOT NULL,
    agents        INTEGER NOT NULL DEFAULT 0,
    failed_agents INTEGER NOT NULL DEFAULT 0,
    affected      INTEGER NOT NULL DEFAULT 0,
    detail        TEXT,
    started_at    TEXT NOT NULL,
    finished_at   TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_agents_active_bots ON agents(is_bot, active);
CREATE INDEX IF NOT EXISTS idx_memories_agent ON memories(agent_id, created_at);
CREATE INDEX IF NOT EXISTS idx_memories_created ON memories(created_at);
CREATE INDEX IF NOT EXISTS idx_traces_kind ON traces(kind);
CREATE INDEX IF NOT EXISTS idx_schedule_runs_started ON schedule_runs(started_at);
"#;

/// v1 -> v2: community membership and the schedule run log.
pub const MIGRATE_V1_TO_V2: &str = r#"
ALTER TABLE agents ADD COLUMN community_id TEXT;

CREATE TABLE IF NOT EXISTS schedule_runs (
    id            TEXT PRIMARY KEY,
    schedule      TEXT NOT NULL,
    success       INTEGER NOT NULL,
    agents        INTEGER NOT NULL DEFAULT 0,
    failed_agents INTEGER NOT NULL DEFAULT 0,
    affected      INTEGER NOT NULL DEFAULT 0,
    detail        TEXT,
    started_at    TEXT NOT NULL,
    finished_at   TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_schedule_runs_started ON schedule_runs(started_at);
"#;
