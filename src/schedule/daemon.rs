//! Cron-based schedule daemon that invokes the dispatcher on schedule.
//!
//! Reads schedules.yml for entries mapping a cron expression to a schedule
//! kind. Due entries run one after another; every invocation is written to
//! the schedule run log.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use cron::Schedule;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::dispatcher::ScheduleDispatcher;
use crate::state::Database;

/// One line of schedules.yml.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub name: String,
    /// Six-field cron expression (seconds first).
    pub cron: String,
    /// Schedule kind, e.g. `agent_cycle`.
    pub schedule: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Background schedule daemon.
pub struct ScheduleDaemon {
    dispatcher: Arc<ScheduleDispatcher>,
    db: Arc<Mutex<Database>>,
    entries: Vec<ScheduleEntry>,
    last_run: HashMap<String, DateTime<Utc>>,
    tick_interval: std::time::Duration,
}

impl ScheduleDaemon {
    pub fn new(
        dispatcher: Arc<ScheduleDispatcher>,
        db: Arc<Mutex<Database>>,
        entries: Vec<ScheduleEntry>,
        tick_interval_secs: u64,
    ) -> Self {
        info!("Loaded {} schedule entries", entries.len());
        Self {
            dispatcher,
            db,
            entries,
            last_run: HashMap::new(),
            tick_interval: std::time::Duration::from_secs(tick_interval_secs.max(1)),
        }
    }

    pub fn entries(&self) -> &[ScheduleEntry] {
        &self.entries
    }

    /// Run the schedule loop (call from a tokio::spawn).
    ///
    /// The loop exits cooperatively when `cancel` is triggered.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<()> {
        info!("Schedule daemon started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.tick_interval) => {
                    if let Err(e) = self.tick(Utc::now()).await {
                        error!("Schedule tick failed: {e}");
                    }
                }
                _ = cancel.cancelled() => {
                    info!("Schedule daemon shutting down");
                    return Ok(());
                }
            }
        }
    }

    /// Run every entry due at `now`. Returns how many ran.
    ///
    /// A failing schedule is logged and does not stop the others.
    /// Failing to write the run log is propagated.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> Result<usize> {
        let mut ran = 0;

        for entry in &self.entries {
            if !entry.enabled {
                continue;
            }

            let cron = match Schedule::from_str(&entry.cron) {
                Ok(s) => s,
                Err(e) => {
                    warn!("Invalid cron expression '{}' for '{}': {}", entry.cron, entry.name, e);
                    continue;
                }
            };

            let last = self
                .last_run
                .get(&entry.name)
                .copied()
                .unwrap_or(now - chrono::Duration::hours(1));

            let Some(next_run) = cron.after(&last).next() else {
                continue;
            };
            if next_run > now {
                continue;
            }

            debug!("Running schedule entry: {}", entry.name);
            let started_at = Utc::now();
            let result = self.dispatcher.handle_schedule_str(&entry.schedule).await;

            {
                let db = self.db.lock().await;
                let logged = match &result {
                    Ok(report) => db.log_schedule_run(report),
                    Err(e) => db.log_schedule_failure(&entry.schedule, &e.to_string(), started_at),
                };
                logged.context("Failed to log schedule run")?;
            }

            self.last_run.insert(entry.name.clone(), now);
            ran += 1;

            if let Err(e) = result {
                warn!("Schedule entry '{}' failed: {}", entry.name, e);
            }
        }

        Ok(ran)
    }
}

/// Load entries from `path`, or the defaults when the file does not exist.
pub fn load_schedule_entries(path: &Path) -> Result<Vec<ScheduleEntry>> {
    if !path.exists() {
        debug!("No schedule config at {:?}, using defaults", path);
        return Ok(default_schedule_entries());
    }

    let contents = std::fs::read_to_string(path).context("Failed to read schedules.yml")?;
    let entries: Vec<ScheduleEntry> =
        serde_yaml::from_str(&contents).context("Failed to parse schedules.yml")?;

    Ok(entries)
}

/// Write the default entries to `path` unless it already exists.
pub fn write_default_entries(path: &Path) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let yaml = serde_yaml::to_string(&default_schedule_entries())?;
    std::fs::write(path, yaml).context("Failed to write schedules.yml")?;
    Ok(true)
}

pub fn default_schedule_entries() -> Vec<ScheduleEntry> {
    vec![
        ScheduleEntry {
            name: "agent_cycle".into(),
            cron: "0 */5 * * * *".into(), // Every 5 minutes
            schedule: "agent_cycle".into(),
            enabled: true,
        },
        ScheduleEntry {
            name: "relationship_sync".into(),
            cron: "0 0 * * * *".into(), // Hourly
            schedule: "relationship_sync".into(),
            enabled: true,
        },
        ScheduleEntry {
            name: "memory_cleanup".into(),
            cron: "0 30 3 * * *".into(), // Daily 03:30 UTC
            schedule: "memory_cleanup".into(),
            enabled: true,
        },
        ScheduleEntry {
            name: "token_reset".into(),
            cron: "0 0 0 * * *".into(), // Midnight UTC
            schedule: "token_reset".into(),
            enabled: true,
        },
    ]
}
