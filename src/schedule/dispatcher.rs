//! Maps schedule kinds to handlers and runs them.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{error, info};

use crate::error::ScheduleError;
use crate::types::{ScheduleReport, ScheduleType};

/// Work done for one schedule kind.
#[async_trait]
pub trait ScheduleHandler: Send + Sync {
    async fn run(&self, schedule: ScheduleType) -> Result<ScheduleReport>;
}

type HandlerTable = HashMap<ScheduleType, Arc<dyn ScheduleHandler>>;

/// Dispatch table from [`ScheduleType`] to handler.
///
/// Handlers can be swapped at runtime; [`reset_handlers`](Self::reset_handlers)
/// restores the set the dispatcher was built with.
#[derive(Default)]
pub struct ScheduleDispatcher {
    handlers: RwLock<HandlerTable>,
    builtin: HandlerTable,
}

impl ScheduleDispatcher {
    /// A dispatcher with no handlers.
    pub fn new() -> Self {
        Self::default()
    }

    /// A dispatcher whose built-in table is `handlers`.
    pub fn with_handlers(handlers: HandlerTable) -> Self {
        Self {
            handlers: RwLock::new(handlers.clone()),
            builtin: handlers,
        }
    }

    pub fn register_handler(&self, schedule: ScheduleType, handler: Arc<dyn ScheduleHandler>) {
        self.handlers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(schedule, handler);
    }

    pub fn remove_handler(&self, schedule: ScheduleType) -> bool {
        self.handlers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&schedule)
            .is_some()
    }

    /// Restore the built-in handler table.
    pub fn reset_handlers(&self) {
        *self.handlers.write().unwrap_or_else(|e| e.into_inner()) = self.builtin.clone();
    }

    pub fn has_handler(&self, schedule: ScheduleType) -> bool {
        self.handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&schedule)
    }

    fn handler(&self, schedule: ScheduleType) -> Option<Arc<dyn ScheduleHandler>> {
        self.handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&schedule)
            .cloned()
    }

    pub async fn handle_schedule(&self, schedule: ScheduleType) -> Result<ScheduleReport, ScheduleError> {
        let handler = self
            .handler(schedule)
            .ok_or_else(|| ScheduleError::UnknownScheduleType(schedule.to_string()))?;

        info!("Running schedule {}", schedule);
        match handler.run(schedule).await {
            Ok(report) => {
                info!(
                    "Schedule {} finished: {} agents, {} failed, {} rows affected",
                    schedule,
                    report.results.len(),
                    report.failed_agents(),
                    report.affected
                );
                Ok(report)
            }
            Err(e) => {
                error!("Schedule {} failed: {:#}", schedule, e);
                Err(ScheduleError::HandlerFailed {
                    schedule: schedule.to_string(),
                    reason: format!("{:#}", e),
                })
            }
        }
    }

    /// Parse `name` and dispatch it.
    pub async fn handle_schedule_str(&self, name: &str) -> Result<ScheduleReport, ScheduleError> {
        let schedule: ScheduleType = name.parse()?;
        self.handle_schedule(schedule).await
    }
}
