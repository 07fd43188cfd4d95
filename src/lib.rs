//! Agent orchestration core for a social simulation.
//!
//! Personality-driven agents are woken on a schedule, reason through a
//! pluggable completion service, and act through a governed tool set.
//!
//! - [`completion`]: provider manager with caching, retry and tracing
//! - [`tools`]: tool registry with input normalization and chains
//! - [`prompts`]: versioned prompt-template catalog
//! - [`schedule`]: schedule dispatcher, built-in handlers and cron daemon
//! - [`app`]: composition root

pub mod agent;
pub mod app;
pub mod completion;
pub mod config;
pub mod error;
pub mod prompts;
pub mod schedule;
pub mod state;
pub mod tools;
pub mod trace;
pub mod types;

pub use app::App;
pub use error::Error;
