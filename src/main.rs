//! Orchestrator CLI.
//!
//! Usage:
//!   orchestrator init                 Write default config and schedules
//!   orchestrator daemon               Run scheduled agent activity until Ctrl+C
//!   orchestrator tick <schedule>      Run one schedule now
//!   orchestrator agent-add <id> <name> Register a bot agent
//!   orchestrator prompts [name]       List or show prompt templates
//!   orchestrator health               Check every completion provider
//!   orchestrator runs                 Show recent schedule runs

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use orchestrator::config::{self, OrchestratorConfig};
use orchestrator::prompts::{PromptCatalog, Template};
use orchestrator::schedule::daemon::write_default_entries;
use orchestrator::state::Database;
use orchestrator::types::*;
use orchestrator::App;

const CONFIG_FILE: &str = "orchestrator.toml";

#[derive(Parser, Debug)]
#[command(name = "orchestrator")]
#[command(version)]
#[command(about = "Schedule-driven orchestration of autonomous community agents")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to orchestrator home directory (default ~/.orchestrator).
    #[arg(long)]
    home: Option<String>,

    /// Log level (debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a default config and schedule file.
    Init,

    /// Run the schedule daemon.
    Daemon,

    /// Run one schedule immediately.
    Tick {
        /// agent_cycle, relationship_sync, memory_cleanup or token_reset
        schedule: String,
    },

    /// Register or update a bot agent.
    AgentAdd {
        id: String,
        name: String,
        #[arg(long)]
        community: Option<String>,
    },

    /// List prompt templates, or show one.
    Prompts { name: Option<String> },

    /// Check provider health.
    Health,

    /// Show recent schedule runs.
    Runs {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    let home_dir = match &cli.home {
        Some(home) => PathBuf::from(shellexpand::tilde(home).into_owned()),
        None => config::default_home_dir(),
    };

    match cli.command {
        Commands::Init => cmd_init(&home_dir),
        Commands::Daemon => cmd_daemon(&home_dir).await,
        Commands::Tick { schedule } => cmd_tick(&home_dir, &schedule).await,
        Commands::AgentAdd {
            id,
            name,
            community,
        } => cmd_agent_add(&home_dir, id, name, community),
        Commands::Prompts { name } => cmd_prompts(name.as_deref()),
        Commands::Health => cmd_health(&home_dir).await,
        Commands::Runs { limit } => cmd_runs(&home_dir, limit),
    }
}

// ---------------------------------------------------------------------------
// Command implementations
// ---------------------------------------------------------------------------

fn cmd_init(home_dir: &Path) -> Result<()> {
    let config_path = home_dir.join(CONFIG_FILE);
    if config_path.exists() {
        println!("{} Config already exists at {}", "!".yellow().bold(), config_path.display());
    } else {
        let cfg = OrchestratorConfig {
            db_path: home_dir.join("state.db").display().to_string(),
            schedule_config_path: home_dir.join("schedules.yml").display().to_string(),
            ..OrchestratorConfig::default()
        };
        config::save_config(&cfg, &config_path)?;
        println!("{} Wrote {}", "+".green().bold(), config_path.display());
    }

    let cfg = config::load_config(&config_path)?;
    let schedule_path = PathBuf::from(cfg.resolved_schedule_path());
    if write_default_entries(&schedule_path)? {
        println!("{} Wrote {}", "+".green().bold(), schedule_path.display());
    }
    Ok(())
}

async fn cmd_daemon(home_dir: &Path) -> Result<()> {
    let cfg = load(home_dir)?;
    let db = open_db(&cfg)?;
    let app = App::from_config(cfg, db)?;
    let mut daemon = app.daemon()?;

    println!(
        "{} Starting schedule daemon with {} entries ...",
        ">>>".green().bold(),
        daemon.entries().len()
    );

    let cancel = CancellationToken::new();
    let daemon_cancel = cancel.clone();
    let daemon_handle = tokio::spawn(async move {
        if let Err(e) = daemon.run(daemon_cancel).await {
            error!("Schedule daemon error: {}", e);
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;

    println!("\n{} Shutting down gracefully...", "<<<".red().bold());
    cancel.cancel();

    // A schedule in flight finishes its current agent before the loop sees the token.
    let shutdown_timeout = tokio::time::Duration::from_secs(30);
    match tokio::time::timeout(shutdown_timeout, daemon_handle).await {
        Ok(Err(e)) => warn!("Schedule task join error: {}", e),
        Err(_) => warn!("Schedule daemon did not stop within {:?}", shutdown_timeout),
        Ok(Ok(())) => {}
    }

    app.shutdown().await;
    info!("Daemon shutdown complete");
    Ok(())
}

async fn cmd_tick(home_dir: &Path, schedule: &str) -> Result<()> {
    let cfg = load(home_dir)?;
    let db = open_db(&cfg)?;
    let app = App::from_config(cfg, db)?;
    let started_at = chrono::Utc::now();

    let result = app.dispatcher.handle_schedule_str(schedule).await;
    {
        let db = app.db.lock().await;
        match &result {
            Ok(report) => db.log_schedule_run(report)?,
            Err(e) => db.log_schedule_failure(schedule, &e.to_string(), started_at)?,
        }
    }
    app.shutdown().await;

    let report = result?;
    print_report(&report);
    Ok(())
}

fn cmd_agent_add(home_dir: &Path, id: String, name: String, community: Option<String>) -> Result<()> {
    let cfg = load(home_dir)?;
    let db = open_db(&cfg)?;
    let agent = AgentRecord {
        id,
        name,
        is_bot: true,
        active: true,
        community_id: community,
        personality: Personality::default(),
        morale: 0.5,
        heat: cfg.schedule.baseline_heat,
        daily_actions_remaining: cfg.schedule.daily_action_budget,
    };
    db.upsert_agent(&agent)?;
    println!("{} Agent {} ({})", "+".green().bold(), agent.id, agent.name);
    Ok(())
}

fn cmd_prompts(name: Option<&str>) -> Result<()> {
    let catalog = PromptCatalog::with_defaults();

    let Some(name) = name else {
        for key in catalog.list() {
            if let Some(def) = catalog.get(&key) {
                println!("  {:<22} {}", key.bold(), def.description.dimmed());
            }
        }
        return Ok(());
    };

    let def = catalog
        .get(name)
        .with_context(|| format!("No prompt named '{}'", name))?;
    println!("{} (v{})", def.name.bold(), def.version);
    println!("  model:       {}", def.model);
    println!("  temperature: {}", def.temperature);
    println!("  variables:   {}", def.variables.join(", "));
    println!();
    match &def.template {
        Template::Text(text) => println!("{}", text),
        Template::Builder(_) => println!("{}", "(built from variables at render time)".dimmed()),
    }
    Ok(())
}

async fn cmd_health(home_dir: &Path) -> Result<()> {
    let mut cfg = load(home_dir)?;
    cfg.tracing.enabled = false;
    let app = App::from_config(cfg, Database::open_memory()?)?;

    for name in app.completions.provider_names() {
        let healthy = app.completions.check_health(Some(&name)).await?;
        let status = if healthy { "ok".green() } else { "unreachable".red() };
        let marker = if name == app.completions.default_provider() { " (default)" } else { "" };
        println!("  {:<16} {}{}", name, status, marker.dimmed());
    }
    Ok(())
}

fn cmd_runs(home_dir: &Path, limit: usize) -> Result<()> {
    let db = open_db(&load(home_dir)?)?;
    for run in db.recent_schedule_runs(limit)? {
        let status = if run.success { "ok".green() } else { "failed".red() };
        println!(
            "  {}  {:<18} {:<6}  agents {:>3} ({} failed)  affected {}",
            run.started_at.format("%Y-%m-%d %H:%M:%S"),
            run.schedule,
            status,
            run.agents,
            run.failed_agents,
            run.affected
        );
        if let Some(detail) = run.detail {
            for line in detail.lines() {
                println!("      {}", line.dimmed());
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn load(home_dir: &Path) -> Result<OrchestratorConfig> {
    let config_path = home_dir.join(CONFIG_FILE);
    if !config_path.exists() {
        warn!("No config at {}; using defaults (run `orchestrator init`)", config_path.display());
    }
    config::load_config(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))
}

fn open_db(cfg: &OrchestratorConfig) -> Result<Database> {
    let db_path = cfg.resolved_db_path();
    let db_path = Path::new(&db_path);
    Database::open(db_path).with_context(|| format!("Failed to open database at {}", db_path.display()))
}

fn print_report(report: &ScheduleReport) {
    let elapsed = report.finished_at - report.started_at;
    println!(
        "{} {} in {} ms",
        ">>>".green().bold(),
        report.schedule.to_string().bold(),
        elapsed.num_milliseconds()
    );
    if report.affected > 0 || report.results.is_empty() {
        println!("    rows affected: {}", report.affected);
    }
    for r in &report.results {
        match &r.error {
            None => println!(
                "    {} {}  {}",
                "ok".green(),
                r.agent_id,
                r.executed_actions.join(", ").dimmed()
            ),
            Some(e) => println!("    {} {}  {}", "failed".red(), r.agent_id, e),
        }
    }
}
