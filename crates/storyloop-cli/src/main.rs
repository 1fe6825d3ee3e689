//! storyloop - backlog-driven delivery pipeline CLI
//!
//! ## Commands
//!
//! - `run`: drive the backlog through Developer -> QA -> Architect cycles
//! - `serve`: expose a role's handler as an agent
//! - `card`: print a role's agent card
//! - `send`: send one task to a running agent
//! - `status`: show the backlog
//! - `reopen`: reset stories to `todo`
//! - `repair`: heal and rewrite the backlog file

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::builder::BoolishValueParser;
use clap::{Parser, Subcommand};
use serde_json::Value;
use storyloop_a2a::{run_agent, A2aClient, AgentService, AgentSkill, Payload};
use storyloop_core::{
    registry_from_config, CommandHandler, LoadReport, NotesJournal, Orchestrator, PipelineConfig,
    Role, RunSummary, StoryStatus, StoryStore,
};
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "storyloop")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Backlog-driven multi-role delivery pipeline", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Pipeline configuration file
    #[arg(short, long, global = true, env = "STORYLOOP_CONFIG", default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the orchestration loop over the backlog
    Run {
        /// Maximum iterations (overrides `orchestrator.max_loops`)
        #[arg(long, env = "MAX_LOOPS")]
        max_loops: Option<u32>,

        /// Accept stories without tests (overrides `orchestrator.allow_no_tests`)
        #[arg(long, env = "ALLOW_NO_TESTS", value_parser = BoolishValueParser::new())]
        allow_no_tests: Option<bool>,
    },

    /// Serve a role's configured handler over the agent protocol
    Serve {
        role: Role,

        /// Bind URL (default: `a2a.agents.<role>.url`, then the role's default port)
        #[arg(long)]
        url: Option<String>,
    },

    /// Print a role's agent card
    Card {
        role: Role,

        #[arg(long)]
        url: Option<String>,
    },

    /// Send one task to a role's agent and print the result
    Send {
        role: Role,

        /// JSON object passed as the task payload
        payload: String,

        /// Skill to invoke (default: the configured or built-in skill)
        #[arg(long)]
        skill: Option<String>,

        #[arg(long)]
        url: Option<String>,
    },

    /// Show every story and its status
    Status,

    /// Reset stories to `todo`
    Reopen {
        /// Only reopen stories in these statuses (comma separated)
        #[arg(long, value_delimiter = ',')]
        only: Vec<String>,
    },

    /// Heal the backlog file and rewrite it in normalized form
    Repair,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    storyloop_core::init_tracing(cli.json, level);

    let config = PipelineConfig::load(&cli.config)
        .with_context(|| format!("Failed to load config {}", cli.config.display()))?;

    match cli.command {
        Commands::Run {
            max_loops,
            allow_no_tests,
        } => cmd_run(config, max_loops, allow_no_tests).await,
        Commands::Serve { role, url } => cmd_serve(&config, role, url).await,
        Commands::Card { role, url } => cmd_card(&config, role, url),
        Commands::Send {
            role,
            payload,
            skill,
            url,
        } => cmd_send(&config, role, &payload, skill, url).await,
        Commands::Status => cmd_status(&config),
        Commands::Reopen { only } => cmd_reopen(&config, &only),
        Commands::Repair => cmd_repair(&config),
    }
}

fn store(config: &PipelineConfig) -> StoryStore {
    StoryStore::new(&config.paths.stories).with_notes(NotesJournal::new(&config.paths.notes))
}

/// Run the orchestration loop
async fn cmd_run(
    mut config: PipelineConfig,
    max_loops: Option<u32>,
    allow_no_tests: Option<bool>,
) -> Result<()> {
    if let Some(max_loops) = max_loops {
        config.orchestrator.max_loops = max_loops;
    }
    if let Some(allow) = allow_no_tests {
        config.orchestrator.allow_no_tests = allow;
    }

    let registry = registry_from_config(&config)?;
    let mut engine = Orchestrator::from_config(&config, &registry);
    let summary = engine.run().await?;

    println!("{}", summary.render());
    Ok(())
}

/// Serve a role's command handler until Ctrl-C
async fn cmd_serve(config: &PipelineConfig, role: Role, url: Option<String>) -> Result<()> {
    let url = url.unwrap_or_else(|| config.a2a.url_for(role));
    let settings = config
        .handler(role)
        .with_context(|| format!("No handler configured for role '{role}' (handlers.{role})"))?;
    let handler = Arc::new(CommandHandler::new(role, settings)?);

    let service = agent_service(config, role, &url, handler);
    info!(role = %role, url = %url, "serving agent");
    run_agent(service, &url)
        .await
        .with_context(|| format!("Agent for role '{role}' failed"))?;
    Ok(())
}

/// The role's card plus every skill the config declares, all backed by `handler`.
fn agent_service(
    config: &PipelineConfig,
    role: Role,
    url: &str,
    handler: Arc<CommandHandler>,
) -> AgentService {
    let mut card = role.card(url);
    let mut skill_ids = vec![role.default_skill().to_string()];
    if let Some(agent) = config.a2a.agent(role) {
        for id in agent.skills.keys() {
            if !skill_ids.contains(id) {
                card = card.with_skill(AgentSkill::json(id, id, "Configured skill"));
                skill_ids.push(id.clone());
            }
        }
    }

    skill_ids
        .iter()
        .fold(AgentService::new(card), |service, id| {
            service.with_handler(id, handler.clone())
        })
}

fn cmd_card(config: &PipelineConfig, role: Role, url: Option<String>) -> Result<()> {
    let url = url.unwrap_or_else(|| config.a2a.url_for(role));
    println!("{}", serde_json::to_string_pretty(&role.card(&url))?);
    Ok(())
}

/// Send one task to a running agent
async fn cmd_send(
    config: &PipelineConfig,
    role: Role,
    payload: &str,
    skill: Option<String>,
    url: Option<String>,
) -> Result<()> {
    let payload = parse_payload(payload)?;
    let url = url.unwrap_or_else(|| config.a2a.url_for(role));
    let skill = skill.unwrap_or_else(|| config.a2a.skill_for(role));

    let client = A2aClient::new(&url, config.a2a.timeout())?;
    let result = client
        .send_task(&skill, payload, None)
        .await
        .with_context(|| format!("Task '{skill}' failed on {url}"))?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn parse_payload(raw: &str) -> Result<Payload> {
    match serde_json::from_str::<Value>(raw).context("Payload is not valid JSON")? {
        Value::Object(map) => Ok(map),
        _ => bail!("Payload must be a JSON object"),
    }
}

/// Show the backlog
fn cmd_status(config: &PipelineConfig) -> Result<()> {
    let loaded = store(config).load_detailed();
    println!("{}", render_load_report(&config.paths.stories, &loaded.report));

    for story in &loaded.stories {
        println!(
            "{:<14} {:<24} {:<4} {}",
            story.id,
            story.status.as_str(),
            story
                .priority
                .map(|p| format!("{p:?}"))
                .unwrap_or_else(|| "-".to_string()),
            story.title.as_deref().unwrap_or("")
        );
    }

    let summary = RunSummary::from_stories(&loaded.stories, 0, Utc::now());
    println!();
    println!(
        "{} stories: {} done, {} blocked, {} pending",
        summary.total,
        summary.done.len(),
        summary.blocked.len(),
        summary.pending.len()
    );
    Ok(())
}

fn render_load_report(path: &Path, report: &LoadReport) -> String {
    match report {
        LoadReport::Missing => format!("{}: not found (empty backlog)", path.display()),
        LoadReport::Clean => format!("{}: ok", path.display()),
        LoadReport::Repaired { passes } => {
            format!("{}: repaired on load ({})", path.display(), passes.join(", "))
        }
        LoadReport::Unrecoverable { error, backup } => format!(
            "{}: unreadable ({error}); backup: {}",
            path.display(),
            backup
                .as_ref()
                .map(|b| b.display().to_string())
                .unwrap_or_else(|| "none".to_string())
        ),
    }
}

fn parse_statuses(raw: &[String]) -> Result<Vec<StoryStatus>> {
    raw.iter()
        .filter(|s| !s.trim().is_empty())
        .map(|s| s.parse::<StoryStatus>().map_err(anyhow::Error::from))
        .collect()
}

/// Reset stories to `todo`
fn cmd_reopen(config: &PipelineConfig, only: &[String]) -> Result<()> {
    let only = parse_statuses(only)?;
    let summary = store(config).reopen(&only)?;

    println!("Reopened {} stories", summary.reopened.len());
    for id in &summary.reopened {
        println!("  {id}");
    }
    if let Some(backup) = summary.backup {
        println!("Backup: {}", backup.display());
    }
    Ok(())
}

/// Heal and rewrite the backlog
fn cmd_repair(config: &PipelineConfig) -> Result<()> {
    let loaded = store(config).repair()?;
    println!("{}", render_load_report(&config.paths.stories, &loaded.report));
    if let LoadReport::Unrecoverable { .. } = loaded.report {
        bail!("Backlog could not be repaired; the file was left unchanged");
    }
    println!("{} stories written", loaded.stories.len());
    Ok(())
}
