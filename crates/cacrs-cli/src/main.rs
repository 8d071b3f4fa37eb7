//! cacrs CLI - investigative casework from the terminal

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;

use cacrs_core::ai::{self, GenerativeAi};
use cacrs_core::chat::{ChatFlow, ChatUpdate, ReportOutcome, SendOutcome};
use cacrs_core::export::{self, ExportFormat};
use cacrs_core::research::Research;
use cacrs_core::services::{ServicePatch, ServicesRegistry};
use cacrs_core::tour::{FileCompletionStore, TourController, default_steps};
use cacrs_core::{CaseRepository, Config, dashboard, store};

mod pretty;

#[derive(Debug, Parser)]
#[command(
    name = "cacrs",
    author,
    version,
    about = "Investigative casework with an AI assistant",
    propagate_version = true
)]
struct Cli {
    /// Config file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List cases, newest first
    Cases {
        /// Write the cases to a file (.json for JSON, CSV otherwise)
        #[arg(long, value_name = "FILE")]
        export: Option<PathBuf>,
    },

    /// Show a case with its files, timeline and chat log
    Show {
        /// Case ID
        id: String,
    },

    /// Send a message to the case assistant and stream the reply
    Chat {
        /// Case ID
        case: String,

        /// Message text
        text: String,
    },

    /// Condense chat messages into a report appended to the case
    Report {
        /// Case ID
        case: String,

        /// Messages to include
        #[arg(required = true)]
        message_ids: Vec<String>,
    },

    /// Run a grounded web search
    Search {
        /// Search query
        query: String,

        /// Keep the result as a finding
        #[arg(long)]
        save: bool,
    },

    /// List saved findings
    Findings {
        /// Write the findings to a file (.json for JSON, CSV otherwise)
        #[arg(long, value_name = "FILE")]
        export: Option<PathBuf>,
    },

    /// Manage watchlists
    Watch {
        #[command(subcommand)]
        command: WatchCommand,
    },

    /// Inspect and test third-party services
    Services {
        #[command(subcommand)]
        command: ServicesCommand,
    },

    /// Show or complete the onboarding tour
    Tour {
        /// User the tour state belongs to
        #[arg(long, default_value = "local")]
        user: String,

        /// Walk through every step and record completion
        #[arg(long)]
        complete: bool,
    },

    /// Show dashboard statistics
    Stats,

    /// Print the effective configuration
    Config,
}

#[derive(Debug, Subcommand)]
enum WatchCommand {
    /// Register a watchlist
    Add {
        /// Watchlist name
        name: String,

        /// Query to monitor
        query: String,

        /// Refresh interval in minutes
        #[arg(long, default_value = "60")]
        interval: u32,
    },

    /// List watchlists
    List,
}

#[derive(Debug, Subcommand)]
enum ServicesCommand {
    /// List the service catalogue
    List,

    /// Run a connectivity test
    Test {
        /// Service ID
        id: String,
    },

    /// Enable a service for this run
    Enable {
        /// Service ID
        id: String,
    },

    /// Disable a service for this run
    Disable {
        /// Service ID
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.unwrap_or_else(Config::default_config_path);
    let config = Config::ensure_at(&config_path)?;

    let services = ServicesRegistry::with_defaults(&config.services.secret_manager_base_path);

    match cli.command {
        Command::Config => cmd_config(&config, &config_path),
        Command::Services { command } => cmd_services(&services, command).await,
        Command::Tour { user, complete } => cmd_tour(&config, &user, complete),
        command => {
            let repo = store::open(&config).await?;
            let ai = ai::from_config(&config.ai, services.gemini_tuning())?;
            run_case_command(command, repo, ai).await
        }
    }
}

async fn run_case_command(
    command: Command,
    repo: Arc<dyn CaseRepository>,
    ai: Arc<dyn GenerativeAi>,
) -> Result<()> {
    let research = Research::new(repo.clone(), ai.clone());
    match command {
        Command::Cases { export: target } => {
            let cases = repo.list_cases().await?;
            match target {
                Some(path) => {
                    let format = format_for(&path);
                    let content = export::export_cases(&cases, format)?;
                    let written = export::write_export(&path, format, &content)?;
                    println!("Exported {} case(s) to {}", cases.len(), written.display());
                }
                None => pretty::print_cases(&cases),
            }
            Ok(())
        }
        Command::Show { id } => cmd_show(repo.as_ref(), &id).await,
        Command::Chat { case, text } => cmd_chat(ChatFlow::new(repo, ai), &case, &text).await,
        Command::Report { case, message_ids } => {
            cmd_report(repo.clone(), ChatFlow::new(repo, ai), &case, &message_ids).await
        }
        Command::Search { query, save } => cmd_search(&research, &query, save).await,
        Command::Findings { export: target } => cmd_findings(&research, target.as_deref()).await,
        Command::Watch { command } => cmd_watch(&research, command).await,
        Command::Stats => {
            let cases = repo.list_cases().await?;
            let findings = repo.list_findings().await?;
            let alerts = repo.list_alerts().await?;
            pretty::print_dashboard(&dashboard::summarize(&cases, &findings, &alerts));
            Ok(())
        }
        Command::Config | Command::Services { .. } | Command::Tour { .. } => Ok(()),
    }
}

async fn cmd_show(repo: &dyn CaseRepository, id: &str) -> Result<()> {
    let case = repo
        .get_case(id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Case not found: {id}"))?;
    let files = repo.list_files(id).await?;
    let events = repo.list_events(id).await?;
    pretty::print_case_detail(&case, &files, &events);

    let messages = repo.list_messages(id).await?;
    if !messages.is_empty() {
        println!();
        pretty::print_messages(&messages);
    }
    Ok(())
}

async fn cmd_chat(chat: ChatFlow, case_id: &str, text: &str) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();

    let printer = tokio::spawn(async move {
        let mut stdout = std::io::stdout();
        while let Some(update) = rx.recv().await {
            match update {
                ChatUpdate::Chunk { delta, .. } => {
                    let _ = write!(stdout, "{delta}");
                    let _ = stdout.flush();
                }
                ChatUpdate::Finished { .. } => {
                    let _ = writeln!(stdout);
                }
                ChatUpdate::Failed { message } => {
                    let _ = writeln!(stdout, "{}", message.content);
                }
                ChatUpdate::UserMessage { .. }
                | ChatUpdate::AssistantStarted { .. }
                | ChatUpdate::Rejected { .. } => {}
            }
        }
    });

    let outcome = chat.send_message(case_id, text, Some(&tx)).await;
    drop(tx);
    printer.await?;

    match outcome? {
        SendOutcome::Rejected(reason) => {
            anyhow::bail!("Message not sent: {reason:?}");
        }
        SendOutcome::Completed(_) => Ok(()),
        SendOutcome::Degraded(_) => {
            tracing::warn!("The assistant could not answer; the apology was stored");
            Ok(())
        }
    }
}

async fn cmd_report(
    repo: Arc<dyn CaseRepository>,
    chat: ChatFlow,
    case_id: &str,
    message_ids: &[String],
) -> Result<()> {
    let case = repo
        .get_case(case_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Case not found: {case_id}"))?;
    let messages = repo.list_messages(case_id).await?;
    for id in message_ids {
        if !messages.iter().any(|m| &m.id == id) {
            anyhow::bail!("Message not found in case {case_id}: {id}");
        }
    }
    let selected: Vec<_> = messages
        .into_iter()
        .filter(|m| m.is_selectable() && message_ids.contains(&m.id))
        .collect();

    match chat.generate_report(case_id, &case.title, &selected).await? {
        ReportOutcome::Rejected(reason) => anyhow::bail!("No report generated: {reason:?}"),
        ReportOutcome::Generated { report, .. } => {
            pretty::print_messages(std::slice::from_ref(&report));
            Ok(())
        }
    }
}

async fn cmd_search(research: &Research, query: &str, save: bool) -> Result<()> {
    let result = research.web_search(query).await?;
    pretty::print_search_result(query, &result);
    if save {
        let finding = research.save_finding(query, result).await?;
        println!();
        println!("Saved finding {}", finding.id);
    }
    Ok(())
}

async fn cmd_findings(research: &Research, export_path: Option<&Path>) -> Result<()> {
    let findings = research.findings().await?;
    let Some(path) = export_path else {
        pretty::print_findings(&findings);
        return Ok(());
    };

    let format = format_for(path);
    let content = export::export_findings(&findings, format)?;
    let written = export::write_export(path, format, &content)?;
    println!("Exported {} finding(s) to {}", findings.len(), written.display());
    Ok(())
}

fn format_for(path: &Path) -> ExportFormat {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => ExportFormat::Json,
        _ => ExportFormat::Csv,
    }
}

async fn cmd_watch(research: &Research, command: WatchCommand) -> Result<()> {
    match command {
        WatchCommand::Add {
            name,
            query,
            interval,
        } => {
            let watchlist = research.create_watchlist(&name, &query, interval).await?;
            println!("Added watchlist {} ({})", watchlist.name, watchlist.id);
        }
        WatchCommand::List => pretty::print_watchlists(&research.watchlists().await?),
    }
    Ok(())
}

async fn cmd_services(services: &ServicesRegistry, command: ServicesCommand) -> Result<()> {
    match command {
        ServicesCommand::List => pretty::print_services(&services.list().await),
        ServicesCommand::Test { id } => {
            let result = services.test(&id).await;
            pretty::print_service_test(&id, &result);
        }
        ServicesCommand::Enable { id } => toggle_service(services, &id, true).await?,
        ServicesCommand::Disable { id } => toggle_service(services, &id, false).await?,
    }
    Ok(())
}

/// The registry is rebuilt on every start, so toggles only last for this run.
async fn toggle_service(services: &ServicesRegistry, id: &str, enabled: bool) -> Result<()> {
    let patch = ServicePatch {
        enabled: Some(enabled),
        ..ServicePatch::default()
    };
    let service = services.update(id, patch).await?;
    pretty::print_services(std::slice::from_ref(&service));
    Ok(())
}

fn cmd_tour(config: &Config, user: &str, complete: bool) -> Result<()> {
    let store = Arc::new(FileCompletionStore::new(
        config.onboarding.resolved_state_path(),
    ));
    let mut tour = TourController::new(user, default_steps(), store)?;
    if complete {
        tour.start();
        for _ in 0..tour.steps().len() {
            tour.next()?;
        }
    }
    pretty::print_tour(tour.state(), tour.steps());
    Ok(())
}

fn cmd_config(config: &Config, config_path: &Path) -> Result<()> {
    println!("# {}", config_path.display());
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}
