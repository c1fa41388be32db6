//! CLI binary for shiftbot.

use clap::{Parser, Subcommand};
use shiftbot::BotConfig;
use shiftbot::config::ConfigSeverity;
use shiftbot::store::{RemoteStore, SheetsStore};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Shiftbot: café shift and cleaning-task Telegram bot.
#[derive(Parser)]
#[command(name = "shiftbot", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Option<Command>,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// Start the bot (default).
    Run,

    /// Validate configuration and print any issues.
    CheckConfig,

    /// Create missing worksheets and header rows in the spreadsheet.
    SetupSheet,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let path = cli.config.unwrap_or_else(BotConfig::default_config_path);
    let config = BotConfig::load(&path)?;
    let _log_guard = shiftbot::logging::init(&config.logging)?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(config).await,
        Command::CheckConfig => check_config(&config, &path),
        Command::SetupSheet => setup_sheet(&config).await,
    }
}

async fn run(config: BotConfig) -> anyhow::Result<()> {
    println!("shiftbot v{}", env!("CARGO_PKG_VERSION"));

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received Ctrl+C, shutting down...");
            cancel_clone.cancel();
        }
    });

    shiftbot::app::run(config, cancel).await
}

fn check_config(config: &BotConfig, path: &std::path::Path) -> anyhow::Result<()> {
    println!("config: {}", path.display());
    let issues = config.validate();
    if issues.is_empty() {
        println!("✓ configuration looks good");
        return Ok(());
    }
    for issue in &issues {
        let tag = match issue.severity {
            ConfigSeverity::Warning => "warning",
            ConfigSeverity::Error => "error",
        };
        println!("{tag} [{}]: {}", issue.id, issue.summary);
    }
    config.ensure_valid()?;
    Ok(())
}

async fn setup_sheet(config: &BotConfig) -> anyhow::Result<()> {
    if config.sheets.spreadsheet_id.trim().is_empty() {
        anyhow::bail!("GOOGLE_SHEETS_ID is required");
    }
    let store = SheetsStore::new(&config.sheets)?;
    for line in store.ensure_layout().await? {
        println!("{line}");
    }
    Ok(())
}
