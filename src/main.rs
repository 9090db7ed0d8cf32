//! Quota Relay daemon
//!
//! CLI for running the relay over a JSON-lines transport and administering quotas.

use chrono::Utc;
use clap::{Parser, Subcommand};
use quota_relay::completion::{CompletionClient, HttpCompletionClient};
use quota_relay::config::Config;
use quota_relay::quota::{QuotaStore, SqliteQuotaStore};
use quota_relay::redemption::HttpRedemptionClient;
use quota_relay::relay::RelayEngine;
use quota_relay::transport::{self, shared_writer};
use quota_relay::{Error, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Quota Relay - quota-gated chat relay
#[derive(Parser)]
#[command(name = "quota-relay")]
#[command(about = "Relay chat messages to a completion service under a daily quota")]
struct Cli {
    /// Config file (defaults to the user config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Relay messages read as JSON lines on stdin, replies go to stdout
    Serve {
        /// Skip the startup completion check
        #[arg(long)]
        no_self_test: bool,
    },

    /// Send one prompt to the completion service and print the answer
    Ask {
        /// Prompt text
        prompt: String,
    },

    /// Inspect or adjust user quotas
    Quota {
        #[command(subcommand)]
        action: QuotaAction,
    },

    /// Manage the config file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum QuotaAction {
    /// Show a user's quota records
    Show {
        /// User ID
        user: String,
    },

    /// Add requests to a user's quota for today
    Credit {
        /// User ID
        user: String,

        /// Requests to add
        amount: u32,
    },

    /// Delete all quota records of a user
    Reset {
        /// User ID
        user: String,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a config file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective config
    Show,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging (stderr, stdout carries the transport)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.clone();
    let load_config = || Config::load(config_path.as_deref());

    match cli.command {
        Commands::Serve { no_self_test } => cmd_serve(&load_config()?, !no_self_test),
        Commands::Ask { prompt } => cmd_ask(&load_config()?, &prompt),
        Commands::Quota { action } => cmd_quota(&load_config()?, action),
        Commands::Config { action } => match action {
            ConfigAction::Init { force } => cmd_config_init(config_path.clone(), force),
            ConfigAction::Show => cmd_config_show(&load_config()?),
        },
    }
}

// ============================================================================
// CLI Commands
// ============================================================================

fn runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?)
}

fn cmd_serve(config: &Config, self_test: bool) -> Result<()> {
    info!("Quota relay starting");

    let store = Arc::new(SqliteQuotaStore::open(&config.quota_db)?);
    info!("Quota database: {}", config.quota_db.display());

    let engine = Arc::new(RelayEngine::new(
        config,
        store,
        Arc::new(HttpCompletionClient::new(config)),
        Arc::new(HttpRedemptionClient::new(config)),
    ));

    runtime()?.block_on(async move {
        if self_test {
            engine.self_test().await;
        }

        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        let stats = transport::serve(engine, stdin, shared_writer(tokio::io::stdout())).await?;
        info!("Handled {} message(s)", stats.received);
        Ok::<(), Error>(())
    })
}

fn cmd_ask(config: &Config, prompt: &str) -> Result<()> {
    let client = HttpCompletionClient::new(config);
    let answer = runtime()?.block_on(client.complete(prompt));

    match answer {
        Ok(text) => {
            println!("{}", text);
            Ok(())
        }
        Err(e) => {
            error!("Completion failed: {}", e);
            Err(Error::Completion(e))
        }
    }
}

fn cmd_quota(config: &Config, action: QuotaAction) -> Result<()> {
    let store = SqliteQuotaStore::open(&config.quota_db)?;
    let today = Utc::now().date_naive();

    match action {
        QuotaAction::Show { user } => {
            let records = store.history(&user)?;
            if records.is_empty() {
                println!("No quota records for {}", user);
            }
            for record in records {
                let marker = if record.date == today { " (today)" } else { "" };
                println!("{}  {}{}", record.date, record.request_count, marker);
            }
        }
        QuotaAction::Credit { user, amount } => {
            let count = store.credit(&user, today, amount)?;
            println!("{} now has {} request(s) for {}", user, count, today);
        }
        QuotaAction::Reset { user } => {
            let removed = store.remove_user(&user)?;
            println!("Removed {} record(s) for {}", removed, user);
        }
    }

    Ok(())
}

fn cmd_config_init(path: Option<PathBuf>, force: bool) -> Result<()> {
    let path = path.unwrap_or_else(Config::default_path);
    if path.exists() && !force {
        println!("Config already exists: {} (use --force to overwrite)", path.display());
        return Ok(());
    }

    Config::default().save(&path)?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn cmd_config_show(config: &Config) -> Result<()> {
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}
