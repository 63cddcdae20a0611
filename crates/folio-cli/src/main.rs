#![deny(unsafe_code)]

//! folio CLI: run the contact service and inspect its configuration and
//! stored submissions.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::SecondsFormat;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use folio_config::AppConfig;
use folio_core::{Daemon, FileStore, StoredSubmission};

/// folio: abuse-guarded contact form API for a portfolio site.
#[derive(Parser)]
#[command(name = "folio", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, default_value = "folio.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the contact API until Ctrl-C.
    Serve,

    /// Validate and display configuration.
    Config {
        /// Show the resolved configuration.
        #[arg(long)]
        show: bool,
    },

    /// List stored submissions, newest first.
    Submissions {
        /// Maximum number of submissions to print.
        #[arg(short, long, default_value_t = 20)]
        limit: usize,

        /// Print raw JSON records.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config).await?;

    // RUST_LOG wins, then -v flags, then [logging] level.
    let filter = match cli.verbose {
        0 => config.logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    if !cli.config.exists() {
        info!(path = %cli.config.display(), "Config file not found, using defaults");
    }

    match cli.command {
        Commands::Serve => cmd_serve(config).await?,
        Commands::Config { show } => cmd_config(&cli.config, &config, show)?,
        Commands::Submissions { limit, json } => cmd_submissions(&config, limit, json).await?,
    }

    Ok(())
}

async fn cmd_serve(config: AppConfig) -> Result<()> {
    info!(
        addr = %config.server.listen_addr,
        port = config.server.listen_port,
        "Starting folio contact service"
    );
    let daemon = Daemon::new(config)?;
    daemon.run().await?;
    Ok(())
}

fn cmd_config(config_path: &Path, config: &AppConfig, show: bool) -> Result<()> {
    if show {
        let toml_str = toml::to_string_pretty(config).context("failed to render config")?;
        println!("{toml_str}");
    } else {
        println!("Configuration at '{}' is valid.", config_path.display());
    }
    Ok(())
}

async fn cmd_submissions(config: &AppConfig, limit: usize, json: bool) -> Result<()> {
    let Some(path) = &config.notify.store_path else {
        bail!("no submission store configured (set notify.store_path)");
    };
    let records = FileStore::new(path)
        .load()
        .await
        .with_context(|| format!("failed to read submissions from '{path}'"))?;

    let latest: Vec<&StoredSubmission> = records.iter().rev().take(limit).collect();
    if json {
        println!("{}", serde_json::to_string_pretty(&latest)?);
    } else {
        print!("{}", render_submissions(&latest, records.len()));
    }
    Ok(())
}

/// Longest message excerpt shown per submission.
const EXCERPT_CHARS: usize = 72;

fn render_submissions(latest: &[&StoredSubmission], total: usize) -> String {
    if latest.is_empty() {
        return "No submissions stored.\n".to_string();
    }

    let mut out = String::new();
    for s in latest {
        let first_line = s.message.lines().next().unwrap_or_default();
        let mut excerpt: String = first_line.chars().take(EXCERPT_CHARS).collect();
        if first_line.chars().count() > EXCERPT_CHARS || s.message.lines().nth(1).is_some() {
            excerpt.push_str("...");
        }
        out.push_str(&format!(
            "{}  {} <{}>  [{}]\n    {}\n",
            s.received_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            s.name,
            s.email,
            s.client_id,
            excerpt,
        ));
    }
    out.push_str(&format!("Showing {} of {} submissions.\n", latest.len(), total));
    out
}

async fn load_config(path: &Path) -> Result<AppConfig> {
    if path.exists() {
        AppConfig::load(path)
            .await
            .with_context(|| format!("failed to load config from '{}'", path.display()))
    } else {
        Ok(AppConfig::default())
    }
}
