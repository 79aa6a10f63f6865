//! promptmgr command-line interface.

pub mod commands;
pub mod prompter;

use clap::{Parser, Subcommand};
use promptmgr_core::{paths, Config, ConfigError};
use promptmgr_secrets::{AuthSession, SecureVariableStore};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

use crate::prompter::TerminalPrompter;

/// pm - prompt manager secure variables
#[derive(Parser)]
#[command(name = "pm")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to config file
    #[arg(short, long, env = "PM_CONFIG_FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Prompt data file; the secure store is kept next to it
    #[arg(long, global = true)]
    pub data_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Manage encrypted secure variables
    Secure(commands::secure::SecureArgs),

    /// Inspect or change the unlock session
    Session(commands::session::SessionArgs),

    /// Configuration management
    Config(commands::config::ConfigArgs),

    /// Run diagnostics
    Doctor(commands::doctor::DoctorArgs),

    /// Show version information
    Version,
}

/// Settings resolved once per invocation.
pub struct Context {
    pub config: Config,
    pub config_path: PathBuf,
    data_file: Option<PathBuf>,
}

impl Context {
    /// Resolve the config file and load it. A missing file means defaults.
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let config_path = match &cli.config {
            Some(path) => path.clone(),
            None => paths::config_file()?,
        };

        let config = match Config::load(&config_path) {
            Ok(config) => config,
            Err(ConfigError::NotFound(_)) => Config::default(),
            Err(e) => {
                warn!("ignoring unreadable config file {}: {e}", config_path.display());
                Config::default()
            }
        };

        Ok(Self {
            config,
            config_path,
            data_file: cli.data_file.clone(),
        })
    }

    /// `--data-file`, then `PM_DATA_FILE`, then the config, then `~/.pm/prompts.json`.
    pub fn data_file(&self) -> Result<PathBuf, ConfigError> {
        match &self.data_file {
            Some(path) => Ok(path.clone()),
            None => self.config.resolve_data_file(),
        }
    }

    /// The secure store, creating its directory (owner-only) on first use.
    pub fn open_store(&self) -> anyhow::Result<SecureVariableStore> {
        let data_file = self.data_file()?;
        if let Some(dir) = data_file.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                paths::ensure_private_dir(dir)?;
            }
        }

        let store = SecureVariableStore::open(&data_file, &self.config, Arc::new(TerminalPrompter))?;
        Ok(store)
    }

    /// The authentication session on its own, for `pm session`.
    pub fn open_session(&self) -> anyhow::Result<AuthSession> {
        Ok(AuthSession::from_config(&self.config, Arc::new(TerminalPrompter))?)
    }
}

/// Default tracing filter when `RUST_LOG` is not set.
///
/// `-v` turns on debug output and the `audit` target; `-vv` goes to trace.
pub fn log_filter(verbose: u8, config: &Config) -> String {
    match verbose {
        0 => format!("promptmgr={}", config.logging.level.as_str()),
        1 => "promptmgr=debug,audit=info".to_string(),
        _ => "promptmgr=trace,audit=info".to_string(),
    }
}

/// Run the CLI with the given arguments.
pub async fn run(cli: Cli, ctx: Context) -> anyhow::Result<()> {
    match cli.command {
        Commands::Secure(args) => commands::secure::run(args, &ctx).await,
        Commands::Session(args) => commands::session::run(args, &ctx).await,
        Commands::Config(args) => commands::config::run(args, &ctx).await,
        Commands::Doctor(args) => commands::doctor::run(args, &ctx).await,
        Commands::Version => {
            println!("pm {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
