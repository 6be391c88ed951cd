mod profile_cmds;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use hestia_config::AppConfig;
use hestia_profile::ProfileManager;

#[derive(Debug, Parser)]
#[command(
    name = "hestia",
    version,
    about = "Manage per-user assistant profiles: validate, heal, back up and recover"
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true, default_value = "config/default.toml")]
    config: PathBuf,

    /// Skip the validation sweep normally run before every command.
    #[arg(long, global = true)]
    no_sweep: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Validate every profile, restoring or quarantining corrupt ones.
    Validate,
    /// Create a new profile with registry defaults.
    Create {
        name: String,
        #[arg(long)]
        password: String,
    },
    /// List usable profiles.
    List,
    /// Print one preference of a profile.
    Get { id: String, key: String },
    /// Change one preference of a profile.
    Set {
        id: String,
        key: String,
        value: String,
    },
    /// Show the preference catalogue with defaults.
    Prefs {
        /// Only the switches shown in the preference editor.
        #[arg(long)]
        toggles: bool,
    },
    /// Put every preference of a profile back to its default.
    Reset { id: String },
    /// Mark every profile as logged out.
    Logout,
    /// Delete a profile directory and its backups.
    Delete {
        id: String,
        #[arg(long)]
        yes: bool,
    },
    Backups {
        #[command(subcommand)]
        command: BackupCommands,
    },
}

#[derive(Debug, Subcommand)]
enum BackupCommands {
    /// Show the most recent backup of every profile.
    List,
    /// Delete backups that belong to no stored profile.
    Prune,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config_exists = cli.config.exists();
    let config = AppConfig::load_from(&cli.config)?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.telemetry.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if !config_exists {
        AppConfig::default()
            .save_to(&cli.config)
            .with_context(|| format!("write default config to {}", cli.config.display()))?;
        info!(path = %cli.config.display(), "wrote default configuration");
    }

    let manager = ProfileManager::open(&config)
        .with_context(|| format!("open profile storage under {}", config.storage.root))?;

    let sweep_first = config.validation.sweep_on_start
        && !cli.no_sweep
        && !matches!(cli.command, Commands::Validate);
    if sweep_first {
        let report = manager.validate_all().context("startup profile sweep")?;
        profile_cmds::print_quarantined(&report.quarantined);
    }

    let result = run(&manager, cli.command);
    manager.shutdown();
    info!("profile writes frozen; exiting");
    result
}

fn run(manager: &ProfileManager, command: Commands) -> Result<()> {
    match command {
        Commands::Validate => profile_cmds::run_validate(manager)?,
        Commands::Create { name, password } => {
            profile_cmds::run_create(manager, &name, &password)?
        }
        Commands::List => profile_cmds::run_list(manager)?,
        Commands::Get { id, key } => profile_cmds::run_get(manager, &id, &key)?,
        Commands::Set { id, key, value } => profile_cmds::run_set(manager, &id, &key, &value)?,
        Commands::Prefs { toggles } => profile_cmds::run_prefs(manager, toggles),
        Commands::Reset { id } => profile_cmds::run_reset(manager, &id)?,
        Commands::Logout => {
            let changed = manager.logout_all()?;
            println!("logged out {changed} profile(s)");
        }
        Commands::Delete { id, yes } => profile_cmds::run_delete(manager, &id, yes)?,
        Commands::Backups { command } => match command {
            BackupCommands::List => profile_cmds::run_backups_list(manager)?,
            BackupCommands::Prune => profile_cmds::run_backups_prune(manager)?,
        },
    }
    Ok(())
}
