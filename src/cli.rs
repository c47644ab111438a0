//! CLI definitions for sonar.
//!
//! Uses clap for argument parsing with derive macros.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// sonar - local cache for the Sonar feed and inbox
#[derive(Parser, Debug)]
#[command(name = "sonar")]
#[command(version)]
#[command(about = "Sync, back up and restore the local Sonar data cache")]
#[command(long_about = r#"
sonar keeps a local SQLite copy of your Sonar feed, suggestions and
interests for offline querying.

Quick start:
  1. Export SONAR_API_KEY or run: sonar config set token <token>
  2. Run: sonar data download
  3. Keep it fresh: sonar data sync
"#)]
pub struct Cli {
    /// Path to the database file
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Emit machine-readable JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Be verbose (show debug info)
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Be quiet (suppress non-error output)
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage the local data cache
    #[command(subcommand)]
    Data(DataCommand),

    /// Show or manage configuration
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Subcommand, Debug)]
pub enum DataCommand {
    /// Wipe the local cache and download the last 7 days
    Download,

    /// Fetch what changed since the last sync
    Sync,

    /// Write a verified copy of the database
    Backup(BackupArgs),

    /// Replace the database with a verified backup
    Restore(RestoreArgs),

    /// Run an integrity check on a database file
    Verify(VerifyArgs),

    /// Print the database path
    Path,

    /// Show row counts and the last sync time
    Stats,

    /// Open the sqlite3 shell on the database
    Sql,
}

#[derive(Args, Debug)]
pub struct BackupArgs {
    /// Backup file (default: <db>-backup-<timestamp>.db next to the database)
    #[arg(long, short = 'o')]
    pub out: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct RestoreArgs {
    /// Backup file to restore from
    #[arg(long)]
    pub from: PathBuf,

    /// Database to replace (default: the configured database)
    #[arg(long)]
    pub to: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Database file to check (default: the configured database)
    pub path: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the resolved configuration
    Show,

    /// Set a configuration value
    Set(SetArgs),

    /// Delete the config file and the local database
    Nuke(NukeArgs),
}

#[derive(Args, Debug)]
pub struct SetArgs {
    /// Config key: token, api_url, vendor, feed_render, feed_width, db
    pub key: String,

    /// Value to set
    pub value: String,
}

#[derive(Args, Debug)]
pub struct NukeArgs {
    /// Required to actually delete anything
    #[arg(long)]
    pub confirm: bool,
}

#[derive(Args, Debug, Clone)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
