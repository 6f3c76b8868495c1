use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use plugin_scout_core::Tier;

#[derive(Parser)]
#[command(name = "plugin-scout")]
#[command(about = "Discover, validate, score and back up plugin marketplaces")]
#[command(version)]
pub struct Cli {
    /// Verbose output (debug logs)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet output (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Base directory (default: ~/.plugin-scout)
    #[arg(long, global = true)]
    pub base_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run discovery, write artifacts, check integrity and back up
    Collect {
        /// Print the planned strategies and limits without any network call
        #[arg(short, long)]
        dry_run: bool,

        /// Ignore the cached collection
        #[arg(long)]
        force_refresh: bool,

        /// Treat validation warnings as errors
        #[arg(long)]
        strict: bool,

        /// Skip the post-run snapshot
        #[arg(long)]
        no_backup: bool,
    },

    /// Validate a local manifest file
    Validate {
        /// Path to a marketplace.json or plugin.json
        file: PathBuf,

        /// Treat warnings as errors
        #[arg(long)]
        strict: bool,

        /// Schema to apply (default: guessed from the document)
        #[arg(long, value_enum)]
        schema: Option<SchemaArg>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check written artifacts for consistency
    Integrity {
        /// Artifact directory (default: configured output directory)
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage artifact snapshots
    Backup {
        #[command(subcommand)]
        action: BackupAction,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum SchemaArg {
    Plugin,
    Marketplace,
}

#[derive(Subcommand)]
pub enum BackupAction {
    /// Snapshot the current artifacts
    Create,

    /// List snapshots in every tier
    List {
        /// Only this tier (daily, weekly, monthly)
        #[arg(long)]
        tier: Option<Tier>,
    },

    /// Check a snapshot's checksums without restoring it
    Verify {
        /// Snapshot ID
        id: String,
    },

    /// Restore a snapshot into the output directory
    Restore {
        /// Snapshot ID
        id: String,

        /// Restore somewhere else than the output directory
        #[arg(long)]
        target: Option<PathBuf>,
    },

    /// Promote and prune according to the retention policy
    Prune,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Get a config value
    Get {
        /// Config key (e.g., search.max_results)
        key: String,
    },

    /// List all config values
    List,

    /// Show config file path
    Path,

    /// Initialize config file with defaults
    Init,
}
