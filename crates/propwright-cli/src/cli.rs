use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use propwright_core::ScanMode;

/// Conditional property rules for a markdown vault.
///
/// Rules are read from the vault's settings file; older rule shapes are
/// migrated in place on load.
#[derive(Parser, Debug)]
#[command(name = "propwright", about = "Conditional property rules for a markdown vault", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Vault root directory
    #[arg(long, global = true, default_value = ".")]
    pub vault: PathBuf,

    /// Settings file (default: <vault>/.propwright/settings.json)
    #[arg(long, global = true)]
    pub settings: Option<PathBuf>,

    /// Log rule evaluation details
    #[arg(long, short, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run rules over the notes in scope
    Run {
        /// Override the configured scan scope
        #[arg(long, value_enum)]
        scope: Option<ScopeArg>,

        /// Override the configured note count for latest-N scopes
        #[arg(long)]
        count: Option<u32>,

        /// Run a single rule by its position (0-based)
        #[arg(long)]
        rule: Option<usize>,

        /// Report changes without writing them
        #[arg(long)]
        dry_run: bool,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run every rule against one note
    RunFile {
        /// Note path, absolute or relative to the vault
        path: PathBuf,

        /// Report changes without writing them
        #[arg(long)]
        dry_run: bool,
    },

    /// Upgrade the settings file to the current schema version
    Migrate,

    /// Validate the settings file and report rule problems
    Check,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScopeArg {
    LatestCreated,
    LatestModified,
    EntireVault,
}

impl From<ScopeArg> for ScanMode {
    fn from(arg: ScopeArg) -> Self {
        match arg {
            ScopeArg::LatestCreated => ScanMode::LatestCreated,
            ScopeArg::LatestModified => ScanMode::LatestModified,
            ScopeArg::EntireVault => ScanMode::EntireVault,
        }
    }
}

impl Cli {
    pub fn settings_path(&self) -> PathBuf {
        self.settings
            .clone()
            .unwrap_or_else(|| self.vault.join(".propwright").join("settings.json"))
    }
}
