mod help_text;

use crate::archive::Compression;
use crate::chain::MissingLogPolicy;
use crate::strategy::{DiffStrategy, HashAlgorithm};
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// Incremental backups with self-describing archive chains
#[derive(Parser, Debug)]
#[command(name = "chainvault", version, about, long_about = help_text::ROOT_LONG_ABOUT)]
pub struct Cli {
    /// Change to DIR before doing anything
    #[arg(short = 'C', long, global = true, value_name = "DIR")]
    pub directory: Option<PathBuf>,

    /// Configuration file
    #[arg(
        long,
        global = true,
        value_name = "PATH",
        default_value = "chainvault.toml"
    )]
    pub config: PathBuf,

    /// Increase verbosity (-v for info, -vv for debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Add a backup definition to the configuration file
    #[command(long_about = help_text::INIT_LONG_ABOUT)]
    Init {
        /// Name of the new backup
        #[arg(long)]
        name: String,

        /// Directory tree to back up
        #[arg(long, value_name = "DIR")]
        storage: PathBuf,

        /// Directory holding the archive chain
        #[arg(long, value_name = "DIR")]
        archive: PathBuf,

        /// How files are compared against their archived state
        #[arg(long, value_enum)]
        strategy: DiffStrategy,

        /// Hash algorithm (required with --strategy content-hash)
        #[arg(long, value_enum, value_name = "ALGORITHM")]
        hash: Option<HashAlgorithm>,

        /// Compression method for archive members
        #[arg(long, value_enum, default_value = "deflated")]
        compression: Compression,

        /// Compression level passed to the encoder
        #[arg(long, value_name = "LEVEL")]
        level: Option<i64>,

        /// What to do with an archive that has no change log
        #[arg(long, value_enum, default_value = "fail")]
        missing_log: MissingLogPolicy,
    },

    /// Show changes not yet recorded in an archive
    #[command(long_about = help_text::STATUS_LONG_ABOUT)]
    Status {
        /// Backup to inspect (optional if only one is configured)
        #[arg(long)]
        name: Option<String>,
    },

    /// Write pending changes as the next archive in the chain
    #[command(long_about = help_text::BACKUP_LONG_ABOUT)]
    Backup {
        /// Backup to run (optional if only one is configured)
        #[arg(long)]
        name: Option<String>,

        /// Only proceed if changes match this fingerprint from status
        #[arg(long, value_name = "FINGERPRINT")]
        fingerprint: Option<String>,

        /// Show what would be archived without writing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the last archived state of a file
    State {
        /// Backup to inspect (optional if only one is configured)
        #[arg(long)]
        name: Option<String>,

        /// Path relative to the storage directory, with '/' separators
        #[arg(value_name = "PATH")]
        path: String,
    },

    /// Extract the last archived version of a file
    Restore {
        /// Backup to restore from (optional if only one is configured)
        #[arg(long)]
        name: Option<String>,

        /// Path relative to the storage directory, with '/' separators
        #[arg(value_name = "PATH")]
        path: String,

        /// Where to write the file (must not exist)
        #[arg(value_name = "DEST")]
        destination: PathBuf,
    },
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}
