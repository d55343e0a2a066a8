mod archive;
mod backup;
mod chain;
mod change_log;
mod cli;
mod collect;
mod config;
mod diff_tree;
mod dir_list;
mod probe;
mod report;
mod restore;
mod strategy;
mod util;

use backup::{BackupOptions, run_backup};
use chain::ArchiveChain;
use cli::{Cli, Command};
use config::{BackupConfig, Config, ConfigError};
use std::fmt as stdfmt;
use std::io::{IsTerminal, stderr};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{Event, Level, Subscriber, error, info, warn};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt as tracing_fmt;
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;

struct VaultExitCode;

impl VaultExitCode {
    /// Exit code used when `status` finds changes not yet archived.
    fn pending_changes() -> ExitCode {
        ExitCode::from(1)
    }

    /// Exit code used for other errors (I/O errors, invalid arguments, etc.).
    fn any_error() -> ExitCode {
        ExitCode::from(255)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    if let Some(directory) = &cli.directory
        && let Err(e) = std::env::set_current_dir(directory)
    {
        error!(
            "Failed to change directory to {}: {}",
            directory.display(),
            e
        );
        return VaultExitCode::any_error();
    }

    let config_path = cli.config;

    let result: anyhow::Result<ExitCode> = match cli.command {
        Command::Init {
            name,
            storage,
            archive,
            strategy,
            hash,
            compression,
            level,
            missing_log,
        } => {
            let mut backup = BackupConfig::new(storage, archive, strategy);
            backup.hash_algorithm = hash;
            backup.compression = compression;
            backup.compression_level = level;
            backup.missing_log = missing_log;
            handle_init(&config_path, &name, backup)
        }
        Command::Status { name } => handle_status(&config_path, name.as_deref()),
        Command::Backup {
            name,
            fingerprint,
            dry_run,
        } => handle_backup(
            &config_path,
            name.as_deref(),
            BackupOptions {
                dry_run,
                fingerprint,
            },
        ),
        Command::State { name, path } => handle_state(&config_path, name.as_deref(), &path),
        Command::Restore {
            name,
            path,
            destination,
        } => handle_restore(&config_path, name.as_deref(), &path, destination),
    };

    match result {
        Ok(exit_code) => exit_code,
        Err(err) => {
            error!("{err}");
            VaultExitCode::any_error()
        }
    }
}

fn handle_init(config_path: &Path, name: &str, backup: BackupConfig) -> anyhow::Result<ExitCode> {
    let mut config = match Config::load(config_path) {
        Ok(config) => config,
        Err(ConfigError::NotFound(_)) => Config::new(),
        Err(e) => return Err(e.into()),
    };

    if !backup.storage_dir.is_dir() {
        warn!(
            "Storage directory {} does not exist yet",
            backup.storage_dir.display()
        );
    }

    config.add(name, backup)?;
    config.save(config_path)?;

    info!("Added backup {name} to {}", config_path.display());

    Ok(ExitCode::SUCCESS)
}

fn handle_status(config_path: &Path, name: Option<&str>) -> anyhow::Result<ExitCode> {
    let config = Config::load(config_path)?;
    let (name, backup) = config.select(name)?;

    let changes = collect::collect(
        &backup.storage_dir,
        &backup.archive_dir,
        backup.strategy,
        backup.hash_algorithm,
        backup.missing_log,
    )?;

    if !changes.has_changes() {
        info!("No changes since the last archive of {name}");
        return Ok(ExitCode::SUCCESS);
    }

    report::print_changes(&changes);

    let fingerprint = collect::fingerprint(&changes);
    println!();
    println!("Fingerprint: {fingerprint}");

    info!(
        "Run 'chainvault backup --name {} --fingerprint {}' to archive these changes.",
        name, fingerprint
    );

    Ok(VaultExitCode::pending_changes())
}

fn handle_backup(
    config_path: &Path,
    name: Option<&str>,
    options: BackupOptions,
) -> anyhow::Result<ExitCode> {
    let config = Config::load(config_path)?;
    let (name, backup) = config.select(name)?;
    let dry_run = options.dry_run;

    let result = run_backup(backup, options)?;

    report::print_changes(&result.changes);

    if dry_run {
        info!(
            "DRY RUN - no archive was written (fingerprint {})",
            result.fingerprint
        );
    }

    match &result.archive {
        Some(archive) => info!(
            "Archived {} files and {} deletions of {} in {}",
            result.files_stored,
            result.deletions,
            name,
            archive.display()
        ),
        None if !result.changes.has_changes() => {
            info!("No changes since the last archive of {name}")
        }
        None => {}
    }

    Ok(ExitCode::SUCCESS)
}

fn handle_state(config_path: &Path, name: Option<&str>, path: &str) -> anyhow::Result<ExitCode> {
    let config = Config::load(config_path)?;
    let (_, backup) = config.select(name)?;

    let mut chain = ArchiveChain::open(&backup.archive_dir, backup.strategy, backup.missing_log)?;
    let located = chain.locate(path.trim_start_matches("./"))?;

    match located {
        Some(located) => {
            let archive_name = located
                .archive
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            info!(
                "Newest record is {} in {}",
                located.entry.kind().symbol(),
                archive_name
            );
            match located.entry.state() {
                Some(state) => println!("{}", report::format_state(state)),
                None => println!("absent (deleted in {archive_name})"),
            }
        }
        None => println!("absent"),
    }

    Ok(ExitCode::SUCCESS)
}

fn handle_restore(
    config_path: &Path,
    name: Option<&str>,
    path: &str,
    destination: PathBuf,
) -> anyhow::Result<ExitCode> {
    let config = Config::load(config_path)?;
    let (_, backup) = config.select(name)?;

    restore::restore_file(backup, path, &destination)?;

    Ok(ExitCode::SUCCESS)
}

fn init_tracing(verbose: u8) {
    let stderr_is_terminal = stderr().is_terminal();
    let formatter = EmojiFormatter { stderr_is_terminal };

    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let fmt_layer = tracing_fmt::layer()
        .event_format(formatter)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

struct EmojiFormatter {
    stderr_is_terminal: bool,
}

impl<S, N> FormatEvent<S, N> for EmojiFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> stdfmt::Result {
        if self.stderr_is_terminal {
            match *event.metadata().level() {
                Level::DEBUG => write!(writer, "🔍 ")?,
                Level::INFO => write!(writer, "ℹ️ ")?,
                Level::WARN => write!(writer, "⚠️  ")?,
                Level::ERROR => write!(writer, "❌️ ")?,
                _ => {}
            }
        } else {
            match *event.metadata().level() {
                Level::DEBUG => writer.write_str("DEBUG: ")?,
                Level::INFO => writer.write_str("INFO: ")?,
                Level::WARN => writer.write_str("WARN: ")?,
                Level::ERROR => writer.write_str("ERROR: ")?,
                _ => {}
            }
        }

        ctx.format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}
