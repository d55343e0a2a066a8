use crate::archive::{ArchiveError, ArchiveWriter, data_member_name, next_archive_name};
use crate::change_log::{CHANGE_LOG_MEMBER, ChangeLogError, encode};
use crate::collect::{CollectError, collect, fingerprint};
use crate::config::BackupConfig;
use crate::diff_tree::{ChangeKind, DiffTree, keyed_path};
use crate::strategy::{DiffStrategy, FileState, HashAlgorithm};
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Name of the informational metadata member inside every archive.
pub const METADATA_MEMBER: &str = "metadata.toml";

#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("Collect error: {0}")]
    Collect(#[from] CollectError),
    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),
    #[error("Change log error: {0}")]
    ChangeLog(#[from] ChangeLogError),
    #[error("TOML serialization error: {0}")]
    Metadata(#[from] toml::ser::Error),
    #[error("IO error: {0}")]
    Io(std::io::Error),
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),
    #[error("Fingerprint mismatch: expected {expected}, got {actual}")]
    FingerprintMismatch { expected: String, actual: String },
}

#[derive(Debug, Default)]
pub struct BackupOptions {
    pub dry_run: bool,
    pub fingerprint: Option<String>,
}

#[derive(Debug)]
pub struct BackupResult {
    /// The archive written, or `None` for a dry run or an empty change set.
    pub archive: Option<PathBuf>,
    pub changes: DiffTree,
    pub fingerprint: String,
    /// Created and modified files, i.e. the number of `data/` members.
    pub files_stored: usize,
    pub deletions: usize,
}

#[derive(Debug, Serialize)]
struct ArchiveMetadata {
    created: String,
    strategy: DiffStrategy,
    #[serde(skip_serializing_if = "Option::is_none")]
    hash_algorithm: Option<HashAlgorithm>,
    files_stored: usize,
    deletions: usize,
}

/// Runs one backup cycle for `backup`.
///
/// Collects the pending change set and, if it is not empty, writes it as the
/// next archive in the chain: the contents of every created or modified file
/// under `data/`, the change log and a metadata member. Nothing is written
/// when there are no changes.
///
/// If `options.fingerprint` is given it must match the fingerprint of the
/// change set collected here, otherwise nothing is written. This guards
/// against files changing between a `status` and the `backup` that follows
/// it.
///
/// The archive is assembled in a temporary file and only appears under its
/// `arch<N>.zip` name once complete. A failure part way leaves the chain as
/// it was.
pub fn run_backup(backup: &BackupConfig, options: BackupOptions) -> Result<BackupResult, BackupError> {
    let changes = collect(
        &backup.storage_dir,
        &backup.archive_dir,
        backup.strategy,
        backup.hash_algorithm,
        backup.missing_log,
    )?;
    let actual = fingerprint(&changes);

    // Checked after collecting so that the fingerprint describes exactly the
    // change set about to be written.
    if let Some(expected) = &options.fingerprint
        && expected != &actual
    {
        return Err(BackupError::FingerprintMismatch {
            expected: expected.clone(),
            actual,
        });
    }

    let files_stored = changes.count(ChangeKind::Created) + changes.count(ChangeKind::Modified);
    let deletions = changes.count(ChangeKind::Deleted);

    let mut result = BackupResult {
        archive: None,
        changes,
        fingerprint: actual,
        files_stored,
        deletions,
    };

    if !result.changes.has_changes() {
        info!("No changes since the last archive, nothing to write");
        return Ok(result);
    }

    if options.dry_run {
        return Ok(result);
    }

    let archive = write_archive(backup, &result.changes, files_stored, deletions)?;
    info!(
        "Wrote {} ({} files stored, {} deletions)",
        archive.display(),
        files_stored,
        deletions
    );
    result.archive = Some(archive);

    Ok(result)
}

fn write_archive(
    backup: &BackupConfig,
    changes: &DiffTree,
    files_stored: usize,
    deletions: usize,
) -> Result<PathBuf, BackupError> {
    let archive_dir = &backup.archive_dir;
    std::fs::create_dir_all(archive_dir).map_err(|e| io_error(archive_dir, e))?;

    let path = archive_dir.join(next_archive_name(archive_dir)?);
    let mut writer = ArchiveWriter::create(&path, backup.compression_options())?;
    debug!("Assembling {}", writer.path().display());

    for (relative, entry) in changes.flatten() {
        let member = data_member_name(&relative);
        match entry.state() {
            None => {}
            // The recorded content is exactly what was compared.
            Some(FileState::Content(bytes)) => writer.write_member(&member, bytes)?,
            Some(_) => {
                let source = keyed_path(Some(&backup.storage_dir), &relative);
                writer.write_file(&member, &source)?;
            }
        }
    }

    writer.write_member(CHANGE_LOG_MEMBER, encode(changes)?.as_bytes())?;

    let metadata = ArchiveMetadata {
        created: chrono::Local::now().to_rfc3339(),
        strategy: backup.strategy,
        hash_algorithm: backup.hash_algorithm,
        files_stored,
        deletions,
    };
    writer.write_member(METADATA_MEMBER, toml::to_string(&metadata)?.as_bytes())?;

    Ok(writer.finish()?)
}

fn io_error(path: &Path, e: std::io::Error) -> BackupError {
    if e.kind() == ErrorKind::PermissionDenied {
        BackupError::PermissionDenied(path.to_path_buf())
    } else {
        BackupError::Io(e)
    }
}
