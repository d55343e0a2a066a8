use crate::archive::{ArchiveError, ArchiveReader, data_member_name};
use crate::chain::{ArchiveChain, ResolveError};
use crate::config::BackupConfig;
use crate::diff_tree::ChangeKind;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum RestoreError {
    #[error("Archive chain error: {0}")]
    Resolve(#[from] ResolveError),
    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),
    #[error("{0} has no archived version")]
    NotArchived(String),
    #[error("{path} was deleted as of {archive}")]
    Deleted { path: String, archive: PathBuf },
}

/// Extracts the last archived version of `relative_name` to `destination`.
///
/// The newest record for the file decides which archive the content comes
/// from. Returns that archive's path. `destination` is never overwritten.
pub fn restore_file(
    backup: &BackupConfig,
    relative_name: &str,
    destination: &Path,
) -> Result<PathBuf, RestoreError> {
    let relative_name = relative_name.trim_start_matches("./");

    let mut chain = ArchiveChain::open(&backup.archive_dir, backup.strategy, backup.missing_log)?;
    let located = chain
        .locate(relative_name)?
        .ok_or_else(|| RestoreError::NotArchived(relative_name.to_string()))?;

    if located.entry.kind() == ChangeKind::Deleted {
        return Err(RestoreError::Deleted {
            path: relative_name.to_string(),
            archive: located.archive,
        });
    }

    let mut reader = ArchiveReader::open(&located.archive)?;
    reader.extract_member(&data_member_name(relative_name), destination)?;

    info!(
        "Restored {} from {} to {}",
        relative_name,
        reader.path().display(),
        destination.display()
    );

    Ok(located.archive)
}
