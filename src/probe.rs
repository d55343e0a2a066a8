use crate::chain::{ArchiveChain, ResolveError};
use crate::strategy::{DiffStrategy, FileState, HashAlgorithm};
use crate::util::hashing::hex_digest;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("The content-hash strategy requires a hash algorithm")]
    MissingHashAlgorithm,
    #[error("IO error: {0}")]
    Io(std::io::Error),
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),
    #[error("File modified while reading: {0}")]
    ConcurrentModification(PathBuf),
}

fn io_error(path: &Path, e: std::io::Error) -> ProbeError {
    if e.kind() == ErrorKind::PermissionDenied {
        ProbeError::PermissionDenied(path.to_path_buf())
    } else {
        ProbeError::Io(e)
    }
}

/// Computes the comparable state of the file at `path`.
///
/// Returns `Ok(None)` if nothing exists at `path`. The hash algorithm is
/// checked before the filesystem is touched, so a misconfigured content-hash
/// strategy fails the same way whether or not the file exists.
///
/// # Errors
/// - `ProbeError::MissingHashAlgorithm`: `strategy` is `ContentHash` and no
///   algorithm was given
/// - `ProbeError::ConcurrentModification`: the file's mtime changed while its
///   content was being read. The absence of this error is *not* a guarantee
///   that the file was not modified.
/// - `ProbeError::Io` / `ProbeError::PermissionDenied`: any other failure
pub fn current_state(
    path: &Path,
    strategy: DiffStrategy,
    hash_algorithm: Option<HashAlgorithm>,
) -> Result<Option<FileState>, ProbeError> {
    if strategy == DiffStrategy::ContentHash && hash_algorithm.is_none() {
        return Err(ProbeError::MissingHashAlgorithm);
    }

    let metadata_before = match std::fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(io_error(path, e)),
    };
    let mtime_before = metadata_before.modified().map_err(ProbeError::Io)?;

    let state = match (strategy, hash_algorithm) {
        (DiffStrategy::ModificationTime, _) => {
            return Ok(Some(FileState::ModTime(unix_seconds(mtime_before))));
        }
        (DiffStrategy::ContentHash, Some(algorithm)) => {
            info!("Hashing {} ({algorithm})", path.display());
            let file = File::open(path).map_err(|e| io_error(path, e))?;
            FileState::Digest(hex_digest(algorithm, file).map_err(ProbeError::Io)?)
        }
        (DiffStrategy::ContentHash, None) => return Err(ProbeError::MissingHashAlgorithm),
        (DiffStrategy::RawContent, _) => {
            let mut file = File::open(path).map_err(|e| io_error(path, e))?;
            let mut content = Vec::new();
            file.read_to_end(&mut content).map_err(ProbeError::Io)?;
            FileState::Content(content)
        }
    };

    let mtime_after = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map_err(|e| io_error(path, e))?;
    if mtime_before != mtime_after {
        return Err(ProbeError::ConcurrentModification(path.to_path_buf()));
    }

    debug!("State of {} is {}", path.display(), state.to_log_text());

    Ok(Some(state))
}

/// Looks up the most recently archived state of `relative_name`.
///
/// `Ok(None)` means the chain has no live record for the file: it was never
/// recorded, or its newest record is a deletion.
pub fn archived_state(
    relative_name: &str,
    chain: &mut ArchiveChain,
) -> Result<Option<FileState>, ResolveError> {
    chain.resolve(relative_name)
}

/// Seconds since the Unix epoch, negative for earlier times.
fn unix_seconds(mtime: SystemTime) -> f64 {
    match mtime.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs_f64(),
        Err(e) => -e.duration().as_secs_f64(),
    }
}
