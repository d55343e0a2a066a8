use crate::chain::{ArchiveChain, MissingLogPolicy, ResolveError};
use crate::diff_tree::{DiffEntry, DiffTree, join_relative};
use crate::dir_list::{DirListError, FsEntry, list_directory};
use crate::probe::{ProbeError, archived_state, current_state};
use crate::strategy::{DiffStrategy, FileState, HashAlgorithm};
use crate::util::hashing::hash_field;
use base64::Engine;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    #[error("Probe error: {0}")]
    Probe(#[from] ProbeError),
    #[error("Archive chain error: {0}")]
    Resolve(#[from] ResolveError),
    #[error("Directory listing error: {0}")]
    DirList(#[from] DirListError),
}

/// Compares `storage_dir` against the archives in `archive_dir`.
///
/// Walks the storage tree in name order and records every file whose current
/// state differs from its newest archived state. Files that were archived
/// but no longer exist are recorded as deletions. Every visited subdirectory
/// appears in the result, even when nothing below it changed.
///
/// # Errors
///
/// * `ProbeError::MissingHashAlgorithm` if `strategy` is `ContentHash` and no
///   algorithm is given. Nothing is read in that case.
/// * Listing failures anywhere under `storage_dir`, including the root itself.
///   A partial walk is never returned.
/// * Any archive whose change log cannot be read (see [`MissingLogPolicy`]).
pub fn collect(
    storage_dir: &Path,
    archive_dir: &Path,
    strategy: DiffStrategy,
    hash_algorithm: Option<HashAlgorithm>,
    missing_log: MissingLogPolicy,
) -> Result<DiffTree, CollectError> {
    if strategy == DiffStrategy::ContentHash && hash_algorithm.is_none() {
        return Err(ProbeError::MissingHashAlgorithm.into());
    }

    let mut chain = ArchiveChain::open(archive_dir, strategy, missing_log)?;
    collect_with_chain(storage_dir, archive_dir, &mut chain, hash_algorithm)
}

pub(crate) fn collect_with_chain(
    storage_dir: &Path,
    archive_dir: &Path,
    chain: &mut ArchiveChain,
    hash_algorithm: Option<HashAlgorithm>,
) -> Result<DiffTree, CollectError> {
    let storage_root = storage_dir.canonicalize().map_err(|e| {
        if e.kind() == ErrorKind::PermissionDenied {
            DirListError::PermissionDenied(storage_dir.to_path_buf())
        } else {
            DirListError::Io(e)
        }
    })?;
    // Only relevant when the archives live inside the storage tree.
    let excluded = archive_dir.canonicalize().ok();

    let live = chain.live_paths()?;
    debug!("{} files are live in the archive chain", live.len());

    let mut walker = Walker {
        chain,
        hash_algorithm,
        excluded,
        live,
    };

    let listing = walker.list(&storage_root)?;
    walker.walk_directory(&storage_root, "", listing)
}

/// Classifies one file against its newest archived record.
///
/// Returns `None` when the current and archived states are equal, which
/// includes the case where neither exists.
pub fn detect(
    file_path: &Path,
    relative_name: &str,
    chain: &mut ArchiveChain,
    hash_algorithm: Option<HashAlgorithm>,
) -> Result<Option<DiffEntry>, CollectError> {
    let current = current_state(file_path, chain.strategy(), hash_algorithm)?;
    let archived = archived_state(relative_name, chain)?;

    let entry = match (archived, current) {
        (archived, current) if archived == current => None,
        (None, Some(current)) => Some(DiffEntry::created(current)),
        (Some(_), None) => Some(DiffEntry::deleted()),
        (Some(_), Some(current)) => Some(DiffEntry::modified(current)),
        (None, None) => None,
    };

    if let Some(entry) = &entry {
        debug!("{} {}", entry.kind().symbol(), relative_name);
    }

    Ok(entry)
}

/// A stable identifier for a change set.
///
/// Base64-encoded SHA-256 over each change's path, kind and state. Two
/// collections of the same storage tree against the same archives produce the
/// same fingerprint as long as nothing changed in between.
pub fn fingerprint(tree: &DiffTree) -> String {
    let mut hasher = Sha256::new();

    for (path, entry) in tree.flatten() {
        hash_field(&mut hasher, path.as_bytes());
        hash_field(&mut hasher, entry.kind().symbol().as_bytes());
        let state = entry.state().map(FileState::to_log_text).unwrap_or_default();
        hash_field(&mut hasher, state.as_bytes());
    }

    base64::engine::general_purpose::STANDARD.encode(hasher.finalize())
}

struct Walker<'a> {
    chain: &'a mut ArchiveChain,
    hash_algorithm: Option<HashAlgorithm>,
    excluded: Option<PathBuf>,
    live: BTreeSet<String>,
}

impl Walker<'_> {
    fn list(&self, dir: &Path) -> Result<BTreeMap<String, FsEntry>, DirListError> {
        list_directory(dir, self.excluded.as_deref())
    }

    /// Builds the subtree for `dir` from its listing.
    ///
    /// A directory that no longer exists is walked with an empty listing so
    /// that every live file below it is detected as deleted.
    fn walk_directory(
        &mut self,
        dir: &Path,
        prefix: &str,
        fs_entries: BTreeMap<String, FsEntry>,
    ) -> Result<DiffTree, CollectError> {
        let known = known_children(&self.live, prefix);
        let mut tree = DiffTree::new();

        for (name, fs_entry) in &fs_entries {
            let path = dir.join(name);
            let relative = join_relative(prefix, name);

            // A path that changed type is recorded as deleted first; the new
            // node is picked up once the deletion has been archived.
            match (fs_entry, known.get(name)) {
                (FsEntry::Dir, Some(KnownChild::File)) => {
                    warn!(
                        "{relative} was archived as a file and is now a directory, \
                         its contents are collected after the next backup"
                    );
                    tree.add_entry(name.as_str(), DiffEntry::deleted());
                }
                (FsEntry::File, Some(KnownChild::Dir)) => {
                    warn!(
                        "{relative} was archived as a directory and is now a file, \
                         it is collected after the next backup"
                    );
                    tree.add_subtree(name.as_str(), self.deleted_subtree(&relative));
                }
                (FsEntry::Dir, _) => {
                    let listing = self.list(&path)?;
                    let subtree = self.walk_directory(&path, &relative, listing)?;
                    tree.add_subtree(name.as_str(), subtree);
                }
                (FsEntry::File, _) => {
                    if let Some(entry) = detect(&path, &relative, self.chain, self.hash_algorithm)? {
                        tree.add_entry(name.as_str(), entry);
                    }
                }
                (FsEntry::Symlink | FsEntry::Other, known_kind) => {
                    if matches!(fs_entry, FsEntry::Symlink) {
                        warn!("Skipping symlink {}", path.display());
                    } else {
                        warn!("Skipping special file {}", path.display());
                    }
                    match known_kind {
                        Some(KnownChild::File) => {
                            tree.add_entry(name.as_str(), DiffEntry::deleted());
                        }
                        Some(KnownChild::Dir) => {
                            tree.add_subtree(name.as_str(), self.deleted_subtree(&relative));
                        }
                        None => {}
                    }
                }
            }
        }

        for (name, kind) in known {
            if fs_entries.contains_key(&name) {
                continue;
            }
            let path = dir.join(&name);
            let relative = join_relative(prefix, &name);

            match kind {
                KnownChild::Dir => {
                    let subtree = self.walk_directory(&path, &relative, BTreeMap::new())?;
                    tree.add_subtree(name, subtree);
                }
                KnownChild::File => {
                    if let Some(entry) = detect(&path, &relative, self.chain, self.hash_algorithm)? {
                        tree.add_entry(name, entry);
                    }
                }
            }
        }

        Ok(tree)
    }

    /// Deletions for every live file below `prefix`, without touching the
    /// filesystem.
    fn deleted_subtree(&self, prefix: &str) -> DiffTree {
        let mut tree = DiffTree::new();

        for (name, kind) in known_children(&self.live, prefix) {
            match kind {
                KnownChild::File => {
                    debug!("- {}", join_relative(prefix, &name));
                    tree.add_entry(name, DiffEntry::deleted());
                }
                KnownChild::Dir => {
                    let subtree = self.deleted_subtree(&join_relative(prefix, &name));
                    tree.add_subtree(name, subtree);
                }
            }
        }

        tree
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KnownChild {
    File,
    Dir,
}

/// The immediate children of `prefix` implied by the live archived paths.
fn known_children(live: &BTreeSet<String>, prefix: &str) -> BTreeMap<String, KnownChild> {
    let mut children = BTreeMap::new();

    let start = if prefix.is_empty() {
        String::new()
    } else {
        format!("{prefix}/")
    };

    for path in live.range(start.clone()..) {
        let Some(rest) = path.strip_prefix(start.as_str()) else {
            break;
        };
        match rest.split_once('/') {
            Some((child, _)) => {
                children.insert(child.to_string(), KnownChild::Dir);
            }
            None => {
                children.entry(rest.to_string()).or_insert(KnownChild::File);
            }
        }
    }

    children
}
