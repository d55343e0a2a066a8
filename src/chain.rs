//! Resolution of "last known state" across the archive chain.
//!
//! Archives are scanned newest first and the first change log that mentions a
//! file wins: a record in a newer archive shadows every older record for the
//! same path. Logs are decoded on first use and cached for the lifetime of the
//! [`ArchiveChain`], so a lookup that resolves in the newest archive never
//! opens the older ones.

use crate::archive::{ArchiveError, ArchiveReader, ArchiveRef, list_archive_files};
use crate::change_log::{CHANGE_LOG_MEMBER, ChangeLogError, decode};
use crate::diff_tree::{ChangeKind, DiffEntry};
use crate::strategy::{DiffStrategy, FileState};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),
    #[error("Change log diff-log.csv missing from {0}")]
    MissingLog(PathBuf),
    #[error("Corrupt change log in {archive}: {source}")]
    CorruptLog {
        archive: PathBuf,
        #[source]
        source: ChangeLogError,
    },
    #[error("Change log in {0} is not valid UTF-8")]
    NonUtf8Log(PathBuf),
}

/// What to do with an archive that has no change log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum MissingLogPolicy {
    /// Abort the resolution with `ResolveError::MissingLog`.
    #[default]
    Fail,
    /// Treat the archive as recording no changes, after logging a warning.
    TreatAsEmpty,
}

/// A record found in the chain together with the archive it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Located {
    pub archive: PathBuf,
    pub entry: DiffEntry,
}

type Log = BTreeMap<PathBuf, DiffEntry>;

pub struct ArchiveChain {
    strategy: DiffStrategy,
    missing_log: MissingLogPolicy,
    archives: Vec<ArchiveRef>,
    logs: Vec<Option<Log>>,
}

impl ArchiveChain {
    /// Lists the archives in `dir`. No change log is read yet.
    pub fn open(
        dir: &Path,
        strategy: DiffStrategy,
        missing_log: MissingLogPolicy,
    ) -> Result<Self, ResolveError> {
        let archives = list_archive_files(dir)?;
        debug!("Found {} archives in {}", archives.len(), dir.display());
        let logs = vec![None; archives.len()];
        Ok(ArchiveChain {
            strategy,
            missing_log,
            archives,
            logs,
        })
    }

    pub fn strategy(&self) -> DiffStrategy {
        self.strategy
    }

    /// Finds the newest record for `relative_name`.
    ///
    /// `Ok(None)` means no archive mentions the file. An archive whose log is
    /// missing or corrupt stops the scan with an error rather than being
    /// skipped, since skipping it could surface an older, shadowed record.
    pub fn locate(&mut self, relative_name: &str) -> Result<Option<Located>, ResolveError> {
        let key = PathBuf::from(relative_name);

        for position in 0..self.archives.len() {
            let log = self.log(position)?;
            if let Some(entry) = log.get(&key) {
                let entry = entry.clone();
                let archive = self.archives[position].path.clone();
                debug!(
                    "{} resolved to {} record in {}",
                    relative_name,
                    entry.kind().symbol(),
                    archive.display()
                );
                return Ok(Some(Located { archive, entry }));
            }
        }

        Ok(None)
    }

    /// The most recently recorded state of `relative_name`.
    ///
    /// `Ok(None)` if the file was never recorded or its newest record is a
    /// deletion.
    pub fn resolve(&mut self, relative_name: &str) -> Result<Option<FileState>, ResolveError> {
        Ok(self
            .locate(relative_name)?
            .and_then(|located| located.entry.into_state()))
    }

    /// Every path whose newest record is not a deletion.
    ///
    /// This reads every log in the chain.
    pub fn live_paths(&mut self) -> Result<BTreeSet<String>, ResolveError> {
        let mut seen = BTreeSet::new();
        let mut live = BTreeSet::new();

        for position in 0..self.archives.len() {
            for (path, entry) in self.log(position)? {
                let path = path.to_string_lossy().into_owned();
                if !seen.insert(path.clone()) {
                    continue;
                }
                if entry.kind() != ChangeKind::Deleted {
                    live.insert(path);
                }
            }
        }

        Ok(live)
    }

    fn log(&mut self, position: usize) -> Result<&Log, ResolveError> {
        let log = match self.logs[position].take() {
            Some(log) => log,
            None => self.load_log(&self.archives[position].path)?,
        };
        let log: &Log = self.logs[position].insert(log);
        Ok(log)
    }

    fn load_log(&self, archive: &Path) -> Result<Log, ResolveError> {
        debug!("Reading change log of {}", archive.display());

        let mut reader = ArchiveReader::open(archive)?;
        let bytes = match reader.read_member(CHANGE_LOG_MEMBER) {
            Ok(bytes) => bytes,
            Err(ArchiveError::MemberNotFound { .. }) => {
                return match self.missing_log {
                    MissingLogPolicy::Fail => Err(ResolveError::MissingLog(archive.to_path_buf())),
                    MissingLogPolicy::TreatAsEmpty => {
                        warn!(
                            "{} has no change log; treating it as recording no changes",
                            archive.display()
                        );
                        Ok(Log::new())
                    }
                };
            }
            Err(e) => return Err(e.into()),
        };

        let text =
            String::from_utf8(bytes).map_err(|_| ResolveError::NonUtf8Log(archive.to_path_buf()))?;

        decode(&text, self.strategy, None).map_err(|source| ResolveError::CorruptLog {
            archive: archive.to_path_buf(),
            source,
        })
    }
}

/// One-shot resolution of `relative_name` against the archives in `dir`.
#[allow(dead_code)]
pub fn resolve(
    relative_name: &str,
    dir: &Path,
    strategy: DiffStrategy,
) -> Result<Option<FileState>, ResolveError> {
    ArchiveChain::open(dir, strategy, MissingLogPolicy::Fail)?.resolve(relative_name)
}
