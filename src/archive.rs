//! Zip-backed archive store.
//!
//! Archives live flat in one directory and are named `arch<N>.zip`, where `N`
//! is a sequence index allocated by [`next_archive_name`]. Newer archives have
//! higher indices.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};
use zip::write::SimpleFileOptions;

const ARCHIVE_PREFIX: &str = "arch";
const ARCHIVE_SUFFIX: &str = ".zip";

/// Directory inside an archive under which file contents are stored.
pub const DATA_PREFIX: &str = "data/";

/// The member name under which the file at `relative_name` is stored.
pub fn data_member_name(relative_name: &str) -> String {
    format!("{DATA_PREFIX}{relative_name}")
}

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("IO error: {0}")]
    Io(std::io::Error),
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),
    #[error("Zip error in {archive}: {source}")]
    Zip {
        archive: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
    #[error("Archive already exists: {0}")]
    AlreadyExists(PathBuf),
    #[error("Member {member} not found in {archive}")]
    MemberNotFound { archive: PathBuf, member: String },
    #[error("Destination already exists: {0}")]
    DestinationExists(PathBuf),
    #[error("No archive index left after {0}")]
    IndexExhausted(PathBuf),
}

fn io_error(path: &Path, e: std::io::Error) -> ArchiveError {
    if e.kind() == ErrorKind::PermissionDenied {
        ArchiveError::PermissionDenied(path.to_path_buf())
    } else {
        ArchiveError::Io(e)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Compression {
    Stored,
    #[default]
    Deflated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompressionOptions {
    pub method: Compression,
    /// Passed through to the zip encoder; `None` uses its default.
    pub level: Option<i64>,
}

impl CompressionOptions {
    fn file_options(&self) -> SimpleFileOptions {
        let method = match self.method {
            Compression::Stored => zip::CompressionMethod::Stored,
            Compression::Deflated => zip::CompressionMethod::Deflated,
        };
        let options = SimpleFileOptions::default().compression_method(method);
        match self.method {
            Compression::Stored => options,
            Compression::Deflated => options.compression_level(self.level),
        }
    }
}

/// An archive under construction.
///
/// Members are written to a temporary file next to the final path; nothing is
/// visible under the archive's name until [`ArchiveWriter::finish`] succeeds.
pub struct ArchiveWriter {
    path: PathBuf,
    zip: zip::ZipWriter<NamedTempFile>,
    options: SimpleFileOptions,
}

impl ArchiveWriter {
    /// Starts a new archive at `path`. Fails if `path` already exists.
    pub fn create(path: &Path, compression: CompressionOptions) -> Result<Self, ArchiveError> {
        if path.exists() {
            return Err(ArchiveError::AlreadyExists(path.to_path_buf()));
        }

        let parent = path.parent().unwrap_or(Path::new("."));
        let temp_file = NamedTempFile::new_in(parent).map_err(|e| io_error(parent, e))?;

        Ok(ArchiveWriter {
            path: path.to_path_buf(),
            zip: zip::ZipWriter::new(temp_file),
            options: compression.file_options(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_member(&mut self, name: &str, bytes: &[u8]) -> Result<(), ArchiveError> {
        debug!("Writing member {} to {}", name, self.path.display());
        self.zip
            .start_file(name, self.options.clone())
            .map_err(|source| self.zip_error(source))?;
        self.zip.write_all(bytes).map_err(ArchiveError::Io)?;
        Ok(())
    }

    /// Streams the file at `source` into member `name`.
    pub fn write_file(&mut self, name: &str, source: &Path) -> Result<(), ArchiveError> {
        debug!(
            "Storing {} as {} in {}",
            source.display(),
            name,
            self.path.display()
        );
        let mut file = File::open(source).map_err(|e| io_error(source, e))?;
        self.zip
            .start_file(name, self.options.clone())
            .map_err(|source| self.zip_error(source))?;
        std::io::copy(&mut file, &mut self.zip).map_err(|e| io_error(source, e))?;
        Ok(())
    }

    /// Finalizes the archive and moves it into place.
    ///
    /// The rename refuses to replace an existing file, so two writers racing
    /// for the same name cannot clobber each other.
    pub fn finish(self) -> Result<PathBuf, ArchiveError> {
        let path = self.path;
        let temp_file = self.zip.finish().map_err(|source| ArchiveError::Zip {
            archive: path.clone(),
            source,
        })?;

        temp_file.as_file().sync_all().map_err(ArchiveError::Io)?;

        temp_file.persist_noclobber(&path).map_err(|e| {
            if e.error.kind() == ErrorKind::AlreadyExists {
                ArchiveError::AlreadyExists(path.clone())
            } else {
                io_error(&path, e.error)
            }
        })?;

        Ok(path)
    }

    fn zip_error(&self, source: zip::result::ZipError) -> ArchiveError {
        ArchiveError::Zip {
            archive: self.path.clone(),
            source,
        }
    }
}

pub struct ArchiveReader {
    path: PathBuf,
    zip: zip::ZipArchive<File>,
}

impl ArchiveReader {
    pub fn open(path: &Path) -> Result<Self, ArchiveError> {
        let file = File::open(path).map_err(|e| io_error(path, e))?;
        let zip = zip::ZipArchive::new(file).map_err(|source| ArchiveError::Zip {
            archive: path.to_path_buf(),
            source,
        })?;
        Ok(ArchiveReader {
            path: path.to_path_buf(),
            zip,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    #[allow(dead_code)]
    pub fn member_names(&self) -> BTreeSet<String> {
        self.zip.file_names().map(str::to_string).collect()
    }

    pub fn read_member(&mut self, name: &str) -> Result<Vec<u8>, ArchiveError> {
        let mut member = self
            .zip
            .by_name(name)
            .map_err(|e| member_error(&self.path, name, e))?;
        let mut bytes = Vec::new();
        member.read_to_end(&mut bytes).map_err(ArchiveError::Io)?;
        Ok(bytes)
    }

    /// Copies member `name` to `destination`, creating parent directories.
    ///
    /// Never overwrites: fails with `DestinationExists` if anything is
    /// already at `destination`.
    pub fn extract_member(&mut self, name: &str, destination: &Path) -> Result<(), ArchiveError> {
        if destination.exists() {
            return Err(ArchiveError::DestinationExists(destination.to_path_buf()));
        }

        let mut member = self
            .zip
            .by_name(name)
            .map_err(|e| member_error(&self.path, name, e))?;

        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
        }

        let mut output = File::create_new(destination).map_err(|e| {
            if e.kind() == ErrorKind::AlreadyExists {
                ArchiveError::DestinationExists(destination.to_path_buf())
            } else {
                io_error(destination, e)
            }
        })?;
        std::io::copy(&mut member, &mut output).map_err(|e| io_error(destination, e))?;
        output.sync_all().map_err(ArchiveError::Io)?;

        Ok(())
    }
}

fn member_error(archive: &Path, name: &str, e: zip::result::ZipError) -> ArchiveError {
    match e {
        zip::result::ZipError::FileNotFound => ArchiveError::MemberNotFound {
            archive: archive.to_path_buf(),
            member: name.to_string(),
        },
        source => ArchiveError::Zip {
            archive: archive.to_path_buf(),
            source,
        },
    }
}

/// Parses the sequence index out of an `arch<N>.zip` file name.
pub fn archive_index(file_name: &str) -> Option<u64> {
    let digits = file_name
        .strip_prefix(ARCHIVE_PREFIX)?
        .strip_suffix(ARCHIVE_SUFFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

pub fn archive_file_name(index: u64) -> String {
    format!("{ARCHIVE_PREFIX}{index}{ARCHIVE_SUFFIX}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveRef {
    pub index: u64,
    pub path: PathBuf,
}

/// Lists the archives in `dir`, newest (highest index) first.
///
/// Only regular files named `arch<N>.zip` are considered. Indices compare
/// numerically, so `arch10.zip` is newer than `arch9.zip`. A missing
/// directory is an empty chain.
pub fn list_archive_files(dir: &Path) -> Result<Vec<ArchiveRef>, ArchiveError> {
    let read_dir = match std::fs::read_dir(dir) {
        Ok(read_dir) => read_dir,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(io_error(dir, e)),
    };

    let mut archives = Vec::new();

    for entry in read_dir {
        let entry = entry.map_err(ArchiveError::Io)?;
        let file_name = entry.file_name();
        let Some(index) = file_name.to_str().and_then(archive_index) else {
            continue;
        };
        let file_type = entry.file_type().map_err(ArchiveError::Io)?;
        if !file_type.is_file() {
            continue;
        }
        archives.push(ArchiveRef {
            index,
            path: entry.path(),
        });
    }

    archives.sort_by(|a, b| b.index.cmp(&a.index).then_with(|| a.path.cmp(&b.path)));

    for pair in archives.windows(2) {
        if pair[0].index == pair[1].index {
            warn!(
                "Archives {} and {} share sequence index {}",
                pair[0].path.display(),
                pair[1].path.display(),
                pair[0].index
            );
        }
    }

    Ok(archives)
}

/// Returns the file name the next archive in `dir` should get.
pub fn next_archive_name(dir: &Path) -> Result<String, ArchiveError> {
    let archives = list_archive_files(dir)?;
    let next = match archives.first() {
        Some(newest) => newest
            .index
            .checked_add(1)
            .ok_or_else(|| ArchiveError::IndexExhausted(newest.path.clone()))?,
        None => 1,
    };
    Ok(archive_file_name(next))
}
