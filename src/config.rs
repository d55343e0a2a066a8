use crate::archive::{Compression, CompressionOptions};
use crate::chain::MissingLogPolicy;
use crate::strategy::{DiffStrategy, HashAlgorithm};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(std::io::Error),
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("Unsupported configuration version: {0}")]
    UnsupportedVersion(u32),
    #[error("Backup {0:?} uses the content-hash strategy but sets no hash_algorithm")]
    MissingHashAlgorithm(String),
    #[error("No backup named {0:?} is configured")]
    UnknownBackup(String),
    #[error("Several backups are configured, pick one with --name: {}", .0.join(", "))]
    AmbiguousBackup(Vec<String>),
    #[error("No backups are configured")]
    NoBackups,
    #[error("A backup named {0:?} already exists")]
    DuplicateBackup(String),
    #[error("Backup {name:?} sets compression_level {level}, expected 1 to 9")]
    InvalidCompressionLevel { name: String, level: i64 },
}

fn io_error(path: &Path, e: std::io::Error) -> ConfigError {
    match e.kind() {
        ErrorKind::PermissionDenied => ConfigError::PermissionDenied(path.to_path_buf()),
        ErrorKind::NotFound => ConfigError::NotFound(path.to_path_buf()),
        _ => ConfigError::Io(e),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct Metadata {
    version: u32,
}

/// Only the metadata section, so the version can be checked before the rest
/// of the file is interpreted. Unknown fields are deliberately accepted here.
#[derive(Debug, Deserialize)]
struct MetadataOnly {
    metadata: Metadata,
}

/// One storage tree and the directory its archive chain lives in.
///
/// Relative paths are interpreted relative to the working directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackupConfig {
    pub storage_dir: PathBuf,
    pub archive_dir: PathBuf,
    pub strategy: DiffStrategy,
    /// Required by, and only used with, the content-hash strategy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash_algorithm: Option<HashAlgorithm>,
    #[serde(default)]
    pub compression: Compression,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression_level: Option<i64>,
    #[serde(default)]
    pub missing_log: MissingLogPolicy,
}

impl BackupConfig {
    /// Deflate levels every zip backend accepts.
    const COMPRESSION_LEVELS: std::ops::RangeInclusive<i64> = 1..=9;

    pub fn new(storage_dir: PathBuf, archive_dir: PathBuf, strategy: DiffStrategy) -> Self {
        BackupConfig {
            storage_dir,
            archive_dir,
            strategy,
            hash_algorithm: None,
            compression: Compression::default(),
            compression_level: None,
            missing_log: MissingLogPolicy::default(),
        }
    }

    pub fn compression_options(&self) -> CompressionOptions {
        CompressionOptions {
            method: self.compression,
            level: self.compression_level,
        }
    }

    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        if self.strategy == DiffStrategy::ContentHash && self.hash_algorithm.is_none() {
            return Err(ConfigError::MissingHashAlgorithm(name.to_string()));
        }
        if let Some(level) = self.compression_level
            && !Self::COMPRESSION_LEVELS.contains(&level)
        {
            return Err(ConfigError::InvalidCompressionLevel {
                name: name.to_string(),
                level,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    metadata: Metadata,
    #[serde(default)]
    pub backups: BTreeMap<String, BackupConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Config::new()
    }
}

impl Config {
    const SUPPORTED_VERSION: u32 = 1;

    pub fn new() -> Self {
        Config {
            metadata: Metadata {
                version: Self::SUPPORTED_VERSION,
            },
            backups: BTreeMap::new(),
        }
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        // Check the version first so that a newer file fails with a version
        // error rather than an unknown-field error.
        let metadata_only: MetadataOnly = toml::from_str(content)?;

        if metadata_only.metadata.version != Self::SUPPORTED_VERSION {
            return Err(ConfigError::UnsupportedVersion(
                metadata_only.metadata.version,
            ));
        }

        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, backup) in &self.backups {
            backup.validate(name)?;
        }
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| io_error(path, e))?;
        Self::from_toml(&content)
    }

    /// Writes the configuration atomically: temp file, fsync, rename.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        use std::io::Write;

        let content = self.to_toml()?;

        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut temp_file =
            tempfile::NamedTempFile::new_in(parent).map_err(|e| io_error(parent, e))?;

        temp_file
            .write_all(content.as_bytes())
            .map_err(|e| io_error(path, e))?;
        temp_file.as_file().sync_all().map_err(ConfigError::Io)?;
        temp_file
            .persist(path)
            .map_err(|e| io_error(path, e.error))?;

        Ok(())
    }

    /// Adds a backup definition. Existing definitions are never replaced.
    pub fn add(&mut self, name: &str, backup: BackupConfig) -> Result<(), ConfigError> {
        if self.backups.contains_key(name) {
            return Err(ConfigError::DuplicateBackup(name.to_string()));
        }
        backup.validate(name)?;
        self.backups.insert(name.to_string(), backup);
        Ok(())
    }

    /// Picks the backup called `name`, or the only one if `name` is `None`.
    pub fn select(&self, name: Option<&str>) -> Result<(&str, &BackupConfig), ConfigError> {
        match name {
            Some(name) => self
                .backups
                .get_key_value(name)
                .map(|(name, backup)| (name.as_str(), backup))
                .ok_or_else(|| ConfigError::UnknownBackup(name.to_string())),
            None => {
                let mut backups = self.backups.iter();
                match (backups.next(), backups.next()) {
                    (None, _) => Err(ConfigError::NoBackups),
                    (Some((name, backup)), None) => Ok((name.as_str(), backup)),
                    (Some(_), Some(_)) => Err(ConfigError::AmbiguousBackup(
                        self.backups.keys().cloned().collect(),
                    )),
                }
            }
        }
    }
}
