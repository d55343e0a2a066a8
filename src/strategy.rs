//! Comparison policies and the comparable file state they produce.
//!
//! A backup configuration picks exactly one [`DiffStrategy`] and every state in
//! an archive chain is expected to have been produced with it. Mixing
//! strategies within one chain is not detected here.

use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum DiffStrategy {
    /// Compare filesystem modification times (fractional seconds).
    ModificationTime,
    /// Compare the hex digest of the whole file content.
    ContentHash,
    /// Compare the literal file content.
    RawContent,
}

impl fmt::Display for DiffStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DiffStrategy::ModificationTime => "modification-time",
            DiffStrategy::ContentHash => "content-hash",
            DiffStrategy::RawContent => "raw-content",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    Sha256,
    /// BLAKE2s with a 256-bit digest.
    Blake2s,
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HashAlgorithm::Md5 => "md5",
            HashAlgorithm::Sha1 => "sha1",
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Blake2s => "blake2s",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StateParseError {
    #[error("empty state value")]
    Empty,
    #[error("invalid modification time: {0}")]
    InvalidTimestamp(String),
    #[error("invalid hex digest: {0}")]
    InvalidDigest(String),
    #[error("invalid base64 content: {0}")]
    InvalidContent(String),
}

/// The comparable state of one file under a given strategy.
#[derive(Debug, Clone, PartialEq)]
pub enum FileState {
    ModTime(f64),
    /// Lowercase hex.
    Digest(String),
    Content(Vec<u8>),
}

impl FileState {
    /// Renders the state as it appears in the `diff` column of a change log.
    ///
    /// Timestamps use the shortest decimal that parses back to the same `f64`,
    /// so a logged timestamp compares equal to a freshly probed one. Raw
    /// content is base64 encoded so arbitrary bytes survive as one field.
    pub fn to_log_text(&self) -> String {
        match self {
            FileState::ModTime(seconds) => format!("{seconds}"),
            FileState::Digest(hex) => hex.clone(),
            FileState::Content(bytes) => base64::engine::general_purpose::STANDARD.encode(bytes),
        }
    }

    /// Parses a `diff` column value produced with `strategy`.
    pub fn from_log_text(text: &str, strategy: DiffStrategy) -> Result<Self, StateParseError> {
        match strategy {
            DiffStrategy::ModificationTime => {
                if text.is_empty() {
                    return Err(StateParseError::Empty);
                }
                let seconds: f64 = text
                    .parse()
                    .map_err(|_| StateParseError::InvalidTimestamp(text.to_string()))?;
                if !seconds.is_finite() {
                    return Err(StateParseError::InvalidTimestamp(text.to_string()));
                }
                Ok(FileState::ModTime(seconds))
            }
            DiffStrategy::ContentHash => {
                if text.is_empty() {
                    return Err(StateParseError::Empty);
                }
                if !text.bytes().all(|b| b.is_ascii_hexdigit()) {
                    return Err(StateParseError::InvalidDigest(text.to_string()));
                }
                Ok(FileState::Digest(text.to_ascii_lowercase()))
            }
            // An empty field is the encoding of an empty file.
            DiffStrategy::RawContent => base64::engine::general_purpose::STANDARD
                .decode(text)
                .map(FileState::Content)
                .map_err(|e| StateParseError::InvalidContent(e.to_string())),
        }
    }
}
