//! Per-archive change log: the `diff-log.csv` member that makes each archive
//! self-describing.
//!
//! The format is UTF-8 CSV with a fixed `filename,modtype,diff` header and one
//! row per changed file:
//!
//! ```text
//! filename,modtype,diff
//! notes.txt,+,1622567933.365362
//! sub/old.txt,-,
//! sub/report.txt,*,1622568011.5
//! ```
//!
//! `filename` is relative to the storage root and always uses `/`. `modtype` is
//! one of `+` (created), `-` (deleted) or `*` (modified). `diff` is the
//! strategy-dependent state text and is empty for deletions.

use crate::diff_tree::{ChangeKind, DiffEntry, DiffTree, keyed_path};
use crate::strategy::{DiffStrategy, FileState, StateParseError};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Name of the change log member inside every archive.
pub const CHANGE_LOG_MEMBER: &str = "diff-log.csv";

const HEADER: [&str; 3] = ["filename", "modtype", "diff"];

#[derive(Debug, thiserror::Error)]
pub enum ChangeLogError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Change log is missing the filename,modtype,diff header")]
    MissingHeader,
    #[error("Unexpected change log header: {0}")]
    BadHeader(String),
    #[error("Line {line}: expected 3 fields, found {found}")]
    WrongFieldCount { line: u64, found: usize },
    #[error("Line {line}: empty filename")]
    EmptyFilename { line: u64 },
    #[error("Line {line}: unknown change kind {symbol:?}")]
    UnknownChangeKind { line: u64, symbol: String },
    #[error("Line {line}: invalid state: {source}")]
    InvalidState {
        line: u64,
        #[source]
        source: StateParseError,
    },
    #[error("Line {line}: deletion of {path} carries a state")]
    StateOnDeletion { line: u64, path: String },
    #[error("Line {line}: {path} is listed more than once")]
    DuplicatePath { line: u64, path: String },
}

/// Serializes a tree into change log text.
///
/// Rows are emitted depth-first in name order. Empty subtrees contribute no
/// rows. Output always uses `\n` line endings.
pub fn encode(tree: &DiffTree) -> Result<String, ChangeLogError> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer.write_record(HEADER)?;
    for (path, entry) in tree.flatten() {
        let state = entry.state().map(FileState::to_log_text).unwrap_or_default();
        writer.write_record([path.as_str(), entry.kind().symbol(), state.as_str()])?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| ChangeLogError::Csv(csv::Error::from(e.into_error())))?;
    // The writer only ever receives `&str` fields.
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Parses change log text into a flat map of entries.
///
/// Keys are the literal `filename` field when `base` is `None`, or `base`
/// joined with the field's components otherwise. Any of `\n`, `\r\n` and `\r`
/// are accepted as line endings. A log with only the header yields an empty
/// map.
pub fn decode(
    text: &str,
    strategy: DiffStrategy,
    base: Option<&Path>,
) -> Result<BTreeMap<PathBuf, DiffEntry>, ChangeLogError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = reader.headers()?;
    if headers.is_empty() {
        return Err(ChangeLogError::MissingHeader);
    }
    if headers.iter().ne(HEADER) {
        return Err(ChangeLogError::BadHeader(
            headers.iter().collect::<Vec<_>>().join(","),
        ));
    }

    let mut entries = BTreeMap::new();

    for record in reader.records() {
        let record = record?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();

        if record.len() != HEADER.len() {
            return Err(ChangeLogError::WrongFieldCount {
                line,
                found: record.len(),
            });
        }

        let path = &record[0];
        let symbol = &record[1];
        let state_text = &record[2];

        if path.is_empty() {
            return Err(ChangeLogError::EmptyFilename { line });
        }

        let kind =
            ChangeKind::from_symbol(symbol).ok_or_else(|| ChangeLogError::UnknownChangeKind {
                line,
                symbol: symbol.to_string(),
            })?;

        let entry = match kind {
            ChangeKind::Deleted => {
                if !state_text.is_empty() {
                    return Err(ChangeLogError::StateOnDeletion {
                        line,
                        path: path.to_string(),
                    });
                }
                DiffEntry::deleted()
            }
            ChangeKind::Created | ChangeKind::Modified => {
                let state = FileState::from_log_text(state_text, strategy)
                    .map_err(|source| ChangeLogError::InvalidState { line, source })?;
                if kind == ChangeKind::Created {
                    DiffEntry::created(state)
                } else {
                    DiffEntry::modified(state)
                }
            }
        };

        if entries.insert(keyed_path(base, path), entry).is_some() {
            return Err(ChangeLogError::DuplicatePath {
                line,
                path: path.to_string(),
            });
        }
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nested_tree() -> DiffTree {
        let mut sub_sub = DiffTree::new();
        sub_sub.add_entry("file4", DiffEntry::created(FileState::ModTime(4.0)));

        let mut sub = DiffTree::new();
        sub.add_entry("file2", DiffEntry::created(FileState::ModTime(2.0)));
        sub.add_entry("file3", DiffEntry::created(FileState::ModTime(3.0)));
        sub.add_subtree("sub", sub_sub);

        let mut root = DiffTree::new();
        root.add_entry("file1", DiffEntry::created(FileState::ModTime(1.0)));
        root.add_subtree("sub", sub);
        root
    }

    #[test]
    fn test_encode_nested_tree() {
        let text = encode(&nested_tree()).unwrap();

        assert_eq!(
            text,
            "filename,modtype,diff\nfile1,+,1\nsub/file2,+,2\nsub/file3,+,3\nsub/sub/file4,+,4\n"
        );
    }

    #[test]
    fn test_encode_single_created_file() {
        let mut tree = DiffTree::new();
        tree.add_entry(
            "a.txt",
            DiffEntry::created(FileState::ModTime(1622567933.365362)),
        );

        assert_eq!(
            encode(&tree).unwrap(),
            "filename,modtype,diff\na.txt,+,1622567933.365362\n"
        );
    }

    #[test]
    fn test_encode_empty_tree_is_header_only() {
        let mut tree = DiffTree::new();
        tree.add_subtree("quiet", DiffTree::new());

        assert_eq!(encode(&tree).unwrap(), "filename,modtype,diff\n");
    }

    #[test]
    fn test_encode_all_change_kinds() {
        let mut tree = DiffTree::new();
        tree.add_entry("a", DiffEntry::created(FileState::Digest("aa".to_string())));
        tree.add_entry("b", DiffEntry::deleted());
        tree.add_entry("c", DiffEntry::modified(FileState::Digest("cc".to_string())));

        assert_eq!(
            encode(&tree).unwrap(),
            "filename,modtype,diff\na,+,aa\nb,-,\nc,*,cc\n"
        );
    }

    #[test]
    fn test_encode_quotes_embedded_delimiters() {
        let mut tree = DiffTree::new();
        tree.add_entry(
            "report, final.txt",
            DiffEntry::created(FileState::ModTime(5.0)),
        );

        let text = encode(&tree).unwrap();
        assert_eq!(text, "filename,modtype,diff\n\"report, final.txt\",+,5\n");

        let decoded = decode(&text, DiffStrategy::ModificationTime, None).unwrap();
        assert!(decoded.contains_key(&PathBuf::from("report, final.txt")));
    }

    #[test]
    fn test_symmetry_with_base_path() {
        let tree = nested_tree();
        let base = Path::new("/storage/root");

        let text = encode(&tree).unwrap();
        let decoded = decode(&text, DiffStrategy::ModificationTime, Some(base)).unwrap();

        assert_eq!(decoded, tree.flatten_keyed(Some(base)));
    }

    #[test]
    fn test_symmetry_for_every_strategy() {
        let mut tree = DiffTree::new();
        tree.add_entry("gone", DiffEntry::deleted());

        let cases = [
            (DiffStrategy::ModificationTime, FileState::ModTime(17.25)),
            (
                DiffStrategy::ContentHash,
                FileState::Digest("0123abcd".to_string()),
            ),
            (
                DiffStrategy::RawContent,
                FileState::Content(b"line one\nline,two\r\n".to_vec()),
            ),
        ];

        for (strategy, state) in cases {
            let mut tree = tree.clone();
            let mut sub = DiffTree::new();
            sub.add_entry("file", DiffEntry::modified(state));
            tree.add_subtree("dir", sub);

            let text = encode(&tree).unwrap();
            let decoded = decode(&text, strategy, None).unwrap();
            assert_eq!(decoded, tree.flatten_keyed(None), "strategy {strategy}");
        }
    }

    #[test]
    fn test_decode_without_base_uses_literal_path() {
        let text = "filename,modtype,diff\nsub/x.txt,*,200\n";
        let decoded = decode(text, DiffStrategy::ModificationTime, None).unwrap();

        assert_eq!(
            decoded.get(&PathBuf::from("sub/x.txt")),
            Some(&DiffEntry::modified(FileState::ModTime(200.0)))
        );
    }

    #[test]
    fn test_decode_header_only() {
        let decoded = decode(
            "filename,modtype,diff\n",
            DiffStrategy::ModificationTime,
            None,
        )
        .unwrap();
        assert!(decoded.is_empty());

        let decoded = decode("filename,modtype,diff", DiffStrategy::ContentHash, None).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn test_decode_accepts_any_newline_convention() {
        let unix = "filename,modtype,diff\nfile1,+,1\nsub/file2,-,\n";
        let windows = "filename,modtype,diff\r\nfile1,+,1\r\nsub/file2,-,\r\n";
        let mac = "filename,modtype,diff\rfile1,+,1\rsub/file2,-,\r";

        let expected = decode(unix, DiffStrategy::ModificationTime, None).unwrap();
        assert_eq!(expected.len(), 2);
        assert_eq!(
            decode(windows, DiffStrategy::ModificationTime, None).unwrap(),
            expected
        );
        assert_eq!(
            decode(mac, DiffStrategy::ModificationTime, None).unwrap(),
            expected
        );
    }

    #[test]
    fn test_decode_rejects_missing_header() {
        let result = decode("", DiffStrategy::ModificationTime, None);
        assert!(matches!(result, Err(ChangeLogError::MissingHeader)));
    }

    #[test]
    fn test_decode_rejects_wrong_header() {
        let result = decode("path,kind,state\n", DiffStrategy::ModificationTime, None);
        assert!(matches!(result, Err(ChangeLogError::BadHeader(h)) if h == "path,kind,state"));
    }

    #[test]
    fn test_decode_rejects_wrong_field_count() {
        let text = "filename,modtype,diff\nfile1,+,1\nfile2,+\n";
        let result = decode(text, DiffStrategy::ModificationTime, None);

        match result {
            Err(ChangeLogError::WrongFieldCount { line, found }) => {
                assert_eq!(line, 3);
                assert_eq!(found, 2);
            }
            other => panic!("Expected WrongFieldCount, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_rejects_unknown_change_kind() {
        let text = "filename,modtype,diff\nfile1,?,1\n";
        let result = decode(text, DiffStrategy::ModificationTime, None);
        assert!(matches!(
            result,
            Err(ChangeLogError::UnknownChangeKind { symbol, .. }) if symbol == "?"
        ));
    }

    #[test]
    fn test_decode_rejects_bad_state() {
        let text = "filename,modtype,diff\nfile1,+,not-a-number\n";
        let result = decode(text, DiffStrategy::ModificationTime, None);
        assert!(matches!(result, Err(ChangeLogError::InvalidState { line: 2, .. })));

        let text = "filename,modtype,diff\nfile1,*,\n";
        let result = decode(text, DiffStrategy::ContentHash, None);
        assert!(matches!(result, Err(ChangeLogError::InvalidState { .. })));
    }

    #[test]
    fn test_decode_rejects_state_on_deletion() {
        let text = "filename,modtype,diff\nfile1,-,12\n";
        let result = decode(text, DiffStrategy::ModificationTime, None);
        assert!(matches!(result, Err(ChangeLogError::StateOnDeletion { .. })));
    }

    #[test]
    fn test_decode_rejects_duplicate_paths() {
        let text = "filename,modtype,diff\nfile1,+,1\nfile1,*,2\n";
        let result = decode(text, DiffStrategy::ModificationTime, None);
        assert!(matches!(result, Err(ChangeLogError::DuplicatePath { line: 3, .. })));
    }
}
