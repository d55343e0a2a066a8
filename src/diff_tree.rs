//! Hierarchical record of the changes found by one comparison pass.
//!
//! A [`DiffTree`] mirrors the directory it was collected from: each key is an
//! entry's base name, each value either the change recorded for a file or the
//! nested tree of a subdirectory. Subdirectories without changed descendants
//! are kept as empty subtrees; they produce no change log rows.

use crate::strategy::FileState;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Deleted,
    Modified,
}

impl ChangeKind {
    /// The change log symbol for this kind.
    pub fn symbol(self) -> &'static str {
        match self {
            ChangeKind::Created => "+",
            ChangeKind::Deleted => "-",
            ChangeKind::Modified => "*",
        }
    }

    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "+" => Some(ChangeKind::Created),
            "-" => Some(ChangeKind::Deleted),
            "*" => Some(ChangeKind::Modified),
            _ => None,
        }
    }
}

/// One detected change to a single file.
#[derive(Debug, Clone, PartialEq)]
pub struct DiffEntry {
    kind: ChangeKind,
    state: Option<FileState>,
}

impl DiffEntry {
    pub fn created(state: FileState) -> Self {
        DiffEntry {
            kind: ChangeKind::Created,
            state: Some(state),
        }
    }

    pub fn modified(state: FileState) -> Self {
        DiffEntry {
            kind: ChangeKind::Modified,
            state: Some(state),
        }
    }

    /// A deletion marker. Deletions never carry state.
    pub fn deleted() -> Self {
        DiffEntry {
            kind: ChangeKind::Deleted,
            state: None,
        }
    }

    pub fn kind(&self) -> ChangeKind {
        self.kind
    }

    /// The new state; `None` exactly when the entry is a deletion.
    pub fn state(&self) -> Option<&FileState> {
        self.state.as_ref()
    }

    pub fn into_state(self) -> Option<FileState> {
        self.state
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DiffNode {
    Entry(DiffEntry),
    Tree(DiffTree),
}

impl DiffNode {
    pub fn is_directory(&self) -> bool {
        matches!(self, DiffNode::Tree(_))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiffTree {
    nodes: BTreeMap<String, DiffNode>,
}

impl DiffTree {
    pub fn new() -> Self {
        DiffTree::default()
    }

    /// Inserts a file change, returning whatever was stored under `name` before.
    pub fn add_entry(&mut self, name: impl Into<String>, entry: DiffEntry) -> Option<DiffNode> {
        self.nodes.insert(name.into(), DiffNode::Entry(entry))
    }

    /// Inserts a subdirectory, returning whatever was stored under `name` before.
    pub fn add_subtree(&mut self, name: impl Into<String>, tree: DiffTree) -> Option<DiffNode> {
        self.nodes.insert(name.into(), DiffNode::Tree(tree))
    }

    #[allow(dead_code)]
    pub fn remove(&mut self, name: &str) -> Option<DiffNode> {
        self.nodes.remove(name)
    }

    #[allow(dead_code)]
    pub fn get(&self, name: &str) -> Option<&DiffNode> {
        self.nodes.get(name)
    }

    /// Iterates `(name, node, is_directory)` in name order.
    #[allow(dead_code)]
    pub fn iter(&self) -> impl Iterator<Item = (&str, &DiffNode, bool)> {
        self.nodes
            .iter()
            .map(|(name, node)| (name.as_str(), node, node.is_directory()))
    }

    /// Number of immediate keys, empty subtrees included.
    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether any file change exists at any depth.
    pub fn has_changes(&self) -> bool {
        self.nodes.values().any(|node| match node {
            DiffNode::Entry(_) => true,
            DiffNode::Tree(tree) => tree.has_changes(),
        })
    }

    /// Counts file changes of `kind` at any depth.
    pub fn count(&self, kind: ChangeKind) -> usize {
        self.flatten()
            .into_iter()
            .filter(|(_, entry)| entry.kind() == kind)
            .count()
    }

    /// Flattens the tree depth-first into `(relative path, entry)` pairs.
    ///
    /// Paths are joined with `/` regardless of the host separator so that they
    /// can be written to change logs as-is.
    pub fn flatten(&self) -> Vec<(String, &DiffEntry)> {
        let mut rows = Vec::new();
        self.flatten_into("", &mut rows);
        rows
    }

    fn flatten_into<'a>(&'a self, prefix: &str, rows: &mut Vec<(String, &'a DiffEntry)>) {
        for (name, node) in &self.nodes {
            let path = join_relative(prefix, name);
            match node {
                DiffNode::Entry(entry) => rows.push((path, entry)),
                DiffNode::Tree(tree) => tree.flatten_into(&path, rows),
            }
        }
    }

    /// Flattens the tree into a map keyed the same way
    /// [`crate::change_log::decode`] keys its result.
    #[allow(dead_code)]
    pub fn flatten_keyed(&self, base: Option<&Path>) -> BTreeMap<PathBuf, DiffEntry> {
        self.flatten()
            .into_iter()
            .map(|(path, entry)| (keyed_path(base, &path), entry.clone()))
            .collect()
    }
}

/// Joins a relative prefix and a base name with `/`.
pub fn join_relative(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    }
}

pub(crate) fn keyed_path(base: Option<&Path>, relative: &str) -> PathBuf {
    match base {
        Some(base) => relative
            .split('/')
            .fold(base.to_path_buf(), |acc, part| acc.join(part)),
        None => PathBuf::from(relative),
    }
}
