//! Per-tree inventory shared between the scanner, the planner and the executor.
//!
//! An inventory is built once per run, sorted by relative path, and never
//! mutated afterwards. Workers share it through an `Arc` without locking.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Kind of filesystem node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
}

/// One filesystem node, keyed by its path relative to the tree root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryEntry {
    /// Relative path from the root
    pub relative_path: PathBuf,

    /// File, directory or symlink
    pub kind: EntryKind,

    /// Size in bytes (only meaningful for files)
    pub size: u64,
}

impl InventoryEntry {
    pub fn file(relative_path: impl Into<PathBuf>, size: u64) -> Self {
        Self {
            relative_path: relative_path.into(),
            kind: EntryKind::File,
            size,
        }
    }

    pub fn directory(relative_path: impl Into<PathBuf>) -> Self {
        Self {
            relative_path: relative_path.into(),
            kind: EntryKind::Directory,
            size: 0,
        }
    }

    pub fn symlink(relative_path: impl Into<PathBuf>) -> Self {
        Self {
            relative_path: relative_path.into(),
            kind: EntryKind::Symlink,
            size: 0,
        }
    }
}

/// All entries found under one root
#[derive(Debug, Clone)]
pub struct Inventory {
    root: PathBuf,
    entries: Vec<InventoryEntry>,
}

impl Inventory {
    /// Build an inventory, keeping the first entry seen for any duplicated path.
    pub fn new(root: impl Into<PathBuf>, mut entries: Vec<InventoryEntry>) -> Self {
        // Stable sort keeps the first occurrence ahead of later duplicates
        entries.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        entries.dedup_by(|later, earlier| later.relative_path == earlier.relative_path);

        Self {
            root: root.into(),
            entries,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in relative path order
    pub fn entries(&self) -> &[InventoryEntry] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, InventoryEntry> {
        self.entries.iter()
    }

    pub fn get(&self, relative_path: &Path) -> Option<&InventoryEntry> {
        self.entries
            .binary_search_by(|entry| entry.relative_path.as_path().cmp(relative_path))
            .ok()
            .map(|index| &self.entries[index])
    }

    pub fn contains(&self, relative_path: &Path) -> bool {
        self.get(relative_path).is_some()
    }

    /// Total size of all regular files
    pub fn total_size(&self) -> u64 {
        self.entries
            .iter()
            .filter(|entry| entry.kind == EntryKind::File)
            .map(|entry| entry.size)
            .sum()
    }
}
