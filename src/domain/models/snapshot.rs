//! Repository snapshot model.
//!
//! A snapshot is the read-only, already-bounded view of one submission's
//! repository produced by the snapshot provider. Scorers and the evidence
//! validator share it immutably; nothing in the core mutates it.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// One file in the snapshot's file set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotFile {
    pub path: String,
    pub line_count: u32,
}

/// Read-only view of a repository at analysis time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepoSnapshot {
    pub files: Vec<SnapshotFile>,
    /// Commit hashes present in the snapshot's history window.
    pub commits: Vec<String>,
    pub readme: String,
    /// Bounded source excerpts handed to scorers as context.
    pub source_excerpts: String,
}

impl RepoSnapshot {
    /// Line counts keyed by path, for evidence verification lookups.
    pub fn line_counts(&self) -> HashMap<&str, u32> {
        self.files.iter().map(|f| (f.path.as_str(), f.line_count)).collect()
    }

    pub fn commit_set(&self) -> HashSet<&str> {
        self.commits.iter().map(String::as_str).collect()
    }

    pub fn contains_file(&self, path: &str) -> bool {
        self.files.iter().any(|f| f.path == path)
    }
}
