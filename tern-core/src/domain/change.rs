//! Review-system models
//!
//! serde models of the wire format exposed by a Gerrit-compatible review
//! service. A [`Change`] is an immutable snapshot of one proposal as of the
//! poll that fetched it; nothing here is cached across cycles.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a proposal as reported by the review system.
///
/// Statuses the controller does not know how to handle deserialize to
/// `Unknown` and are skipped during processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeStatus {
    New,
    Merged,
    Abandoned,
    Draft,
    #[serde(other)]
    Unknown,
}

/// A review-system account identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    #[serde(rename = "_account_id")]
    pub account_id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
}

/// Metadata the review system tracks per changed file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileInfo {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub lines_inserted: Option<u32>,
    #[serde(default)]
    pub lines_deleted: Option<u32>,
}

/// One uploaded patch set of a proposal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Revision {
    /// The fetchable ref for this patch set, e.g. `refs/changes/45/12345/2`.
    #[serde(rename = "ref")]
    pub ref_name: String,
    pub created: DateTime<Utc>,
    pub author: Account,
    /// Changed file path -> per-file metadata.
    #[serde(default)]
    pub files: HashMap<String, FileInfo>,
}

/// A comment on a proposal, in chronological position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub author: Account,
    pub message: String,
    pub date: DateTime<Utc>,
}

/// One proposal (a "change") tracked by the review system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Change {
    pub id: String,
    #[serde(rename = "_number")]
    pub number: u64,
    pub project: String,
    pub branch: String,
    pub status: ChangeStatus,
    /// Id of the latest patch set; key into `revisions`.
    pub current_revision: String,
    #[serde(default)]
    pub revisions: HashMap<String, Revision>,
    /// Chronological, oldest first.
    #[serde(default)]
    pub messages: Vec<Message>,
    pub updated: DateTime<Utc>,
}

impl Change {
    /// Looks up the current revision by id. Callers treat `None` as an
    /// error; a change without its own current revision is malformed.
    pub fn current_revision_info(&self) -> Option<&Revision> {
        self.revisions.get(&self.current_revision)
    }

    /// The deduplicated, lexicographically ordered set of file paths touched
    /// by the current revision. Empty when the current revision is missing.
    pub fn changed_files(&self) -> Vec<String> {
        let Some(revision) = self.current_revision_info() else {
            return Vec::new();
        };
        revision
            .files
            .keys()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .cloned()
            .collect()
    }
}
