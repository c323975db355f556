//! Derived source-location metadata
//!
//! `Refs` tells the scheduler where to fetch the code a job runs against:
//! the clone URI, the base branch and its resolved tip, and the inbound
//! patch reference for the proposal's current revision. Ephemeral; rebuilt
//! from scratch for every proposal on every poll.

use serde::{Deserialize, Serialize};

/// Source-location metadata for one proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Refs {
    /// Review host, e.g. `foo-review.googlesource.com`.
    pub org: String,
    /// Project path, e.g. `bar/baz`.
    pub repo: String,
    /// Target branch of the proposal.
    pub base_ref: String,
    /// Tip of the target branch as resolved this cycle.
    pub base_sha: String,
    /// Full clone URI, e.g. `https://foo-review.googlesource.com/bar/baz`.
    pub clone_uri: String,
    /// Human-readable repository link on the paired code host.
    pub repo_link: String,
    /// Human-readable link to the base revision.
    pub base_link: String,
    /// Inbound patch references; exactly one, the current revision.
    pub pulls: Vec<Pull>,
}

/// One inbound patch reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pull {
    pub number: u64,
    pub author: String,
    pub sha: String,
    /// Fetchable ref for the patch set.
    #[serde(rename = "ref")]
    pub ref_name: String,
    /// Link to the proposal on the review host.
    pub link: String,
    /// Link to the patch-set commit on the code host.
    pub commit_link: String,
    /// Link to the author's proposals on the review host.
    pub author_link: String,
}
