//! Clone-URI construction and refs assembly
//!
//! Derives the source-location metadata a job needs from an (instance,
//! change) pair: where to clone from, which branch/SHA to base on, and the
//! inbound patch reference. Links pointing at code use the paired
//! source-browsing host, obtained by stripping the `-review` suffix from
//! the review host's first DNS label.

use thiserror::Error;
use url::Url;

use tern_core::domain::change::Change;
use tern_core::domain::refs::{Pull, Refs};

/// Errors deriving source-location metadata for a proposal.
#[derive(Debug, Error)]
pub enum RefsError {
    #[error("instance {instance} is not a url: {source}")]
    InvalidInstance {
        instance: String,
        #[source]
        source: url::ParseError,
    },

    #[error("instance {instance} does not set a host")]
    MissingHost { instance: String },

    #[error("instance {instance} cannot set a path (this is set by project)")]
    InstanceHasPath { instance: String },

    #[error("cannot find current revision for change {change}")]
    MissingRevision { change: String },
}

/// Builds the clone URI for a project: the instance URL (host only, no
/// path) with the project appended as the path.
pub fn make_clone_uri(instance: &str, project: &str) -> Result<Url, RefsError> {
    let parsed = Url::parse(instance).map_err(|source| RefsError::InvalidInstance {
        instance: instance.to_string(),
        source,
    })?;
    if parsed.host_str().is_none() {
        return Err(RefsError::MissingHost {
            instance: instance.to_string(),
        });
    }
    if !matches!(parsed.path(), "" | "/") {
        return Err(RefsError::InstanceHasPath {
            instance: instance.to_string(),
        });
    }
    let mut clone_uri = parsed;
    clone_uri.set_path(project);
    Ok(clone_uri)
}

/// Maps a review host to its paired source-browsing host:
/// `foo-review.googlesource.com` -> `foo.googlesource.com`.
fn code_host(review_host: &str) -> String {
    match review_host.split_once('.') {
        Some((first, rest)) => {
            format!("{}.{}", first.strip_suffix("-review").unwrap_or(first), rest)
        }
        None => review_host
            .strip_suffix("-review")
            .unwrap_or(review_host)
            .to_string(),
    }
}

/// Assembles the refs for one proposal. The single inbound reference is the
/// current revision; its absence from the revision map is an error.
pub fn build_refs(
    instance: &str,
    change: &Change,
    clone_uri: &Url,
    base_sha: &str,
) -> Result<Refs, RefsError> {
    let revision = change
        .current_revision_info()
        .ok_or_else(|| RefsError::MissingRevision {
            change: change.id.clone(),
        })?;

    // Host presence was checked when the clone URI was built.
    let review_host = clone_uri.host_str().unwrap_or_default();
    let code = code_host(review_host);
    let review = instance.trim_end_matches('/');

    Ok(Refs {
        org: review_host.to_string(),
        repo: change.project.clone(),
        base_ref: change.branch.clone(),
        base_sha: base_sha.to_string(),
        clone_uri: clone_uri.to_string(),
        repo_link: format!("{}/{}", code, change.project),
        base_link: format!("{}/{}/+/{}", code, change.project, base_sha),
        pulls: vec![Pull {
            number: change.number,
            author: revision.author.name.clone(),
            sha: change.current_revision.clone(),
            ref_name: revision.ref_name.clone(),
            link: format!("{}/c/{}/+/{}", review, change.project, change.number),
            commit_link: format!("{}/{}/+/{}", code, change.project, change.current_revision),
            author_link: format!("{}/q/{}", review, revision.author.email),
        }],
    })
}
