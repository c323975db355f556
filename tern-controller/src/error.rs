//! Per-proposal error taxonomy
//!
//! Startup failures abort the process from `main`. Everything here is
//! scoped to a single proposal: the sync loop logs it and moves on to the
//! next one, and the watermark still advances past the failed proposal.

use thiserror::Error;

use crate::refs::RefsError;
use tern_client::ClientError;
use tern_core::domain::job::TemplateError;

/// Why processing one proposal was abandoned.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// Clone-URI construction or refs assembly failed.
    #[error(transparent)]
    Refs(#[from] RefsError),

    /// The target branch's tip could not be resolved this cycle.
    #[error("failed to resolve base branch tip: {0}")]
    BranchResolution(#[source] ClientError),

    /// The controller's own account is unknown on this instance, so prior
    /// self-reports cannot be told apart from other commentary and
    /// selective retriggering would be unsafe.
    #[error("unable to resolve own account on {instance}")]
    MissingAccount { instance: String },

    /// A template's applicability predicate could not be evaluated.
    #[error("failed to evaluate job applicability: {0}")]
    Gate(#[from] TemplateError),

    /// The triggered-jobs comment could not be posted. Jobs already
    /// created are not retracted.
    #[error("failed to post feedback comment: {0}")]
    Feedback(#[source] ClientError),
}
