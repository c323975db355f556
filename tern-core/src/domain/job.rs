//! Job templates and controller-managed labels
//!
//! Templates are owned by the job-config file and read-only to the
//! controller. `should_run` is the mandatory applicability gate applied to
//! every template before a job is created, on both the presubmit and
//! postsubmit paths.

use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Where in a proposal's lifecycle a job runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Presubmit,
    Postsubmit,
}

/// Label recording the patch-set revision a job was triggered for.
pub const REVISION_LABEL: &str = "tern.dev/revision";

/// Label naming the review label the scheduler-side reporter votes on.
pub const REPORT_LABEL: &str = "tern.dev/report-label";

/// Report label applied when a template names none.
pub const DEFAULT_REPORT_VALUE: &str = "Code-Review";

/// Annotation carrying the originating proposal id.
pub const CHANGE_ID_ANNOTATION: &str = "tern.dev/change-id";

/// Annotation carrying the originating review instance.
pub const INSTANCE_ANNOTATION: &str = "tern.dev/instance";

/// Errors evaluating a template's applicability predicates.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("invalid run_if_changed pattern for job {job}: {source}")]
    InvalidPattern {
        job: String,
        #[source]
        source: regex::Error,
    },
}

/// One configured CI job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobTemplate {
    pub name: String,
    /// Static labels forwarded onto every job created from this template.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Branches this job runs against; empty means all branches.
    #[serde(default)]
    pub branches: Vec<String>,
    /// Branches this job never runs against; wins over `branches`.
    #[serde(default)]
    pub skip_branches: Vec<String>,
    /// Regex over changed file paths; when set, the job runs only if at
    /// least one changed path matches.
    #[serde(default)]
    pub run_if_changed: Option<String>,
}

impl JobTemplate {
    /// Branch-applicability predicate.
    pub fn runs_against(&self, branch: &str) -> bool {
        if self.skip_branches.iter().any(|b| b == branch) {
            return false;
        }
        self.branches.is_empty() || self.branches.iter().any(|b| b == branch)
    }

    /// Whether this template applies to the given branch and changed-file
    /// set. The branch gate is checked first; the changed-files gate only
    /// errors on a malformed `run_if_changed` pattern.
    pub fn should_run(&self, branch: &str, changed_files: &[String]) -> Result<bool, TemplateError> {
        if !self.runs_against(branch) {
            return Ok(false);
        }
        let Some(pattern) = &self.run_if_changed else {
            return Ok(true);
        };
        let matcher = Regex::new(pattern).map_err(|source| TemplateError::InvalidPattern {
            job: self.name.clone(),
            source,
        })?;
        Ok(changed_files.iter().any(|path| matcher.is_match(path)))
    }
}
