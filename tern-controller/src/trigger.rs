//! Presubmit trigger filtering
//!
//! Decides which presubmit templates run for one proposal. Independent
//! filters each vote for a subset of templates, votes combine by OR, and a
//! mandatory branch/changed-files gate prunes the combined candidates:
//!
//! - the freshness filter votes for everything when the current revision
//!   was created after the checkpoint watermark (never evaluated before);
//! - the selective filter votes for the jobs an operator explicitly asked
//!   for in comments since the controller's last report.
//!
//! A selective filter that cannot be built (malformed report) is dropped
//! with a warning; the remaining filters still apply. A missing controller
//! account aborts the proposal's whole presubmit path instead, because
//! self-reports can no longer be identified.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use tern_core::domain::change::{Account, Change};
use tern_core::domain::job::{JobTemplate, TemplateError};
use tern_core::domain::report::{self, Report, ReportError, TriggerIntent};

/// One filter's vote over the template set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerFilter {
    /// Votes for every template.
    All,
    /// Votes for the named templates only.
    Commanded(BTreeSet<String>),
}

impl TriggerFilter {
    pub fn matches(&self, job: &str) -> bool {
        match self {
            TriggerFilter::All => true,
            TriggerFilter::Commanded(names) => names.contains(job),
        }
    }
}

/// OR-combination: a template is a candidate if any filter votes for it.
/// Commutative and idempotent over the filter list.
pub fn any_match(filters: &[TriggerFilter], job: &str) -> bool {
    filters.iter().any(|filter| filter.matches(job))
}

/// Builds the filter set for one proposal's presubmit evaluation.
pub fn build_filters(
    watermark: DateTime<Utc>,
    change: &Change,
    account: &Account,
) -> Vec<TriggerFilter> {
    let mut filters = Vec::new();

    match selective_filter(change, account) {
        Ok(Some(filter)) => filters.push(filter),
        Ok(None) => {}
        Err(e) => warn!(
            "failed to build selective filter for change {}: {}",
            change.id, e
        ),
    }

    if let Some(revision) = change.current_revision_info() {
        if revision.created > watermark {
            filters.push(TriggerFilter::All);
        }
    }

    filters
}

/// Locates the most recent self-authored report (newest comment first,
/// first parseable report wins) and distills the comments after it into a
/// retrigger vote. `Ok(None)` means the filter abstains.
fn selective_filter(
    change: &Change,
    account: &Account,
) -> Result<Option<TriggerFilter>, ReportError> {
    let mut located = None;
    for (position, message) in change.messages.iter().enumerate().rev() {
        if message.author.account_id != account.account_id {
            continue;
        }
        if let Some(parsed) = Report::parse(&message.message)? {
            info!(
                "Found latest report on change {}: {} out of {} passed",
                change.id, parsed.passed, parsed.total
            );
            located = Some((position, parsed));
            break;
        }
    }

    let (comments, report) = match &located {
        Some((position, parsed)) => (&change.messages[position + 1..], Some(parsed)),
        None => (&change.messages[..], None),
    };

    let texts = comments.iter().map(|message| message.message.as_str());
    Ok(match report::detect_intent(texts, report) {
        TriggerIntent::RunAll => Some(TriggerFilter::All),
        TriggerIntent::RunNamed(names) => Some(TriggerFilter::Commanded(names)),
        TriggerIntent::NoSignal => None,
    })
}

/// Applies the OR-combined candidate set and then the mandatory
/// branch/changed-files gate. Preserves config order; never yields the same
/// template twice.
pub fn filter_presubmits(
    filters: &[TriggerFilter],
    branch: &str,
    changed_files: &[String],
    presubmits: &[JobTemplate],
) -> Result<Vec<JobTemplate>, TemplateError> {
    let mut selected = Vec::new();
    let mut seen = BTreeSet::new();
    for template in presubmits {
        if !any_match(filters, &template.name) {
            continue;
        }
        if !template.should_run(branch, changed_files)? {
            continue;
        }
        if seen.insert(template.name.clone()) {
            selected.push(template.clone());
        }
    }
    Ok(selected)
}
