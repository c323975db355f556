//! Feedback-report scanning and retrigger commands
//!
//! After jobs finish, the scheduler-side reporter posts a structured
//! pass/fail comment on the proposal under the controller's own account.
//! The controller never generates that comment; it only locates the most
//! recent one to anchor retrigger commands: `/retest` means "the jobs that
//! failed in that report", while `/test <job>` and `/test all` are explicit.
//!
//! The command grammar is deliberately confined to this module so the
//! filter-combination logic can be tested without string matching.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

static HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+) out of (\d+) prow jobs passed").unwrap());

static ROW_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(✔️|❌)\s+(\S+)\s+(SUCCESS|FAILURE)\s*$").unwrap());

static TEST_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^/test\s+(\S+)\s*$").unwrap());

static RETEST_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^/retest\s*$").unwrap());

/// Errors parsing a comment whose header marks it as a report.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("malformed report row: {0:?}")]
    MalformedRow(String),
    #[error("report header counts {total} jobs but body lists {rows}")]
    RowCountMismatch { rows: usize, total: usize },
}

/// Outcome of one previously evaluated job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRow {
    pub job: String,
    pub passed: bool,
}

/// A parsed pass/fail report previously posted by the controller's account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub passed: usize,
    pub total: usize,
    pub rows: Vec<ReportRow>,
}

impl Report {
    /// Parses a comment body. Returns `Ok(None)` when the comment is not a
    /// report at all, and `Err` when the header matches but the body is
    /// malformed.
    pub fn parse(text: &str) -> Result<Option<Report>, ReportError> {
        let mut lines = text.lines();
        let Some(header) = lines.next() else {
            return Ok(None);
        };
        let Some(captures) = HEADER_RE.captures(header.trim()) else {
            return Ok(None);
        };
        // Counts fit usize by construction of the regex.
        let passed: usize = captures[1].parse().unwrap_or(0);
        let total: usize = captures[2].parse().unwrap_or(0);

        let mut rows = Vec::new();
        for line in lines {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Some(captures) = ROW_RE.captures(line) else {
                return Err(ReportError::MalformedRow(line.to_string()));
            };
            rows.push(ReportRow {
                job: captures[2].to_string(),
                passed: &captures[3] == "SUCCESS",
            });
        }
        if rows.len() != total {
            return Err(ReportError::RowCountMismatch {
                rows: rows.len(),
                total,
            });
        }
        Ok(Some(Report {
            passed,
            total,
            rows,
        }))
    }

    /// Names of the jobs the report recorded as failed.
    pub fn failed_jobs(&self) -> BTreeSet<String> {
        self.rows
            .iter()
            .filter(|row| !row.passed)
            .map(|row| row.job.clone())
            .collect()
    }
}

/// An operator's explicit retrigger request, distilled from comment text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerIntent {
    RunAll,
    RunNamed(BTreeSet<String>),
    NoSignal,
}

/// Scans comment bodies for retrigger commands.
///
/// Commands must start a line: `/test all` requests every job, `/test
/// <job>` accumulates named jobs across comments, and `/retest` requests
/// the jobs the anchoring `report` recorded as failed. `/retest` with no
/// report on hand requests everything; nothing is known to have passed.
pub fn detect_intent<'a, I>(comments: I, report: Option<&Report>) -> TriggerIntent
where
    I: IntoIterator<Item = &'a str>,
{
    let mut named = BTreeSet::new();
    for comment in comments {
        for line in comment.lines() {
            let line = line.trim();
            if let Some(captures) = TEST_RE.captures(line) {
                if &captures[1] == "all" {
                    return TriggerIntent::RunAll;
                }
                named.insert(captures[1].to_string());
            } else if RETEST_RE.is_match(line) {
                match report {
                    Some(report) => named.extend(report.failed_jobs()),
                    None => return TriggerIntent::RunAll,
                }
            }
        }
    }
    if named.is_empty() {
        TriggerIntent::NoSignal
    } else {
        TriggerIntent::RunNamed(named)
    }
}
