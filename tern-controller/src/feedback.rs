//! Feedback comments
//!
//! After dispatch, the proposal gets a single comment listing what was
//! triggered. The format is load-bearing: the scheduler-side report
//! tooling keys off the exact wording.

use std::sync::Arc;

use tern_client::ReviewApi;
use tern_core::domain::change::Change;

use crate::error::ProcessError;

/// Posts the triggered-jobs comment back on the proposal.
pub struct FeedbackReporter {
    review: Arc<dyn ReviewApi>,
}

impl FeedbackReporter {
    pub fn new(review: Arc<dyn ReviewApi>) -> Self {
        Self { review }
    }

    /// Comments on the proposal's current revision with no score labels.
    /// No-op when nothing was triggered. A posting failure is surfaced to
    /// the caller; already-created jobs are not retracted.
    pub async fn report(
        &self,
        instance: &str,
        change: &Change,
        triggered: &[String],
    ) -> Result<(), ProcessError> {
        if triggered.is_empty() {
            return Ok(());
        }

        let message = compose(triggered);
        self.review
            .set_review(
                instance,
                &change.id,
                &change.current_revision,
                &message,
                None,
            )
            .await
            .map_err(ProcessError::Feedback)
    }
}

fn compose(triggered: &[String]) -> String {
    let mut message = format!("Triggered {} prow jobs:", triggered.len());
    for job in triggered {
        message.push_str(&format!("\n  * Name: {}", job));
    }
    message
}
