//! Job dispatch
//!
//! Turns the selected templates into job-creation requests and submits
//! them. A single failed creation is logged and left out of the triggered
//! list; sibling jobs for the same proposal still proceed.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{error, info};

use tern_client::JobCreator;
use tern_core::domain::change::Change;
use tern_core::domain::job::{
    self, JobKind, JobTemplate,
};
use tern_core::domain::refs::Refs;
use tern_core::dto::job::JobRequest;

/// Submits job-creation requests for one proposal at a time.
pub struct JobDispatcher {
    jobs: Arc<dyn JobCreator>,
}

impl JobDispatcher {
    pub fn new(jobs: Arc<dyn JobCreator>) -> Self {
        Self { jobs }
    }

    /// Builds one request per template and submits them in order. Returns
    /// the names of the jobs actually created.
    pub async fn dispatch(
        &self,
        instance: &str,
        change: &Change,
        refs: &Refs,
        kind: JobKind,
        templates: &[JobTemplate],
    ) -> Vec<String> {
        let mut triggered = Vec::new();
        for template in templates {
            let request = build_request(instance, change, refs, kind, template);
            match self.jobs.create_job(&request).await {
                Ok(handle) => {
                    info!("Triggered job {} ({})", request.job, handle.id);
                    triggered.push(request.job);
                }
                Err(e) => {
                    error!(
                        "Failed to create job {} for change {}: {}",
                        template.name, change.id, e
                    );
                }
            }
        }
        triggered
    }
}

/// Binds a template to the proposal's refs and merges labels: template
/// labels first, then the revision label (always overwritten), then the
/// report-label default when the template names none or an empty one.
fn build_request(
    instance: &str,
    change: &Change,
    refs: &Refs,
    kind: JobKind,
    template: &JobTemplate,
) -> JobRequest {
    let mut labels = template.labels.clone();
    labels.insert(
        job::REVISION_LABEL.to_string(),
        change.current_revision.clone(),
    );
    let needs_default = labels
        .get(job::REPORT_LABEL)
        .is_none_or(|value| value.is_empty());
    if needs_default {
        labels.insert(
            job::REPORT_LABEL.to_string(),
            job::DEFAULT_REPORT_VALUE.to_string(),
        );
    }

    let annotations = BTreeMap::from([
        (job::CHANGE_ID_ANNOTATION.to_string(), change.id.clone()),
        (job::INSTANCE_ANNOTATION.to_string(), instance.to_string()),
    ]);

    JobRequest {
        kind,
        job: template.name.clone(),
        refs: refs.clone(),
        labels,
        annotations,
    }
}
