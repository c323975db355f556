//! Sync controller
//!
//! One poll cycle: fetch every proposal updated since the watermark,
//! classify each by status, build refs, decide the trigger set, dispatch
//! jobs, comment back, then advance and persist the checkpoint.
//!
//! Proposals are processed strictly sequentially, in the order the review
//! system returned them. A per-proposal failure is logged and the batch
//! continues; the watermark still advances past the failed proposal, so a
//! failure is not retried once its timestamp is subsumed. That trade
//! (lost retries for forward progress) keeps the controller free of any
//! pending-retry queue.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::time;
use tracing::{debug, error, info};

use tern_client::{JobCreator, ReviewApi};
use tern_core::domain::change::{Change, ChangeStatus};
use tern_core::domain::job::JobKind;

use crate::checkpoint;
use crate::dispatch::JobDispatcher;
use crate::error::ProcessError;
use crate::feedback::FeedbackReporter;
use crate::jobcfg::JobConfigSource;
use crate::refs::{build_refs, make_clone_uri};
use crate::trigger;

/// Drives the poll cycles and owns the in-memory watermark. Not shared:
/// only the single poll loop mutates `last_update`.
pub struct SyncController {
    review: Arc<dyn ReviewApi>,
    dispatcher: JobDispatcher,
    reporter: FeedbackReporter,
    job_config: Arc<dyn JobConfigSource>,
    checkpoint_path: PathBuf,
    rate_limit: u32,
    last_update: DateTime<Utc>,
}

impl SyncController {
    pub fn new(
        review: Arc<dyn ReviewApi>,
        jobs: Arc<dyn JobCreator>,
        job_config: Arc<dyn JobConfigSource>,
        checkpoint_path: PathBuf,
        rate_limit: u32,
        last_update: DateTime<Utc>,
    ) -> Self {
        Self {
            dispatcher: JobDispatcher::new(jobs),
            reporter: FeedbackReporter::new(Arc::clone(&review)),
            review,
            job_config,
            checkpoint_path,
            rate_limit,
            last_update,
        }
    }

    /// The current watermark.
    pub fn last_update(&self) -> DateTime<Utc> {
        self.last_update
    }

    /// Runs one poll cycle.
    pub async fn sync(&mut self) {
        let watermark = self.last_update;
        let mut sync_time = watermark;

        for (instance, changes) in self.review.query_changes(watermark, self.rate_limit).await {
            for change in &changes {
                if let Err(e) = self.process_change(&instance, change, watermark).await {
                    error!("Failed to process change {}: {}", change.current_revision, e);
                }
                // Failed proposals advance the watermark too.
                if change.updated > sync_time {
                    sync_time = change.updated;
                }
            }
            info!(
                "Processed {} changes for instance {}",
                changes.len(),
                instance
            );
        }

        self.last_update = sync_time;
        if let Err(e) = checkpoint::save(&self.checkpoint_path, sync_time) {
            error!(
                "Last sync {}, cannot save to {}: {}",
                sync_time,
                self.checkpoint_path.display(),
                e
            );
        }
    }

    /// Runs the full pipeline for one proposal. `watermark` is the
    /// checkpoint value at cycle start, not the running maximum.
    async fn process_change(
        &self,
        instance: &str,
        change: &Change,
        watermark: DateTime<Utc>,
    ) -> Result<(), ProcessError> {
        let kind = match change.status {
            ChangeStatus::Merged => JobKind::Postsubmit,
            ChangeStatus::New => JobKind::Presubmit,
            status => {
                debug!("Skipping change {} with status {:?}", change.id, status);
                return Ok(());
            }
        };

        let clone_uri = make_clone_uri(instance, &change.project)?;

        // The base branch tip may have moved since the last cycle; resolve
        // it fresh every time.
        let base_sha = self
            .review
            .get_branch_revision(instance, &change.project, &change.branch)
            .await
            .map_err(ProcessError::BranchResolution)?;

        let refs = build_refs(instance, change, &clone_uri, &base_sha)?;
        let changed_files = change.changed_files();

        let templates = match kind {
            JobKind::Postsubmit => {
                // Merges always run every applicable postsubmit; only the
                // branch/changed-files gate applies.
                let mut selected = Vec::new();
                for template in self.job_config.postsubmits(&clone_uri) {
                    if template.should_run(&change.branch, &changed_files)? {
                        selected.push(template);
                    }
                }
                selected
            }
            JobKind::Presubmit => {
                let account =
                    self.review
                        .account(instance)
                        .await
                        .ok_or_else(|| ProcessError::MissingAccount {
                            instance: instance.to_string(),
                        })?;
                let filters = trigger::build_filters(watermark, change, &account);
                trigger::filter_presubmits(
                    &filters,
                    &change.branch,
                    &changed_files,
                    &self.job_config.presubmits(&clone_uri),
                )?
            }
        };

        let triggered = self
            .dispatcher
            .dispatch(instance, change, &refs, kind, &templates)
            .await;

        self.reporter.report(instance, change, &triggered).await
    }

    /// Runs the polling loop. A running cycle always completes its fetched
    /// batch; there is no cancellation.
    pub async fn run(&mut self, interval: Duration) -> Result<()> {
        info!("Starting sync loop (interval: {:?})", interval);

        let mut ticker = time::interval(interval);
        loop {
            ticker.tick().await;
            debug!("Polling for updated changes");
            self.sync().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use chrono::{Duration as ChronoDuration, TimeZone};
    use tern_core::domain::job::REVISION_LABEL;

    use crate::testutil::{FakeJobConfig, FakeReview, FakeScheduler, INSTANCE, change, template};

    fn watermark() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    struct Harness {
        review: Arc<FakeReview>,
        scheduler: Arc<FakeScheduler>,
        controller: SyncController,
        _dir: tempfile::TempDir,
        checkpoint_path: PathBuf,
    }

    fn harness(review: FakeReview, scheduler: FakeScheduler, config: FakeJobConfig) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let checkpoint_path = dir.path().join("checkpoint");
        let review = Arc::new(review);
        let scheduler = Arc::new(scheduler);
        let controller = SyncController::new(
            Arc::clone(&review) as Arc<dyn ReviewApi>,
            Arc::clone(&scheduler) as Arc<dyn JobCreator>,
            Arc::new(config),
            checkpoint_path.clone(),
            25,
            watermark(),
        );
        Harness {
            review,
            scheduler,
            controller,
            _dir: dir,
            checkpoint_path,
        }
    }

    /// A fresh change `minutes` past the watermark.
    fn fresh_change(number: u64, status: ChangeStatus, minutes: i64) -> Change {
        let t = watermark() + ChronoDuration::minutes(minutes);
        change(number, status, t, t)
    }

    #[tokio::test]
    async fn test_partial_failure_isolation() {
        // Three changes; the middle one targets a branch the resolver does
        // not know, so its processing fails.
        let mut second = fresh_change(2, ChangeStatus::New, 20);
        second.branch = "missing".to_string();

        let review = FakeReview::new(vec![
            fresh_change(1, ChangeStatus::New, 10),
            second,
            fresh_change(3, ChangeStatus::New, 30),
        ]);
        let mut h = harness(
            review,
            FakeScheduler::default(),
            FakeJobConfig::with_presubmits(vec![template("unit")]),
        );

        h.controller.sync().await;

        let created = h.scheduler.created.lock().unwrap();
        let changes: Vec<_> = created
            .iter()
            .map(|r| r.refs.pulls[0].number)
            .collect();
        assert_eq!(changes, vec![1, 3]);

        // The failed proposal's timestamp was still subsumed.
        let persisted = fs::read_to_string(&h.checkpoint_path).unwrap();
        let expected = watermark() + ChronoDuration::minutes(30);
        assert_eq!(persisted, expected.timestamp().to_string());
        assert_eq!(h.controller.last_update(), expected);
    }

    #[tokio::test]
    async fn test_merged_changes_run_postsubmits_only() {
        let review = FakeReview::new(vec![fresh_change(1, ChangeStatus::Merged, 10)]);
        let config = FakeJobConfig {
            presubmits: vec![template("unit")],
            postsubmits: vec![template("deploy")],
        };
        let mut h = harness(review, FakeScheduler::default(), config);

        h.controller.sync().await;

        let created = h.scheduler.created.lock().unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].job, "deploy");
        assert_eq!(created[0].kind, JobKind::Postsubmit);
    }

    #[tokio::test]
    async fn test_new_changes_run_presubmits_only() {
        let review = FakeReview::new(vec![fresh_change(1, ChangeStatus::New, 10)]);
        let config = FakeJobConfig {
            presubmits: vec![template("unit")],
            postsubmits: vec![template("deploy")],
        };
        let mut h = harness(review, FakeScheduler::default(), config);

        h.controller.sync().await;

        let created = h.scheduler.created.lock().unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].job, "unit");
        assert_eq!(created[0].kind, JobKind::Presubmit);
        assert_eq!(
            created[0].labels.get(REVISION_LABEL).map(String::as_str),
            Some("rev-1")
        );
    }

    #[tokio::test]
    async fn test_other_statuses_skipped_entirely() {
        let review = FakeReview::new(vec![fresh_change(1, ChangeStatus::Abandoned, 10)]);
        let config = FakeJobConfig {
            presubmits: vec![template("unit")],
            postsubmits: vec![template("deploy")],
        };
        let mut h = harness(review, FakeScheduler::default(), config);

        h.controller.sync().await;

        assert!(h.scheduler.created.lock().unwrap().is_empty());
        assert!(h.review.posted.lock().unwrap().is_empty());
        // Still advances the watermark.
        assert_eq!(
            h.controller.last_update(),
            watermark() + ChronoDuration::minutes(10)
        );
    }

    #[tokio::test]
    async fn test_watermark_never_decreases() {
        // A change older than the watermark leaves it untouched.
        let stale = change(
            1,
            ChangeStatus::New,
            watermark() - ChronoDuration::minutes(60),
            watermark() - ChronoDuration::minutes(60),
        );
        let review = FakeReview::new(vec![stale]);
        let mut h = harness(
            review,
            FakeScheduler::default(),
            FakeJobConfig::with_presubmits(vec![template("unit")]),
        );

        h.controller.sync().await;
        assert_eq!(h.controller.last_update(), watermark());

        // An empty cycle leaves it untouched too.
        h.controller.sync().await;
        assert_eq!(h.controller.last_update(), watermark());
    }

    #[tokio::test]
    async fn test_feedback_comment_posted() {
        let review = FakeReview::new(vec![fresh_change(1, ChangeStatus::New, 10)]);
        let mut h = harness(
            review,
            FakeScheduler::default(),
            FakeJobConfig::with_presubmits(vec![template("unit"), template("lint")]),
        );

        h.controller.sync().await;

        let posted = h.review.posted.lock().unwrap();
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0].0, INSTANCE);
        assert_eq!(
            posted[0].2,
            "Triggered 2 prow jobs:\n  * Name: unit\n  * Name: lint"
        );
    }

    #[tokio::test]
    async fn test_failed_job_omitted_from_comment() {
        let review = FakeReview::new(vec![fresh_change(1, ChangeStatus::New, 10)]);
        let scheduler = FakeScheduler {
            fail_jobs: vec!["unit".to_string()],
            ..FakeScheduler::default()
        };
        let mut h = harness(
            review,
            scheduler,
            FakeJobConfig::with_presubmits(vec![template("unit"), template("lint")]),
        );

        h.controller.sync().await;

        let posted = h.review.posted.lock().unwrap();
        assert_eq!(posted[0].2, "Triggered 1 prow jobs:\n  * Name: lint");
    }

    #[tokio::test]
    async fn test_no_comment_when_nothing_triggered() {
        let review = FakeReview::new(vec![fresh_change(1, ChangeStatus::New, 10)]);
        let mut h = harness(
            review,
            FakeScheduler::default(),
            FakeJobConfig::with_presubmits(Vec::new()),
        );

        h.controller.sync().await;

        assert!(h.review.posted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_account_aborts_presubmit_path() {
        let mut review = FakeReview::new(vec![fresh_change(1, ChangeStatus::New, 10)]);
        review.account = None;
        let mut h = harness(
            review,
            FakeScheduler::default(),
            FakeJobConfig::with_presubmits(vec![template("unit")]),
        );

        h.controller.sync().await;

        assert!(h.scheduler.created.lock().unwrap().is_empty());
        // The batch still completed and the watermark advanced.
        assert_eq!(
            h.controller.last_update(),
            watermark() + ChronoDuration::minutes(10)
        );
    }

    #[tokio::test]
    async fn test_feedback_failure_does_not_retract_jobs() {
        let mut review = FakeReview::new(vec![fresh_change(1, ChangeStatus::New, 10)]);
        review.fail_set_review = true;
        let mut h = harness(
            review,
            FakeScheduler::default(),
            FakeJobConfig::with_presubmits(vec![template("unit")]),
        );

        h.controller.sync().await;

        // The job was created even though the comment failed.
        assert_eq!(h.scheduler.created.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stale_revision_with_retrigger_command() {
        // Revision predates the watermark, but a reviewer asked for a job.
        let created = watermark() - ChronoDuration::minutes(60);
        let updated = watermark() + ChronoDuration::minutes(5);
        let mut stale = change(1, ChangeStatus::New, created, updated);
        stale.messages.push(crate::testutil::message(
            7,
            "/test lint",
            updated,
        ));

        let review = FakeReview::new(vec![stale]);
        let mut h = harness(
            review,
            FakeScheduler::default(),
            FakeJobConfig::with_presubmits(vec![template("unit"), template("lint")]),
        );

        h.controller.sync().await;

        let created = h.scheduler.created.lock().unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].job, "lint");
    }
}
