//! Deterministic in-memory fakes for the external collaborators
//!
//! Everything the sync pipeline talks to over the network has a fake here,
//! so the pipeline tests run without any I/O beyond a temp directory for
//! the checkpoint.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use url::Url;

use tern_client::error::{ClientError, Result as ClientResult};
use tern_client::{JobCreator, ReviewApi};
use tern_core::domain::change::{Account, Change, ChangeStatus, FileInfo, Message, Revision};
use tern_core::domain::job::JobTemplate;
use tern_core::dto::job::{JobHandle, JobRequest};

use crate::jobcfg::JobConfigSource;

/// The single review instance all fakes pretend to be.
pub const INSTANCE: &str = "https://demo-review.example.com";

/// Account id the controller authenticates as in tests.
pub const BOT_ACCOUNT: u64 = 1000;

pub fn account(id: u64) -> Account {
    Account {
        account_id: id,
        name: format!("account-{}", id),
        email: format!("{}@example.com", id),
    }
}

pub fn template(name: &str) -> JobTemplate {
    JobTemplate {
        name: name.to_string(),
        labels: BTreeMap::new(),
        branches: Vec::new(),
        skip_branches: Vec::new(),
        run_if_changed: None,
    }
}

pub fn message(author_id: u64, text: &str, date: DateTime<Utc>) -> Message {
    Message {
        author: account(author_id),
        message: text.to_string(),
        date,
    }
}

/// A change on branch `main` of project `demo` with one revision.
pub fn change(
    number: u64,
    status: ChangeStatus,
    created: DateTime<Utc>,
    updated: DateTime<Utc>,
) -> Change {
    let revision_id = format!("rev-{}", number);
    Change {
        id: format!("demo~main~I{:040}", number),
        number,
        project: "demo".to_string(),
        branch: "main".to_string(),
        status,
        current_revision: revision_id.clone(),
        revisions: HashMap::from([(
            revision_id,
            Revision {
                ref_name: format!("refs/changes/{:02}/{}/1", number % 100, number),
                created,
                author: account(7),
                files: HashMap::from([("src/lib.rs".to_string(), FileInfo::default())]),
            },
        )]),
        messages: Vec::new(),
        updated,
    }
}

/// In-memory [`ReviewApi`]: serves a fixed change list for [`INSTANCE`] and
/// records posted reviews.
pub struct FakeReview {
    pub changes: Vec<Change>,
    /// branch -> resolvable tip; lookups for other branches fail.
    pub branches: HashMap<String, String>,
    pub account: Option<Account>,
    /// (instance, change id, message) triples in posting order.
    pub posted: Mutex<Vec<(String, String, String)>>,
    pub fail_set_review: bool,
}

impl FakeReview {
    pub fn new(changes: Vec<Change>) -> Self {
        Self {
            changes,
            branches: HashMap::from([("main".to_string(), "base-sha".to_string())]),
            account: Some(account(BOT_ACCOUNT)),
            posted: Mutex::new(Vec::new()),
            fail_set_review: false,
        }
    }
}

#[async_trait]
impl ReviewApi for FakeReview {
    async fn query_changes(
        &self,
        _since: DateTime<Utc>,
        _rate_limit: u32,
    ) -> HashMap<String, Vec<Change>> {
        HashMap::from([(INSTANCE.to_string(), self.changes.clone())])
    }

    async fn get_branch_revision(
        &self,
        instance: &str,
        project: &str,
        branch: &str,
    ) -> ClientResult<String> {
        self.branches.get(branch).cloned().ok_or_else(|| {
            ClientError::NotFound(format!("branch {} of {} on {}", branch, project, instance))
        })
    }

    async fn set_review(
        &self,
        instance: &str,
        change_id: &str,
        _revision: &str,
        message: &str,
        _labels: Option<BTreeMap<String, i32>>,
    ) -> ClientResult<()> {
        if self.fail_set_review {
            return Err(ClientError::api_error(500, "posting disabled"));
        }
        self.posted.lock().unwrap().push((
            instance.to_string(),
            change_id.to_string(),
            message.to_string(),
        ));
        Ok(())
    }

    async fn account(&self, _instance: &str) -> Option<Account> {
        self.account.clone()
    }
}

/// In-memory [`JobCreator`]: records requests, optionally failing some by
/// job name.
#[derive(Default)]
pub struct FakeScheduler {
    pub created: Mutex<Vec<JobRequest>>,
    pub fail_jobs: Vec<String>,
}

#[async_trait]
impl JobCreator for FakeScheduler {
    async fn create_job(&self, request: &JobRequest) -> ClientResult<JobHandle> {
        if self.fail_jobs.contains(&request.job) {
            return Err(ClientError::api_error(500, "scheduler refused"));
        }
        self.created.lock().unwrap().push(request.clone());
        Ok(JobHandle {
            id: uuid::Uuid::new_v4(),
            job: request.job.clone(),
        })
    }
}

/// Fixed template lists regardless of clone location.
#[derive(Default)]
pub struct FakeJobConfig {
    pub presubmits: Vec<JobTemplate>,
    pub postsubmits: Vec<JobTemplate>,
}

impl FakeJobConfig {
    pub fn with_presubmits(presubmits: Vec<JobTemplate>) -> Self {
        Self {
            presubmits,
            postsubmits: Vec::new(),
        }
    }
}

impl JobConfigSource for FakeJobConfig {
    fn presubmits(&self, _clone_uri: &Url) -> Vec<JobTemplate> {
        self.presubmits.clone()
    }

    fn postsubmits(&self, _clone_uri: &Url) -> Vec<JobTemplate> {
        self.postsubmits.clone()
    }
}
