//! Review-system client
//!
//! Speaks the Gerrit REST dialect: JSON bodies behind the `)]}'` XSSI
//! prefix, `after:` change queries, URL-encoded project/branch path
//! segments.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::error::{ClientError, Result};
use tern_core::domain::change::{Account, Change};

/// Read/write access to the review system, at the granularity the sync
/// pipeline needs.
#[async_trait]
pub trait ReviewApi: Send + Sync {
    /// Fetches all proposals updated since `since`, grouped by review
    /// instance. Per-instance query failures are logged and yield no
    /// entries; a poll cycle must not abort because one instance is down.
    async fn query_changes(
        &self,
        since: DateTime<Utc>,
        rate_limit: u32,
    ) -> HashMap<String, Vec<Change>>;

    /// Resolves the current tip of `branch`. `NotFound` when the branch
    /// does not exist.
    async fn get_branch_revision(
        &self,
        instance: &str,
        project: &str,
        branch: &str,
    ) -> Result<String>;

    /// Posts a review comment on the given revision. `labels: None` means
    /// no score labels are applied.
    async fn set_review(
        &self,
        instance: &str,
        change_id: &str,
        revision: &str,
        message: &str,
        labels: Option<BTreeMap<String, i32>>,
    ) -> Result<()>;

    /// The account this controller authenticates as on `instance`, or
    /// `None` when it cannot be resolved.
    async fn account(&self, instance: &str) -> Option<Account>;
}

/// Gerrit response bodies are prefixed to defeat cross-site script
/// inclusion; strip it before handing the text to serde.
const XSSI_PREFIX: &str = ")]}'";

#[derive(Serialize)]
struct ReviewInput<'a> {
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    labels: Option<BTreeMap<String, i32>>,
}

/// HTTP implementation of [`ReviewApi`].
pub struct HttpReviewClient {
    client: Client,
    /// Instance base URL -> projects polled on that instance.
    instances: HashMap<String, Vec<String>>,
}

impl HttpReviewClient {
    /// Creates a client polling the given instance -> projects map.
    pub fn new(instances: HashMap<String, Vec<String>>) -> Self {
        Self {
            client: Client::new(),
            instances: trim_instance_urls(instances),
        }
    }

    /// Creates a client with a caller-configured reqwest client (timeouts,
    /// proxies, TLS).
    pub fn with_client(instances: HashMap<String, Vec<String>>, client: Client) -> Self {
        Self {
            client,
            instances: trim_instance_urls(instances),
        }
    }

    /// Instances this client polls.
    pub fn instances(&self) -> impl Iterator<Item = &str> {
        self.instances.keys().map(String::as_str)
    }

    async fn parse_json<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(ClientError::api_error(status.as_u16(), text));
        }

        let body = text.strip_prefix(XSSI_PREFIX).unwrap_or(&text);
        serde_json::from_str(body)
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }

    async fn query_project(
        &self,
        instance: &str,
        project: &str,
        since: DateTime<Utc>,
        rate_limit: u32,
    ) -> Result<Vec<Change>> {
        let url = format!("{}/changes/", instance);
        let query = format!(
            "project:{} after:\"{}\"",
            project,
            since.format("%Y-%m-%d %H:%M:%S")
        );
        let limit = rate_limit.to_string();
        let response = self
            .client
            .get(&url)
            .query(&[("q", query.as_str()), ("n", limit.as_str())])
            .query(&[
                ("o", "ALL_REVISIONS"),
                ("o", "ALL_FILES"),
                ("o", "MESSAGES"),
                ("o", "DETAILED_ACCOUNTS"),
            ])
            .send()
            .await?;

        self.parse_json(response).await
    }
}

#[async_trait]
impl ReviewApi for HttpReviewClient {
    async fn query_changes(
        &self,
        since: DateTime<Utc>,
        rate_limit: u32,
    ) -> HashMap<String, Vec<Change>> {
        let mut result = HashMap::new();
        for (instance, projects) in &self.instances {
            let mut changes = Vec::new();
            for project in projects {
                match self.query_project(instance, project, since, rate_limit).await {
                    Ok(mut batch) => changes.append(&mut batch),
                    Err(e) => {
                        warn!(
                            "Failed to query {} on {}, skipping this cycle: {}",
                            project, instance, e
                        );
                    }
                }
            }
            result.insert(instance.clone(), changes);
        }
        result
    }

    async fn get_branch_revision(
        &self,
        instance: &str,
        project: &str,
        branch: &str,
    ) -> Result<String> {
        let url = format!(
            "{}/projects/{}/branches/{}",
            instance,
            urlencoding::encode(project),
            urlencoding::encode(branch)
        );
        let response = self.client.get(&url).send().await?;

        if response.status().as_u16() == 404 {
            return Err(ClientError::NotFound(format!(
                "branch {} of {} on {}",
                branch, project, instance
            )));
        }

        #[derive(serde::Deserialize)]
        struct BranchInfo {
            revision: String,
        }
        let info: BranchInfo = self.parse_json(response).await?;
        Ok(info.revision)
    }

    async fn set_review(
        &self,
        instance: &str,
        change_id: &str,
        revision: &str,
        message: &str,
        labels: Option<BTreeMap<String, i32>>,
    ) -> Result<()> {
        let url = format!(
            "{}/changes/{}/revisions/{}/review",
            instance,
            urlencoding::encode(change_id),
            urlencoding::encode(revision)
        );
        let response = self
            .client
            .post(&url)
            .json(&ReviewInput { message, labels })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ClientError::api_error(status.as_u16(), text));
        }
        Ok(())
    }

    async fn account(&self, instance: &str) -> Option<Account> {
        let url = format!("{}/accounts/self", instance);
        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("Failed to fetch own account on {}: {}", instance, e);
                return None;
            }
        };
        match self.parse_json(response).await {
            Ok(account) => Some(account),
            Err(e) => {
                warn!("Failed to resolve own account on {}: {}", instance, e);
                None
            }
        }
    }
}

fn trim_instance_urls(instances: HashMap<String, Vec<String>>) -> HashMap<String, Vec<String>> {
    instances
        .into_iter()
        .map(|(url, projects)| (url.trim_end_matches('/').to_string(), projects))
        .collect()
}
