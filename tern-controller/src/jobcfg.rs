//! Job and instance configuration
//!
//! One YAML file declares which review instances and projects to poll, and
//! the job templates per clone location. Template lists are looked up under
//! both the full clone URI and its `host/path` form, so either spelling
//! works as a key.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;
use url::Url;

use tern_core::domain::job::JobTemplate;

/// Read-only access to the configured job templates.
pub trait JobConfigSource: Send + Sync {
    /// Presubmit templates for a clone location, in config order.
    fn presubmits(&self, clone_uri: &Url) -> Vec<JobTemplate>;

    /// Postsubmit templates for a clone location, in config order.
    fn postsubmits(&self, clone_uri: &Url) -> Vec<JobTemplate>;
}

/// Job templates for one repository.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RepoJobs {
    #[serde(default)]
    pub presubmits: Vec<JobTemplate>,
    #[serde(default)]
    pub postsubmits: Vec<JobTemplate>,
}

/// The YAML configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobConfigFile {
    /// Review instance URL -> projects polled on that instance.
    #[serde(default)]
    pub instances: HashMap<String, Vec<String>>,

    /// Clone location (full URI or `host/path`) -> job templates.
    #[serde(default)]
    pub repos: HashMap<String, RepoJobs>,
}

impl JobConfigFile {
    /// Loads and validates the configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: JobConfigFile = serde_yaml::from_str(&text)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects unnamed templates and patterns that will never compile, so
    /// bad config fails at startup instead of mid-cycle.
    pub fn validate(&self) -> Result<()> {
        for (repo, jobs) in &self.repos {
            for template in jobs.presubmits.iter().chain(jobs.postsubmits.iter()) {
                if template.name.is_empty() {
                    anyhow::bail!("unnamed job configured for {}", repo);
                }
                if let Some(pattern) = &template.run_if_changed {
                    Regex::new(pattern).with_context(|| {
                        format!("job {} for {}: bad run_if_changed", template.name, repo)
                    })?;
                }
            }
        }
        Ok(())
    }

    fn lookup(&self, clone_uri: &Url, pick: fn(&RepoJobs) -> &Vec<JobTemplate>) -> Vec<JobTemplate> {
        let host_path = format!(
            "{}{}",
            clone_uri.host_str().unwrap_or_default(),
            clone_uri.path()
        );
        let mut templates = Vec::new();
        for key in [clone_uri.as_str(), host_path.as_str()] {
            if let Some(jobs) = self.repos.get(key) {
                templates.extend(pick(jobs).iter().cloned());
            }
        }
        templates
    }
}

impl JobConfigSource for JobConfigFile {
    fn presubmits(&self, clone_uri: &Url) -> Vec<JobTemplate> {
        self.lookup(clone_uri, |jobs| &jobs.presubmits)
    }

    fn postsubmits(&self, clone_uri: &Url) -> Vec<JobTemplate> {
        self.lookup(clone_uri, |jobs| &jobs.postsubmits)
    }
}
