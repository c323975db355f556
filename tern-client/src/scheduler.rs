//! Job-scheduler client

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;

use crate::error::{ClientError, Result};
use tern_core::dto::job::{JobHandle, JobRequest};

/// Capability to create CI jobs on the scheduler.
#[async_trait]
pub trait JobCreator: Send + Sync {
    /// Submits one job-creation request. Callers treat a failure as
    /// affecting that job only.
    async fn create_job(&self, request: &JobRequest) -> Result<JobHandle>;
}

/// HTTP implementation of [`JobCreator`].
#[derive(Debug, Clone)]
pub struct HttpSchedulerClient {
    /// Base URL of the scheduler (e.g., "http://localhost:8080")
    base_url: String,
    client: Client,
}

impl HttpSchedulerClient {
    /// Create a new scheduler client
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    /// Create a scheduler client with a caller-configured reqwest client
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Get the base URL of the scheduler
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }
}

#[async_trait]
impl JobCreator for HttpSchedulerClient {
    async fn create_job(&self, request: &JobRequest) -> Result<JobHandle> {
        let url = format!("{}/api/jobs", self.base_url);
        let response = self.client.post(&url).json(request).send().await?;

        self.handle_response(response).await
    }
}
