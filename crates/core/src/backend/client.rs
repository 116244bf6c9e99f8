//! HTTP client for the studio backend.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument};

use super::{CatalogListing, VersioningBackend};
use crate::comparator::CompareRequest;
use crate::config::BackendConfig;
use crate::errors::BackendError;
use crate::models::{Branch, BranchComparison, Commit, DailyBudget, TrainingJob};
use crate::workflow::{CommitRequest, MergeReceipt, MergeRequest};

/// Asynchronous studio backend client.
#[derive(Clone)]
pub struct StudioClient {
    http: reqwest::Client,
    api_url: String,
    token: Option<String>,
}

impl StudioClient {
    pub fn new(
        api_url: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("timeline-studio/", env!("CARGO_PKG_VERSION"))),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;
        info!(api_url = %api_url, "created StudioClient");
        Ok(Self {
            http,
            api_url,
            token,
        })
    }

    pub fn from_config(config: &BackendConfig) -> Result<Self, BackendError> {
        Self::new(
            config.api_url.clone(),
            config.token.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let req = req.header("X-Request-Id", uuid::Uuid::new_v4().to_string());
        match self.token {
            Some(ref token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, BackendError> {
        let resp = self.authorize(self.http.get(self.url(path))).send().await?;
        let resp = check_response(resp).await?;
        resp.json()
            .await
            .map_err(|e| BackendError::Parse(e.to_string()))
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, BackendError>
    where
        B: serde::Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let resp = self
            .authorize(self.http.post(self.url(path)))
            .json(body)
            .send()
            .await?;
        let resp = check_response(resp).await?;
        resp.json()
            .await
            .map_err(|e| BackendError::Parse(e.to_string()))
    }
}

/// Map a non-2xx response to [`BackendError::Api`], keeping the body for
/// the notification text.
async fn check_response(resp: reqwest::Response) -> Result<reqwest::Response, BackendError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let body = if body.trim().is_empty() {
        format!("HTTP {}", status)
    } else {
        body
    };
    Err(BackendError::Api {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl VersioningBackend for StudioClient {
    #[instrument(skip(self))]
    async fn list_branches(&self) -> Result<Vec<Branch>, BackendError> {
        let branches: Vec<Branch> = self.get_json("/git/branches").await?;
        debug!(count = branches.len(), "fetched branches");
        Ok(branches)
    }

    #[instrument(skip(self, request), fields(should_render = request.should_render))]
    async fn commit(&self, request: &CommitRequest) -> Result<Commit, BackendError> {
        let commit: Commit = self.post_json("/commit", request).await?;
        info!(commit = %commit.id, "commit created");
        Ok(commit)
    }

    #[instrument(skip(self, request), fields(source = %request.source_branch, target = %request.target_branch))]
    async fn compare(&self, request: &CompareRequest) -> Result<BranchComparison, BackendError> {
        self.post_json("/git/compare", request).await
    }

    #[instrument(skip(self, request), fields(source = %request.source_branch, target = %request.target_branch))]
    async fn merge(&self, request: &MergeRequest) -> Result<MergeReceipt, BackendError> {
        let resp = self
            .authorize(self.http.post(self.url("/merge")))
            .json(request)
            .send()
            .await?;
        let resp = check_response(resp).await?;
        let text = resp.text().await?;
        if text.trim().is_empty() {
            return Ok(MergeReceipt::default());
        }
        serde_json::from_str(&text).map_err(|e| BackendError::Parse(e.to_string()))
    }

    #[instrument(skip(self))]
    async fn daily_budget(&self) -> Result<DailyBudget, BackendError> {
        self.get_json("/budget/daily").await
    }

    #[instrument(skip(self))]
    async fn training_jobs(&self) -> Result<Vec<TrainingJob>, BackendError> {
        self.get_json("/training/jobs").await
    }

    #[instrument(skip(self))]
    async fn model_catalog(&self) -> Result<CatalogListing, BackendError> {
        self.get_json("/models").await
    }
}
