//! GPU stats service client (ComfyUI `system_stats`).

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, instrument};

use super::GpuStatsSource;
use crate::config::GpuConfig;
use crate::errors::BackendError;
use crate::models::GpuStats;

#[derive(Clone)]
pub struct GpuStatsClient {
    http: reqwest::Client,
    stats_url: String,
}

impl GpuStatsClient {
    pub fn new(stats_url: impl Into<String>, timeout: Duration) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            stats_url: stats_url.into(),
        })
    }

    pub fn from_config(config: &GpuConfig) -> Result<Self, BackendError> {
        Self::new(config.stats_url.clone(), Duration::from_secs(5))
    }
}

#[async_trait]
impl GpuStatsSource for GpuStatsClient {
    #[instrument(skip(self), fields(url = %self.stats_url))]
    async fn gpu_stats(&self) -> Result<GpuStats, BackendError> {
        let resp = self.http.get(&self.stats_url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(BackendError::Api {
                status: status.as_u16(),
                body: format!("HTTP {}", status),
            });
        }
        let stats: GpuStats = resp
            .json()
            .await
            .map_err(|e| BackendError::Parse(e.to_string()))?;
        debug!(devices = stats.devices.len(), "fetched GPU stats");
        Ok(stats)
    }
}
