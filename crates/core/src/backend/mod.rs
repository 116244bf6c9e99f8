//! Studio backend access.
//!
//! The console talks to two services over HTTP/JSON: the versioning backend
//! (commits, comparisons, merges, budget, training jobs, model catalog) and
//! a separate GPU stats service. Both are reached through traits so the
//! orchestrator can be driven by test doubles.

pub mod client;
pub mod gpu;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use client::StudioClient;
pub use gpu::GpuStatsClient;

use crate::comparator::CompareRequest;
use crate::errors::BackendError;
use crate::models::{Branch, BranchComparison, Commit, DailyBudget, GpuStats, Quality, TrainingJob};
use crate::workflow::{CommitRequest, MergeReceipt, MergeRequest};

/// Model and quality lists offered in the render dropdowns.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CatalogListing {
    #[serde(default)]
    pub models: Vec<String>,
    #[serde(default)]
    pub qualities: Vec<Quality>,
}

/// The versioning / orchestration backend.
#[async_trait]
pub trait VersioningBackend: Send + Sync {
    /// `GET /git/branches`
    async fn list_branches(&self) -> Result<Vec<Branch>, BackendError>;

    /// `POST /commit`
    async fn commit(&self, request: &CommitRequest) -> Result<Commit, BackendError>;

    /// `POST /git/compare`
    async fn compare(&self, request: &CompareRequest) -> Result<BranchComparison, BackendError>;

    /// `POST /merge`
    async fn merge(&self, request: &MergeRequest) -> Result<MergeReceipt, BackendError>;

    /// `GET /budget/daily`
    async fn daily_budget(&self) -> Result<DailyBudget, BackendError>;

    /// `GET /training/jobs`
    async fn training_jobs(&self) -> Result<Vec<TrainingJob>, BackendError>;

    /// `GET /models`
    async fn model_catalog(&self) -> Result<CatalogListing, BackendError>;
}

/// The GPU occupancy service.
#[async_trait]
pub trait GpuStatsSource: Send + Sync {
    async fn gpu_stats(&self) -> Result<GpuStats, BackendError>;
}
