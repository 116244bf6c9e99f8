//! Domain model types shared by the workflows, the backend client and the CLI.
//!
//! Wire names follow the studio backend's JSON contract (camelCase).

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ValidationError;

// ---------------------------------------------------------------------------
// Render configuration
// ---------------------------------------------------------------------------

/// Render quality tier.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Draft,
    #[default]
    Medium,
    High,
    Ultra,
}

impl Quality {
    pub const ALL: [Quality; 4] = [Self::Draft, Self::Medium, Self::High, Self::Ultra];
}

impl std::fmt::Display for Quality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Ultra => write!(f, "ultra"),
        }
    }
}

impl FromStr for Quality {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "draft" => Ok(Self::Draft),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "ultra" => Ok(Self::Ultra),
            other => Err(ValidationError::SceneParam {
                field: "quality".into(),
                detail: format!("unknown quality '{}'", other),
            }),
        }
    }
}

/// Render queue priority.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Normal => write!(f, "normal"),
            Self::High => write!(f, "high"),
            Self::Urgent => write!(f, "urgent"),
        }
    }
}

impl FromStr for Priority {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "normal" => Ok(Self::Normal),
            "high" => Ok(Self::High),
            "urgent" => Ok(Self::Urgent),
            other => Err(ValidationError::RenderConfig(format!(
                "unknown priority '{}'",
                other
            ))),
        }
    }
}

/// Render request attached to a commit.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RenderConfig {
    pub quality: Quality,
    pub priority: Priority,
}

// ---------------------------------------------------------------------------
// Branches & commits
// ---------------------------------------------------------------------------

/// A named line of commits within a project.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Branch {
    pub name: String,
    /// Latest commit on the branch, if any.
    #[serde(default)]
    pub head: Option<String>,
}

impl Branch {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            head: None,
        }
    }
}

/// An immutable commit record as returned by the backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Commit {
    pub id: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub author: Option<String>,
    /// Present only when the commit requested a render.
    #[serde(default, rename = "renderConfig")]
    pub render: Option<RenderConfig>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub parents: Vec<String>,
}

impl Commit {
    /// A commit without a render request is a pure checkpoint.
    pub fn is_checkpoint(&self) -> bool {
        self.render.is_none()
    }

    /// Merges produce commits with more than one parent.
    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }
}

// ---------------------------------------------------------------------------
// Scene
// ---------------------------------------------------------------------------

/// Output resolution in pixels.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const FULL_HD: Resolution = Resolution {
        width: 1920,
        height: 1080,
    };

    pub fn pixels(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self::FULL_HD
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Resolution {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::SceneParam {
            field: "resolution".into(),
            detail: format!("expected WIDTHxHEIGHT, got '{}'", s),
        };
        let (w, h) = s.trim().split_once(['x', 'X']).ok_or_else(invalid)?;
        let width: u32 = w.trim().parse().map_err(|_| invalid())?;
        let height: u32 = h.trim().parse().map_err(|_| invalid())?;
        if width == 0 || height == 0 {
            return Err(invalid());
        }
        Ok(Self { width, height })
    }
}

/// Scene metadata. The source of truth lives in the backend; the console
/// only reads it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    pub id: String,
    pub frames: u32,
    #[serde(default, rename = "duration")]
    pub duration_secs: Option<f64>,
    #[serde(default)]
    pub resolution: Resolution,
    #[serde(default)]
    pub quality: Quality,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub music_track: Option<String>,
}

// ---------------------------------------------------------------------------
// Branch comparison
// ---------------------------------------------------------------------------

/// Per-branch statistics reported by the comparison endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BranchStats {
    pub commits: u32,
    #[serde(default)]
    pub scenes: u32,
    #[serde(default)]
    pub last_modified: Option<String>,
}

/// Kind of change between two branches.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Added,
    Modified,
    Deleted,
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Added => write!(f, "added"),
            Self::Modified => write!(f, "modified"),
            Self::Deleted => write!(f, "deleted"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Change {
    #[serde(rename = "type")]
    pub change_type: ChangeType,
    pub description: String,
}

/// A scene modified divergently on both branches.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Conflict {
    pub scene: String,
    pub description: String,
}

/// Derived comparison between a source and a target branch. Never cached
/// across selections.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BranchComparison {
    pub source: BranchStats,
    pub target: BranchStats,
    #[serde(default)]
    pub changes: Vec<Change>,
    #[serde(default)]
    pub conflicts: Vec<Conflict>,
}

impl BranchComparison {
    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Status panels
// ---------------------------------------------------------------------------

/// Lifecycle of a background model-training job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TrainingStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TrainingStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for TrainingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A background model-training job (e.g. a character LoRA).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrainingJob {
    pub id: String,
    pub name: String,
    pub status: TrainingStatus,
    /// Completion in `0.0..=1.0`.
    #[serde(default)]
    pub progress: f32,
    #[serde(default)]
    pub message: Option<String>,
}

/// One device reported by the GPU stats service (ComfyUI `system_stats`
/// shape, sizes in bytes).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GpuDevice {
    pub name: String,
    #[serde(default)]
    pub vram_total: u64,
    #[serde(default)]
    pub vram_free: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GpuStats {
    #[serde(default)]
    pub devices: Vec<GpuDevice>,
}

impl GpuStats {
    /// Aggregate free VRAM fraction, `None` when no device is reported.
    pub fn free_fraction(&self) -> Option<f64> {
        let total: u64 = self.devices.iter().map(|d| d.vram_total).sum();
        if total == 0 {
            return None;
        }
        let free: u64 = self.devices.iter().map(|d| d.vram_free).sum();
        Some(free as f64 / total as f64)
    }

    /// The local GPU is busy when less than `threshold` of VRAM is free.
    pub fn is_busy(&self, threshold: f64) -> bool {
        self.free_fraction().map(|f| f < threshold).unwrap_or(false)
    }
}

/// Daily spend as reported by `GET /budget/daily`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DailyBudget {
    pub used: f64,
    pub auto_approval_threshold: f64,
}
