//! Cloud vs local render cost model.

use serde::{Deserialize, Serialize};

use crate::errors::{ConfigError, ValidationError};
use crate::models::{Quality, Resolution, Scene};

/// Policy constants for the cost model. These are pricing assumptions, not
/// measurements, and every one of them can be overridden from `[pricing]`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Pricing {
    /// Render seconds per frame at `high` quality.
    pub seconds_per_frame_high: f64,
    /// Render seconds per frame at `medium` quality.
    pub seconds_per_frame_medium: f64,
    /// Render seconds per frame for every other tier.
    pub seconds_per_frame_other: f64,

    /// Cloud GPU rate in USD per render minute.
    pub gpu_per_minute: f64,
    /// Object storage in USD per GB-month; estimates prorate one day.
    pub storage_per_gb_month: f64,
    /// Egress up to this size (MB) is free.
    pub network_free_mb: f64,
    /// Egress rate in USD per GB above the free threshold.
    pub network_per_gb: f64,
    /// Orchestration functions in USD per GB-second.
    pub function_per_gb_second: f64,
    /// Memory assumed for the orchestration functions.
    pub function_memory_gb: f64,

    /// Local GPU power draw in watts. The hardware itself is sunk cost.
    pub local_gpu_watts: f64,
    /// Electricity rate in USD per kWh.
    pub electricity_per_kwh: f64,

    /// Output size per frame at 1920x1080, medium quality.
    pub mb_per_frame: f64,
}

impl Default for Pricing {
    fn default() -> Self {
        Self {
            seconds_per_frame_high: 3.0,
            seconds_per_frame_medium: 2.0,
            seconds_per_frame_other: 1.0,
            gpu_per_minute: 0.0265,
            storage_per_gb_month: 0.02,
            network_free_mb: 1000.0,
            network_per_gb: 0.12,
            function_per_gb_second: 0.000_002_5,
            function_memory_gb: 2.0,
            local_gpu_watts: 350.0,
            electricity_per_kwh: 0.15,
            mb_per_frame: 0.5,
        }
    }
}

impl Pricing {
    /// Render seconds per frame for a quality tier.
    pub fn seconds_per_frame(&self, quality: Quality) -> f64 {
        match quality {
            Quality::High => self.seconds_per_frame_high,
            Quality::Medium => self.seconds_per_frame_medium,
            Quality::Draft | Quality::Ultra => self.seconds_per_frame_other,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            ("seconds_per_frame_high", self.seconds_per_frame_high),
            ("seconds_per_frame_medium", self.seconds_per_frame_medium),
            ("seconds_per_frame_other", self.seconds_per_frame_other),
            ("gpu_per_minute", self.gpu_per_minute),
            ("storage_per_gb_month", self.storage_per_gb_month),
            ("network_free_mb", self.network_free_mb),
            ("network_per_gb", self.network_per_gb),
            ("function_per_gb_second", self.function_per_gb_second),
            ("function_memory_gb", self.function_memory_gb),
            ("local_gpu_watts", self.local_gpu_watts),
            ("electricity_per_kwh", self.electricity_per_kwh),
            ("mb_per_frame", self.mb_per_frame),
        ];
        for (name, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidValue {
                    field: format!("pricing.{}", name),
                    detail: format!("must be a non-negative number, got {}", value),
                });
            }
        }
        Ok(())
    }
}

/// Output size multiplier per quality tier.
fn size_factor(quality: Quality) -> f64 {
    match quality {
        Quality::Draft => 0.5,
        Quality::Medium => 1.0,
        Quality::High => 1.5,
        Quality::Ultra => 2.0,
    }
}

/// The scene parameters the estimate depends on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneParams {
    pub frames: u32,
    pub duration_secs: Option<f64>,
    pub resolution: Resolution,
    pub quality: Quality,
}

impl SceneParams {
    pub fn new(frames: u32, quality: Quality) -> Self {
        Self {
            frames,
            duration_secs: None,
            resolution: Resolution::default(),
            quality,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(d) = self.duration_secs {
            if !d.is_finite() || d < 0.0 {
                return Err(ValidationError::SceneParam {
                    field: "duration".into(),
                    detail: format!("must be a non-negative number, got {}", d),
                });
            }
        }
        Ok(())
    }
}

impl From<&Scene> for SceneParams {
    fn from(scene: &Scene) -> Self {
        Self {
            frames: scene.frames,
            duration_secs: scene.duration_secs,
            resolution: scene.resolution,
            quality: scene.quality,
        }
    }
}

/// Execution venue for a render.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Venue {
    Cloud,
    Local,
}

impl std::fmt::Display for Venue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cloud => write!(f, "cloud"),
            Self::Local => write!(f, "local"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq)]
pub struct CloudCost {
    pub gpu: f64,
    pub storage: f64,
    pub network: f64,
    pub functions: f64,
    pub total: f64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq)]
pub struct LocalCost {
    pub electricity: f64,
    pub total: f64,
}

/// Itemized estimate for both venues.
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct CostEstimate {
    pub render_minutes: u32,
    pub file_size_mb: f64,
    pub cloud: CloudCost,
    pub local: LocalCost,
}

impl CostEstimate {
    /// The venue pre-selected for the user: the cheaper one, local on a tie.
    pub fn cheapest(&self) -> Venue {
        if self.local.total <= self.cloud.total {
            Venue::Local
        } else {
            Venue::Cloud
        }
    }

    pub fn total_for(&self, venue: Venue) -> f64 {
        match venue {
            Venue::Cloud => self.cloud.total,
            Venue::Local => self.local.total,
        }
    }
}

/// Estimate render time and cost for a scene.
pub fn estimate(params: &SceneParams, pricing: &Pricing) -> CostEstimate {
    let frames = params.frames as f64;
    let render_minutes = (frames * pricing.seconds_per_frame(params.quality) / 60.0).ceil() as u32;
    let minutes = render_minutes as f64;

    let pixel_scale = params.resolution.pixels() as f64 / Resolution::FULL_HD.pixels() as f64;
    let file_size_mb = frames * pricing.mb_per_frame * pixel_scale * size_factor(params.quality);
    let file_size_gb = file_size_mb / 1024.0;

    let gpu = minutes * pricing.gpu_per_minute;
    let storage = file_size_gb * pricing.storage_per_gb_month / 30.0;
    let network = if file_size_mb <= pricing.network_free_mb {
        0.0
    } else {
        file_size_gb * pricing.network_per_gb
    };
    let functions = minutes * 60.0 * pricing.function_memory_gb * pricing.function_per_gb_second;

    let electricity = pricing.local_gpu_watts / 1000.0 * (minutes / 60.0) * pricing.electricity_per_kwh;

    CostEstimate {
        render_minutes,
        file_size_mb,
        cloud: CloudCost {
            gpu,
            storage,
            network,
            functions,
            total: gpu + storage + network + functions,
        },
        local: LocalCost {
            electricity,
            total: electricity,
        },
    }
}
