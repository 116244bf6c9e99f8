//! Timeline Studio core library.
//!
//! This crate provides the pieces behind the studio console: configuration,
//! the render cost estimator and budget policy, the commit and merge dialog
//! state machines, branch comparison, the backend clients, notifications,
//! training-job polling, and the [`Studio`] shell that wires them together.

pub mod backend;
pub mod catalog;
pub mod comparator;
pub mod config;
pub mod errors;
pub mod estimate;
pub mod models;
pub mod notify;
pub mod studio;
pub mod training;
pub mod workflow;

// Re-exports for convenience.
pub use backend::{GpuStatsClient, StudioClient};
pub use config::StudioConfig;
pub use errors::CoreError;
pub use notify::Notifier;
pub use studio::{Studio, StudioSettings};
pub use training::TrainingMonitor;
