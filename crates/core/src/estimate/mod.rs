//! Render cost and ETA estimation.
//!
//! Everything here is pure arithmetic over scene parameters and policy
//! constants. Estimates are advisory and never persisted.

pub mod budget;
pub mod cost;

pub use budget::{Approval, BudgetDecision, BudgetPolicy, VenueSelection};
pub use cost::{estimate, CloudCost, CostEstimate, LocalCost, Pricing, SceneParams, Venue};
