//! Daily spend cap, auto-approval and venue selection.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::cost::{CostEstimate, Venue};
use crate::models::DailyBudget;

/// Daily spend policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BudgetPolicy {
    /// Hard cap on cumulative spend per day, in USD.
    pub daily_cap: f64,
    /// Estimates below this cost are approved without asking. The backend's
    /// `autoApprovalThreshold` takes precedence when it reports one.
    pub auto_approval_threshold: f64,
}

impl Default for BudgetPolicy {
    fn default() -> Self {
        Self {
            daily_cap: 20.0,
            auto_approval_threshold: 1.0,
        }
    }
}

/// Whether a render can proceed unattended.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Approval {
    Auto,
    Manual,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct BudgetDecision {
    pub cost: f64,
    /// Spend after this render.
    pub projected: f64,
    pub over_cap: bool,
    pub approval: Approval,
}

impl BudgetPolicy {
    /// Check a cost against today's spend.
    pub fn decide(&self, cost: f64, today: &DailyBudget) -> BudgetDecision {
        let threshold = if today.auto_approval_threshold > 0.0 {
            today.auto_approval_threshold
        } else {
            self.auto_approval_threshold
        };
        let projected = today.used + cost;
        let over_cap = projected > self.daily_cap;
        let approval = if !over_cap && cost < threshold {
            Approval::Auto
        } else {
            Approval::Manual
        };
        debug!(cost, projected, over_cap, ?approval, "budget decision");
        BudgetDecision {
            cost,
            projected,
            over_cap,
            approval,
        }
    }
}

/// The venue picker: defaults to the cheaper venue, the user may override.
#[derive(Debug, Clone, PartialEq)]
pub struct VenueSelection {
    estimate: CostEstimate,
    chosen: Venue,
    overridden: bool,
    local_busy: bool,
}

impl VenueSelection {
    pub fn new(estimate: CostEstimate, local_busy: bool) -> Self {
        Self {
            chosen: estimate.cheapest(),
            estimate,
            overridden: false,
            local_busy,
        }
    }

    /// Explicit user choice.
    pub fn choose(&mut self, venue: Venue) {
        self.overridden = venue != self.estimate.cheapest();
        self.chosen = venue;
    }

    /// Replace the estimate after a parameter change. A user override
    /// survives; otherwise the cheaper venue is re-selected.
    pub fn update(&mut self, estimate: CostEstimate, local_busy: bool) {
        self.estimate = estimate;
        self.local_busy = local_busy;
        if !self.overridden {
            self.chosen = estimate.cheapest();
        }
    }

    pub fn chosen(&self) -> Venue {
        self.chosen
    }

    pub fn is_overridden(&self) -> bool {
        self.overridden
    }

    pub fn local_busy(&self) -> bool {
        self.local_busy
    }

    pub fn estimate(&self) -> &CostEstimate {
        &self.estimate
    }

    pub fn cost(&self) -> f64 {
        self.estimate.total_for(self.chosen)
    }
}
