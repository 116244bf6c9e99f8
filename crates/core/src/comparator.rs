//! Branch comparison.
//!
//! Conflict detection is the backend's job; this layer requests the
//! comparison, keeps the server's ordering, and turns a failure into an
//! explicit [`ComparisonOutcome::Unavailable`] instead of placeholder data.
//!
//! Each request is tagged with a [`CompareTicket`]. Issuing a new ticket
//! supersedes the previous one, so a slow response for an abandoned source
//! selection is recognised and dropped.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::backend::VersioningBackend;
use crate::errors::BackendError;
use crate::models::{BranchComparison, Change, Conflict};

/// Body of `POST /git/compare`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CompareRequest {
    pub source_branch: String,
    pub target_branch: String,
}

/// The branch pair a comparison was requested for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompareTicket {
    generation: u64,
    pub source: String,
    pub target: String,
}

impl CompareTicket {
    pub fn request(&self) -> CompareRequest {
        CompareRequest {
            source_branch: self.source.clone(),
            target_branch: self.target.clone(),
        }
    }
}

/// Hands out tickets and remembers which one is current.
#[derive(Debug, Default, Clone)]
pub struct CompareGuard {
    generation: u64,
    current: Option<(String, String)>,
}

impl CompareGuard {
    /// Supersede any outstanding request with one for `source -> target`.
    pub fn issue(&mut self, source: &str, target: &str) -> CompareTicket {
        self.generation += 1;
        self.current = Some((source.to_string(), target.to_string()));
        CompareTicket {
            generation: self.generation,
            source: source.to_string(),
            target: target.to_string(),
        }
    }

    /// Whether a response for `ticket` still matches the selection.
    pub fn is_current(&self, ticket: &CompareTicket) -> bool {
        ticket.generation == self.generation
            && self
                .current
                .as_ref()
                .map(|(s, t)| *s == ticket.source && *t == ticket.target)
                .unwrap_or(false)
    }

    /// Orphan the outstanding request, if any.
    pub fn invalidate(&mut self) {
        self.generation += 1;
        self.current = None;
    }
}

/// What the comparison panel shows once a request has returned.
#[derive(Debug, Clone, PartialEq)]
pub enum ComparisonOutcome {
    Available(BranchComparison),
    /// The comparison could not be fetched. No substitute data is shown.
    Unavailable { reason: String },
}

impl ComparisonOutcome {
    pub fn from_result(result: Result<BranchComparison, BackendError>) -> Self {
        match result {
            Ok(cmp) => Self::Available(cmp),
            Err(e) => Self::Unavailable {
                reason: e.to_string(),
            },
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }

    pub fn comparison(&self) -> Option<&BranchComparison> {
        match self {
            Self::Available(cmp) => Some(cmp),
            Self::Unavailable { .. } => None,
        }
    }

    /// Change rows in server order; empty when unavailable.
    pub fn change_rows(&self) -> &[Change] {
        self.comparison().map(|c| c.changes.as_slice()).unwrap_or(&[])
    }

    /// Conflict rows in server order; empty when unavailable.
    pub fn conflict_rows(&self) -> &[Conflict] {
        self.comparison()
            .map(|c| c.conflicts.as_slice())
            .unwrap_or(&[])
    }
}

/// Fetches comparisons from the versioning backend.
#[derive(Clone)]
pub struct BranchComparator {
    backend: Arc<dyn VersioningBackend>,
}

impl BranchComparator {
    pub fn new(backend: Arc<dyn VersioningBackend>) -> Self {
        Self { backend }
    }

    /// Request the comparison for a ticket. The caller decides whether the
    /// answer is still wanted.
    pub async fn compare(&self, ticket: &CompareTicket) -> Result<BranchComparison, BackendError> {
        debug!(source = %ticket.source, target = %ticket.target, "requesting branch comparison");
        match self.backend.compare(&ticket.request()).await {
            Ok(cmp) => {
                info!(
                    source = %ticket.source,
                    target = %ticket.target,
                    changes = cmp.changes.len(),
                    conflicts = cmp.conflicts.len(),
                    "branch comparison received"
                );
                Ok(cmp)
            }
            Err(e) => {
                warn!(
                    source = %ticket.source,
                    target = %ticket.target,
                    kind = e.kind(),
                    error = %e,
                    "branch comparison failed"
                );
                Err(e)
            }
        }
    }
}
