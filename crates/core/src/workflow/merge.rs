//! Merge dialog.
//!
//! Phases: `NoSource -> Comparing -> Ready -> {Merging -> Merged | Cancelled}`.
//! The target is always the active branch and never appears among the
//! selectable sources. Submission stays disabled while a comparison is in
//! flight or when it came back unavailable.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{Outcome, Resolution, Ticket};
use crate::comparator::{CompareGuard, CompareTicket, ComparisonOutcome};
use crate::errors::{BackendError, ValidationError, WorkflowError};
use crate::models::{Branch, BranchComparison, Commit};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePhase {
    NoSource,
    Comparing,
    Ready,
    Merging,
    Merged,
    Cancelled,
}

impl std::fmt::Display for MergePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoSource => write!(f, "no_source"),
            Self::Comparing => write!(f, "comparing"),
            Self::Ready => write!(f, "ready"),
            Self::Merging => write!(f, "merging"),
            Self::Merged => write!(f, "merged"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// How the backend resolves detected conflicts. Passed through unmodified.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum MergeStrategy {
    /// Resolve trivial conflicts, defer the rest to the user.
    #[default]
    Auto,
    /// Resolve nothing automatically.
    Manual,
    PreferTarget,
    PreferSource,
}

impl std::fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Manual => write!(f, "manual"),
            Self::PreferTarget => write!(f, "prefer-target"),
            Self::PreferSource => write!(f, "prefer-source"),
        }
    }
}

impl std::str::FromStr for MergeStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "auto" => Ok(Self::Auto),
            "manual" => Ok(Self::Manual),
            "prefer-target" => Ok(Self::PreferTarget),
            "prefer-source" => Ok(Self::PreferSource),
            other => Err(format!("unknown merge strategy '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MergeOptions {
    /// Collapse the source commits into one merge commit on the target.
    pub squash: bool,
    /// Delete the source branch after a successful merge.
    pub delete_branch: bool,
    /// Snapshot the target before merging.
    pub create_backup: bool,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            squash: false,
            delete_branch: false,
            create_backup: true,
        }
    }
}

/// Body of `POST /merge`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MergeRequest {
    pub source_branch: String,
    pub target_branch: String,
    pub strategy: MergeStrategy,
    pub message: String,
    pub options: MergeOptions,
}

/// What `POST /merge` reports back. Every field is optional; an empty body
/// is a plain success.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct MergeReceipt {
    pub commit: Option<Commit>,
    pub backup_branch: Option<String>,
    pub unresolved_conflicts: Vec<String>,
}

pub fn default_message(source: &str, target: &str) -> String {
    format!("Merge {} into {}", source, target)
}

#[derive(Debug, Clone)]
pub struct MergeDialog {
    target: String,
    sources: Vec<String>,
    phase: MergePhase,
    source: Option<String>,
    strategy: Option<MergeStrategy>,
    options: MergeOptions,
    message: String,
    /// Set when the user typed the message; regeneration stops.
    message_dirty: bool,
    comparison: Option<ComparisonOutcome>,
    guard: CompareGuard,
    attempt: u64,
    last_error: Option<String>,
}

impl MergeDialog {
    /// Open the dialog against the active branch `target`. The selectable
    /// sources are `branches` minus the target.
    pub fn new(target: impl Into<String>, branches: &[Branch]) -> Self {
        let target = target.into();
        let mut sources: Vec<String> = Vec::new();
        for b in branches {
            if b.name != target && !sources.contains(&b.name) {
                sources.push(b.name.clone());
            }
        }
        debug!(target = %target, sources = sources.len(), "merge dialog opened");
        Self {
            target,
            sources,
            phase: MergePhase::NoSource,
            source: None,
            strategy: Some(MergeStrategy::default()),
            options: MergeOptions::default(),
            message: String::new(),
            message_dirty: false,
            comparison: None,
            guard: CompareGuard::default(),
            attempt: 0,
            last_error: None,
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn phase(&self) -> MergePhase {
        self.phase
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Branches the user may pick as source. Never contains the target.
    pub fn selectable_sources(&self) -> &[String] {
        &self.sources
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn strategy(&self) -> Option<MergeStrategy> {
        self.strategy
    }

    pub fn options(&self) -> MergeOptions {
        self.options
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn comparison(&self) -> Option<&ComparisonOutcome> {
        self.comparison.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Loading flag for the comparison panel.
    pub fn is_comparing(&self) -> bool {
        self.phase == MergePhase::Comparing
    }

    /// Loading flag for the merge button.
    pub fn is_merging(&self) -> bool {
        self.phase == MergePhase::Merging
    }

    /// Whether the merge button is enabled.
    pub fn can_submit(&self) -> bool {
        self.check_submittable().is_ok()
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    /// Pick a source branch and start comparing it against the target.
    pub fn select_source(&mut self, name: &str) -> Result<CompareTicket, WorkflowError> {
        if !matches!(
            self.phase,
            MergePhase::NoSource | MergePhase::Comparing | MergePhase::Ready
        ) {
            return Err(self.invalid("select_source"));
        }
        if name == self.target {
            return Err(ValidationError::SourceIsTarget(name.to_string()).into());
        }
        if !self.sources.iter().any(|s| s == name) {
            return Err(ValidationError::UnknownBranch(name.to_string()).into());
        }

        self.source = Some(name.to_string());
        self.comparison = None;
        self.last_error = None;
        self.phase = MergePhase::Comparing;
        if !self.message_dirty {
            self.message = default_message(name, &self.target);
        }
        let ticket = self.guard.issue(name, &self.target);
        debug!(source = name, target = %self.target, "merge source selected");
        Ok(ticket)
    }

    /// Feed back a comparison response.
    pub fn on_comparison(
        &mut self,
        ticket: &CompareTicket,
        result: Result<BranchComparison, BackendError>,
    ) -> Outcome<ComparisonOutcome> {
        if self.phase != MergePhase::Comparing || !self.guard.is_current(ticket) {
            debug!(source = %ticket.source, "discarding stale comparison");
            return Outcome::Stale;
        }
        let outcome = ComparisonOutcome::from_result(result);
        self.comparison = Some(outcome.clone());
        self.phase = MergePhase::Ready;
        Outcome::Applied(outcome)
    }

    pub fn set_strategy(&mut self, strategy: Option<MergeStrategy>) -> Result<(), WorkflowError> {
        self.ensure_editable("set_strategy")?;
        self.strategy = strategy;
        Ok(())
    }

    pub fn set_squash(&mut self, on: bool) -> Result<(), WorkflowError> {
        self.ensure_editable("set_squash")?;
        self.options.squash = on;
        Ok(())
    }

    pub fn set_delete_branch(&mut self, on: bool) -> Result<(), WorkflowError> {
        self.ensure_editable("set_delete_branch")?;
        self.options.delete_branch = on;
        Ok(())
    }

    pub fn set_create_backup(&mut self, on: bool) -> Result<(), WorkflowError> {
        self.ensure_editable("set_create_backup")?;
        self.options.create_backup = on;
        Ok(())
    }

    /// Override the message. Clearing it brings back the generated default.
    pub fn set_message(&mut self, message: impl Into<String>) -> Result<(), WorkflowError> {
        self.ensure_editable("set_message")?;
        let message = message.into();
        if message.trim().is_empty() {
            self.message_dirty = false;
            self.message = self
                .source
                .as_deref()
                .map(|s| default_message(s, &self.target))
                .unwrap_or_default();
        } else {
            self.message_dirty = true;
            self.message = message;
        }
        Ok(())
    }

    /// Validate and move to `Merging`.
    pub fn submit(&mut self) -> Result<(Ticket, MergeRequest), WorkflowError> {
        let (source, strategy) = self.check_submittable()?;

        let request = MergeRequest {
            source_branch: source.to_string(),
            target_branch: self.target.clone(),
            strategy,
            message: self.message.trim().to_string(),
            options: self.options,
        };
        self.attempt += 1;
        self.phase = MergePhase::Merging;
        self.last_error = None;
        info!(
            source = %request.source_branch,
            target = %request.target_branch,
            strategy = %request.strategy,
            "merge submitted"
        );
        Ok((Ticket(self.attempt), request))
    }

    /// Feed back the backend's answer to a merge.
    pub fn on_result(
        &mut self,
        ticket: Ticket,
        result: Result<MergeReceipt, BackendError>,
    ) -> Outcome<Resolution<MergeReceipt>> {
        if self.phase != MergePhase::Merging || ticket.0 != self.attempt {
            debug!(ticket = ticket.0, current = self.attempt, "discarding stale merge result");
            return Outcome::Stale;
        }
        match result {
            Ok(receipt) => {
                info!(target = %self.target, "merge completed");
                self.phase = MergePhase::Merged;
                Outcome::Applied(Resolution::Succeeded(receipt))
            }
            Err(e) => {
                warn!(kind = e.kind(), error = %e, "merge failed");
                let reason = e.to_string();
                self.last_error = Some(reason.clone());
                self.phase = MergePhase::Ready;
                Outcome::Applied(Resolution::Failed(reason))
            }
        }
    }

    /// Close the dialog. Any in-flight comparison or merge result is dropped
    /// when it arrives.
    pub fn cancel(&mut self) {
        self.guard.invalidate();
        self.attempt += 1;
        self.phase = MergePhase::Cancelled;
        debug!("merge dialog cancelled");
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn check_submittable(&self) -> Result<(&str, MergeStrategy), WorkflowError> {
        match self.phase {
            MergePhase::NoSource => return Err(ValidationError::NoSourceBranch.into()),
            MergePhase::Comparing => return Err(WorkflowError::ComparisonPending),
            MergePhase::Ready => {}
            _ => return Err(self.invalid("submit")),
        }
        let source = self
            .source
            .as_deref()
            .ok_or(ValidationError::NoSourceBranch)?;
        if source == self.target {
            return Err(ValidationError::SourceIsTarget(source.to_string()).into());
        }
        let strategy = self.strategy.ok_or(ValidationError::NoStrategy)?;
        match self.comparison {
            Some(ComparisonOutcome::Available(_)) => Ok((source, strategy)),
            Some(ComparisonOutcome::Unavailable { ref reason }) => {
                Err(WorkflowError::ComparisonUnavailable(reason.clone()))
            }
            None => Err(WorkflowError::ComparisonPending),
        }
    }

    fn ensure_editable(&self, action: &str) -> Result<(), WorkflowError> {
        if matches!(
            self.phase,
            MergePhase::NoSource | MergePhase::Comparing | MergePhase::Ready
        ) {
            Ok(())
        } else {
            Err(self.invalid(action))
        }
    }

    fn invalid(&self, action: &str) -> WorkflowError {
        WorkflowError::InvalidTransition {
            from: self.phase.to_string(),
            action: action.to_string(),
        }
    }
}
