//! Commit dialog.
//!
//! Phases: `Idle -> Editing -> Submitting -> {Committed | Failed}`. A failed
//! commit keeps its fields and can be submitted again; a successful one
//! resets the form to its defaults.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{Outcome, Resolution, Ticket};
use crate::errors::{BackendError, ValidationError, WorkflowError};
use crate::models::{Commit, Priority, Quality, RenderConfig, Scene};

/// Tags offered as one-click suggestions. Free-form tags are accepted too.
pub const SUGGESTED_TAGS: [&str; 4] = ["wip", "final", "review", "render"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitPhase {
    Idle,
    Editing,
    Submitting,
    Committed,
    Failed,
}

impl std::fmt::Display for CommitPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Editing => write!(f, "editing"),
            Self::Submitting => write!(f, "submitting"),
            Self::Committed => write!(f, "committed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Body of `POST /commit`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CommitRequest {
    pub message: String,
    pub should_render: bool,
    /// `None` unless `should_render` is set.
    pub render_config: Option<RenderConfig>,
    pub tags: Vec<String>,
    pub estimated_cost: Option<f64>,
    /// Estimated render time in minutes.
    pub estimated_time: Option<u32>,
}

/// Emitted by [`CommitDialog::scene_changed`]. The owner recomputes the cost
/// estimate in response.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneChanged {
    pub suggestion: Option<String>,
    /// Whether the suggestion replaced the message.
    pub applied: bool,
}

#[derive(Debug, Clone, PartialEq)]
struct CommitForm {
    message: String,
    /// Set when the user typed the message. Suggestions never overwrite it.
    message_dirty: bool,
    should_render: bool,
    quality: Option<Quality>,
    priority: Option<Priority>,
    tags: Vec<String>,
    estimated_cost: Option<f64>,
    estimated_minutes: Option<u32>,
}

impl Default for CommitForm {
    fn default() -> Self {
        Self {
            message: String::new(),
            message_dirty: false,
            should_render: false,
            quality: Some(Quality::Medium),
            priority: Some(Priority::Normal),
            tags: Vec::new(),
            estimated_cost: None,
            estimated_minutes: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommitDialog {
    phase: CommitPhase,
    form: CommitForm,
    attempt: u64,
    last_commit: Option<Commit>,
    last_error: Option<String>,
}

impl Default for CommitDialog {
    fn default() -> Self {
        Self::new()
    }
}

impl CommitDialog {
    pub fn new() -> Self {
        Self {
            phase: CommitPhase::Idle,
            form: CommitForm::default(),
            attempt: 0,
            last_commit: None,
            last_error: None,
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn phase(&self) -> CommitPhase {
        self.phase
    }

    pub fn is_open(&self) -> bool {
        matches!(
            self.phase,
            CommitPhase::Editing | CommitPhase::Submitting | CommitPhase::Failed
        )
    }

    /// Loading flag for the view.
    pub fn is_submitting(&self) -> bool {
        self.phase == CommitPhase::Submitting
    }

    pub fn message(&self) -> &str {
        &self.form.message
    }

    pub fn is_message_dirty(&self) -> bool {
        self.form.message_dirty
    }

    pub fn should_render(&self) -> bool {
        self.form.should_render
    }

    pub fn quality(&self) -> Option<Quality> {
        self.form.quality
    }

    pub fn priority(&self) -> Option<Priority> {
        self.form.priority
    }

    pub fn tags(&self) -> &[String] {
        &self.form.tags
    }

    /// Suggested tags not yet attached.
    pub fn tag_suggestions(&self) -> Vec<&'static str> {
        SUGGESTED_TAGS
            .iter()
            .copied()
            .filter(|s| !self.form.tags.iter().any(|t| t == s))
            .collect()
    }

    pub fn estimated_cost(&self) -> Option<f64> {
        self.form.estimated_cost
    }

    pub fn estimated_minutes(&self) -> Option<u32> {
        self.form.estimated_minutes
    }

    pub fn last_commit(&self) -> Option<&Commit> {
        self.last_commit.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Whether the submit button is enabled.
    pub fn can_submit(&self) -> bool {
        self.is_editable() && self.validate().is_ok()
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    /// Open the dialog with default fields.
    pub fn open(&mut self) -> Result<(), WorkflowError> {
        match self.phase {
            CommitPhase::Idle | CommitPhase::Committed | CommitPhase::Failed => {
                self.form = CommitForm::default();
                self.last_error = None;
                self.phase = CommitPhase::Editing;
                debug!("commit dialog opened");
                Ok(())
            }
            CommitPhase::Editing => Ok(()),
            CommitPhase::Submitting => Err(self.invalid("open")),
        }
    }

    pub fn set_message(&mut self, message: impl Into<String>) -> Result<(), WorkflowError> {
        self.ensure_editable("set_message")?;
        let message = message.into();
        // Clearing the field hands it back to the suggestion logic.
        self.form.message_dirty = !message.trim().is_empty();
        self.form.message = message;
        Ok(())
    }

    pub fn set_render(&mut self, should_render: bool) -> Result<(), WorkflowError> {
        self.ensure_editable("set_render")?;
        self.form.should_render = should_render;
        Ok(())
    }

    pub fn set_quality(&mut self, quality: Option<Quality>) -> Result<(), WorkflowError> {
        self.ensure_editable("set_quality")?;
        self.form.quality = quality;
        Ok(())
    }

    pub fn set_priority(&mut self, priority: Option<Priority>) -> Result<(), WorkflowError> {
        self.ensure_editable("set_priority")?;
        self.form.priority = priority;
        Ok(())
    }

    /// Add a tag. Whitespace is trimmed; empty and duplicate tags are ignored.
    pub fn add_tag(&mut self, tag: &str) -> Result<bool, WorkflowError> {
        self.ensure_editable("add_tag")?;
        let tag = tag.trim();
        if tag.is_empty() || self.form.tags.iter().any(|t| t == tag) {
            return Ok(false);
        }
        self.form.tags.push(tag.to_string());
        Ok(true)
    }

    pub fn remove_tag(&mut self, tag: &str) -> Result<bool, WorkflowError> {
        self.ensure_editable("remove_tag")?;
        let before = self.form.tags.len();
        self.form.tags.retain(|t| t != tag.trim());
        Ok(self.form.tags.len() != before)
    }

    /// Attach the advisory cost/ETA shown next to the render toggle.
    pub fn set_estimate(&mut self, cost: Option<f64>, minutes: Option<u32>) {
        if self.phase == CommitPhase::Submitting {
            return;
        }
        self.form.estimated_cost = cost;
        self.form.estimated_minutes = minutes;
    }

    /// React to a scene metadata change while the dialog is open.
    ///
    /// The estimate is cleared because it no longer matches the scene; the
    /// owner is expected to recompute it.
    pub fn scene_changed(&mut self, scene: &Scene) -> Option<SceneChanged> {
        if !self.is_editable() {
            return None;
        }
        self.form.estimated_cost = None;
        self.form.estimated_minutes = None;

        let suggestion = suggest_message(scene);
        let applied = match suggestion {
            Some(ref text) if !self.form.message_dirty => {
                self.form.message = text.clone();
                true
            }
            // An untouched message only ever holds an earlier suggestion.
            None if !self.form.message_dirty => {
                self.form.message.clear();
                false
            }
            _ => false,
        };
        debug!(applied, "scene changed while committing");
        Some(SceneChanged {
            suggestion,
            applied,
        })
    }

    /// Validate and move to `Submitting`. Nothing is sent on error.
    pub fn submit(&mut self) -> Result<(Ticket, CommitRequest), WorkflowError> {
        self.ensure_editable("submit")?;
        let render_config = self.validate()?;

        self.attempt += 1;
        self.phase = CommitPhase::Submitting;
        self.last_error = None;

        let request = CommitRequest {
            message: self.form.message.trim().to_string(),
            should_render: self.form.should_render,
            render_config,
            tags: self.form.tags.clone(),
            estimated_cost: self.form.estimated_cost,
            estimated_time: self.form.estimated_minutes,
        };
        info!(
            should_render = request.should_render,
            tags = request.tags.len(),
            "commit submitted"
        );
        Ok((Ticket(self.attempt), request))
    }

    /// Feed back the backend's answer to a submission.
    pub fn on_result(
        &mut self,
        ticket: Ticket,
        result: Result<Commit, BackendError>,
    ) -> Outcome<Resolution<Commit>> {
        if self.phase != CommitPhase::Submitting || ticket.0 != self.attempt {
            debug!(ticket = ticket.0, current = self.attempt, "discarding stale commit result");
            return Outcome::Stale;
        }
        match result {
            Ok(commit) => {
                info!(commit = %commit.id, "commit created");
                self.form = CommitForm::default();
                self.last_commit = Some(commit.clone());
                self.phase = CommitPhase::Committed;
                Outcome::Applied(Resolution::Succeeded(commit))
            }
            Err(e) => {
                warn!(kind = e.kind(), error = %e, "commit failed");
                let reason = e.to_string();
                self.last_error = Some(reason.clone());
                self.phase = CommitPhase::Failed;
                Outcome::Applied(Resolution::Failed(reason))
            }
        }
    }

    /// Close the dialog, reset every field, and orphan any in-flight submit.
    pub fn cancel(&mut self) {
        self.attempt += 1;
        self.form = CommitForm::default();
        self.last_error = None;
        self.phase = CommitPhase::Idle;
        debug!("commit dialog cancelled");
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn is_editable(&self) -> bool {
        matches!(self.phase, CommitPhase::Editing | CommitPhase::Failed)
    }

    fn ensure_editable(&self, action: &str) -> Result<(), WorkflowError> {
        if self.is_editable() {
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

    fn validate(&self) -> Result<Option<RenderConfig>, ValidationError> {
        if self.form.message.trim().is_empty() {
            return Err(ValidationError::EmptyMessage);
        }
        if !self.form.should_render {
            return Ok(None);
        }
        let quality = self
            .form
            .quality
            .ok_or_else(|| ValidationError::RenderConfig("quality is required".into()))?;
        let priority = self
            .form
            .priority
            .ok_or_else(|| ValidationError::RenderConfig("priority is required".into()))?;
        Ok(Some(RenderConfig { quality, priority }))
    }
}

/// Music track, style and duration, in that order, skipping absent values.
pub fn suggest_message(scene: &Scene) -> Option<String> {
    let mut parts: Vec<String> = Vec::new();
    if let Some(track) = scene.music_track.as_deref().map(str::trim) {
        if !track.is_empty() {
            parts.push(track.to_string());
        }
    }
    if let Some(style) = scene.style.as_deref().map(str::trim) {
        if !style.is_empty() {
            parts.push(style.to_string());
        }
    }
    if let Some(duration) = scene.duration_secs {
        parts.push(format!("{}s", duration));
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(", "))
    }
}
