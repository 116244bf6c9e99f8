//! The studio shell.
//!
//! [`Studio`] owns the selection state (project, character, active branch,
//! current scene), the commit and merge dialogs, and the cached status
//! panels. It performs the I/O the dialogs ask for and feeds the answers
//! back, turning every failure into a transient notification. Methods take
//! `&self`; state lives behind a mutex that is never held across an await,
//! so concurrent calls interleave the way UI events do and late responses
//! are recognised as stale.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info};

use crate::backend::{GpuStatsSource, VersioningBackend};
use crate::catalog::ModelCatalog;
use crate::comparator::{BranchComparator, ComparisonOutcome};
use crate::config::StudioConfig;
use crate::errors::{ValidationError, WorkflowError};
use crate::estimate::{
    estimate, BudgetDecision, BudgetPolicy, CostEstimate, Pricing, SceneParams, Venue,
    VenueSelection,
};
use crate::models::{Branch, Commit, DailyBudget, GpuStats, Scene};
use crate::notify::{Notification, NotificationSink};
use crate::workflow::{
    CommitDialog, MergeDialog, MergeReceipt, Outcome, Resolution, SceneChanged,
};

/// Policy and initial selection for a [`Studio`].
#[derive(Debug, Clone)]
pub struct StudioSettings {
    pub pricing: Pricing,
    pub budget: BudgetPolicy,
    pub busy_free_fraction: f64,
    pub project: Option<String>,
    pub branch: String,
}

impl Default for StudioSettings {
    fn default() -> Self {
        Self::from_config(&StudioConfig::default())
    }
}

impl StudioSettings {
    pub fn from_config(config: &StudioConfig) -> Self {
        Self {
            pricing: config.pricing.clone(),
            budget: config.budget.clone(),
            busy_free_fraction: config.gpu.busy_free_fraction,
            project: config.studio.project.clone(),
            branch: config.studio.branch.clone(),
        }
    }
}

/// What the user currently has selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub project: Option<String>,
    pub character: Option<String>,
    pub branch: String,
}

struct StudioState {
    selection: Selection,
    branches: Vec<Branch>,
    scene: Option<Scene>,
    venue: Option<VenueSelection>,
    budget: Option<DailyBudget>,
    gpu: Option<GpuStats>,
    catalog: ModelCatalog,
    commit: CommitDialog,
    merge: Option<MergeDialog>,
    /// Bumped whenever the merge dialog is opened or closed.
    merge_session: u64,
}

pub struct Studio {
    backend: Arc<dyn VersioningBackend>,
    gpu: Arc<dyn GpuStatsSource>,
    notifier: Arc<dyn NotificationSink>,
    comparator: BranchComparator,
    settings: StudioSettings,
    state: Mutex<StudioState>,
}

impl Studio {
    pub fn new(
        backend: Arc<dyn VersioningBackend>,
        gpu: Arc<dyn GpuStatsSource>,
        notifier: Arc<dyn NotificationSink>,
        settings: StudioSettings,
    ) -> Self {
        info!(branch = %settings.branch, "initializing studio");
        let state = StudioState {
            selection: Selection {
                project: settings.project.clone(),
                character: None,
                branch: settings.branch.clone(),
            },
            branches: Vec::new(),
            scene: None,
            venue: None,
            budget: None,
            gpu: None,
            catalog: ModelCatalog::default(),
            commit: CommitDialog::new(),
            merge: None,
            merge_session: 0,
        };
        Self {
            comparator: BranchComparator::new(backend.clone()),
            backend,
            gpu,
            notifier,
            settings,
            state: Mutex::new(state),
        }
    }

    fn state(&self) -> MutexGuard<'_, StudioState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // -----------------------------------------------------------------------
    // Selection
    // -----------------------------------------------------------------------

    pub fn selection(&self) -> Selection {
        self.state().selection.clone()
    }

    /// Switch project. Scene, branch list and open dialogs belong to the old
    /// project and are dropped.
    ///
    /// The backend serves one project per endpoint and its routes carry no
    /// project parameter, so this only resets local state. The next
    /// [`Studio::refresh_branches`] reloads the list.
    pub fn select_project(&self, project: Option<String>) {
        let mut st = self.state();
        info!(project = ?project, "project selected");
        st.selection.project = project;
        st.selection.character = None;
        st.selection.branch = self.settings.branch.clone();
        st.branches.clear();
        st.scene = None;
        st.venue = None;
        st.commit.cancel();
        close_merge_locked(&mut st);
    }

    pub fn select_character(&self, character: Option<String>) {
        self.state().selection.character = character;
    }

    /// Make `name` the active branch. Refused while a commit or merge is in
    /// flight; an open merge dialog is closed because its target changes.
    pub fn switch_branch(&self, name: &str) -> Result<(), WorkflowError> {
        let name = name.trim();
        let mut st = self.state();
        if st.commit.is_submitting() || st.merge.as_ref().map_or(false, |m| m.is_merging()) {
            return Err(WorkflowError::InvalidTransition {
                from: "busy".into(),
                action: "switch_branch".into(),
            });
        }
        if name.is_empty()
            || (!st.branches.is_empty() && !st.branches.iter().any(|b| b.name == name))
        {
            return Err(ValidationError::UnknownBranch(name.to_string()).into());
        }
        info!(branch = name, "switched branch");
        st.selection.branch = name.to_string();
        close_merge_locked(&mut st);
        Ok(())
    }

    pub fn branches(&self) -> Vec<Branch> {
        self.state().branches.clone()
    }

    /// Reload the branch list. On failure the cached list is kept.
    pub async fn refresh_branches(&self) -> Vec<Branch> {
        match self.backend.list_branches().await {
            Ok(branches) => {
                debug!(count = branches.len(), "branches refreshed");
                let mut st = self.state();
                st.branches = branches;
                st.branches.clone()
            }
            Err(e) => {
                self.notifier
                    .notify(Notification::warning(format!("Could not load branches: {}", e)));
                self.state().branches.clone()
            }
        }
    }

    // -----------------------------------------------------------------------
    // Scene & estimate
    // -----------------------------------------------------------------------

    pub fn scene(&self) -> Option<Scene> {
        self.state().scene.clone()
    }

    /// Replace the current scene. An open commit dialog gets the change
    /// (message suggestion) and the estimate is recomputed.
    pub fn set_scene(&self, scene: Scene) -> Option<SceneChanged> {
        let mut st = self.state();
        let event = st.commit.scene_changed(&scene);
        st.scene = Some(scene);
        self.on_parameters_changed(&mut st);
        event
    }

    /// Pure estimate for arbitrary parameters with the studio's pricing.
    pub fn estimate_for(&self, params: &SceneParams) -> CostEstimate {
        estimate(params, &self.settings.pricing)
    }

    pub fn estimate(&self) -> Option<CostEstimate> {
        self.state().venue.as_ref().map(|v| *v.estimate())
    }

    pub fn venue(&self) -> Option<VenueSelection> {
        self.state().venue.clone()
    }

    pub fn choose_venue(&self, venue: Venue) {
        let mut st = self.state();
        if let Some(ref mut sel) = st.venue {
            sel.choose(venue);
        }
        self.on_parameters_changed(&mut st);
    }

    /// Recompute the estimate for the current scene and push it into the
    /// commit dialog. The render quality chosen in the dialog wins over the
    /// scene's own quality.
    fn on_parameters_changed(&self, st: &mut StudioState) {
        let Some(ref scene) = st.scene else {
            st.venue = None;
            st.commit.set_estimate(None, None);
            return;
        };
        let mut params = SceneParams::from(scene);
        if st.commit.is_open() && st.commit.should_render() {
            if let Some(q) = st.commit.quality() {
                params.quality = q;
            }
        }
        let est = estimate(&params, &self.settings.pricing);
        let busy = local_busy(st.gpu.as_ref(), self.settings.busy_free_fraction);
        match st.venue {
            Some(ref mut sel) => sel.update(est, busy),
            None => st.venue = Some(VenueSelection::new(est, busy)),
        }
        let cost = st.venue.as_ref().map(|v| v.cost());
        st.commit.set_estimate(cost, Some(est.render_minutes));
        debug!(
            minutes = est.render_minutes,
            cloud = est.cloud.total,
            local = est.local.total,
            "estimate recomputed"
        );
    }

    // -----------------------------------------------------------------------
    // Status panels
    // -----------------------------------------------------------------------

    /// Refresh today's spend. On failure the last known value (or zero) is
    /// kept and a warning is shown.
    pub async fn refresh_budget(&self) -> DailyBudget {
        match self.backend.daily_budget().await {
            Ok(budget) => {
                self.state().budget = Some(budget);
                budget
            }
            Err(e) => {
                self.notifier
                    .notify(Notification::warning(format!("Daily budget unavailable: {}", e)));
                self.state().budget.unwrap_or_default()
            }
        }
    }

    pub fn daily_budget(&self) -> Option<DailyBudget> {
        self.state().budget
    }

    /// Refresh GPU occupancy. On failure the previous reading is kept.
    pub async fn refresh_gpu(&self) -> Option<GpuStats> {
        match self.gpu.gpu_stats().await {
            Ok(stats) => {
                let mut st = self.state();
                st.gpu = Some(stats.clone());
                self.on_parameters_changed(&mut st);
                Some(stats)
            }
            Err(e) => {
                self.notifier
                    .notify(Notification::warning(format!("GPU status unavailable: {}", e)));
                self.state().gpu.clone()
            }
        }
    }

    pub fn local_busy(&self) -> bool {
        local_busy(self.state().gpu.as_ref(), self.settings.busy_free_fraction)
    }

    /// Check the selected venue's cost against today's spend.
    pub fn budget_decision(&self) -> Option<BudgetDecision> {
        let st = self.state();
        let cost = st.venue.as_ref()?.cost();
        let today = st.budget.unwrap_or_default();
        Some(self.settings.budget.decide(cost, &today))
    }

    pub async fn refresh_catalog(&self) -> ModelCatalog {
        let result = self.backend.model_catalog().await;
        let mut st = self.state();
        if let Err(e) = st.catalog.apply(result) {
            self.notifier
                .notify(Notification::warning(format!("Model list unavailable: {}", e)));
        }
        st.catalog.clone()
    }

    pub fn catalog(&self) -> ModelCatalog {
        self.state().catalog.clone()
    }

    // -----------------------------------------------------------------------
    // Commit
    // -----------------------------------------------------------------------

    pub fn open_commit(&self) -> Result<(), WorkflowError> {
        let mut st = self.state();
        st.commit.open()?;
        if let Some(scene) = st.scene.clone() {
            st.commit.scene_changed(&scene);
        }
        self.on_parameters_changed(&mut st);
        Ok(())
    }

    pub fn commit_dialog(&self) -> CommitDialog {
        self.state().commit.clone()
    }

    /// Edit the commit dialog. Render settings feed the estimate, so it is
    /// recomputed afterwards.
    pub fn update_commit<R>(&self, f: impl FnOnce(&mut CommitDialog) -> R) -> R {
        let mut st = self.state();
        let r = f(&mut st.commit);
        self.on_parameters_changed(&mut st);
        r
    }

    pub fn cancel_commit(&self) {
        self.state().commit.cancel();
    }

    /// Validate, send, and apply the result of the commit dialog.
    ///
    /// Validation errors are returned (and shown) without any request being
    /// made. Backend failures come back as `Resolution::Failed` with the
    /// dialog ready for a retry.
    pub async fn submit_commit(&self) -> Result<Outcome<Resolution<Commit>>, WorkflowError> {
        let submitted = self.state().commit.submit();
        let (ticket, request) = match submitted {
            Ok(v) => v,
            Err(e) => {
                self.notifier.notify(Notification::warning(e.to_string()));
                return Err(e);
            }
        };

        let result = self.backend.commit(&request).await;

        let mut st = self.state();
        let outcome = st.commit.on_result(ticket, result);
        match outcome {
            Outcome::Applied(Resolution::Succeeded(ref commit)) => {
                let branch = st.selection.branch.clone();
                if let Some(b) = st.branches.iter_mut().find(|b| b.name == branch) {
                    b.head = Some(commit.id.clone());
                }
                self.notifier
                    .notify(Notification::success(format!("Committed: {}", commit.message)));
                if let Some(render) = request.render_config {
                    self.notifier.notify(Notification::info(format!(
                        "Render queued at {} quality ({} priority)",
                        render.quality, render.priority
                    )));
                }
            }
            Outcome::Applied(Resolution::Failed(ref reason)) => {
                self.notifier
                    .notify(Notification::error(format!("Commit failed: {}", reason)));
            }
            Outcome::Stale => debug!("commit result arrived after the dialog closed"),
        }
        Ok(outcome)
    }

    // -----------------------------------------------------------------------
    // Merge
    // -----------------------------------------------------------------------

    /// Open the merge dialog against the active branch with a fresh branch
    /// list. Refused while a merge is in flight, including one submitted
    /// during the branch refresh.
    pub async fn open_merge(&self) -> Result<(), WorkflowError> {
        check_not_merging(&self.state())?;
        let branches = self.refresh_branches().await;
        let mut st = self.state();
        check_not_merging(&st)?;
        close_merge_locked(&mut st);
        let dialog = MergeDialog::new(st.selection.branch.clone(), &branches);
        st.merge = Some(dialog);
        Ok(())
    }

    pub fn merge_dialog(&self) -> Option<MergeDialog> {
        self.state().merge.clone()
    }

    /// Edit the open merge dialog.
    pub fn update_merge<R>(&self, f: impl FnOnce(&mut MergeDialog) -> R) -> Result<R, WorkflowError> {
        let mut st = self.state();
        let dialog = st.merge.as_mut().ok_or_else(|| closed("update_merge"))?;
        Ok(f(dialog))
    }

    /// Pick the merge source and load the comparison. A response that
    /// arrives after the selection moved on is dropped (`Outcome::Stale`).
    pub async fn select_merge_source(
        &self,
        name: &str,
    ) -> Result<Outcome<ComparisonOutcome>, WorkflowError> {
        let (session, ticket) = {
            let mut st = self.state();
            let session = st.merge_session;
            let dialog = st.merge.as_mut().ok_or_else(|| closed("select_source"))?;
            (session, dialog.select_source(name)?)
        };

        let result = self.comparator.compare(&ticket).await;

        let mut st = self.state();
        if st.merge_session != session {
            return Ok(Outcome::Stale);
        }
        let Some(dialog) = st.merge.as_mut() else {
            return Ok(Outcome::Stale);
        };
        let outcome = dialog.on_comparison(&ticket, result);
        if let Outcome::Applied(ComparisonOutcome::Unavailable { ref reason }) = outcome {
            self.notifier.notify(Notification::warning(format!(
                "Comparison of {} and {} unavailable: {}",
                ticket.source, ticket.target, reason
            )));
        }
        Ok(outcome)
    }

    /// Validate, send, and apply the result of the merge dialog.
    pub async fn submit_merge(&self) -> Result<Outcome<Resolution<MergeReceipt>>, WorkflowError> {
        let submitted = {
            let mut st = self.state();
            let session = st.merge_session;
            st.merge
                .as_mut()
                .ok_or_else(|| closed("submit"))
                .and_then(|d| d.submit())
                .map(|(ticket, request)| (session, ticket, request))
        };
        let (session, ticket, request) = match submitted {
            Ok(v) => v,
            Err(e) => {
                self.notifier.notify(Notification::warning(e.to_string()));
                return Err(e);
            }
        };

        let result = self.backend.merge(&request).await;

        let mut st = self.state();
        if st.merge_session != session {
            return Ok(Outcome::Stale);
        }
        let Some(dialog) = st.merge.as_mut() else {
            return Ok(Outcome::Stale);
        };
        let outcome = dialog.on_result(ticket, result);
        match outcome {
            Outcome::Applied(Resolution::Succeeded(ref receipt)) => {
                if request.options.delete_branch {
                    st.branches.retain(|b| b.name != request.source_branch);
                }
                if let Some(ref commit) = receipt.commit {
                    let target = request.target_branch.clone();
                    if let Some(b) = st.branches.iter_mut().find(|b| b.name == target) {
                        b.head = Some(commit.id.clone());
                    }
                }
                self.notifier.notify(Notification::success(format!(
                    "Merged {} into {}",
                    request.source_branch, request.target_branch
                )));
                if let Some(ref backup) = receipt.backup_branch {
                    self.notifier
                        .notify(Notification::info(format!("Backup created: {}", backup)));
                }
                if !receipt.unresolved_conflicts.is_empty() {
                    self.notifier.notify(Notification::warning(format!(
                        "{} conflict(s) need manual resolution: {}",
                        receipt.unresolved_conflicts.len(),
                        receipt.unresolved_conflicts.join(", ")
                    )));
                }
            }
            Outcome::Applied(Resolution::Failed(ref reason)) => {
                self.notifier
                    .notify(Notification::error(format!("Merge failed: {}", reason)));
            }
            Outcome::Stale => debug!("merge result arrived after the dialog closed"),
        }
        Ok(outcome)
    }

    /// Close the merge dialog. In-flight responses are dropped on arrival.
    pub fn close_merge(&self) {
        close_merge_locked(&mut self.state());
    }
}

fn close_merge_locked(st: &mut StudioState) {
    if let Some(mut dialog) = st.merge.take() {
        dialog.cancel();
    }
    st.merge_session += 1;
}

fn check_not_merging(st: &StudioState) -> Result<(), WorkflowError> {
    if st.merge.as_ref().map_or(false, |m| m.is_merging()) {
        return Err(WorkflowError::InvalidTransition {
            from: "merging".into(),
            action: "open_merge".into(),
        });
    }
    Ok(())
}

fn closed(action: &str) -> WorkflowError {
    WorkflowError::InvalidTransition {
        from: "closed".into(),
        action: action.into(),
    }
}

fn local_busy(gpu: Option<&GpuStats>, threshold: f64) -> bool {
    gpu.map(|g| g.is_busy(threshold)).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use chrono::Utc;
    use tokio::sync::Notify;

    use crate::backend::CatalogListing;
    use crate::comparator::CompareRequest;
    use crate::errors::BackendError;
    use crate::estimate::Approval;
    use crate::models::{
        BranchComparison, BranchStats, Change, ChangeType, Conflict, GpuDevice, Quality,
        TrainingJob,
    };
    use crate::notify::{Level, RecordingSink};
    use crate::workflow::{CommitPhase, CommitRequest, MergePhase, MergeRequest, MergeStrategy};

    // -----------------------------------------------------------------------
    // Doubles
    // -----------------------------------------------------------------------

    #[derive(Default)]
    struct FakeBackend {
        fail: AtomicBool,
        gates: Mutex<HashMap<String, Arc<Notify>>>,
        hold_branches: Mutex<Option<Arc<Notify>>>,
        hold_merges: Mutex<Option<Arc<Notify>>>,
        compares: Mutex<Vec<CompareRequest>>,
        commits: Mutex<Vec<CommitRequest>>,
        merges: Mutex<Vec<MergeRequest>>,
    }

    impl FakeBackend {
        fn failing() -> Self {
            let b = Self::default();
            b.fail.store(true, Ordering::SeqCst);
            b
        }

        /// Hold comparisons for `source` until the returned gate is opened.
        fn gate(&self, source: &str) -> Arc<Notify> {
            let gate = Arc::new(Notify::new());
            self.gates
                .lock()
                .unwrap()
                .insert(source.to_string(), gate.clone());
            gate
        }

        /// Hold the next calls through `slot` until the returned gate is opened.
        fn hold(slot: &Mutex<Option<Arc<Notify>>>) -> Arc<Notify> {
            let gate = Arc::new(Notify::new());
            *slot.lock().unwrap() = Some(gate.clone());
            gate
        }

        async fn wait(slot: &Mutex<Option<Arc<Notify>>>) {
            let gate = slot.lock().unwrap().take();
            if let Some(gate) = gate {
                gate.notified().await;
            }
        }

        fn check(&self) -> Result<(), BackendError> {
            if self.fail.load(Ordering::SeqCst) {
                Err(BackendError::Api {
                    status: 503,
                    body: "backend down".into(),
                })
            } else {
                Ok(())
            }
        }
    }

    fn comparison_for(source: &str) -> BranchComparison {
        let n = if source == "feature/rain" { 4 } else { 1 };
        BranchComparison {
            source: BranchStats {
                commits: 8,
                ..Default::default()
            },
            target: BranchStats {
                commits: 15,
                ..Default::default()
            },
            changes: (0..n)
                .map(|i| Change {
                    change_type: ChangeType::Modified,
                    description: format!("{} change {}", source, i),
                })
                .collect(),
            conflicts: vec![
                Conflict {
                    scene: "scene-2".into(),
                    description: "lighting".into(),
                },
                Conflict {
                    scene: "scene-3".into(),
                    description: "music".into(),
                },
            ],
        }
    }

    #[async_trait]
    impl VersioningBackend for FakeBackend {
        async fn list_branches(&self) -> Result<Vec<Branch>, BackendError> {
            Self::wait(&self.hold_branches).await;
            self.check()?;
            Ok(["main", "feature/rain", "feature/snow"]
                .into_iter()
                .map(Branch::new)
                .collect())
        }

        async fn commit(&self, request: &CommitRequest) -> Result<Commit, BackendError> {
            self.commits.lock().unwrap().push(request.clone());
            self.check()?;
            Ok(Commit {
                id: "c100".into(),
                message: request.message.clone(),
                timestamp: Utc::now(),
                author: Some("aiko".into()),
                render: request.render_config,
                tags: request.tags.clone(),
                parents: vec!["c99".into()],
            })
        }

        async fn compare(&self, request: &CompareRequest) -> Result<BranchComparison, BackendError> {
            self.compares.lock().unwrap().push(request.clone());
            let gate = self
                .gates
                .lock()
                .unwrap()
                .get(&request.source_branch)
                .cloned();
            if let Some(gate) = gate {
                gate.notified().await;
            }
            self.check()?;
            Ok(comparison_for(&request.source_branch))
        }

        async fn merge(&self, request: &MergeRequest) -> Result<MergeReceipt, BackendError> {
            self.merges.lock().unwrap().push(request.clone());
            Self::wait(&self.hold_merges).await;
            self.check()?;
            Ok(MergeReceipt {
                commit: None,
                backup_branch: request
                    .options
                    .create_backup
                    .then(|| format!("backup/{}", request.target_branch)),
                unresolved_conflicts: Vec::new(),
            })
        }

        async fn daily_budget(&self) -> Result<DailyBudget, BackendError> {
            self.check()?;
            Ok(DailyBudget {
                used: 19.9,
                auto_approval_threshold: 0.5,
            })
        }

        async fn training_jobs(&self) -> Result<Vec<TrainingJob>, BackendError> {
            self.check()?;
            Ok(Vec::new())
        }

        async fn model_catalog(&self) -> Result<CatalogListing, BackendError> {
            self.check()?;
            Ok(CatalogListing {
                models: vec!["animagine-xl".into()],
                qualities: Vec::new(),
            })
        }
    }

    struct FakeGpu {
        free_fraction: Option<f64>,
    }

    #[async_trait]
    impl GpuStatsSource for FakeGpu {
        async fn gpu_stats(&self) -> Result<GpuStats, BackendError> {
            match self.free_fraction {
                Some(f) => Ok(GpuStats {
                    devices: vec![GpuDevice {
                        name: "RTX 4090".into(),
                        vram_total: 1000,
                        vram_free: (f * 1000.0) as u64,
                    }],
                }),
                None => Err(BackendError::Parse("connection refused".into())),
            }
        }
    }

    fn studio_with(backend: Arc<FakeBackend>, gpu_free: Option<f64>) -> (Studio, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::new());
        let studio = Studio::new(
            backend,
            Arc::new(FakeGpu {
                free_fraction: gpu_free,
            }),
            sink.clone(),
            StudioSettings::default(),
        );
        (studio, sink)
    }

    fn scene() -> Scene {
        Scene {
            id: "scene-1".into(),
            frames: 120,
            duration_secs: Some(5.0),
            quality: Quality::Medium,
            style: Some("watercolor".into()),
            music_track: Some("Moonlight".into()),
            ..Default::default()
        }
    }

    // -----------------------------------------------------------------------
    // Commit
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_empty_message_sends_nothing() {
        let backend = Arc::new(FakeBackend::default());
        let (studio, sink) = studio_with(backend.clone(), Some(0.9));
        studio.open_commit().unwrap();
        studio.update_commit(|d| d.set_render(true)).unwrap();

        let err = studio.submit_commit().await.unwrap_err();
        assert_eq!(err, WorkflowError::Validation(ValidationError::EmptyMessage));
        assert!(backend.commits.lock().unwrap().is_empty());
        assert_eq!(sink.count(Level::Warning), 1);
        assert_eq!(studio.commit_dialog().phase(), CommitPhase::Editing);
    }

    #[tokio::test]
    async fn test_commit_with_scene_suggestion_and_estimate() {
        let backend = Arc::new(FakeBackend::default());
        let (studio, sink) = studio_with(backend.clone(), Some(0.9));
        studio.set_scene(scene());
        studio.open_commit().unwrap();

        let dialog = studio.commit_dialog();
        assert_eq!(dialog.message(), "Moonlight, watercolor, 5s");
        assert_eq!(dialog.estimated_minutes(), Some(4));

        studio
            .update_commit(|d| {
                d.set_render(true)?;
                d.set_quality(Some(Quality::High))
            })
            .unwrap();
        // 120 frames at 3 s/frame.
        assert_eq!(studio.commit_dialog().estimated_minutes(), Some(6));

        let outcome = studio.submit_commit().await.unwrap();
        let commit = match outcome {
            Outcome::Applied(Resolution::Succeeded(c)) => c,
            other => panic!("unexpected outcome {:?}", other),
        };
        assert_eq!(commit.message, "Moonlight, watercolor, 5s");

        let sent = backend.commits.lock().unwrap()[0].clone();
        assert!(sent.should_render);
        assert_eq!(sent.render_config.unwrap().quality, Quality::High);
        assert_eq!(sent.estimated_time, Some(6));
        assert!(sent.estimated_cost.is_some());

        assert_eq!(sink.count(Level::Success), 1);
        assert_eq!(sink.count(Level::Info), 1);
        let dialog = studio.commit_dialog();
        assert_eq!(dialog.phase(), CommitPhase::Committed);
        assert_eq!(dialog.message(), "");
    }

    #[tokio::test]
    async fn test_commit_failure_is_notified_and_retryable() {
        let backend = Arc::new(FakeBackend::failing());
        let (studio, sink) = studio_with(backend.clone(), None);
        studio.open_commit().unwrap();
        studio.update_commit(|d| d.set_message("Checkpoint")).unwrap();

        let outcome = studio.submit_commit().await.unwrap();
        assert!(matches!(outcome, Outcome::Applied(Resolution::Failed(_))));
        assert_eq!(sink.count(Level::Error), 1);
        let dialog = studio.commit_dialog();
        assert_eq!(dialog.phase(), CommitPhase::Failed);
        assert!(dialog.can_submit());

        backend.fail.store(false, Ordering::SeqCst);
        let outcome = studio.submit_commit().await.unwrap();
        assert!(matches!(outcome, Outcome::Applied(Resolution::Succeeded(_))));
    }

    // -----------------------------------------------------------------------
    // Merge
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_merge_happy_path() {
        let backend = Arc::new(FakeBackend::default());
        let (studio, sink) = studio_with(backend.clone(), None);
        studio.open_merge().await.unwrap();

        let dialog = studio.merge_dialog().unwrap();
        assert_eq!(dialog.target(), "main");
        assert!(!dialog.selectable_sources().iter().any(|s| s == "main"));

        let outcome = studio.select_merge_source("feature/rain").await.unwrap();
        let cmp = outcome.applied().unwrap();
        assert_eq!(cmp.change_rows().len(), 4);
        assert_eq!(cmp.conflict_rows().len(), 2);

        studio
            .update_merge(|d| {
                d.set_strategy(Some(MergeStrategy::PreferTarget))?;
                d.set_delete_branch(true)
            })
            .unwrap()
            .unwrap();

        let outcome = studio.submit_merge().await.unwrap();
        assert!(matches!(outcome, Outcome::Applied(Resolution::Succeeded(_))));

        let sent = backend.merges.lock().unwrap()[0].clone();
        assert_eq!(sent.source_branch, "feature/rain");
        assert_eq!(sent.target_branch, "main");
        assert_eq!(sent.strategy, MergeStrategy::PreferTarget);
        assert_eq!(sent.message, "Merge feature/rain into main");
        assert!(sent.options.create_backup);

        assert!(!studio.branches().iter().any(|b| b.name == "feature/rain"));
        assert_eq!(sink.count(Level::Success), 1);
        assert_eq!(sink.count(Level::Info), 1);
        assert_eq!(studio.merge_dialog().unwrap().phase(), MergePhase::Merged);
    }

    #[tokio::test]
    async fn test_comparison_failure_is_explicit_and_blocks_merge() {
        let backend = Arc::new(FakeBackend::default());
        let (studio, sink) = studio_with(backend.clone(), None);
        studio.open_merge().await.unwrap();

        backend.fail.store(true, Ordering::SeqCst);
        let outcome = studio.select_merge_source("feature/rain").await.unwrap();
        let cmp = outcome.applied().unwrap();
        assert!(matches!(cmp, ComparisonOutcome::Unavailable { .. }));
        assert!(cmp.change_rows().is_empty());
        assert!(sink.count(Level::Warning) >= 1);

        let dialog = studio.merge_dialog().unwrap();
        assert!(!dialog.can_submit());
        assert!(matches!(
            studio.submit_merge().await,
            Err(WorkflowError::ComparisonUnavailable(_))
        ));
        assert!(backend.merges.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stale_comparison_is_discarded() {
        let backend = Arc::new(FakeBackend::default());
        let gate = backend.gate("feature/rain");
        let (studio, _sink) = studio_with(backend.clone(), None);
        let studio = Arc::new(studio);
        studio.open_merge().await.unwrap();

        let slow_studio = studio.clone();
        let slow = tokio::spawn(async move { slow_studio.select_merge_source("feature/rain").await });
        tokio::task::yield_now().await;
        assert_eq!(backend.compares.lock().unwrap().len(), 1);

        let fast = studio.select_merge_source("feature/snow").await.unwrap();
        assert!(!fast.is_stale());

        gate.notify_one();
        let slow = slow.await.unwrap().unwrap();
        assert!(slow.is_stale());

        let dialog = studio.merge_dialog().unwrap();
        assert_eq!(dialog.source(), Some("feature/snow"));
        assert_eq!(dialog.comparison().unwrap().change_rows().len(), 1);
    }

    #[tokio::test]
    async fn test_close_during_comparison_discards_result() {
        let backend = Arc::new(FakeBackend::default());
        let gate = backend.gate("feature/rain");
        let (studio, _sink) = studio_with(backend.clone(), None);
        let studio = Arc::new(studio);
        studio.open_merge().await.unwrap();

        let s = studio.clone();
        let pending = tokio::spawn(async move { s.select_merge_source("feature/rain").await });
        tokio::task::yield_now().await;

        studio.close_merge();
        studio.open_merge().await.unwrap();
        gate.notify_one();

        assert!(pending.await.unwrap().unwrap().is_stale());
        assert_eq!(studio.merge_dialog().unwrap().phase(), MergePhase::NoSource);
    }

    #[tokio::test]
    async fn test_reopen_during_merge_keeps_the_merge() {
        let backend = Arc::new(FakeBackend::default());
        let (studio, sink) = studio_with(backend.clone(), None);
        let studio = Arc::new(studio);
        studio.open_merge().await.unwrap();
        studio.select_merge_source("feature/rain").await.unwrap();
        studio
            .update_merge(|d| d.set_delete_branch(true))
            .unwrap()
            .unwrap();

        let branches_gate = FakeBackend::hold(&backend.hold_branches);
        let merge_gate = FakeBackend::hold(&backend.hold_merges);

        let s = studio.clone();
        let reopen = tokio::spawn(async move { s.open_merge().await });
        tokio::task::yield_now().await;

        let s = studio.clone();
        let merge = tokio::spawn(async move { s.submit_merge().await });
        tokio::task::yield_now().await;
        assert_eq!(backend.merges.lock().unwrap().len(), 1);
        assert!(studio.merge_dialog().unwrap().is_merging());

        branches_gate.notify_one();
        assert!(matches!(
            reopen.await.unwrap(),
            Err(WorkflowError::InvalidTransition { .. })
        ));

        merge_gate.notify_one();
        let outcome = merge.await.unwrap().unwrap();
        assert!(matches!(outcome, Outcome::Applied(Resolution::Succeeded(_))));
        assert_eq!(sink.count(Level::Success), 1);
        assert!(!studio.branches().iter().any(|b| b.name == "feature/rain"));
        assert_eq!(studio.merge_dialog().unwrap().phase(), MergePhase::Merged);
    }

    #[tokio::test]
    async fn test_switch_branch_retargets_merge() {
        let backend = Arc::new(FakeBackend::default());
        let (studio, _sink) = studio_with(backend, None);
        studio.refresh_branches().await;
        studio.open_merge().await.unwrap();

        studio.switch_branch("feature/snow").unwrap();
        assert!(studio.merge_dialog().is_none());
        assert!(studio.switch_branch("nope").is_err());

        studio.open_merge().await.unwrap();
        let dialog = studio.merge_dialog().unwrap();
        assert_eq!(dialog.target(), "feature/snow");
        assert!(dialog.selectable_sources().iter().any(|s| s == "main"));
    }

    // -----------------------------------------------------------------------
    // Status panels
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_status_failures_fall_back_without_blocking_estimate() {
        let backend = Arc::new(FakeBackend::failing());
        let (studio, sink) = studio_with(backend, None);
        studio.set_scene(scene());

        let budget = studio.refresh_budget().await;
        assert_eq!(budget, DailyBudget::default());
        assert!(studio.refresh_gpu().await.is_none());
        assert!(!studio.local_busy());
        assert_eq!(sink.count(Level::Warning), 2);

        let est = studio.estimate().unwrap();
        assert_eq!(est.render_minutes, 4);
        let decision = studio.budget_decision().unwrap();
        assert_eq!(decision.approval, Approval::Auto);
    }

    #[tokio::test]
    async fn test_budget_over_cap_needs_manual_approval() {
        let backend = Arc::new(FakeBackend::default());
        let (studio, _sink) = studio_with(backend, Some(0.1));
        studio.set_scene(scene());
        studio.refresh_budget().await;
        studio.refresh_gpu().await;
        assert!(studio.local_busy());
        assert!(studio.venue().unwrap().local_busy());

        // Local electricity is a fraction of a cent.
        assert_eq!(studio.venue().unwrap().chosen(), Venue::Local);
        let decision = studio.budget_decision().unwrap();
        assert!(!decision.over_cap);
        assert_eq!(decision.approval, Approval::Auto);

        // About $0.11 in the cloud pushes 19.90 past the $20 cap.
        studio.choose_venue(Venue::Cloud);
        let decision = studio.budget_decision().unwrap();
        assert!(decision.over_cap);
        assert_eq!(decision.approval, Approval::Manual);

        // The override survives a scene change.
        studio.set_scene(Scene {
            frames: 240,
            ..scene()
        });
        assert_eq!(studio.venue().unwrap().chosen(), Venue::Cloud);
    }

    #[tokio::test]
    async fn test_catalog_refresh_failure_keeps_defaults() {
        let backend = Arc::new(FakeBackend::failing());
        let (studio, sink) = studio_with(backend.clone(), None);
        let catalog = studio.refresh_catalog().await;
        assert!(!catalog.is_loaded());
        assert_eq!(catalog.qualities(), &Quality::ALL);
        assert_eq!(sink.count(Level::Warning), 1);

        backend.fail.store(false, Ordering::SeqCst);
        let catalog = studio.refresh_catalog().await;
        assert_eq!(catalog.models(), &["animagine-xl".to_string()]);
    }

    #[tokio::test]
    async fn test_select_project_resets_scene() {
        let (studio, _sink) = studio_with(Arc::new(FakeBackend::default()), None);
        studio.refresh_branches().await;
        studio.switch_branch("feature/rain").unwrap();
        studio.set_scene(scene());
        studio.select_character(Some("Hana".into()));
        studio.select_project(Some("moonlit".into()));

        let sel = studio.selection();
        assert_eq!(sel.project.as_deref(), Some("moonlit"));
        assert_eq!(sel.character, None);
        assert_eq!(sel.branch, "main");
        assert!(studio.branches().is_empty());
        assert!(studio.scene().is_none());
        assert!(studio.estimate().is_none());

        assert_eq!(studio.refresh_branches().await.len(), 3);
    }
}
