//! HTTP-level tests for the backend clients and the studio shell.
//!
//! Each test starts an in-process axum server on an ephemeral port that
//! plays the studio backend, then drives the real `StudioClient` against it.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use timeline_studio_core::backend::{GpuStatsClient, GpuStatsSource, VersioningBackend};
use timeline_studio_core::comparator::{CompareRequest, ComparisonOutcome};
use timeline_studio_core::errors::{BackendError, WorkflowError};
use timeline_studio_core::models::{Quality, TrainingStatus};
use timeline_studio_core::notify::{Level, RecordingSink};
use timeline_studio_core::workflow::{
    CommitRequest, MergeOptions, MergePhase, MergeRequest, MergeStrategy, Outcome, Resolution,
};
use timeline_studio_core::{Studio, StudioClient, StudioSettings};

// ===========================================================================
// Helpers
// ===========================================================================

/// Request bodies and auth headers seen by the fake backend.
#[derive(Clone, Default)]
struct Recorded {
    bodies: Arc<Mutex<Vec<(String, Value)>>>,
    auth: Arc<Mutex<Vec<String>>>,
}

impl Recorded {
    fn push(&self, route: &str, headers: &HeaderMap, body: Value) {
        if let Some(v) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
            self.auth.lock().unwrap().push(v.to_string());
        }
        self.bodies.lock().unwrap().push((route.to_string(), body));
    }

    fn bodies_for(&self, route: &str) -> Vec<Value> {
        self.bodies
            .lock()
            .unwrap()
            .iter()
            .filter(|(r, _)| r == route)
            .map(|(_, b)| b.clone())
            .collect()
    }
}

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn client(base: &str) -> StudioClient {
    StudioClient::new(format!("{}/api", base), Some("s3cret".into()), Duration::from_secs(5))
        .unwrap()
}

async fn branches() -> Json<Value> {
    Json(json!([
        { "name": "main", "head": "c15" },
        { "name": "feature/rain", "head": "c23" },
        { "name": "feature/snow" }
    ]))
}

async fn commit(
    State(rec): State<Recorded>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    rec.push("commit", &headers, body.clone());
    Json(json!({
        "id": "c16",
        "message": body["message"],
        "timestamp": "2026-10-18T09:30:00Z",
        "author": "aiko",
        "renderConfig": body["renderConfig"],
        "tags": body["tags"],
        "parents": ["c15"]
    }))
}

async fn compare_ok(
    State(rec): State<Recorded>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    rec.push("compare", &headers, body);
    Json(json!({
        "source": { "commits": 8, "scenes": 4, "lastModified": "2026-10-17T18:00:00Z" },
        "target": { "commits": 15, "scenes": 6 },
        "changes": [
            { "type": "added", "description": "Scene 4: rooftop chase" },
            { "type": "modified", "description": "Scene 2: lighting" },
            { "type": "modified", "description": "Scene 3: music cue" },
            { "type": "deleted", "description": "Scene 7: alt ending" }
        ],
        "conflicts": [
            { "scene": "scene-2", "description": "lighting edited on both branches" },
            { "scene": "scene-3", "description": "different music tracks" }
        ]
    }))
}

async fn compare_broken(
    State(rec): State<Recorded>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    rec.push("compare", &headers, body);
    (StatusCode::INTERNAL_SERVER_ERROR, "index locked")
}

async fn merge_empty(
    State(rec): State<Recorded>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    rec.push("merge", &headers, body);
    StatusCode::OK
}

fn app(rec: Recorded, compare_works: bool) -> Router {
    let router = Router::new()
        .route("/api/git/branches", get(branches))
        .route("/api/commit", post(commit))
        .route("/api/merge", post(merge_empty))
        .route(
            "/api/budget/daily",
            get(|| async { Json(json!({ "used": 12.5, "autoApprovalThreshold": 2.0 })) }),
        )
        .route(
            "/api/training/jobs",
            get(|| async {
                Json(json!([
                    { "id": "t1", "name": "Hana LoRA", "status": "running", "progress": 0.42 },
                    { "id": "t2", "name": "Kenji LoRA", "status": "completed", "progress": 1.0 }
                ]))
            }),
        )
        .route(
            "/api/models",
            get(|| async { Json(json!({ "models": ["animagine-xl"], "qualities": ["draft", "high"] })) }),
        );
    let router = if compare_works {
        router.route("/api/git/compare", post(compare_ok))
    } else {
        router.route("/api/git/compare", post(compare_broken))
    };
    router.with_state(rec)
}

// ===========================================================================
// Client
// ===========================================================================

#[tokio::test]
async fn test_commit_round_trip() {
    let rec = Recorded::default();
    let base = serve(app(rec.clone(), true)).await;
    let client = client(&base);

    let request = CommitRequest {
        message: "Add rain".into(),
        should_render: true,
        render_config: Some(timeline_studio_core::models::RenderConfig {
            quality: Quality::High,
            priority: Default::default(),
        }),
        tags: vec!["final".into()],
        estimated_cost: Some(0.16),
        estimated_time: Some(6),
    };
    let commit = client.commit(&request).await.unwrap();
    assert_eq!(commit.id, "c16");
    assert_eq!(commit.message, "Add rain");
    assert_eq!(commit.render.unwrap().quality, Quality::High);
    assert!(!commit.is_checkpoint());

    let sent = &rec.bodies_for("commit")[0];
    assert_eq!(sent["shouldRender"], true);
    assert_eq!(sent["renderConfig"]["priority"], "normal");
    assert_eq!(sent["estimatedTime"], 6);
    assert_eq!(rec.auth.lock().unwrap()[0], "Bearer s3cret");
}

#[tokio::test]
async fn test_compare_parses_changes_and_conflicts() {
    let rec = Recorded::default();
    let base = serve(app(rec.clone(), true)).await;
    let cmp = client(&base)
        .compare(&CompareRequest {
            source_branch: "feature/rain".into(),
            target_branch: "main".into(),
        })
        .await
        .unwrap();
    assert_eq!(cmp.source.commits, 8);
    assert_eq!(cmp.target.commits, 15);
    assert_eq!(cmp.changes.len(), 4);
    assert_eq!(cmp.conflicts.len(), 2);
    assert!(cmp.has_conflicts());
    assert_eq!(rec.bodies_for("compare")[0]["sourceBranch"], "feature/rain");
}

#[tokio::test]
async fn test_non_2xx_keeps_status_and_body() {
    let base = serve(app(Recorded::default(), false)).await;
    let err = client(&base)
        .compare(&CompareRequest {
            source_branch: "feature/rain".into(),
            target_branch: "main".into(),
        })
        .await
        .unwrap_err();
    match err {
        BackendError::Api { status, ref body } => {
            assert_eq!(status, 500);
            assert_eq!(body, "index locked");
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_route_reports_status_line() {
    let base = serve(Router::new()).await;
    let err = client(&base).daily_budget().await.unwrap_err();
    match err {
        BackendError::Api { status, body } => {
            assert_eq!(status, 404);
            assert!(body.starts_with("HTTP 404"));
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn test_empty_merge_body_is_success() {
    let rec = Recorded::default();
    let base = serve(app(rec.clone(), true)).await;
    let receipt = client(&base)
        .merge(&MergeRequest {
            source_branch: "feature/rain".into(),
            target_branch: "main".into(),
            strategy: MergeStrategy::Auto,
            message: "Merge feature/rain into main".into(),
            options: MergeOptions::default(),
        })
        .await
        .unwrap();
    assert!(receipt.commit.is_none());
    assert!(receipt.unresolved_conflicts.is_empty());
    assert_eq!(rec.bodies_for("merge")[0]["options"]["createBackup"], true);
}

#[tokio::test]
async fn test_status_endpoints() {
    let base = serve(app(Recorded::default(), true)).await;
    let client = client(&base);

    let budget = client.daily_budget().await.unwrap();
    assert_eq!(budget.used, 12.5);
    assert_eq!(budget.auto_approval_threshold, 2.0);

    let jobs = client.training_jobs().await.unwrap();
    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[0].status, TrainingStatus::Running);
    assert!(jobs[1].status.is_terminal());

    let catalog = client.model_catalog().await.unwrap();
    assert_eq!(catalog.models, vec!["animagine-xl"]);
    assert_eq!(catalog.qualities, vec![Quality::Draft, Quality::High]);

    let branches = client.list_branches().await.unwrap();
    assert_eq!(branches.len(), 3);
    assert_eq!(branches[2].head, None);
}

#[tokio::test]
async fn test_gpu_stats_comfyui_shape() {
    let app = Router::new().route(
        "/system_stats",
        get(|| async {
            Json(json!({
                "system": { "os": "posix", "python_version": "3.11" },
                "devices": [{
                    "name": "cuda:0 NVIDIA GeForce RTX 4090",
                    "type": "cuda",
                    "index": 0,
                    "vram_total": 25_757_220_864u64,
                    "vram_free": 2_147_483_648u64,
                    "torch_vram_total": 0,
                    "torch_vram_free": 0
                }]
            }))
        }),
    );
    let base = serve(app).await;
    let gpu = GpuStatsClient::new(format!("{}/system_stats", base), Duration::from_secs(5)).unwrap();
    let stats = gpu.gpu_stats().await.unwrap();
    assert_eq!(stats.devices.len(), 1);
    assert!(stats.is_busy(0.30));
}

// ===========================================================================
// Studio over HTTP
// ===========================================================================

fn studio(base: &str, sink: Arc<RecordingSink>) -> Studio {
    let gpu = GpuStatsClient::new(format!("{}/system_stats", base), Duration::from_secs(5)).unwrap();
    Studio::new(
        Arc::new(client(base)),
        Arc::new(gpu),
        sink,
        StudioSettings::default(),
    )
}

#[tokio::test]
async fn test_merge_flow_over_http() {
    let rec = Recorded::default();
    let base = serve(app(rec.clone(), true)).await;
    let sink = Arc::new(RecordingSink::new());
    let studio = studio(&base, sink.clone());

    studio.open_merge().await.unwrap();
    let sources = studio.merge_dialog().unwrap().selectable_sources().to_vec();
    assert_eq!(sources, vec!["feature/rain", "feature/snow"]);

    let outcome = studio.select_merge_source("feature/rain").await.unwrap();
    let cmp = outcome.applied().unwrap();
    assert_eq!(cmp.change_rows().len(), 4);
    assert_eq!(cmp.conflict_rows().len(), 2);

    let outcome = studio.submit_merge().await.unwrap();
    assert!(matches!(outcome, Outcome::Applied(Resolution::Succeeded(_))));
    assert_eq!(studio.merge_dialog().unwrap().phase(), MergePhase::Merged);

    let sent = &rec.bodies_for("merge")[0];
    assert_eq!(sent["sourceBranch"], "feature/rain");
    assert_eq!(sent["targetBranch"], "main");
    assert_eq!(sent["strategy"], "auto");
    assert_eq!(sent["message"], "Merge feature/rain into main");
    assert_eq!(sink.count(Level::Success), 1);
}

#[tokio::test]
async fn test_failed_comparison_disables_merge_over_http() {
    let rec = Recorded::default();
    let base = serve(app(rec.clone(), false)).await;
    let sink = Arc::new(RecordingSink::new());
    let studio = studio(&base, sink.clone());

    studio.open_merge().await.unwrap();
    let outcome = studio.select_merge_source("feature/rain").await.unwrap();
    match outcome.applied().unwrap() {
        ComparisonOutcome::Unavailable { reason } => assert!(reason.contains("index locked")),
        other => panic!("expected unavailable, got {:?}", other),
    }

    let dialog = studio.merge_dialog().unwrap();
    assert_eq!(dialog.phase(), MergePhase::Ready);
    assert!(!dialog.can_submit());
    assert!(matches!(
        studio.submit_merge().await,
        Err(WorkflowError::ComparisonUnavailable(_))
    ));
    assert!(rec.bodies_for("merge").is_empty());
    assert!(sink
        .notifications()
        .iter()
        .any(|n| n.level == Level::Warning && n.message.contains("unavailable")));
}

#[tokio::test]
async fn test_commit_flow_over_http() {
    let rec = Recorded::default();
    let base = serve(app(rec.clone(), true)).await;
    let sink = Arc::new(RecordingSink::new());
    let studio = studio(&base, sink.clone());
    studio.refresh_branches().await;

    studio.open_commit().unwrap();
    studio
        .update_commit(|d| {
            d.set_message("Checkpoint before relight")?;
            d.add_tag("wip").map(|_| ())
        })
        .unwrap();
    let outcome = studio.submit_commit().await.unwrap();
    assert!(matches!(outcome, Outcome::Applied(Resolution::Succeeded(_))));

    let sent = &rec.bodies_for("commit")[0];
    assert_eq!(sent["shouldRender"], false);
    assert!(sent["renderConfig"].is_null());
    assert_eq!(sent["tags"], json!(["wip"]));

    let main = studio
        .branches()
        .into_iter()
        .find(|b| b.name == "main")
        .unwrap();
    assert_eq!(main.head.as_deref(), Some("c16"));
}
