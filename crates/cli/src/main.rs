//! Timeline Studio command-line console.
//!
//! Provides subcommands for estimating render cost, checking the daily
//! budget and local GPU, listing and comparing branches, committing scene
//! changes, merging branches, and watching model-training jobs. Also
//! generates and validates configuration files.

mod style;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, ContentArrangement, Table};
use dialoguer::Confirm;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use timeline_studio_core::backend::{GpuStatsSource, VersioningBackend};
use timeline_studio_core::comparator::ComparisonOutcome;
use timeline_studio_core::estimate::{
    self, Approval, BudgetDecision, CostEstimate, SceneParams, Venue,
};
use timeline_studio_core::models::{Priority, Quality, Resolution, Scene, TrainingJob};
use timeline_studio_core::notify::RecordingSink;
use timeline_studio_core::training::TrainingSnapshot;
use timeline_studio_core::workflow::{MergeStrategy, Outcome, Resolution as Submission};
use timeline_studio_core::{
    GpuStatsClient, Notifier, Studio, StudioClient, StudioConfig, StudioSettings, TrainingMonitor,
};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// Timeline Studio command-line console.
#[derive(Parser, Debug)]
#[command(
    name = "studio",
    version,
    about = "Estimate, commit, compare and merge anime scene timelines"
)]
struct Cli {
    /// Path to the TOML configuration file. Defaults to the per-user config
    /// when it exists, built-in defaults otherwise.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log filter (e.g. `debug`, `timeline_studio_core=trace`).
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a default configuration file.
    Init {
        /// Output path. Defaults to the per-user config location.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Overwrite without asking.
        #[arg(long)]
        force: bool,
    },

    /// Validate a configuration file.
    Validate,

    /// Estimate render time and cost for a scene.
    Estimate {
        #[arg(long)]
        frames: u32,

        #[arg(long, default_value = "medium")]
        quality: Quality,

        /// Output resolution as WIDTHxHEIGHT.
        #[arg(long, default_value = "1920x1080")]
        resolution: Resolution,

        /// Scene duration in seconds.
        #[arg(long)]
        duration: Option<f64>,

        /// Print the estimate as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show today's render spend.
    Budget,

    /// Show local GPU occupancy.
    Gpu,

    /// List branches.
    Branches,

    /// Compare a branch against the target branch.
    Compare {
        source: String,

        /// Defaults to the configured active branch.
        #[arg(long)]
        target: Option<String>,
    },

    /// Commit the current scene state, optionally queueing a render.
    Commit {
        /// Commit message. Suggested from the scene metadata when omitted.
        #[arg(short, long)]
        message: Option<String>,

        /// Queue a render with this commit. Needs `--frames` for the estimate.
        #[arg(long, requires = "frames")]
        render: bool,

        #[arg(long, default_value = "medium")]
        quality: Quality,

        #[arg(long, default_value = "normal")]
        priority: Priority,

        /// Tag to attach (repeatable), e.g. wip, final, review, render.
        #[arg(short, long = "tag")]
        tags: Vec<String>,

        /// Scene frame count, used for the estimate.
        #[arg(long)]
        frames: Option<u32>,

        /// Scene duration in seconds.
        #[arg(long)]
        duration: Option<f64>,

        /// Scene art style.
        #[arg(long)]
        style: Option<String>,

        /// Scene music track.
        #[arg(long)]
        track: Option<String>,

        /// Skip the manual-approval prompt.
        #[arg(short, long)]
        yes: bool,
    },

    /// Merge a branch into the target branch.
    Merge {
        source: String,

        /// Defaults to the configured active branch.
        #[arg(long)]
        target: Option<String>,

        /// auto, manual, prefer-target or prefer-source.
        #[arg(long, default_value = "auto")]
        strategy: MergeStrategy,

        /// Merge message. Defaults to "Merge <source> into <target>".
        #[arg(short, long)]
        message: Option<String>,

        #[arg(long)]
        squash: bool,

        /// Delete the source branch after merging.
        #[arg(long)]
        delete_branch: bool,

        /// Do not snapshot the target before merging.
        #[arg(long)]
        no_backup: bool,

        /// Do not ask for confirmation.
        #[arg(short, long)]
        yes: bool,
    },

    /// Show model-training jobs.
    Training {
        /// Keep refreshing until Ctrl+C.
        #[arg(short, long)]
        watch: bool,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match cli.command {
        Commands::Init { .. } | Commands::Validate => Ok(None),
        _ => load_config(cli.config.as_deref()).map(Some),
    };

    let level = cli
        .log_level
        .clone()
        .or_else(|| {
            config
                .as_ref()
                .ok()
                .and_then(|c| c.as_ref())
                .map(|c| c.logging.level.clone())
        })
        .unwrap_or_else(|| "warn".into());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let result = match config {
        Ok(config) => run(cli, config).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", style::error(&format!("Error: {:#}", e)));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, config: Option<StudioConfig>) -> Result<()> {
    let command = cli.command;
    let config = match command {
        Commands::Init { output, force } => return cmd_init(output, force),
        Commands::Validate => return cmd_validate(cli.config.as_deref()),
        _ => config.context("configuration was not loaded")?,
    };

    match command {
        Commands::Estimate {
            frames,
            quality,
            resolution,
            duration,
            json,
        } => {
            let params = SceneParams {
                frames,
                duration_secs: duration,
                resolution,
                quality,
            };
            cmd_estimate(&config, &params, json)
        }
        Commands::Budget => cmd_budget(&config).await,
        Commands::Gpu => cmd_gpu(&config).await,
        Commands::Branches => cmd_branches(&config).await,
        Commands::Compare { source, target } => {
            let console = Console::connect(config)?;
            console.compare(&source, target.as_deref()).await
        }
        Commands::Commit {
            message,
            render,
            quality,
            priority,
            tags,
            frames,
            duration,
            style,
            track,
            yes,
        } => {
            let console = Console::connect(config)?;
            let scene = frames.map(|frames| Scene {
                id: "cli".into(),
                frames,
                duration_secs: duration,
                quality,
                style,
                music_track: track,
                ..Default::default()
            });
            let args = CommitArgs {
                message,
                render,
                quality,
                priority,
                tags,
                yes,
            };
            console.commit(scene, args).await
        }
        Commands::Merge {
            source,
            target,
            strategy,
            message,
            squash,
            delete_branch,
            no_backup,
            yes,
        } => {
            let console = Console::connect(config)?;
            let args = MergeArgs {
                strategy,
                message,
                squash,
                delete_branch,
                create_backup: !no_backup,
                yes,
            };
            console.merge(&source, target.as_deref(), args).await
        }
        Commands::Training { watch } => cmd_training(&config, watch).await,
        Commands::Init { .. } | Commands::Validate => unreachable!(),
    }
}

// ---------------------------------------------------------------------------
// Config helpers
// ---------------------------------------------------------------------------

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("timeline-studio").join("config.toml"))
}

/// The explicit path, else the per-user config if it exists.
fn config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    match explicit {
        Some(p) => Some(p.to_path_buf()),
        None => default_config_path().filter(|p| p.exists()),
    }
}

fn load_config(explicit: Option<&Path>) -> Result<StudioConfig> {
    match config_path(explicit) {
        Some(path) => StudioConfig::load_and_resolve(&path)
            .with_context(|| format!("failed to load configuration from {}", path.display())),
        None => {
            let mut config = StudioConfig::default();
            config
                .resolve_env_vars()
                .context("failed to resolve environment variables")?;
            Ok(config)
        }
    }
}

fn backend_client(config: &StudioConfig) -> Result<StudioClient> {
    StudioClient::from_config(&config.backend).context("failed to create backend client")
}

fn gpu_client(config: &StudioConfig) -> Result<GpuStatsClient> {
    GpuStatsClient::from_config(&config.gpu).context("failed to create GPU stats client")
}

// ---------------------------------------------------------------------------
// Config subcommands
// ---------------------------------------------------------------------------

const DEFAULT_CONFIG: &str = r#"# Timeline Studio configuration
# Every section is optional; the values below are the defaults.

[backend]
api_url = "http://127.0.0.1:8000/api"
# token_env = "STUDIO_API_TOKEN"
timeout_secs = 30

[gpu]
stats_url = "http://127.0.0.1:8188/system_stats"
# Local GPU counts as busy below this free-VRAM fraction.
busy_free_fraction = 0.30

[pricing]
seconds_per_frame_high = 3.0
seconds_per_frame_medium = 2.0
seconds_per_frame_other = 1.0
gpu_per_minute = 0.0265
storage_per_gb_month = 0.02
network_free_mb = 1000.0
network_per_gb = 0.12
function_per_gb_second = 0.0000025
function_memory_gb = 2.0
local_gpu_watts = 350.0
electricity_per_kwh = 0.15
mb_per_frame = 0.5

[budget]
daily_cap = 20.0
auto_approval_threshold = 1.0

[polling]
training_interval_secs = 10

[notifications]
# slack_webhook_url_env = "SLACK_WEBHOOK_URL"

[logging]
level = "warn"

[studio]
# project = "moonlit-rooftops"
branch = "main"
"#;

fn cmd_init(output: Option<PathBuf>, force: bool) -> Result<()> {
    let output = output
        .or_else(default_config_path)
        .context("could not determine a config directory; pass --output")?;

    if output.exists() && !force {
        let overwrite = Confirm::new()
            .with_prompt(format!("{} already exists. Overwrite?", output.display()))
            .default(false)
            .interact()
            .context("failed to read confirmation")?;
        if !overwrite {
            println!("{}", style::warn("Init cancelled. Existing file was not modified."));
            return Ok(());
        }
    }

    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent).context("failed to create config directory")?;
    }
    std::fs::write(&output, DEFAULT_CONFIG).context("failed to write config file")?;

    println!("{}", style::success(&format!("Configuration written to {}", output.display())));
    println!();
    println!("Next steps:");
    println!("  1. Point [backend] api_url at your studio backend");
    println!("  2. Set the referenced environment variables (STUDIO_API_TOKEN, etc.)");
    println!("  3. Validate with: studio validate --config {}", output.display());

    Ok(())
}

fn cmd_validate(explicit: Option<&Path>) -> Result<()> {
    let path = config_path(explicit).context("no configuration file found; run `studio init`")?;
    println!("Validating configuration: {}", path.display());
    println!();

    let mut config =
        StudioConfig::load_from_file(&path).context("failed to parse configuration")?;
    println!("  [OK] TOML structure is valid");

    let _ = config.resolve_env_vars();
    println!("  [OK] Environment variable references processed");

    match config.validate() {
        Ok(()) => println!("  [OK] All values are valid"),
        Err(e) => {
            println!("  [FAIL] Validation error: {}", e);
            anyhow::bail!("configuration validation failed");
        }
    }

    let set = |v: bool| if v { "set" } else { "not set" };
    println!();
    println!("Configuration summary:");
    println!("  Backend URL    : {}", config.backend.api_url);
    println!("  Backend token  : {}", set(config.backend.token.is_some()));
    println!("  GPU stats URL  : {}", config.gpu.stats_url);
    println!("  Busy below     : {:.0}% free VRAM", config.gpu.busy_free_fraction * 100.0);
    println!("  Daily cap      : {}", style::money(config.budget.daily_cap));
    println!("  Auto-approve   : under {}", style::money(config.budget.auto_approval_threshold));
    println!("  Training poll  : {}s", config.polling.training_interval_secs);
    println!("  Slack webhook  : {}", set(config.notifications.slack_webhook_url.is_some()));
    println!("  Active branch  : {}", config.studio.branch);
    println!();
    println!("{}", style::success("Configuration is valid."));

    Ok(())
}

// ---------------------------------------------------------------------------
// Status subcommands
// ---------------------------------------------------------------------------

fn cmd_estimate(config: &StudioConfig, params: &SceneParams, json: bool) -> Result<()> {
    params.validate()?;
    let est = estimate::estimate(params, &config.pricing);

    if json {
        println!("{}", serde_json::to_string_pretty(&est)?);
        return Ok(());
    }

    println!();
    println!(
        "{}",
        style::header(&format!(
            "{} frames at {} quality, {}",
            params.frames, params.quality, params.resolution
        ))
    );
    print_estimate(&est);
    Ok(())
}

fn print_estimate(est: &CostEstimate) {
    let cheapest = est.cheapest();
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Venue", "Breakdown", "Total"]);
    table.add_row(vec![
        Cell::new(venue_label(Venue::Cloud, cheapest)),
        Cell::new(format!(
            "GPU {}  storage {}  network {}  functions {}",
            style::money(est.cloud.gpu),
            style::money(est.cloud.storage),
            style::money(est.cloud.network),
            style::money(est.cloud.functions)
        )),
        Cell::new(style::money(est.cloud.total)),
    ]);
    table.add_row(vec![
        Cell::new(venue_label(Venue::Local, cheapest)),
        Cell::new(format!("electricity {}", style::money(est.local.electricity))),
        Cell::new(style::money(est.local.total)),
    ]);

    println!();
    println!("  Render time : ~{} min", est.render_minutes);
    println!("  Output size : {:.1} MB", est.file_size_mb);
    println!("{}", table);
}

fn venue_label(venue: Venue, cheapest: Venue) -> String {
    if venue == cheapest {
        format!("{} (cheapest)", venue)
    } else {
        venue.to_string()
    }
}

/// A render without a budget decision is treated like one over the threshold.
fn needs_approval(decision: Option<&BudgetDecision>) -> bool {
    decision.map_or(true, |d| d.approval == Approval::Manual)
}

async fn cmd_budget(config: &StudioConfig) -> Result<()> {
    let client = backend_client(config)?;
    let today = client
        .daily_budget()
        .await
        .context("failed to fetch daily budget")?;

    let cap = config.budget.daily_cap;
    let threshold = if today.auto_approval_threshold > 0.0 {
        today.auto_approval_threshold
    } else {
        config.budget.auto_approval_threshold
    };
    let remaining = (cap - today.used).max(0.0);

    println!();
    println!("{}", style::header("Daily Budget"));
    println!();
    println!("  Used today   : {} of {}", style::money(today.used), style::money(cap));
    println!("  Remaining    : {}", style::money(remaining));
    println!("  Auto-approve : renders under {}", style::money(threshold));
    if remaining == 0.0 {
        println!();
        println!("{}", style::warn("Daily cap reached; new renders need manual approval."));
    }
    println!();
    Ok(())
}

async fn cmd_gpu(config: &StudioConfig) -> Result<()> {
    let stats = gpu_client(config)?
        .gpu_stats()
        .await
        .context("failed to fetch GPU stats")?;

    if stats.devices.is_empty() {
        println!("{}", style::warn("No GPU devices reported"));
        return Ok(());
    }

    let gb = |bytes: u64| bytes as f64 / 1024.0 / 1024.0 / 1024.0;
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Device", "VRAM total", "VRAM free", "Free"]);
    for d in &stats.devices {
        let pct = if d.vram_total > 0 {
            d.vram_free as f64 / d.vram_total as f64 * 100.0
        } else {
            0.0
        };
        table.add_row(vec![
            Cell::new(&d.name),
            Cell::new(format!("{:.1} GB", gb(d.vram_total))),
            Cell::new(format!("{:.1} GB", gb(d.vram_free))),
            Cell::new(format!("{:.0}%", pct)),
        ]);
    }

    println!();
    println!("{}", table);
    if stats.is_busy(config.gpu.busy_free_fraction) {
        println!("{}", style::warn("Local GPU is busy; cloud rendering is recommended."));
    } else {
        println!("{}", style::success("Local GPU is available."));
    }
    println!();
    Ok(())
}

async fn cmd_branches(config: &StudioConfig) -> Result<()> {
    let branches = backend_client(config)?
        .list_branches()
        .await
        .context("failed to list branches")?;

    if branches.is_empty() {
        println!("No branches found.");
        return Ok(());
    }

    for b in &branches {
        let marker = if b.name == config.studio.branch { "*" } else { " " };
        let head = b.head.as_deref().unwrap_or("-");
        println!("{} {:<32} {}", marker, b.name, style::dim(head));
    }
    Ok(())
}

async fn cmd_training(config: &StudioConfig, watch: bool) -> Result<()> {
    let client = Arc::new(backend_client(config)?);

    if !watch {
        let jobs = client
            .training_jobs()
            .await
            .context("failed to fetch training jobs")?;
        print_jobs(&jobs);
        return Ok(());
    }

    let interval = Duration::from_secs(config.polling.training_interval_secs);
    let handle = TrainingMonitor::spawn(client, interval);
    let mut rx = handle.subscribe();
    let term = console::Term::stdout();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let snap = rx.borrow_and_update().clone();
                let _ = term.clear_screen();
                print_snapshot(&snap, interval);
            }
        }
    }

    handle.shutdown().await;
    Ok(())
}

fn print_snapshot(snap: &TrainingSnapshot, interval: Duration) {
    let fetched = snap
        .fetched_at
        .map(|t| t.with_timezone(&chrono::Local).format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "never".into());
    println!(
        "{}",
        style::header(&format!(
            "Training jobs (updated {}, every {}s, Ctrl+C to stop)",
            fetched,
            interval.as_secs()
        ))
    );
    print_jobs(&snap.jobs);
    if let Some(ref e) = snap.last_error {
        println!(
            "{}",
            style::warn(&format!(
                "Refresh failed {} time(s) in a row: {}",
                snap.consecutive_errors, e
            ))
        );
    }
}

fn print_jobs(jobs: &[TrainingJob]) {
    if jobs.is_empty() {
        println!("No training jobs.");
        return;
    }
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["ID", "Name", "Status", "Progress", "Message"]);
    for j in jobs {
        table.add_row(vec![
            Cell::new(&j.id),
            Cell::new(&j.name),
            Cell::new(j.status),
            Cell::new(format!("{:.0}%", j.progress * 100.0)),
            Cell::new(j.message.as_deref().unwrap_or("")),
        ]);
    }
    println!("{}", table);
}

// ---------------------------------------------------------------------------
// Workflow subcommands
// ---------------------------------------------------------------------------

struct CommitArgs {
    message: Option<String>,
    render: bool,
    quality: Quality,
    priority: Priority,
    tags: Vec<String>,
    yes: bool,
}

struct MergeArgs {
    strategy: MergeStrategy,
    message: Option<String>,
    squash: bool,
    delete_branch: bool,
    create_backup: bool,
    yes: bool,
}

/// A studio session plus the sink its notifications are collected in.
struct Console {
    studio: Studio,
    sink: Arc<RecordingSink>,
    daily_cap: f64,
}

impl Console {
    fn connect(config: StudioConfig) -> Result<Self> {
        let backend = Arc::new(backend_client(&config)?);
        let gpu = Arc::new(gpu_client(&config)?);
        let sink = Arc::new(RecordingSink::new());
        let notifier = Notifier::new(&config.notifications).with_sink(sink.clone());
        let studio = Studio::new(
            backend,
            gpu,
            Arc::new(notifier),
            StudioSettings::from_config(&config),
        );
        Ok(Self {
            studio,
            sink,
            daily_cap: config.budget.daily_cap,
        })
    }

    /// Print and clear collected notifications.
    fn flush(&self) {
        for n in self.sink.take() {
            eprintln!("{}", style::notification(&n));
        }
    }

    /// Make `target` the active branch when given.
    async fn prepare_target(&self, target: Option<&str>) -> Result<()> {
        self.studio.refresh_branches().await;
        if let Some(target) = target {
            self.studio.switch_branch(target)?;
        }
        Ok(())
    }

    async fn compare(&self, source: &str, target: Option<&str>) -> Result<()> {
        self.prepare_target(target).await?;
        self.studio.open_merge().await?;
        let outcome = self.load_comparison(source).await?;
        self.flush();
        if let Some(ref cmp) = outcome {
            print_comparison(source, &self.studio.selection().branch, cmp);
        }
        Ok(())
    }

    async fn load_comparison(&self, source: &str) -> Result<Option<ComparisonOutcome>> {
        let spinner = style::spinner(format!("Comparing {}...", source));
        let outcome = self.studio.select_merge_source(source).await;
        spinner.finish_and_clear();
        Ok(outcome?.applied())
    }

    async fn commit(&self, scene: Option<Scene>, args: CommitArgs) -> Result<()> {
        if let Some(scene) = scene {
            self.studio.set_scene(scene);
        }
        self.studio.open_commit()?;
        self.studio.update_commit(|d| -> Result<()> {
            d.set_render(args.render)?;
            d.set_quality(Some(args.quality))?;
            d.set_priority(Some(args.priority))?;
            for tag in &args.tags {
                d.add_tag(tag)?;
            }
            if let Some(ref m) = args.message {
                d.set_message(m.as_str())?;
            }
            Ok(())
        })?;

        let dialog = self.studio.commit_dialog();
        if dialog.tags().is_empty() {
            println!(
                "{}",
                style::dim(&format!(
                    "No tags. Suggested: {}",
                    dialog.tag_suggestions().join(", ")
                ))
            );
        }

        if args.render {
            tokio::join!(self.studio.refresh_budget(), self.studio.refresh_gpu());
            if let Some(est) = self.studio.estimate() {
                print_estimate(&est);
            }
            if let Some(venue) = self.studio.venue() {
                println!(
                    "  Venue       : {}{}",
                    venue.chosen(),
                    if venue.local_busy() { " (local GPU busy)" } else { "" }
                );
            }
            let decision = self.studio.budget_decision();
            if let Some(ref decision) = decision {
                println!(
                    "  Projected   : {} of {} today",
                    style::money(decision.projected),
                    style::money(self.daily_cap)
                );
            }
            if needs_approval(decision.as_ref()) && !args.yes {
                self.flush();
                let prompt = match decision {
                    Some(d) => format!(
                        "This render ({}) needs manual approval. Continue?",
                        style::money(d.cost)
                    ),
                    None => "No cost estimate for this render. Queue it anyway?".to_string(),
                };
                let go = Confirm::new()
                    .with_prompt(prompt)
                    .default(false)
                    .interact()
                    .context("failed to read confirmation")?;
                if !go {
                    self.studio.cancel_commit();
                    println!("{}", style::warn("Commit cancelled."));
                    return Ok(());
                }
            }
        }

        let message = self.studio.commit_dialog().message().to_string();
        debug!(message = %message, "submitting commit");
        let spinner = style::spinner("Committing...");
        let outcome = self.studio.submit_commit().await;
        spinner.finish_and_clear();
        self.flush();

        match outcome? {
            Outcome::Applied(Submission::Succeeded(commit)) => {
                println!(
                    "  {} {}",
                    style::dim(&commit.id),
                    commit.timestamp.format("%Y-%m-%d %H:%M")
                );
                Ok(())
            }
            Outcome::Applied(Submission::Failed(reason)) => anyhow::bail!("commit failed: {}", reason),
            Outcome::Stale => anyhow::bail!("commit was superseded"),
        }
    }

    async fn merge(&self, source: &str, target: Option<&str>, args: MergeArgs) -> Result<()> {
        self.prepare_target(target).await?;
        self.studio.open_merge().await?;
        let outcome = self.load_comparison(source).await?;
        self.flush();
        let target = self.studio.selection().branch;
        if let Some(ref cmp) = outcome {
            print_comparison(source, &target, cmp);
        }

        self.studio.update_merge(|d| -> Result<()> {
            d.set_strategy(Some(args.strategy))?;
            d.set_squash(args.squash)?;
            d.set_delete_branch(args.delete_branch)?;
            d.set_create_backup(args.create_backup)?;
            if let Some(ref m) = args.message {
                d.set_message(m.as_str())?;
            }
            Ok(())
        })??;

        let dialog = self
            .studio
            .merge_dialog()
            .context("merge dialog closed unexpectedly")?;
        if dialog.can_submit() && !args.yes {
            let go = Confirm::new()
                .with_prompt(format!(
                    "{} ({} strategy). Proceed?",
                    dialog.message(),
                    args.strategy
                ))
                .default(false)
                .interact()
                .context("failed to read confirmation")?;
            if !go {
                self.studio.close_merge();
                println!("{}", style::warn("Merge cancelled."));
                return Ok(());
            }
        }

        let spinner = style::spinner(format!("Merging {} into {}...", source, target));
        let outcome = self.studio.submit_merge().await;
        spinner.finish_and_clear();
        self.flush();

        match outcome? {
            Outcome::Applied(Submission::Succeeded(_)) => Ok(()),
            Outcome::Applied(Submission::Failed(reason)) => anyhow::bail!("merge failed: {}", reason),
            Outcome::Stale => anyhow::bail!("merge was superseded"),
        }
    }
}

fn print_comparison(source: &str, target: &str, outcome: &ComparisonOutcome) {
    let cmp = match outcome {
        ComparisonOutcome::Available(cmp) => cmp,
        ComparisonOutcome::Unavailable { reason } => {
            println!(
                "{}",
                style::error(&format!("Comparison unavailable: {}", reason))
            );
            return;
        }
    };

    println!();
    println!("{}", style::header(&format!("{} → {}", source, target)));
    println!(
        "  {} commits on {}, {} on {}",
        cmp.source.commits, source, cmp.target.commits, target
    );
    println!();

    if cmp.changes.is_empty() {
        println!("No changes.");
    } else {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec!["Change", "Description"]);
        for c in &cmp.changes {
            table.add_row(vec![Cell::new(c.change_type), Cell::new(&c.description)]);
        }
        println!("{}", table);
    }

    if cmp.has_conflicts() {
        println!();
        println!(
            "{}",
            style::warn(&format!("{} conflict(s)", cmp.conflicts.len()))
        );
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec!["Scene", "Conflict"]);
        for c in &cmp.conflicts {
            table.add_row(vec![Cell::new(&c.scene), Cell::new(&c.description)]);
        }
        println!("{}", table);
    }
    println!();
}
