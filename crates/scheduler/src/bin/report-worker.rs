//! report-worker: runs report requests against a file-backed history.
//!
//! Definitions come from a static JSON catalog (`--catalog`); requests,
//! reports and rendered artifacts live under `REPORT_DATA_DIR`.
//!
//! Commands:
//! - `run`    execute one report synchronously
//! - `queue`  enqueue one report and wait for the queue to drain
//! - `history` list stored requests
//! - `modes`  list rendering modes for a definition
//! - `sweep`  delete expired history once
//! - `serve`  keep the queue pump and retention sweep running until Ctrl-C

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use uuid::Uuid;

use reportd_core::Config;
use reportd_scheduler::{
    DefinitionRef, FileHistory, MemoryDesignStore, ModeRef, Priority, RendererRegistry, ReportDefinition,
    ReportRequest, ReportScheduler, ReportStatus, StaticEvaluator,
};

// ── CLI ─────────────────────────────────────────────────────────────

/// Report scheduler worker.
#[derive(Parser, Debug)]
#[command(name = "report-worker", version, about)]
struct Cli {
    /// Static definition catalog (`{"definitions": [...]}`).
    #[arg(long, env = "REPORT_CATALOG", default_value = "config/reports.json")]
    catalog: PathBuf,

    /// Overrides REPORT_DATA_DIR.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a report on this thread and print the result.
    Run(RequestArgs),
    /// Queue a report and wait until every queued report has finished.
    Queue {
        #[command(flatten)]
        request: RequestArgs,

        #[arg(long, default_value = "normal")]
        priority: Priority,

        /// Seconds to wait for the queue to drain.
        #[arg(long, default_value_t = 300)]
        timeout: u64,
    },
    /// List stored report requests, oldest first.
    History {
        /// Only show requests with this status.
        #[arg(long)]
        status: Option<String>,
    },
    /// List rendering modes for a definition.
    Modes {
        /// Definition name or uuid.
        definition: String,
    },
    /// Delete expired, unsaved history once.
    Sweep,
    /// Run the queue pump and retention sweep until Ctrl-C.
    Serve,
}

#[derive(Args, Debug)]
struct RequestArgs {
    /// Definition name or uuid.
    definition: String,

    /// Renderer type name.
    #[arg(long, default_value = "json")]
    renderer: String,

    /// Renderer argument (for example a design uuid).
    #[arg(long, default_value = "")]
    argument: String,

    /// Evaluation parameter as `key=value`; repeatable.
    #[arg(long = "param", value_parser = parse_param)]
    params: Vec<(String, String)>,

    /// Optional label stored with the request.
    #[arg(long)]
    label: Option<String>,

    /// Write the rendered artifact here.
    #[arg(long)]
    output: Option<PathBuf>,

    #[arg(long, env = "USER", default_value = "report-worker")]
    requested_by: String,
}

fn parse_param(raw: &str) -> std::result::Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))
}

// ── Main ────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    reportd_core::config::load_dotenv();
    let mut config = Config::from_env().context("invalid configuration")?;
    if let Some(dir) = &cli.data_dir {
        config.storage.data_dir = dir.clone();
    }
    config.log_summary();

    let evaluator = Arc::new(if cli.catalog.exists() {
        StaticEvaluator::from_json_file(&cli.catalog)
            .with_context(|| format!("failed to load catalog {}", cli.catalog.display()))?
    } else {
        info!(path = %cli.catalog.display(), "No definition catalog found, starting empty");
        StaticEvaluator::new()
    });
    let history = Arc::new(
        FileHistory::new(&config.storage.data_dir)
            .with_context(|| format!("failed to open history at {}", config.storage.data_dir.display()))?,
    );
    let scheduler = ReportScheduler::new(
        config.scheduler.clone(),
        Arc::new(RendererRegistry::with_builtin()),
        evaluator.clone(),
        history,
        Arc::new(MemoryDesignStore::new()),
    )?;

    match cli.command {
        Command::Run(args) => {
            let request = build_request(&evaluator, &args, Priority::Highest)?;
            let report = scheduler.run_report(request)?;
            info!(uuid = %report.request_uuid(), "Report completed");
            print_report(&scheduler, &report.request_uuid(), args.output.as_ref())?;
        }
        Command::Queue {
            request,
            priority,
            timeout,
        } => {
            let queued = scheduler.queue_report(build_request(&evaluator, &request, priority)?)?;
            let uuid = queued.uuid().ok_or_else(|| anyhow!("queued request has no identifier"))?;
            if !scheduler.wait_until_idle(Duration::from_secs(timeout)) {
                bail!("queue did not drain within {}s", timeout);
            }
            print_report(&scheduler, &uuid, request.output.as_ref())?;
        }
        Command::History { status } => {
            let wanted = status.map(|s| s.to_ascii_uppercase());
            for request in scheduler.get_completed_report_requests()?.into_iter().chain(
                scheduler
                    .get_queued_report_requests()?
                    .into_iter()
                    .chain(scheduler.get_in_progress_report_requests()?),
            ) {
                if wanted.as_deref().is_some_and(|w| w != request.status().to_string()) {
                    continue;
                }
                println!(
                    "{}  {:<10}  {:<7}  {}  {}{}",
                    request.uuid().map(|u| u.to_string()).unwrap_or_default(),
                    request.status(),
                    request.priority,
                    request.requested_at.format("%Y-%m-%d %H:%M:%S"),
                    request.definition.name,
                    if request.is_saved() { "  [saved]" } else { "" }
                );
            }
        }
        Command::Modes { definition } => {
            let definition = resolve_definition(&evaluator, &definition)?;
            for mode in scheduler.get_rendering_modes(&definition)? {
                println!("{:>4}  {:<8}  {:<20}  {}", mode.sort_weight, mode.renderer, mode.label, mode.argument);
            }
        }
        Command::Sweep => {
            let deleted = scheduler.delete_old_report_requests()?;
            println!("deleted {} report requests", deleted);
        }
        Command::Serve => {
            let started = scheduler.ensure_scheduled_tasks_running()?;
            info!("report-worker serving ({} background tasks started)", started);
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .context("failed to build signal runtime")?;
            runtime.block_on(tokio::signal::ctrl_c()).context("failed to wait for Ctrl-C")?;
            scheduler.shutdown();
            info!("report-worker exited cleanly");
        }
    }
    Ok(())
}

fn resolve_definition(evaluator: &StaticEvaluator, key: &str) -> Result<ReportDefinition> {
    use reportd_scheduler::DefinitionEvaluator;

    let by_uuid = Uuid::parse_str(key).ok().and_then(|uuid| evaluator.definition(&uuid));
    by_uuid
        .or_else(|| evaluator.find_by_name(key))
        .ok_or_else(|| anyhow!("unknown report definition '{}'", key))
}

fn build_request(evaluator: &StaticEvaluator, args: &RequestArgs, priority: Priority) -> Result<ReportRequest> {
    let definition = resolve_definition(evaluator, &args.definition)?;
    let mut reference = DefinitionRef::new(definition.uuid, definition.name);
    for (key, value) in &args.params {
        let value = serde_json::from_str(value).unwrap_or_else(|_| serde_json::Value::String(value.clone()));
        reference = reference.with_parameter(key.clone(), value);
    }
    let mut request = ReportRequest::new(
        reference,
        ModeRef::new(args.renderer.clone(), args.argument.clone()),
        priority,
        args.requested_by.clone(),
    );
    if let Some(label) = &args.label {
        request = request.with_label(label.clone());
    }
    Ok(request)
}

fn print_report(scheduler: &ReportScheduler, uuid: &Uuid, output: Option<&PathBuf>) -> Result<()> {
    let request = scheduler.get_report_request_by_uuid(uuid)?;
    let report = scheduler
        .get_report_by_uuid(uuid)?
        .ok_or_else(|| anyhow!("report {} has not finished", uuid))?;

    if request.status() == ReportStatus::Failed {
        let detail = report.error().map(|e| e.message.clone()).unwrap_or_default();
        bail!("report {} failed: {}", uuid, detail);
    }

    match (report.artifact(), output) {
        (Some(artifact), Some(path)) => {
            std::fs::write(path, &artifact.content)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("{} ({}, {} bytes) -> {}", artifact.file_name, artifact.content_type, artifact.content.len(), path.display());
        }
        (Some(artifact), None) => {
            println!("{}", String::from_utf8_lossy(&artifact.content));
        }
        (None, _) => {
            let data = report.data().ok_or_else(|| anyhow!("report {} has no data", uuid))?;
            println!("{}", serde_json::to_string_pretty(data)?);
        }
    }
    Ok(())
}
