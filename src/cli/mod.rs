mod config;
mod render;

pub use config::BaganaConfig;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

use crate::engine::WorkflowMachine;
use crate::engine::types::Phase;
use crate::export::{csv_file_name, recommendations_csv};
use crate::services::StatusSource;
use crate::services::http::HttpStatusSource;
use crate::services::mock::{CannedResults, MockStatusSource};
use crate::storage::HistoryStore;
use crate::storage::json_store::JsonHistoryStore;
use crate::workflows::campaign::{CampaignBrief, Kpi, Platform};
use crate::workflows::research::ResearchInput;
use crate::workflows::{Campaign, Depth, Research, Scope, WorkflowKind};

use render::Report;

const DEFAULT_STORE_DIR: &str = "data/history";
const HISTORY_REFRESH: Duration = Duration::from_secs(2);

#[derive(Parser)]
#[command(name = "bagana", version, about = "Campaign planning and research workflow client")]
pub struct Cli {
    /// Path to a .env file to load (default: auto-detect .env in cwd)
    #[arg(long, global = true)]
    dotenv: Option<PathBuf>,

    /// Path to a config file (default: auto-detect bagana.yaml in cwd)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum Kind {
    Research,
    Campaign,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum HistoryFormat {
    Table,
    Json,
}

#[derive(clap::Args)]
pub struct RunArgs {
    /// History directory
    #[arg(long, env = "STORE_DIR")]
    store_dir: Option<PathBuf>,

    /// Backend base URL (default: in-process mock backend)
    #[arg(long, env = "BACKEND_URL")]
    backend: Option<String>,

    /// Print the final state as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a research workflow
    Research {
        /// The research question
        query: String,

        /// Market Analysis, Technical Feasibility, User Research, Competitive Analysis
        #[arg(long, default_value = "Market Analysis")]
        scope: Scope,

        /// Quick, Standard, Deep
        #[arg(long, default_value = "Standard")]
        depth: Depth,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Plan an influencer campaign
    Campaign {
        /// Campaign objectives
        #[arg(long)]
        objectives: String,

        /// Target audience description
        #[arg(long)]
        audience: String,

        /// Budget (must be positive)
        #[arg(long)]
        budget: Option<f64>,

        /// KPI to optimise for (repeatable): engagement, conversions, roi, reach, brand_awareness
        #[arg(long = "kpi")]
        kpis: Vec<Kpi>,

        /// Platform to consider (repeatable): instagram, tiktok
        #[arg(long = "platform")]
        platforms: Vec<Platform>,

        #[arg(long, default_value = "Market Analysis")]
        scope: Scope,

        #[arg(long, default_value = "Standard")]
        depth: Depth,

        /// Also write the recommendations as CSV to this path
        #[arg(long)]
        csv: Option<PathBuf>,

        #[command(flatten)]
        run: RunArgs,
    },

    /// List completed runs, newest first
    History {
        #[arg(value_enum)]
        kind: Kind,

        /// History directory
        #[arg(long, env = "STORE_DIR")]
        store_dir: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value = "table")]
        format: HistoryFormat,

        /// Show one stored run in full instead of the listing
        #[arg(long, conflicts_with = "watch")]
        id: Option<String>,

        /// Keep refreshing the listing until interrupted
        #[arg(long)]
        watch: bool,
    },

    /// Export a past campaign's recommendations as CSV
    Export {
        /// Campaign ID (default: most recent campaign)
        campaign_id: Option<String>,

        /// History directory
        #[arg(long, env = "STORE_DIR")]
        store_dir: Option<PathBuf>,

        /// Output path (default: bagana-campaign-<id>.csv)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Start the mock backend server
    Serve {
        /// Host to bind to
        #[arg(long, env = "HOST")]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long, env = "PORT")]
        port: Option<u16>,

        /// How long each run stays running, in milliseconds
        #[arg(long, env = "RUN_DURATION_MS")]
        run_duration_ms: Option<u64>,
    },
}

pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();

    // Load .env file
    load_dotenv(cli.dotenv.as_deref());

    let config = BaganaConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Research {
            query,
            scope,
            depth,
            run,
        } => {
            let input = ResearchInput::new(query, scope, depth);
            cmd_run::<Research>(input, &run, &config).await?;
            Ok(())
        }
        Commands::Campaign {
            objectives,
            audience,
            budget,
            kpis,
            platforms,
            scope,
            depth,
            csv,
            run,
        } => {
            let brief = CampaignBrief {
                objectives,
                target_audience: audience,
                budget,
                kpis,
                platforms,
                scope,
                depth,
            };
            let results = cmd_run::<Campaign>(brief, &run, &config).await?;
            if let (Some(path), Some(results)) = (csv, results) {
                write_csv(&path, &results)?;
            }
            Ok(())
        }
        Commands::History {
            kind,
            store_dir,
            format,
            id,
            watch,
        } => {
            let store_dir = resolve_store_dir(store_dir, &config);
            match (kind, id) {
                (Kind::Research, Some(id)) => cmd_show::<Research>(&store_dir, &id, format).await,
                (Kind::Campaign, Some(id)) => cmd_show::<Campaign>(&store_dir, &id, format).await,
                (Kind::Research, None) => cmd_history::<Research>(&store_dir, format, watch).await,
                (Kind::Campaign, None) => cmd_history::<Campaign>(&store_dir, format, watch).await,
            }
        }
        Commands::Export {
            campaign_id,
            store_dir,
            out,
        } => cmd_export(campaign_id, resolve_store_dir(store_dir, &config), out).await,
        Commands::Serve {
            host,
            port,
            run_duration_ms,
        } => {
            let host = host
                .or_else(|| config.host.clone())
                .unwrap_or_else(|| "0.0.0.0".to_string());
            let port = port.or(config.port).unwrap_or(3000);
            let run_duration = run_duration_ms
                .or(config.run_duration_ms)
                .map(Duration::from_millis)
                .unwrap_or(Duration::from_secs(5));
            crate::api::serve(&host, port, run_duration).await
        }
    }
}

/// Load environment variables from a .env file.
/// If an explicit path is given, load from that path (error if missing).
/// Otherwise, auto-detect .env in the current working directory (silently skip if absent).
fn load_dotenv(explicit_path: Option<&Path>) {
    match explicit_path {
        Some(path) => match dotenvy::from_path(path) {
            Ok(()) => info!("Loaded env from {}", path.display()),
            Err(e) => {
                eprintln!(
                    "Warning: Failed to load dotenv file '{}': {}",
                    path.display(),
                    e
                );
            }
        },
        None => match dotenvy::dotenv() {
            Ok(path) => info!("Loaded env from {}", path.display()),
            Err(dotenvy::Error::Io(_)) => {}
            Err(e) => {
                eprintln!("Warning: Failed to parse .env file: {}", e);
            }
        },
    }
}

fn resolve_store_dir(flag: Option<PathBuf>, config: &BaganaConfig) -> PathBuf {
    flag.or_else(|| config.store_dir.as_ref().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_DIR))
}

/// Validate, submit and follow one run to completion. Returns the results
/// when the run finished `done`.
async fn cmd_run<W: Report + CannedResults>(
    input: W::Input,
    args: &RunArgs,
    config: &BaganaConfig,
) -> Result<Option<W::Results>> {
    if let Err(errors) = W::validate(&input) {
        println!("Validation: FAILED");
        for err in &errors.errors {
            println!("  - {}: {}", err.field, err.message);
        }
        anyhow::bail!("{} validation error(s) found", errors.errors.len());
    }

    let poll = config.poll_config()?;
    let source: Arc<dyn StatusSource<W>> = match args.backend.clone().or_else(|| config.backend_url.clone()) {
        Some(url) => {
            info!(backend = %url, "Using HTTP backend");
            Arc::new(HttpStatusSource::<W>::new(url, poll.status_timeout)?)
        }
        None => Arc::new(MockStatusSource::<W>::default()),
    };
    let store_dir = resolve_store_dir(args.store_dir.clone(), config);
    let history: Arc<dyn HistoryStore<W::Results>> =
        Arc::new(JsonHistoryStore::for_kind::<W>(&store_dir));

    let machine = WorkflowMachine::<W>::new(source, history, poll);
    let mut rx = machine.subscribe();

    let handle = match machine.submit(input).await {
        Ok(handle) => handle,
        Err(e) => {
            let message = machine.state().error.unwrap_or_else(|| e.to_string());
            anyhow::bail!("{}", message);
        }
    };
    println!("Run ID: {}", handle);
    println!("Status: {}", Phase::Running);

    let follow = async {
        let mut last_stage: Option<String> = None;
        loop {
            let state = rx.borrow_and_update().clone();
            if state.current_stage != last_stage {
                if let Some(ref stage) = state.current_stage {
                    println!("  ⟳ {}", render::stage_line::<W>(stage));
                }
                last_stage = state.current_stage.clone();
            }
            if state.phase != Phase::Running {
                return state;
            }
            if rx.changed().await.is_err() {
                return machine.state();
            }
        }
    };

    let state = tokio::select! {
        state = follow => state,
        _ = tokio::signal::ctrl_c() => {
            machine.reset().await;
            anyhow::bail!("Interrupted, run {} abandoned", handle);
        }
    };

    println!("Status: {}", state.phase);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&state)?);
    }

    match state.phase {
        Phase::Done => {
            let results = state
                .results
                .context("Run finished without results")?;
            if !args.json {
                W::print_results(&results);
            }
            println!("\nSaved to history: {}", store_dir.display());
            Ok(Some(results))
        }
        Phase::Error => anyhow::bail!(
            "{}",
            state.error.unwrap_or_else(|| W::FAILURE_MESSAGE.to_string())
        ),
        _ => Ok(None),
    }
}

async fn cmd_history<W: Report>(store_dir: &Path, format: HistoryFormat, watch: bool) -> Result<()> {
    let store = JsonHistoryStore::<W::Results>::for_kind::<W>(store_dir);

    if !watch {
        return print_history::<W>(&store, format).await;
    }

    let mut ticker = tokio::time::interval(HISTORY_REFRESH);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                println!("\n[{}]", chrono::Local::now().format("%H:%M:%S"));
                print_history::<W>(&store, format).await?;
            }
            _ = tokio::signal::ctrl_c() => return Ok(()),
        }
    }
}

async fn print_history<W: Report>(
    store: &dyn HistoryStore<W::Results>,
    format: HistoryFormat,
) -> Result<()> {
    let entries = store.list().await?;

    if format == HistoryFormat::Json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    if entries.is_empty() {
        println!("No {} runs yet.", W::NAME);
        return Ok(());
    }

    W::print_history_table(&entries);
    println!(
        "\nTotal: {} of {} run(s) retained",
        entries.len(),
        store.capacity()
    );
    Ok(())
}

/// Look up one stored run by handle; the most recent run when `id` is `None`.
async fn find_entry<W: WorkflowKind>(
    store: &dyn HistoryStore<W::Results>,
    id: Option<&str>,
) -> Result<W::Results> {
    let entries = store.list().await?;
    match id {
        Some(id) => entries
            .into_iter()
            .find(|r| W::run_handle(r).as_str() == id)
            .with_context(|| format!("Run '{}' not found in {} history", id, W::NAME)),
        None => entries
            .into_iter()
            .next()
            .with_context(|| format!("No {} runs in history", W::NAME)),
    }
}

async fn cmd_show<W: Report>(store_dir: &Path, id: &str, format: HistoryFormat) -> Result<()> {
    let store = JsonHistoryStore::<W::Results>::for_kind::<W>(store_dir);
    let results = find_entry::<W>(&store, Some(id)).await?;

    match format {
        HistoryFormat::Json => println!("{}", serde_json::to_string_pretty(&results)?),
        HistoryFormat::Table => W::print_results(&results),
    }
    Ok(())
}

async fn cmd_export(campaign_id: Option<String>, store_dir: PathBuf, out: Option<PathBuf>) -> Result<()> {
    let store = JsonHistoryStore::for_kind::<Campaign>(&store_dir);
    let results = find_entry::<Campaign>(&store, campaign_id.as_deref()).await?;

    let path = out.unwrap_or_else(|| PathBuf::from(csv_file_name(&results)));
    write_csv(&path, &results)
}

fn write_csv(path: &Path, results: &crate::workflows::campaign::CampaignResults) -> Result<()> {
    let csv = recommendations_csv(results)?;
    std::fs::write(path, csv)
        .with_context(|| format!("Failed to write CSV: {}", path.display()))?;
    println!("Exported {} recommendation(s) to {}", results.recommendations.len(), path.display());
    Ok(())
}
