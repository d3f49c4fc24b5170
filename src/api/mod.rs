mod errors;
pub mod handlers;

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use anyhow::Result;
use axum::Router;
use axum::routing::{get, post};
use chrono::{DateTime, Utc};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::services::mock::{CannedResults, MAX_TRACKED_RUNS, RunTable};
use crate::workflows::{Campaign, Research};

pub use errors::{AppError, ErrorResponse};

/// A run admitted by the mock backend.
pub struct Job<I> {
    pub input: I,
    pub submitted_at: DateTime<Utc>,
    pub started: Instant,
}

/// Jobs of one workflow variant. Only the most recent
/// [`MAX_TRACKED_RUNS`] are kept; older ids answer 404.
pub struct Jobs<W: CannedResults> {
    jobs: Mutex<RunTable<Job<W::Input>>>,
}

impl<W: CannedResults> Default for Jobs<W> {
    fn default() -> Self {
        Self::with_capacity(MAX_TRACKED_RUNS)
    }
}

impl<W: CannedResults> Jobs<W> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            jobs: Mutex::new(RunTable::new(capacity)),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, RunTable<Job<W::Input>>> {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Shared application state accessible by all handlers.
pub struct AppState {
    /// How long a run reports `running` before it resolves.
    pub run_duration: Duration,
    pub research: Jobs<Research>,
    pub campaign: Jobs<Campaign>,
}

impl AppState {
    pub fn new(run_duration: Duration) -> Self {
        Self {
            run_duration,
            research: Jobs::default(),
            campaign: Jobs::default(),
        }
    }
}

/// Variants served by the mock backend.
pub trait Hosted: CannedResults {
    fn jobs(state: &AppState) -> &Jobs<Self>;
}

impl Hosted for Research {
    fn jobs(state: &AppState) -> &Jobs<Self> {
        &state.research
    }
}

impl Hosted for Campaign {
    fn jobs(state: &AppState) -> &Jobs<Self> {
        &state.campaign
    }
}

fn route_kind<W: Hosted>(router: Router<Arc<AppState>>) -> Router<Arc<AppState>> {
    router
        .route(W::SUBMIT_PATH, post(handlers::submit::<W>))
        .route(&W::status_path("{id}"), get(handlers::status::<W>))
}

/// Router exposing the job-submission and job-status endpoints of both variants.
pub fn router(state: Arc<AppState>) -> Router {
    let router = Router::new().route("/health", get(handlers::health));
    let router = route_kind::<Research>(router);
    let router = route_kind::<Campaign>(router);

    router
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the mock backend server.
pub async fn serve(host: &str, port: u16, run_duration: Duration) -> Result<()> {
    let state = Arc::new(AppState::new(run_duration));
    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Bagana mock backend listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
