use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::extract::{Path, State};
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};

use crate::engine::types::{RunHandle, RunStatus};
use crate::services::http::StatusBody;
use crate::services::mock::mint_handle;

use super::errors::AppError;
use super::{AppState, Hosted, Job};

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// POST submission endpoint. Responds `{"<handle field>": "<id>"}`.
pub async fn submit<W: Hosted>(
    State(state): State<Arc<AppState>>,
    Json(input): Json<W::Input>,
) -> Result<Json<serde_json::Value>, AppError> {
    W::validate(&input)?;

    let handle = mint_handle::<W>();
    let evicted = W::jobs(&state).lock().admit(
        handle.clone(),
        Job {
            input,
            submitted_at: Utc::now(),
            started: Instant::now(),
        },
    );
    if let Some(evicted) = evicted {
        debug!(run = %evicted, workflow = W::NAME, "Oldest run evicted");
    }
    info!(run = %handle, workflow = W::NAME, "Run accepted");

    let mut body = serde_json::Map::new();
    body.insert(
        W::HANDLE_FIELD.to_string(),
        serde_json::Value::String(handle.to_string()),
    );
    Ok(Json(serde_json::Value::Object(body)))
}

/// GET status endpoint. A run reports `running`, walking through the
/// variant's stages, until the configured run duration has elapsed.
pub async fn status<W: Hosted>(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<StatusBody<W::Results>>, AppError> {
    let handle = RunHandle::new(id);
    let jobs = W::jobs(&state).lock();
    let job = jobs
        .get(&handle)
        .ok_or_else(|| AppError::NotFound(format!("Run not found: {}", handle)))?;

    let elapsed = job.started.elapsed();
    let body = if elapsed < state.run_duration {
        let current_agent = if W::STAGES.is_empty() {
            None
        } else {
            let fraction = elapsed.as_secs_f64() / state.run_duration.as_secs_f64();
            let index = ((fraction * W::STAGES.len() as f64) as usize).min(W::STAGES.len() - 1);
            Some(W::STAGES[index].name.to_string())
        };
        StatusBody {
            status: RunStatus::Running,
            results: None,
            current_agent,
        }
    } else {
        let elapsed_ms = elapsed.as_millis() as u64;
        StatusBody {
            status: RunStatus::Done,
            results: Some(W::canned(&handle, &job.input, job.submitted_at, elapsed_ms)),
            current_agent: None,
        }
    };

    Ok(Json(body))
}

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
