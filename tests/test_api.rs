//! Tests for the mock backend endpoints and the HTTP status source that
//! talks to them.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use bagana::api::{AppState, Jobs, router};
use bagana::engine::WorkflowMachine;
use bagana::engine::types::*;
use bagana::services::http::HttpStatusSource;
use bagana::services::{ProgressSink, SourceError, StatusSource};
use bagana::storage::HistoryStore;
use bagana::storage::memory_store::MemoryHistoryStore;
use bagana::workflows::research::ResearchInput;
use bagana::workflows::{Campaign, Depth, Research, Scope, WorkflowKind};

fn app(run_duration: Duration) -> Router {
    router(Arc::new(AppState::new(run_duration)))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn brief_json() -> Value {
    json!({
        "objectives": "Launch the spring collection to new audiences",
        "targetAudience": "Women 18-34 into sustainable fashion",
        "budget": 25000,
        "kpis": ["engagement", "reach"],
        "platforms": ["tiktok"],
        "scope": "Market Analysis",
        "depth": "Standard"
    })
}

async fn spawn_backend(run_duration: Duration) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = app(run_duration);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn fast_poll() -> PollConfig {
    PollConfig {
        poll_interval: Duration::from_millis(20),
        max_polls: 200,
        submit_timeout: Duration::from_secs(5),
        status_timeout: Duration::from_secs(5),
        retry: RetryConfig {
            max_retries: 2,
            backoff_s: 0.01,
        },
    }
}

// --- Router ---

#[tokio::test]
async fn health_reports_ok() {
    let (status, body) = send(&app(Duration::ZERO), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn research_submit_returns_run_id() {
    let app = app(Duration::ZERO);
    let (status, body) = send(
        &app,
        post_json(
            "/api/workflows/start",
            json!({"query": "What is the market size for X?", "scope": "Market Analysis", "depth": "Quick"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let id = body["runId"].as_str().unwrap();
    assert!(id.starts_with("run_"));
}

#[tokio::test]
async fn research_submit_rejects_short_query() {
    let app = app(Duration::ZERO);
    let (status, body) = send(
        &app,
        post_json("/api/workflows/start", json!({"query": "  short  "})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["fields"][0]["field"], "query");
    assert_eq!(
        body["fields"][0]["message"],
        "Query must be at least 10 characters"
    );
}

#[tokio::test]
async fn campaign_submit_reports_every_invalid_field() {
    let app = app(Duration::ZERO);
    let (status, body) = send(
        &app,
        post_json(
            "/api/v1/campaigns/plan",
            json!({
                "objectives": "too short",
                "targetAudience": "",
                "budget": -5,
                "kpis": [],
                "platforms": []
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let fields: Vec<&str> = body["fields"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["field"].as_str().unwrap())
        .collect();
    assert_eq!(
        fields,
        vec!["objectives", "targetAudience", "budget", "kpis", "platforms"]
    );
    assert!(body["error"].as_str().unwrap().contains("budget"));
}

#[tokio::test]
async fn malformed_body_is_unprocessable() {
    let app = app(Duration::ZERO);
    let (status, _) = send(
        &app,
        post_json("/api/v1/campaigns/plan", json!({"objectives": 42})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn unknown_run_is_not_found() {
    let app = app(Duration::ZERO);
    let (status, body) = send(&app, get("/api/workflows/run_missing/status")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Run not found: run_missing");
}

#[tokio::test]
async fn campaign_reports_running_stage_then_results() {
    let app = app(Duration::from_millis(200));
    let (_, body) = send(&app, post_json("/api/v1/campaigns/plan", brief_json())).await;
    let id = body["campaignId"].as_str().unwrap().to_string();
    assert!(id.starts_with("campaign_"));
    let uri = format!("/api/v1/campaigns/{}/status", id);

    let (status, body) = send(&app, get(&uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "running");
    assert_eq!(body["currentAgent"], "Trend Agent");
    assert!(body.get("results").is_none());

    tokio::time::sleep(Duration::from_millis(250)).await;
    let (_, body) = send(&app, get(&uri)).await;
    assert_eq!(body["status"], "done");
    assert!(body.get("currentAgent").is_none());

    let results = &body["results"];
    assert_eq!(results["campaignId"], id.as_str());
    let recs = results["recommendations"].as_array().unwrap();
    assert!(!recs.is_empty());
    assert!(recs.iter().all(|r| r["platform"] == "tiktok"));
    assert!(results["performanceForecast"]["predictedROI"].is_number());
}

#[tokio::test]
async fn research_runs_report_no_stage() {
    let app = app(Duration::from_secs(60));
    let (_, body) = send(
        &app,
        post_json(
            "/api/workflows/start",
            json!({"query": "How do teams adopt Rust?"}),
        ),
    )
    .await;
    let uri = format!("/api/workflows/{}/status", body["runId"].as_str().unwrap());

    let (_, body) = send(&app, get(&uri)).await;
    assert_eq!(body["status"], "running");
    assert!(body.get("currentAgent").is_none());
}

#[tokio::test]
async fn oldest_jobs_are_evicted_past_capacity() {
    let state = AppState {
        run_duration: Duration::ZERO,
        research: Jobs::with_capacity(1),
        campaign: Jobs::default(),
    };
    let app = router(Arc::new(state));
    let query = json!({"query": "What is the market size for X?"});

    let (_, first) = send(&app, post_json("/api/workflows/start", query.clone())).await;
    let (_, second) = send(&app, post_json("/api/workflows/start", query)).await;

    let status_of = |body: &Value| format!("/api/workflows/{}/status", body["runId"].as_str().unwrap());
    let (status, _) = send(&app, get(&status_of(&first))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, body) = send(&app, get(&status_of(&second))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "done");
}

// --- HTTP status source against a live backend ---

#[tokio::test]
async fn http_source_drives_research_run_to_done() {
    let addr = spawn_backend(Duration::ZERO).await;
    let source = HttpStatusSource::<Research>::new(format!("http://{}/", addr), Duration::from_secs(5))
        .unwrap();
    let history = Arc::new(MemoryHistoryStore::new(Research::HISTORY_CAPACITY));
    let machine = WorkflowMachine::new(Arc::new(source), history.clone(), fast_poll());

    let input = ResearchInput::new("What is the market size for X?", Scope::MarketAnalysis, Depth::Standard);
    let handle = machine.submit(input).await.unwrap();
    let state = machine.settled().await;

    assert_eq!(state.phase, Phase::Done);
    let results = state.results.unwrap();
    assert_eq!(results.run_id, handle);
    assert_eq!(results.query, "What is the market size for X?");
    assert_eq!(history.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn http_source_forwards_campaign_stages() {
    let addr = spawn_backend(Duration::from_millis(400)).await;
    let source = HttpStatusSource::<Campaign>::new(format!("http://{}", addr), Duration::from_secs(5))
        .unwrap();
    let history = Arc::new(MemoryHistoryStore::new(Campaign::HISTORY_CAPACITY));
    let machine = WorkflowMachine::new(Arc::new(source), history, fast_poll());

    let mut rx = machine.subscribe();
    let collector = tokio::spawn(async move {
        let mut stages: Vec<String> = Vec::new();
        loop {
            let state = rx.borrow_and_update().clone();
            if let Some(stage) = state.current_stage.clone()
                && stages.last() != Some(&stage)
            {
                stages.push(stage);
            }
            if state.phase.is_terminal() || rx.changed().await.is_err() {
                return (stages, state);
            }
        }
    });

    let brief = serde_json::from_value(brief_json()).unwrap();
    machine.submit(brief).await.unwrap();
    let (stages, state) = collector.await.unwrap();

    assert_eq!(state.phase, Phase::Done);
    assert!(state.results.unwrap().is_ranked());

    // Stages may be skipped between polls but never reported out of order.
    assert!(!stages.is_empty());
    let order: Vec<usize> = stages
        .iter()
        .map(|s| Campaign::STAGES.iter().position(|st| st.name == s).unwrap())
        .collect();
    assert!(order.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test]
async fn http_source_surfaces_validation_rejection() {
    let addr = spawn_backend(Duration::ZERO).await;
    let source = HttpStatusSource::<Research>::new(format!("http://{}", addr), Duration::from_secs(5))
        .unwrap();
    let history = Arc::new(MemoryHistoryStore::new(Research::HISTORY_CAPACITY));
    let machine = WorkflowMachine::new(Arc::new(source), history, fast_poll());

    let err = machine
        .submit(ResearchInput::new("short", Scope::UserResearch, Depth::Quick))
        .await
        .unwrap_err();
    assert!(matches!(err, bagana::engine::WorkflowError::Submit(SourceError::Rejected(_))));

    let state = machine.state();
    assert_eq!(state.phase, Phase::Error);
    let message = state.error.unwrap();
    assert!(message.starts_with("HTTP 400"));
    assert!(message.contains("Query must be at least 10 characters"));
}

#[tokio::test]
async fn http_source_unknown_run_is_rejected() {
    let addr = spawn_backend(Duration::ZERO).await;
    let source = HttpStatusSource::<Research>::new(format!("http://{}", addr), Duration::from_secs(5))
        .unwrap();

    let err = source
        .fetch_status(&RunHandle::new("run_missing"), &ProgressSink::discard())
        .await
        .unwrap_err();
    assert!(matches!(err, SourceError::Rejected(_)));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn http_source_unreachable_backend_is_retryable() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let source = HttpStatusSource::<Research>::new(format!("http://{}", addr), Duration::from_secs(2))
        .unwrap();
    let err = source
        .fetch_status(&RunHandle::new("run_1"), &ProgressSink::discard())
        .await
        .unwrap_err();
    assert!(err.is_retryable());
}
