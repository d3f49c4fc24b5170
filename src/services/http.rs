use std::marker::PhantomData;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::engine::types::{RunHandle, RunStatus, StatusReport};
use crate::services::{ProgressSink, SourceError, StatusSource};
use crate::workflows::WorkflowKind;

/// Body of a status response.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(bound(serialize = "R: Serialize", deserialize = "R: DeserializeOwned"))]
pub struct StatusBody<R> {
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<R>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_agent: Option<String>,
}

/// Status source backed by an HTTP+JSON job API.
pub struct HttpStatusSource<W: WorkflowKind> {
    client: reqwest::Client,
    base_url: String,
    _kind: PhantomData<fn() -> W>,
}

impl<W: WorkflowKind> HttpStatusSource<W> {
    /// `timeout` bounds every request, connection setup included.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SourceError::Failed(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            _kind: PhantomData,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

fn classify(err: reqwest::Error) -> SourceError {
    if err.is_timeout() {
        SourceError::Transient(format!("request timed out: {}", err))
    } else if err.is_connect() || err.is_request() {
        SourceError::Transient(err.to_string())
    } else if err.is_decode() {
        SourceError::Failed(format!("Malformed response body: {}", err))
    } else {
        SourceError::Failed(err.to_string())
    }
}

/// Map a non-success status to an error, pulling the `error` field from a
/// JSON body when there is one.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, SourceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or(body);
    let message = if detail.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("HTTP {}: {}", status.as_u16(), detail)
    };

    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        Err(SourceError::Transient(message))
    } else {
        Err(SourceError::Rejected(message))
    }
}

#[async_trait]
impl<W: WorkflowKind> StatusSource<W> for HttpStatusSource<W> {
    async fn submit(&self, input: &W::Input) -> Result<RunHandle, SourceError> {
        let response = self
            .client
            .post(self.url(W::SUBMIT_PATH))
            .json(input)
            .send()
            .await
            .map_err(classify)?;
        let response = check_status(response).await?;

        let body: serde_json::Value = response.json().await.map_err(classify)?;
        let handle = body
            .get(W::HANDLE_FIELD)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                SourceError::Failed(format!("Submission response is missing '{}'", W::HANDLE_FIELD))
            })?;

        debug!(run = %handle, workflow = W::NAME, "Run admitted by backend");
        Ok(RunHandle::new(handle))
    }

    async fn fetch_status(
        &self,
        handle: &RunHandle,
        progress: &ProgressSink,
    ) -> Result<StatusReport<W::Results>, SourceError> {
        let response = self
            .client
            .get(self.url(&W::status_path(handle.as_str())))
            .send()
            .await
            .map_err(classify)?;
        let response = check_status(response).await?;
        let body: StatusBody<W::Results> = response.json().await.map_err(classify)?;

        if let Some(agent) = body.current_agent {
            progress.emit(agent);
        }

        Ok(StatusReport {
            status: body.status,
            results: body.results,
        })
    }
}
