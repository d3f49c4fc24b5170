use std::path::Path;
use std::time::Duration;

use anyhow::{Context as _, Result};
use serde::Deserialize;

use crate::engine::types::{PollConfig, RetryConfig};

/// Configuration loaded from `bagana.yaml`.
/// All fields are optional; missing fields fall back to CLI/env/defaults.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct BaganaConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub store_dir: Option<String>,
    /// Base URL of a real backend; without it runs use the in-process mock.
    pub backend_url: Option<String>,
    pub poll_interval_ms: Option<u64>,
    pub max_polls: Option<u32>,
    pub submit_timeout_s: Option<f64>,
    pub status_timeout_s: Option<f64>,
    pub max_retries: Option<u32>,
    pub backoff_s: Option<f64>,
    /// How long mock-backend runs stay `running`.
    pub run_duration_ms: Option<u64>,
}

impl BaganaConfig {
    /// Load configuration from a YAML file.
    ///
    /// - If `path` is `Some`, load that specific file (error if missing).
    /// - If `path` is `None`, auto-detect `bagana.yaml` in cwd; return defaults if absent.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file_path = match path {
            Some(p) => {
                if !p.exists() {
                    anyhow::bail!("Config file not found: {}", p.display());
                }
                p.to_path_buf()
            }
            None => {
                let default_path = Path::new("bagana.yaml");
                if !default_path.exists() {
                    return Ok(Self::default());
                }
                default_path.to_path_buf()
            }
        };

        let contents = std::fs::read_to_string(&file_path)
            .with_context(|| format!("Failed to read config file: {}", file_path.display()))?;

        let config: BaganaConfig = serde_yml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", file_path.display()))?;

        Ok(config)
    }

    /// Polling parameters, with defaults for anything not configured.
    pub fn poll_config(&self) -> Result<PollConfig> {
        let defaults = PollConfig::default();
        let retry_defaults = RetryConfig::default();

        let seconds = |value: Option<f64>, default: Duration, name: &str| -> Result<Duration> {
            match value {
                Some(s) => Duration::try_from_secs_f64(s)
                    .with_context(|| format!("Invalid {}: {}", name, s)),
                None => Ok(default),
            }
        };

        Ok(PollConfig {
            poll_interval: self
                .poll_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            max_polls: self.max_polls.unwrap_or(defaults.max_polls).max(1),
            submit_timeout: seconds(self.submit_timeout_s, defaults.submit_timeout, "submit_timeout_s")?,
            status_timeout: seconds(self.status_timeout_s, defaults.status_timeout, "status_timeout_s")?,
            retry: RetryConfig {
                max_retries: self.max_retries.unwrap_or(retry_defaults.max_retries),
                backoff_s: self.backoff_s.unwrap_or(retry_defaults.backoff_s).max(0.0),
            },
        })
    }
}
