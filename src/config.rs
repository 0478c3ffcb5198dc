//! # Configuration Module
//!
//! Defines structures and logic for loading and managing configuration
//! for the agent. Configuration can be loaded from a JSON file,
//! environment variables, and command-line arguments.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

use crate::agent::AgentOptions;

pub const DEFAULT_CONFIG_FILE: &str = "agent_config.json";
pub const DEFAULT_MODEL: &str = "llama3";
pub const DEFAULT_BASE_URL: &str = "http://localhost:11500/v1";
/// Local backends accept any credential, but the header must be present.
pub const PLACEHOLDER_API_KEY: &str = "dummy_api_key";

const API_KEY_ENV: &str = "OPENAI_API_KEY";
const BASE_URL_ENV: &str = "OPENAI_BASE_URL";

/// Connection settings for the chat-completion backend.
#[derive(Deserialize, Debug, Clone)]
pub struct ModelParameters {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    /// Extra attempts after a transient failure. Zero disables retrying.
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}
fn default_retry_backoff_ms() -> u64 {
    500
}
fn default_request_timeout_secs() -> u64 {
    120
}
fn default_max_iterations() -> Option<u32> {
    Some(20)
}

impl Default for ModelParameters {
    fn default() -> Self {
        ModelParameters {
            model: default_model(),
            api_key: None,
            base_url: None,
            temperature: None,
            max_retries: 0,
            retry_backoff_ms: default_retry_backoff_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl ModelParameters {
    pub fn api_key_or_placeholder(&self) -> &str {
        self.api_key.as_deref().unwrap_or(PLACEHOLDER_API_KEY)
    }

    pub fn base_url_or_default(&self) -> &str {
        self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }
}

/// Main configuration structure.
#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    #[serde(flatten)]
    pub model_parameters: ModelParameters,
    /// Cap on model calls per run; `null` leaves the loop unbounded.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: Option<u32>,
    /// Wall-clock budget for one run.
    #[serde(default)]
    pub run_timeout_secs: Option<u64>,
    /// Tell the model about malformed commands, unknown tools and tool failures.
    #[serde(default)]
    pub report_failures_to_model: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            model_parameters: ModelParameters::default(),
            max_iterations: default_max_iterations(),
            run_timeout_secs: None,
            report_failures_to_model: false,
        }
    }
}

impl Config {
    /// Loads the agent configuration.
    ///
    /// Priority for loading values:
    /// 1. Command-line arguments (highest).
    /// 2. Values from the JSON configuration file.
    /// 3. Environment variables (`OPENAI_API_KEY`, `OPENAI_BASE_URL`).
    /// 4. Default values coded in the application (lowest).
    pub fn load(
        config_file_path: &str,
        cli_model: Option<String>,
        cli_base_url: Option<String>,
        cli_api_key: Option<String>,
        cli_max_iterations: Option<u32>,
    ) -> Result<Self> {
        let path = Path::new(config_file_path);
        let mut loaded_config: Config = if path.exists() {
            let config_str = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file at: {}", config_file_path))?;
            serde_json::from_str(&config_str)
                .with_context(|| format!("Failed to parse config file: {}", config_file_path))?
        } else {
            warn!(
                "Config file not found at: {}. Using default values and environment variables.",
                config_file_path
            );
            Config::default()
        };

        let params = &mut loaded_config.model_parameters;
        if let Some(model) = cli_model {
            params.model = model;
        }
        params.api_key = cli_api_key
            .or_else(|| params.api_key.take())
            .or_else(|| std::env::var(API_KEY_ENV).ok());
        params.base_url = cli_base_url
            .or_else(|| params.base_url.take())
            .or_else(|| std::env::var(BASE_URL_ENV).ok());

        if let Some(max_iterations) = cli_max_iterations {
            loaded_config.max_iterations = Some(max_iterations);
        }

        Ok(loaded_config)
    }

    /// Loop options derived from this configuration.
    pub fn agent_options(&self) -> AgentOptions {
        AgentOptions {
            max_iterations: self.max_iterations,
            deadline: self.run_timeout_secs.map(Duration::from_secs),
            report_failures_to_model: self.report_failures_to_model,
        }
    }
}
