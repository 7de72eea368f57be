use std::{env, path::PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tokio::fs;
use tracing::info;

pub const DEFAULT_CONFIG_PATH: &str = "config/app.yaml";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    #[serde(default = "default_working_dir")]
    pub working_dir: String,
    #[serde(default)]
    pub workspace: Option<String>,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub consolidation: ConsolidationConfig,
    #[serde(default)]
    pub review: ReviewConfig,
    #[serde(default)]
    pub graph: GraphConfig,
}

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Body limit for multipart uploads.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub model: String,
    pub base_url: Option<String>,
    pub timeout_secs: u64,
    pub max_triplets: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            model: "gpt-5-mini".to_string(),
            base_url: None,
            timeout_secs: 600,
            max_triplets: 50,
        }
    }
}

/// Each worker holds at most one unacknowledged delivery.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub workers: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { workers: 1 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    pub ttl_secs: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self { ttl_secs: 86_400 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConsolidationConfig {
    pub enabled: bool,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    pub admins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub transaction_timeout_secs: u64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            transaction_timeout_secs: 30,
        }
    }
}

fn default_max_upload_bytes() -> usize {
    DEFAULT_MAX_UPLOAD_BYTES
}

fn default_working_dir() -> String {
    "./data".to_string()
}

impl AppConfig {
    pub fn from_yaml(contents: &str) -> Result<Self> {
        serde_yaml::from_str(contents).context("Failed to parse configuration")
    }

    /// `WORKSPACE` from the environment wins over the file.
    pub fn resolved_workspace(&self) -> Option<String> {
        env::var("WORKSPACE")
            .ok()
            .or_else(|| self.workspace.clone())
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }
}

pub async fn load_config() -> Result<AppConfig> {
    let path = config_path();
    let contents = fs::read_to_string(&path)
        .await
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let config = AppConfig::from_yaml(&contents)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    info!(path = %path.display(), "Configuration loaded from disk");
    Ok(config)
}

fn config_path() -> PathBuf {
    env::var("APP_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}
