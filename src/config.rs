//! Configuration parsing and validation.
//!
//! corpus-sync is configured via a TOML file (default: `config/csync.toml`).
//! The file is parsed into a [`Config`] struct and validated before any
//! command runs.
//!
//! # Example
//!
//! ```toml
//! [db]
//! path = "./data/csync.sqlite"
//!
//! [source]
//! kind = "help_center"
//! base_url = "https://support.example.com/api/v2/help_center"
//! locale = "en-us"
//!
//! [remote]
//! vector_store_name = "Help Center"
//!
//! [executor]
//! concurrency = 8
//! max_attempts = 5
//!
//! [sync]
//! kind_change = "update"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use corpus_sync_core::diff::KindChangePolicy;

use crate::executor::RetryPolicy;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub source: SourceConfig,
    #[serde(default)]
    pub remote: Option<RemoteConfig>,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Where the content tree comes from.
#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    HelpCenter(HelpCenterConfig),
    Snapshot(SnapshotConfig),
}

#[derive(Debug, Deserialize, Clone)]
pub struct HelpCenterConfig {
    /// API root, e.g. `https://support.example.com/api/v2/help_center`.
    pub base_url: String,
    #[serde(default = "default_locale")]
    pub locale: String,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    #[serde(default = "default_source_timeout_secs")]
    pub timeout_secs: u64,
    /// Upload draft articles too.
    #[serde(default)]
    pub include_drafts: bool,
    /// Section and article listings fetched at once.
    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,
}

fn default_locale() -> String {
    "en-us".to_string()
}
fn default_per_page() -> u32 {
    100
}
fn default_source_timeout_secs() -> u64 {
    30
}
fn default_fetch_concurrency() -> usize {
    8
}

#[derive(Debug, Deserialize, Clone)]
pub struct SnapshotConfig {
    /// JSON file holding an array of content nodes.
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RemoteConfig {
    #[serde(default = "default_remote_base_url")]
    pub base_url: String,
    /// Use this vector store directly.
    #[serde(default)]
    pub vector_store_id: Option<String>,
    /// Find (or create) a vector store by name when no id is given.
    #[serde(default)]
    pub vector_store_name: Option<String>,
    /// Environment variable holding the bearer token.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

fn default_remote_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExecutorConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_op_timeout_secs")]
    pub op_timeout_secs: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_attempts: default_max_attempts(),
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            op_timeout_secs: default_op_timeout_secs(),
        }
    }
}

fn default_concurrency() -> usize {
    8
}
fn default_max_attempts() -> u32 {
    5
}
fn default_base_backoff_ms() -> u64 {
    500
}
fn default_max_backoff_ms() -> u64 {
    8_000
}
fn default_op_timeout_secs() -> u64 {
    60
}

impl ExecutorConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_backoff_ms),
            max_delay: Duration::from_millis(self.max_backoff_ms),
            attempt_timeout: Duration::from_secs(self.op_timeout_secs),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SyncConfig {
    #[serde(default)]
    pub kind_change: KindChangePolicy,
}

impl Config {
    /// The remote section, required by commands that touch the vector store.
    pub fn remote(&self) -> Result<&RemoteConfig> {
        self.remote
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("[remote] section is required for this command"))
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    // Validate executor
    if config.executor.concurrency == 0 {
        bail!("executor.concurrency must be >= 1");
    }
    if config.executor.max_attempts == 0 {
        bail!("executor.max_attempts must be >= 1");
    }
    if config.executor.base_backoff_ms > config.executor.max_backoff_ms {
        bail!("executor.base_backoff_ms must not exceed executor.max_backoff_ms");
    }
    if config.executor.op_timeout_secs == 0 {
        bail!("executor.op_timeout_secs must be > 0");
    }

    // Validate source
    if let SourceConfig::HelpCenter(hc) = &config.source {
        if hc.base_url.trim().is_empty() {
            bail!("source.base_url must not be empty");
        }
        if hc.per_page == 0 {
            bail!("source.per_page must be > 0");
        }
        if hc.fetch_concurrency == 0 {
            bail!("source.fetch_concurrency must be >= 1");
        }
    }

    // Validate remote
    if let Some(remote) = &config.remote {
        if remote.vector_store_id.is_none() && remote.vector_store_name.is_none() {
            bail!("remote needs either vector_store_id or vector_store_name");
        }
    }

    Ok(config)
}
