//! Configuration management with YAML support

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Comma-separated import paths appended to `imports`
pub const IMPORT_PATHS_ENV: &str = "CONVOS_IMPORT_PATHS";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub state: StateConfig,

    /// Keyed by source name: `claude-code`, `codex`, `chatgpt`, `claude`
    #[serde(default)]
    pub sources: HashMap<String, SourceConfig>,

    /// Ad-hoc export files or glob patterns, in order
    #[serde(default)]
    pub imports: Vec<String>,

    #[serde(default)]
    pub credentials: CredentialsConfig,

    #[serde(default)]
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateConfig {
    /// Watermark document; defaults to `sync_state.json` beside the database
    #[serde(default)]
    pub path: Option<String>,
}

/// Individual source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub status: Option<String>, // 'active', 'frozen', 'deprecated'

    #[serde(default)]
    pub base_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialsConfig {
    /// Browser profiles tried in order
    #[serde(default = "default_profiles")]
    pub profiles: Vec<String>,

    #[serde(default = "default_cookie_file")]
    pub cookie_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_workers")]
    pub max_jobs: usize,

    #[serde(default = "default_workers")]
    pub detail_workers: usize,

    #[serde(default = "default_page_size")]
    pub page_size: usize,

    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    #[serde(default = "default_http_retries")]
    pub http_retries: u32,

    #[serde(default = "default_interval")]
    pub interval_secs: u64,
}

// Default value functions
fn default_database_path() -> String {
    "~/.local/share/convos/convos.db".to_string()
}

fn default_enabled() -> bool {
    true
}

fn default_profiles() -> Vec<String> {
    vec!["safari".to_string(), "chrome".to_string()]
}

fn default_cookie_file() -> String {
    "~/.config/convos/cookies.yaml".to_string()
}

fn default_workers() -> usize {
    4
}

fn default_page_size() -> usize {
    100
}

fn default_http_timeout() -> u64 {
    30
}

fn default_http_retries() -> u32 {
    2
}

fn default_interval() -> u64 {
    300
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            profiles: default_profiles(),
            cookie_file: default_cookie_file(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_jobs: default_workers(),
            detail_workers: default_workers(),
            page_size: default_page_size(),
            http_timeout_secs: default_http_timeout(),
            http_retries: default_http_retries(),
            interval_secs: default_interval(),
        }
    }
}

impl SyncConfig {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).to_string())
}

impl Config {
    /// Load configuration from a YAML file
    /// Searches in order:
    /// 1. Provided path
    /// 2. ./convos.yaml (current directory)
    /// 3. ~/.config/convos/convos.yaml
    pub fn load(path: &str) -> Result<Self> {
        let search_paths = vec![
            shellexpand::tilde(path).to_string(),
            "convos.yaml".to_string(),
            shellexpand::tilde("~/.config/convos/convos.yaml").to_string(),
        ];

        for search_path in &search_paths {
            if std::path::Path::new(search_path).exists() {
                let content = std::fs::read_to_string(search_path)
                    .with_context(|| format!("reading {}", search_path))?;
                let config: Config =
                    serde_yaml::from_str(&content).with_context(|| format!("parsing {}", search_path))?;
                return Ok(config);
            }
        }

        // No config file found, use defaults
        Ok(Config::default())
    }

    /// Get the database path, expanding ~ to home directory
    pub fn database_path(&self) -> PathBuf {
        expand(&self.database.path)
    }

    pub fn state_path(&self) -> PathBuf {
        match &self.state.path {
            Some(p) => expand(p),
            None => self.database_path().with_file_name("sync_state.json"),
        }
    }

    pub fn cookie_file(&self) -> PathBuf {
        expand(&self.credentials.cookie_file)
    }

    /// Check if a source is enabled
    /// Returns false if:
    /// - Source is explicitly disabled
    /// - Source status is 'frozen' or 'deprecated'
    pub fn is_source_enabled(&self, name: &str) -> bool {
        self.sources.get(name).map_or(true, |s| {
            if !s.enabled {
                return false;
            }
            !matches!(s.status.as_deref(), Some("frozen") | Some("deprecated"))
        })
    }

    /// Root directory of a local session source, if configured
    pub fn source_path(&self, name: &str) -> Option<PathBuf> {
        self.sources
            .get(name)
            .and_then(|s| s.base_path.as_deref())
            .map(expand)
    }

    /// Configured imports followed by those from the environment
    pub fn import_patterns(&self) -> Vec<String> {
        let from_env = std::env::var(IMPORT_PATHS_ENV).unwrap_or_default();
        merge_imports(&self.imports, &from_env)
    }
}

fn merge_imports(configured: &[String], from_env: &str) -> Vec<String> {
    let mut patterns: Vec<String> = configured.to_vec();
    for p in from_env.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        if !patterns.iter().any(|existing| existing == p) {
            patterns.push(p.to_string());
        }
    }
    patterns
}
