//! Configuration loader and validator for the Notion cache tools.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::freshness::FreshnessPolicy;
use crate::retry::RetryPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub app: App,
    pub notion: Notion,
    pub fetch: Fetch,
    pub query: Query,
}

/// Cache location and freshness window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct App {
    pub cache_path: String,
    pub max_age_minutes: u64,
}

impl Default for App {
    fn default() -> Self {
        Self {
            cache_path: "~/.claude/MEMORY/STATE/notion-cache.json".into(),
            max_age_minutes: 60,
        }
    }
}

/// Notion API settings and the pinned databases synced on every run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Notion {
    pub token: String,
    pub version: String,
    pub base_url: String,
    /// Database key -> remote database id.
    pub databases: BTreeMap<String, String>,
}

impl Default for Notion {
    fn default() -> Self {
        Self {
            token: String::new(),
            version: "2022-06-28".into(),
            base_url: "https://api.notion.com/".into(),
            databases: BTreeMap::new(),
        }
    }
}

/// Pagination bounds and transport retry settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Fetch {
    pub page_size: u32,
    pub max_pages_per_db: usize,
    pub retry_delay_ms: u64,
    pub max_attempts: u32,
}

impl Default for Fetch {
    fn default() -> Self {
        Self {
            page_size: 100,
            max_pages_per_db: 500,
            retry_delay_ms: 2000,
            max_attempts: 2,
        }
    }
}

/// Read-side display settings and the heuristic vocabularies used to guess
/// status, due date and task-like databases.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Query {
    pub display_limit: usize,
    /// Databases with fewer records than this are shown unfiltered.
    pub filter_threshold: usize,
    pub done_statuses: Vec<String>,
    pub status_properties: Vec<String>,
    pub status_values: Vec<String>,
    pub due_date_properties: Vec<String>,
    pub task_markers: Vec<String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for Query {
    fn default() -> Self {
        Self {
            display_limit: 20,
            filter_threshold: 5,
            done_statuses: strings(&["done", "archived", "completed"]),
            status_properties: strings(&["status", "state"]),
            status_values: strings(&[
                "todo",
                "in progress",
                "done",
                "not started",
                "blocked",
                "completed",
                "archived",
                "active",
                "planning",
                "on hold",
                "cancelled",
            ]),
            due_date_properties: strings(&["due", "due date", "deadline", "date"]),
            task_markers: strings(&["task", "todo", "to-do", "to do"]),
        }
    }
}

impl Config {
    /// Cache path with a leading `~/` expanded against `HOME`.
    pub fn resolved_cache_path(&self) -> PathBuf {
        expand_home(&self.app.cache_path)
    }

    pub fn freshness(&self) -> FreshnessPolicy {
        FreshnessPolicy::from_minutes(self.app.max_age_minutes)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.fetch.max_attempts,
            Duration::from_millis(self.fetch.retry_delay_ms),
        )
    }

    /// The sync role cannot run without credentials; the read role never needs them.
    pub fn require_token(&self) -> Result<(), ConfigError> {
        if self.notion.token.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "notion.token must be non-empty (or set NOTION_TOKEN)",
            ));
        }
        Ok(())
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return Path::new(home.trim_end_matches('/')).join(rest);
        }
    }
    PathBuf::from(path)
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Like [`load`], but a missing file yields the default configuration.
pub fn load_or_default(path: Option<&Path>) -> Result<Config, ConfigError> {
    match load(path) {
        Err(ConfigError::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
            Ok(Config::default())
        }
        other => other,
    }
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.cache_path.trim().is_empty() {
        return Err(ConfigError::Invalid("app.cache_path must be non-empty"));
    }

    if cfg.notion.version.trim().is_empty() {
        return Err(ConfigError::Invalid("notion.version must be non-empty"));
    }
    if reqwest::Url::parse(&cfg.notion.base_url).is_err() {
        return Err(ConfigError::Invalid("notion.base_url must be a valid URL"));
    }
    for (key, id) in &cfg.notion.databases {
        if key.trim().is_empty() || id.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "notion.databases entries need a non-empty key and id",
            ));
        }
    }

    if cfg.fetch.page_size == 0 || cfg.fetch.page_size > 100 {
        return Err(ConfigError::Invalid("fetch.page_size must be within 1..=100"));
    }
    if cfg.fetch.max_pages_per_db == 0 {
        return Err(ConfigError::Invalid("fetch.max_pages_per_db must be > 0"));
    }
    if cfg.fetch.max_attempts == 0 {
        return Err(ConfigError::Invalid("fetch.max_attempts must be >= 1"));
    }

    if cfg.query.display_limit == 0 {
        return Err(ConfigError::Invalid("query.display_limit must be > 0"));
    }

    Ok(())
}

/// Returns the example YAML content.
pub fn example() -> &'static str {
    r#"app:
  cache_path: "~/.claude/MEMORY/STATE/notion-cache.json"
  max_age_minutes: 60

notion:
  token: "YOUR_NOTION_INTEGRATION_TOKEN"
  version: "2022-06-28"
  databases:
    tasks: "231f11fc665580e88f51d9ba5b7293b5"
    projects: "231f11fc66558096bf4ed377065f61d8"

fetch:
  page_size: 100
  max_pages_per_db: 500
  retry_delay_ms: 2000
  max_attempts: 2

query:
  display_limit: 20
  filter_threshold: 5
  done_statuses: ["done", "archived", "completed"]
  due_date_properties: ["due", "due date", "deadline", "date"]
  task_markers: ["task", "todo", "to-do", "to do"]
"#
}
