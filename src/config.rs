//! Configuration loader and validator for the repository sync job.
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub app: App,
    pub github: Github,
    pub branches: Branches,
    #[serde(default)]
    pub labels: Labels,
    #[serde(default)]
    pub issues: Issues,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    #[serde(default = "default_sync_interval_hours")]
    pub sync_interval_hours: u64,
    #[serde(default = "default_lock_at_most_seconds")]
    pub lock_at_most_seconds: u64,
    #[serde(default)]
    pub lock_at_least_seconds: u64,
}

/// GitHub GraphQL API settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Github {
    pub token: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    pub owner: String,
    pub repository: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Organization project (v2) number that carries points and priorities.
    #[serde(default)]
    pub project_number: Option<i64>,
}

/// Branch naming rules.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Branches {
    /// Protected branch names; the first entry is the canonical default branch.
    pub protected: Vec<String>,
    #[serde(default = "default_rename_pattern")]
    pub rename_pattern: String,
    #[serde(default = "default_rename_replacement")]
    pub rename_replacement: String,
}

/// Label highlight policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Labels {
    #[serde(default)]
    pub priority_colors: Vec<String>,
    #[serde(default)]
    pub excluded_colors: Vec<String>,
    #[serde(default = "default_max_highlights")]
    pub max_highlights: usize,
}

/// Issue tree settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Issues {
    #[serde(default = "default_points")]
    pub default_points: f64,
    #[serde(default = "default_epic_type")]
    pub epic_type: String,
}

impl Default for Labels {
    fn default() -> Self {
        Self {
            priority_colors: Vec::new(),
            excluded_colors: Vec::new(),
            max_highlights: default_max_highlights(),
        }
    }
}

impl Default for Issues {
    fn default() -> Self {
        Self {
            default_points: default_points(),
            epic_type: default_epic_type(),
        }
    }
}

/// One year.
pub const MAX_SYNC_INTERVAL_HOURS: u64 = 24 * 365;

fn default_sync_interval_hours() -> u64 {
    24
}

fn default_lock_at_most_seconds() -> u64 {
    3600
}

fn default_endpoint() -> String {
    "https://api.github.com/graphql".to_string()
}

fn default_page_size() -> u32 {
    100
}

fn default_rename_pattern() -> String {
    r"^release/(\d+\.\d+)$".to_string()
}

fn default_rename_replacement() -> String {
    "$1-release".to_string()
}

fn default_max_highlights() -> usize {
    15
}

fn default_points() -> f64 {
    3.0
}

fn default_epic_type() -> String {
    "Epic".to_string()
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(self.app.resolved_data_dir())
    }

    /// Canonical default branch name (first protected branch).
    pub fn default_branch(&self) -> &str {
        self.branches
            .protected
            .first()
            .map(String::as_str)
            .unwrap_or("master")
    }

    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL").unwrap_or_else(|_| {
            format!("sqlite://{}/release-radar.db", self.app.resolved_data_dir())
        })
    }
}

impl App {
    /// `data_dir` with a leading `~/` expanded to `$HOME`.
    pub fn resolved_data_dir(&self) -> String {
        match self.data_dir.strip_prefix("~/") {
            Some(rest) => match std::env::var("HOME") {
                Ok(home) => format!("{}/{}", home.trim_end_matches('/'), rest),
                Err(_) => self.data_dir.clone(),
            },
            None => self.data_dir.clone(),
        }
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_hours.saturating_mul(3600))
    }
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

/// Validate a configuration instance.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if !(1..=MAX_SYNC_INTERVAL_HOURS).contains(&cfg.app.sync_interval_hours) {
        return Err(ConfigError::Invalid(
            "app.sync_interval_hours must be within 1..=8760",
        ));
    }
    if cfg.app.lock_at_most_seconds == 0 {
        return Err(ConfigError::Invalid("app.lock_at_most_seconds must be > 0"));
    }
    if cfg.app.lock_at_least_seconds > cfg.app.lock_at_most_seconds {
        return Err(ConfigError::Invalid(
            "app.lock_at_least_seconds must not exceed app.lock_at_most_seconds",
        ));
    }

    if cfg.github.token.trim().is_empty() {
        return Err(ConfigError::Invalid("github.token must be non-empty"));
    }
    if cfg.github.endpoint.trim().is_empty() {
        return Err(ConfigError::Invalid("github.endpoint must be non-empty"));
    }
    if cfg.github.owner.trim().is_empty() {
        return Err(ConfigError::Invalid("github.owner must be non-empty"));
    }
    if cfg.github.repository.trim().is_empty() {
        return Err(ConfigError::Invalid("github.repository must be non-empty"));
    }
    if cfg.github.page_size == 0 || cfg.github.page_size > 100 {
        return Err(ConfigError::Invalid("github.page_size must be within 1..=100"));
    }

    if cfg.branches.protected.is_empty() {
        return Err(ConfigError::Invalid("branches.protected must list at least one branch"));
    }
    if cfg.branches.protected.iter().any(|b| b.trim().is_empty()) {
        return Err(ConfigError::Invalid("branches.protected entries must be non-empty"));
    }
    if Regex::new(&cfg.branches.rename_pattern).is_err() {
        return Err(ConfigError::Invalid("branches.rename_pattern must be a valid regex"));
    }

    if cfg.labels.max_highlights == 0 {
        return Err(ConfigError::Invalid("labels.max_highlights must be > 0"));
    }
    if cfg.issues.default_points < 0.0 || !cfg.issues.default_points.is_finite() {
        return Err(ConfigError::Invalid("issues.default_points must be a non-negative number"));
    }

    Ok(())
}

/// Returns the example YAML configuration.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  sync_interval_hours: 24
  lock_at_most_seconds: 3600
  lock_at_least_seconds: 60

github:
  token: "YOUR_GITHUB_TOKEN"
  endpoint: "https://api.github.com/graphql"
  owner: "acme"
  repository: "platform"
  page_size: 100
  project_number: 7

branches:
  protected:
    - master
    - main
  rename_pattern: '^release/(\d+\.\d+)$'
  rename_replacement: "$1-release"

labels:
  priority_colors:
    - "B60205"
    - "D93F0B"
  excluded_colors:
    - "EDEDED"
  max_highlights: 15

issues:
  default_points: 3.0
  epic_type: "Epic"
"#
}
