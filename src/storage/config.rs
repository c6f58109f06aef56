//! Configuration handling for stagehub
//!
//! Configuration is stored in `.stagehub/config.toml` (project) and
//! `~/.config/stagehub/config.toml` (global). Credentials are never read
//! here; the CLI passes them explicitly.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::Stage;
use crate::publish::{PublishOptions, RetryPolicy};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

/// Remote dataset hub settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HubConfig {
    /// Base URL of the hub
    pub endpoint: String,

    /// Repository type segment in commit URLs (`dataset`, `model`, ...)
    pub repo_type: String,

    /// Branch the commits land on
    pub revision: String,

    /// Destination repository for raw text
    pub raw_repo: String,

    /// Destination repository for cleaned text
    pub cleaned_repo: String,

    /// Destination repository for chunk records
    pub chunked_repo: String,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://huggingface.co".to_string(),
            repo_type: "dataset".to_string(),
            revision: "main".to_string(),
            raw_repo: String::new(),
            cleaned_repo: String::new(),
            chunked_repo: String::new(),
        }
    }
}

impl HubConfig {
    /// Returns the configured destination for a stage, if any
    pub fn repo_for(&self, stage: Stage) -> Option<&str> {
        let repo = match stage {
            Stage::Raw => &self.raw_repo,
            Stage::Cleaned => &self.cleaned_repo,
            Stage::Chunked => &self.chunked_repo,
        };
        let repo = repo.trim();
        (!repo.is_empty()).then_some(repo)
    }
}

/// Batch publishing settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PublishConfig {
    /// Items per commit
    pub batch_size: usize,

    /// Commit attempts per batch
    pub max_retries: u32,

    /// Backoff unit; the wait after attempt `n` is `backoff_base_ms * 2^n`
    pub backoff_base_ms: u64,

    /// Which errors are retried
    pub retry: RetryPolicy,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            max_retries: 3,
            backoff_base_ms: 1000,
            retry: RetryPolicy::All,
        }
    }
}

impl PublishConfig {
    /// Validates the settings and converts them into publisher options
    pub fn to_options(&self) -> Result<PublishOptions, ConfigError> {
        PublishOptions::new(self.batch_size, self.max_retries)
            .map(|options| {
                options
                    .with_backoff_base(Duration::from_millis(self.backoff_base_ms))
                    .with_retry_policy(self.retry)
            })
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

/// Project-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProjectConfig {
    /// Name recorded in `approved_by` / `updated_by`
    pub reviewer: String,

    /// Hub settings
    pub hub: HubConfig,

    /// Publishing settings
    pub publish: PublishConfig,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            reviewer: "admin".to_string(),
            hub: HubConfig::default(),
            publish: PublishConfig::default(),
        }
    }
}

/// Global user configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GlobalConfig {
    /// Default output format (text or json)
    pub default_format: OutputFormat,
}

/// Output format for commands
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Combined configuration (global + project)
#[derive(Debug, Clone)]
pub struct Config {
    pub project: ProjectConfig,
    pub global: GlobalConfig,
    pub project_root: Option<PathBuf>,
}

impl Config {
    /// Loads configuration for a specific project
    pub fn for_project(project_root: &Path) -> Result<Self> {
        let global = Self::load_global()?;
        let project = Self::load_project_config(project_root)?;

        Ok(Self {
            project,
            global,
            project_root: Some(project_root.to_path_buf()),
        })
    }

    /// Returns the global config directory
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("dev", "stagehub", "stagehub")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Loads global configuration
    pub fn load_global() -> Result<GlobalConfig> {
        let config_dir = match Self::global_config_dir() {
            Some(dir) => dir,
            None => return Ok(GlobalConfig::default()),
        };

        let config_path = config_dir.join("config.toml");
        if !config_path.exists() {
            return Ok(GlobalConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read global config: {}", config_path.display()))?;

        toml::from_str(&content)
            .map_err(|e| ConfigError::Parse(e.to_string()))
            .context("Failed to parse global config")
    }

    /// Loads project configuration from a specific root
    fn load_project_config(project_root: &Path) -> Result<ProjectConfig> {
        let config_path = project_root.join(".stagehub").join("config.toml");

        if !config_path.exists() {
            return Ok(ProjectConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read project config: {}", config_path.display()))?;

        toml::from_str(&content)
            .map_err(|e| ConfigError::Parse(e.to_string()))
            .context("Failed to parse project config")
    }

    /// Finds the project root by looking for `.stagehub/` directory
    pub fn find_project_root() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;
        Self::find_project_root_from(&current)
    }

    /// Finds the project root starting from a given directory
    pub fn find_project_root_from(start: &Path) -> Option<PathBuf> {
        let mut current = start.to_path_buf();

        loop {
            if current.join(".stagehub").is_dir() {
                return Some(current);
            }

            if !current.pop() {
                return None;
            }
        }
    }

    /// Returns true if we're in a stagehub project
    pub fn is_in_project(&self) -> bool {
        self.project_root.is_some()
    }

    /// Returns the project root, or an error if not in a project
    pub fn require_project_root(&self) -> Result<&Path> {
        self.project_root
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("Not in a stagehub project. Run 'stagehub init' first."))
    }

    /// Saves the project configuration
    pub fn save_project(&self) -> Result<()> {
        let root = self.require_project_root()?;
        let config_path = root.join(".stagehub").join("config.toml");

        let content =
            toml::to_string_pretty(&self.project).context("Failed to serialize project config")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write project config: {}", config_path.display()))
    }
}
