//! Project management
//!
//! Handles project initialization and provides access to the staged store.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use thiserror::Error;

use super::{Config, StagedStore};

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("Not in a stagehub project. Run 'stagehub init' first.")]
    NotInProject,
}

/// A stagehub project
pub struct Project {
    root: PathBuf,
    config: Config,
}

impl Project {
    /// Opens an existing project at the given path
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let stagehub_dir = root.join(".stagehub");

        if !stagehub_dir.is_dir() {
            return Err(ProjectError::NotInProject.into());
        }

        let config = Config::for_project(&root)?;

        Ok(Self { root, config })
    }

    /// Opens the project at the current directory or a parent
    pub fn open_current() -> Result<Self> {
        let root = Config::find_project_root().ok_or(ProjectError::NotInProject)?;

        Self::open(root)
    }

    /// Opens the project containing `start`, or the current directory when `None`
    pub fn discover(start: Option<&Path>) -> Result<Self> {
        match start {
            Some(path) => {
                let root = Config::find_project_root_from(path).ok_or(ProjectError::NotInProject)?;
                Self::open(root)
            }
            None => Self::open_current(),
        }
    }

    /// Initializes a new project at the given path
    pub fn init(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let stagehub_dir = root.join(".stagehub");

        fs::create_dir_all(&stagehub_dir).with_context(|| {
            format!(
                "Failed to create .stagehub directory: {}",
                stagehub_dir.display()
            )
        })?;

        StagedStore::for_project(&root).ensure_layout()?;

        let config_path = stagehub_dir.join("config.toml");
        if !config_path.exists() {
            let default_config = r#"# stagehub configuration

# Name recorded in approved_by / updated_by
reviewer = "admin"

[hub]
endpoint = "https://huggingface.co"
repo_type = "dataset"
revision = "main"
raw_repo = ""
cleaned_repo = ""
chunked_repo = ""

[publish]
# Items per commit
batch_size = 50
# Commit attempts per batch
max_retries = 3
# Wait after attempt n is backoff_base_ms * 2^n
backoff_base_ms = 1000
# "all" retries every error, "transient_only" fails fast on not-found/permission errors
retry = "all"
"#;
            fs::write(&config_path, default_config)
                .with_context(|| format!("Failed to write config: {}", config_path.display()))?;
        }

        let gitignore_path = stagehub_dir.join(".gitignore");
        if !gitignore_path.exists() {
            let gitignore = r#"# Lock file is recreated on demand
store.lock

# Interrupted writes
*.tmp
"#;
            fs::write(&gitignore_path, gitignore).with_context(|| {
                format!("Failed to write .gitignore: {}", gitignore_path.display())
            })?;
        }

        Self::open(root)
    }

    /// Returns the project root path
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the .stagehub directory path
    pub fn stagehub_dir(&self) -> PathBuf {
        self.root.join(".stagehub")
    }

    /// Returns the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the staged store, stamping edits with the configured reviewer
    pub fn store(&self) -> StagedStore {
        StagedStore::for_project(&self.root).with_reviewer(self.config.project.reviewer.clone())
    }
}
