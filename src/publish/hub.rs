//! Remote hub contract
//!
//! A [`HubClient`] applies one multi-file [`Commit`] atomically: either every
//! file lands in the destination repository or none does.

use thiserror::Error;

/// One file added by a commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitFile {
    /// Path inside the destination repository
    pub path: String,
    pub content: Vec<u8>,
}

impl CommitFile {
    pub fn new(path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// An atomic multi-file commit to one repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    /// Destination repository, e.g. `org/dataset`
    pub repo: String,
    pub message: String,
    pub files: Vec<CommitFile>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HubError {
    #[error("No hub credential provided (pass --token or set HF_TOKEN)")]
    MissingCredential,

    #[error("Invalid hub endpoint '{0}'")]
    InvalidEndpoint(String),

    #[error("Rate limited by hub: {0}")]
    RateLimited(String),

    #[error("Hub refused credential ({status}): {message}")]
    Unauthorized { status: u16, message: String },

    #[error("Repository not found: {0}")]
    NotFound(String),

    #[error("Hub server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Hub rejected commit ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),
}

impl HubError {
    /// Maps an HTTP status and response body to an error
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            429 => HubError::RateLimited(message),
            401 | 403 => HubError::Unauthorized { status, message },
            404 => HubError::NotFound(message),
            500..=599 => HubError::Server { status, message },
            _ => HubError::Rejected { status, message },
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, HubError::RateLimited(_))
    }

    /// True for errors that may succeed if the same commit is sent again
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            HubError::RateLimited(_) | HubError::Server { .. } | HubError::Transport(_)
        )
    }
}

/// Applies commits to a remote dataset hub
pub trait HubClient {
    fn create_commit(&self, commit: &Commit) -> Result<(), HubError>;
}

impl<T: HubClient + ?Sized> HubClient for &T {
    fn create_commit(&self, commit: &Commit) -> Result<(), HubError> {
        (**self).create_commit(commit)
    }
}

impl<T: HubClient + ?Sized> HubClient for Box<T> {
    fn create_commit(&self, commit: &Commit) -> Result<(), HubError> {
        (**self).create_commit(commit)
    }
}
