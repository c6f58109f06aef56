//! HTTP hub client
//!
//! Posts commits as NDJSON to `{endpoint}/api/{repo_type}s/{repo}/commit/{revision}`.
//! The first line is the commit header, followed by one line per file with
//! base64 content.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;
use tracing::debug;
use url::Url;

use super::hub::{Commit, HubClient, HubError};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// [`HubClient`] speaking the hub's HTTP commit API
pub struct HttpHub {
    agent: ureq::Agent,
    endpoint: Url,
    repo_type: String,
    revision: String,
    token: String,
}

#[derive(Serialize)]
#[serde(tag = "key", content = "value", rename_all = "snake_case")]
enum CommitLine<'a> {
    Header { summary: &'a str, description: &'a str },
    File {
        content: String,
        path: &'a str,
        encoding: &'static str,
    },
}

impl HttpHub {
    /// Fails with `MissingCredential` if the token is empty
    pub fn new(endpoint: &str, token: impl Into<String>) -> Result<Self, HubError> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(HubError::MissingCredential);
        }
        let endpoint = normalize_endpoint(endpoint)?;
        let agent = ureq::AgentBuilder::new().timeout(DEFAULT_TIMEOUT).build();

        Ok(Self {
            agent,
            endpoint,
            repo_type: "dataset".to_string(),
            revision: "main".to_string(),
            token: token.trim().to_string(),
        })
    }

    pub fn with_repo_type(mut self, repo_type: impl Into<String>) -> Self {
        self.repo_type = repo_type.into();
        self
    }

    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = revision.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = ureq::AgentBuilder::new().timeout(timeout).build();
        self
    }

    fn commit_url(&self, repo: &str) -> Result<Url, HubError> {
        let mut url = self.endpoint.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| HubError::InvalidEndpoint(self.endpoint.to_string()))?;
            path.pop_if_empty();
            path.push("api");
            path.push(&format!("{}s", self.repo_type));
            for segment in repo.split('/').filter(|s| !s.is_empty()) {
                path.push(segment);
            }
            path.push("commit");
            path.push(&self.revision);
        }
        Ok(url)
    }
}

impl HubClient for HttpHub {
    fn create_commit(&self, commit: &Commit) -> Result<(), HubError> {
        let url = self.commit_url(&commit.repo)?;
        let body = commit_body(commit)?;
        debug!(url = %url, files = commit.files.len(), "Posting commit");

        let response = self
            .agent
            .request("POST", url.as_str())
            .set("Authorization", &format!("Bearer {}", self.token))
            .set("Content-Type", "application/x-ndjson")
            .send_string(&body);

        match response {
            Ok(_) => Ok(()),
            Err(ureq::Error::Status(code, resp)) => {
                let message = resp.into_string().unwrap_or_default();
                Err(HubError::from_status(code, error_message(&message)))
            }
            Err(ureq::Error::Transport(err)) => Err(HubError::Transport(err.to_string())),
        }
    }
}

fn normalize_endpoint(raw: &str) -> Result<Url, HubError> {
    let mut url =
        Url::parse(raw.trim()).map_err(|_| HubError::InvalidEndpoint(raw.to_string()))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(HubError::InvalidEndpoint(raw.to_string()));
    }
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

fn commit_body(commit: &Commit) -> Result<String, HubError> {
    let mut lines = Vec::with_capacity(commit.files.len() + 1);
    lines.push(CommitLine::Header {
        summary: &commit.message,
        description: "",
    });
    for file in &commit.files {
        lines.push(CommitLine::File {
            content: STANDARD.encode(&file.content),
            path: &file.path,
            encoding: "base64",
        });
    }

    let mut body = String::new();
    for line in &lines {
        let encoded = serde_json::to_string(line)
            .map_err(|e| HubError::Rejected {
                status: 0,
                message: format!("failed to encode commit: {}", e),
            })?;
        body.push_str(&encoded);
        body.push('\n');
    }
    Ok(body)
}

/// Pulls `error` out of a JSON error body, falling back to the raw text
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}
