//! Pipeline stages and review areas

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum StageError {
    #[error("Invalid stage '{0}': expected raw, cleaned or chunked")]
    InvalidStage(String),

    #[error("Invalid area '{0}': expected pending or approved")]
    InvalidArea(String),
}

/// Processing stage of a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Text as collected
    Raw,
    /// Text after cleanup
    Cleaned,
    /// RAG-ready chunks, one JSON record per chunk
    Chunked,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Raw, Stage::Cleaned, Stage::Chunked];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Raw => "raw",
            Stage::Cleaned => "cleaned",
            Stage::Chunked => "chunked",
        }
    }

    /// Returns true for stages stored as `{name}.txt` + `{name}.meta.json`
    pub fn is_document(&self) -> bool {
        !matches!(self, Stage::Chunked)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = StageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "raw" => Ok(Stage::Raw),
            "cleaned" => Ok(Stage::Cleaned),
            "chunked" | "chunk" | "chunks" => Ok(Stage::Chunked),
            _ => Err(StageError::InvalidStage(s.to_string())),
        }
    }
}

/// Review area a record lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Area {
    Pending,
    Approved,
}

impl Area {
    pub fn as_str(&self) -> &'static str {
        match self {
            Area::Pending => "pending",
            Area::Approved => "approved",
        }
    }
}

impl fmt::Display for Area {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Area {
    type Err = StageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Area::Pending),
            "approved" => Ok(Area::Approved),
            _ => Err(StageError::InvalidArea(s.to_string())),
        }
    }
}
