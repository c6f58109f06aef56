//! Staged items
//!
//! An [`Item`] is one unit of content at one stage: a raw or cleaned text
//! document, or a single chunk record. Items are plain values; reading and
//! writing them is the store's job.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use super::name::DocName;
use super::stage::Stage;

/// Open metadata mapping attached to every item
pub type Metadata = serde_json::Map<String, Value>;

/// Metadata key holding the "already published" timestamp
pub const PUBLISHED_KEY: &str = "published_at";

/// Chunk record key holding the chunk's position in its document
pub const CHUNK_INDEX_KEY: &str = "chunk_index";

#[derive(Debug, Error, PartialEq)]
pub enum ItemError {
    #[error("Chunk record in '{0}' has no integer chunk_index")]
    MissingOrdinal(String),

    #[error("Chunk record must be a JSON object")]
    NotAnObject,
}

/// One unit of staged content
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Item {
    pub stage: Stage,

    /// Source document name; equals `identifier` for raw and cleaned items
    pub group: String,

    /// Stable key within the group (`chunk_01` for chunks)
    pub identifier: String,

    /// Text content (raw and cleaned only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Chunk position (chunked only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ordinal: Option<u32>,

    /// Metadata without the published marker
    pub metadata: Metadata,

    /// Set once the item has been committed to the remote collection
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
}

impl Item {
    /// Creates a raw or cleaned document item
    pub fn document(
        stage: Stage,
        name: &DocName,
        content: impl Into<String>,
        mut metadata: Metadata,
    ) -> Self {
        let published_at = take_marker(&mut metadata);
        Self {
            stage,
            group: name.to_string(),
            identifier: name.to_string(),
            content: Some(content.into()),
            ordinal: None,
            metadata,
            published_at,
        }
    }

    /// Creates a chunk item from its JSON record
    pub fn chunk(group: &DocName, mut record: Metadata) -> Result<Self, ItemError> {
        let ordinal = record
            .get(CHUNK_INDEX_KEY)
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| ItemError::MissingOrdinal(group.to_string()))?;
        let published_at = take_marker(&mut record);

        Ok(Self {
            stage: Stage::Chunked,
            group: group.to_string(),
            identifier: chunk_identifier(ordinal),
            content: None,
            ordinal: Some(ordinal),
            metadata: record,
            published_at,
        })
    }

    /// Creates a chunk item from an arbitrary JSON value
    pub fn chunk_from_value(group: &DocName, value: Value) -> Result<Self, ItemError> {
        match value {
            Value::Object(record) => Self::chunk(group, record),
            _ => Err(ItemError::NotAnObject),
        }
    }

    /// Returns true if the item has already been sent to the remote collection
    ///
    /// A marker that is present but not a timestamp (left by older tooling)
    /// stays in `metadata` and still counts.
    pub fn is_published(&self) -> bool {
        self.published_at.is_some()
            || self
                .metadata
                .get(PUBLISHED_KEY)
                .is_some_and(|v| !matches!(v, Value::Null | Value::Bool(false)))
    }

    /// Sets the published marker. Never overwrites an existing marker.
    pub fn mark_published(&mut self, at: DateTime<Utc>) -> bool {
        if self.is_published() {
            return false;
        }
        self.published_at = Some(at);
        true
    }

    /// Key used in reports: `identifier` for documents, `group/identifier` for chunks
    pub fn key(&self) -> String {
        if self.stage.is_document() {
            self.identifier.clone()
        } else {
            format!("{}/{}", self.group, self.identifier)
        }
    }

    /// Metadata as persisted, including the published marker
    pub fn record(&self) -> Metadata {
        let mut record = self.metadata.clone();
        if let Some(at) = self.published_at {
            record.insert(
                PUBLISHED_KEY.to_string(),
                Value::String(format_timestamp(at)),
            );
        }
        record
    }
}

/// File stem of a chunk record
pub fn chunk_identifier(ordinal: u32) -> String {
    format!("chunk_{:02}", ordinal)
}

/// RFC 3339 with a `Z` suffix, the format written into every timestamp field
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn take_marker(metadata: &mut Metadata) -> Option<DateTime<Utc>> {
    let parsed = metadata
        .get(PUBLISHED_KEY)
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))?;
    metadata.remove(PUBLISHED_KEY);
    Some(parsed)
}
