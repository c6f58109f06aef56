//! Remote file layout and commit messages

use thiserror::Error;

use crate::domain::{chunk_identifier, Item, Metadata, Stage};

use super::hub::CommitFile;

#[derive(Debug, Error, PartialEq)]
pub enum RenderError {
    #[error("'{0}' has no text content")]
    MissingContent(String),

    #[error("'{0}' has no chunk index")]
    MissingOrdinal(String),

    #[error("Failed to encode '{0}': {1}")]
    Encode(String, String),
}

/// Files written to the remote collection for one item
///
/// - raw: `{id}.txt` and `{id}.meta.json`
/// - cleaned: `{id}.txt`
/// - chunked: `{group}/chunk_{NN}.json`
pub fn remote_files(item: &Item) -> Result<Vec<CommitFile>, RenderError> {
    match item.stage {
        Stage::Raw | Stage::Cleaned => {
            let content = item
                .content
                .as_deref()
                .ok_or_else(|| RenderError::MissingContent(item.key()))?;
            let mut files = vec![CommitFile::new(
                format!("{}.txt", item.identifier),
                content.as_bytes(),
            )];
            if item.stage == Stage::Raw {
                files.push(CommitFile::new(
                    format!("{}.meta.json", item.identifier),
                    pretty_json(item, &item.metadata)?,
                ));
            }
            Ok(files)
        }
        Stage::Chunked => {
            let ordinal = item
                .ordinal
                .ok_or_else(|| RenderError::MissingOrdinal(item.key()))?;
            Ok(vec![CommitFile::new(
                format!("{}/{}.json", item.group, chunk_identifier(ordinal)),
                pretty_json(item, &item.metadata)?,
            )])
        }
    }
}

/// Commit message for one batch
///
/// `first` is the 1-based position of the batch's first item.
pub fn commit_message(stage: Stage, group: &str, first: usize, batch: &[&Item]) -> String {
    match (stage, batch) {
        (Stage::Chunked, _) => format!(
            "Add chunks {}-{} for {}",
            first,
            first + batch.len().saturating_sub(1),
            group
        ),
        (Stage::Raw, [item]) => format!("Add raw file: {}", item.identifier),
        (Stage::Cleaned, [item]) => format!("Add cleaned file: {}", item.identifier),
        _ => format!("Add {} {} files for {}", batch.len(), stage, group),
    }
}

fn pretty_json(item: &Item, value: &Metadata) -> Result<Vec<u8>, RenderError> {
    serde_json::to_vec_pretty(value).map_err(|e| RenderError::Encode(item.key(), e.to_string()))
}
