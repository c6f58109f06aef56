//! Submission commands

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use serde_json::Value;

use super::output::Output;
use super::{open_project, parse_key_value, read_input};
use crate::domain::{DocName, Item, Metadata, Stage};

#[derive(Subcommand)]
pub enum SubmitCommands {
    /// Submit raw text for review
    Raw {
        /// Document name
        name: DocName,

        /// Text file (`-` for stdin)
        file: PathBuf,

        /// Metadata entry (repeatable)
        #[arg(long = "meta", value_name = "KEY=VALUE", value_parser = parse_key_value)]
        meta: Vec<(String, Value)>,
    },

    /// Submit cleaned text for review
    Cleaned {
        /// Document name
        name: DocName,

        /// Text file (`-` for stdin)
        file: PathBuf,

        /// Metadata entry (repeatable)
        #[arg(long = "meta", value_name = "KEY=VALUE", value_parser = parse_key_value)]
        meta: Vec<(String, Value)>,
    },

    /// Submit chunk records for review
    ///
    /// The file holds one JSON object with an integer `chunk_index`, or an
    /// array of such objects.
    Chunk {
        /// Source document name
        group: DocName,

        /// JSON file (`-` for stdin)
        file: PathBuf,
    },
}

pub fn run(cmd: SubmitCommands, output: &Output, root: Option<&Path>) -> Result<()> {
    match cmd {
        SubmitCommands::Raw { name, file, meta } => {
            submit_document(output, root, Stage::Raw, &name, &file, meta)
        }
        SubmitCommands::Cleaned { name, file, meta } => {
            submit_document(output, root, Stage::Cleaned, &name, &file, meta)
        }
        SubmitCommands::Chunk { group, file } => submit_chunks(output, root, &group, &file),
    }
}

fn submit_document(
    output: &Output,
    root: Option<&Path>,
    stage: Stage,
    name: &DocName,
    file: &Path,
    meta: Vec<(String, Value)>,
) -> Result<()> {
    let project = open_project(root)?;
    let content = read_input(file)?;
    let metadata: Metadata = meta.into_iter().collect();

    let item = project
        .store()
        .submit_document(stage, name, &content, metadata)?;

    if output.is_json() {
        output.data(&item);
    } else {
        output.success(&format!("Submitted {} file: {}", stage, item.identifier));
    }
    Ok(())
}

fn submit_chunks(output: &Output, root: Option<&Path>, group: &DocName, file: &Path) -> Result<()> {
    let project = open_project(root)?;
    let raw = read_input(file)?;
    let value: Value = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid JSON in {}", file.display()))?;

    let records = match value {
        Value::Object(record) => vec![record],
        Value::Array(values) => values
            .into_iter()
            .map(|v| match v {
                Value::Object(record) => Ok(record),
                _ => bail!("Every chunk record must be a JSON object"),
            })
            .collect::<Result<Vec<_>>>()?,
        _ => bail!("Chunk file must hold a JSON object or an array of objects"),
    };

    let store = project.store();
    let mut submitted: Vec<Item> = Vec::with_capacity(records.len());
    for record in records {
        submitted.push(store.submit_chunk(group, record)?);
    }

    if output.is_json() {
        output.data(&submitted);
    } else {
        let ids: Vec<&str> = submitted.iter().map(|i| i.identifier.as_str()).collect();
        output.success(&format!(
            "Submitted {} chunk(s) for {}: {}",
            submitted.len(),
            group,
            ids.join(", ")
        ));
    }
    Ok(())
}
