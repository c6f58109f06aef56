//! Review commands: inspect, edit, approve and reject pending content

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde_json::Value;

use super::output::Output;
use super::{open_project, read_input};
use crate::domain::{Area, DocName, Item, Metadata, Stage};
use crate::storage::ItemUpdate;

/// Lists everything waiting for review
pub fn pending(output: &Output, root: Option<&Path>) -> Result<()> {
    let project = open_project(root)?;
    let overview = project.store().pending_overview()?;

    if output.is_json() {
        output.data(&serde_json::json!({
            "raw": overview.raw,
            "cleaned": overview.cleaned,
            "chunked": overview.chunked,
            "total": overview.total(),
        }));
        return Ok(());
    }

    if overview.total() == 0 {
        println!("Nothing pending.");
        return Ok(());
    }

    for (stage, items) in [("raw", &overview.raw), ("cleaned", &overview.cleaned)] {
        if items.is_empty() {
            continue;
        }
        println!("{} ({}):", stage, items.len());
        for item in items {
            let submitted = item
                .metadata
                .get("submitted_at")
                .and_then(Value::as_str)
                .unwrap_or("-");
            output.row(&["  ", &item.identifier, submitted]);
        }
        output.blank();
    }

    if !overview.chunked.is_empty() {
        println!("chunked ({}):", overview.chunk_count());
        for (group, chunks) in &overview.chunked {
            let ids: Vec<&str> = chunks.iter().map(|c| c.identifier.as_str()).collect();
            output.row(&["  ", group, &ids.join(", ")]);
        }
        output.blank();
    }

    println!("{} item(s) pending", overview.total());
    Ok(())
}

/// Shows one item
pub fn show(
    output: &Output,
    root: Option<&Path>,
    stage: Stage,
    name: &DocName,
    chunk: Option<u32>,
    approved: bool,
) -> Result<()> {
    let project = open_project(root)?;
    let area = if approved { Area::Approved } else { Area::Pending };
    let item = project.store().get(area, stage, name, chunk_for(stage, chunk)?)?;

    if output.is_json() {
        output.data(&item);
    } else {
        print_item(&item, area);
    }
    Ok(())
}

/// Edits a pending item
#[allow(clippy::too_many_arguments)]
pub fn update(
    output: &Output,
    root: Option<&Path>,
    stage: Stage,
    name: &DocName,
    chunk: Option<u32>,
    content: Option<&Path>,
    record: Option<&Path>,
    set: Vec<(String, Value)>,
) -> Result<()> {
    if content.is_none() && record.is_none() && set.is_empty() {
        bail!("Nothing to update: pass --content, --record or --set");
    }
    if content.is_some() && !stage.is_document() {
        bail!("--content applies to raw and cleaned files; use --record for chunks");
    }
    if record.is_some() && stage.is_document() {
        bail!("--record applies to chunks; use --content or --set for {} files", stage);
    }

    let project = open_project(root)?;
    let update = ItemUpdate {
        content: content.map(read_input).transpose()?,
        metadata: (!set.is_empty()).then(|| set.into_iter().collect::<Metadata>()),
        record: record.map(read_record).transpose()?,
    };

    let item = project
        .store()
        .update_pending(stage, name, chunk_for(stage, chunk)?, update)?;

    if output.is_json() {
        output.data(&item);
    } else {
        output.success(&format!("Updated {} {}", stage, item.key()));
    }
    Ok(())
}

/// Approves one pending item
pub fn approve(
    output: &Output,
    root: Option<&Path>,
    stage: Stage,
    name: &DocName,
    chunk: Option<u32>,
) -> Result<()> {
    let project = open_project(root)?;
    let item = project
        .store()
        .approve(stage, name, chunk_for(stage, chunk)?)?;

    if output.is_json() {
        output.data(&item);
    } else {
        output.success(&format!("Approved {} {}", stage, item.key()));
    }
    Ok(())
}

/// Approves every pending item of a stage (chunks: of one group)
pub fn approve_all(
    output: &Output,
    root: Option<&Path>,
    stage: Stage,
    group: Option<&DocName>,
) -> Result<()> {
    let project = open_project(root)?;
    let count = project.store().approve_all(stage, group)?;

    if output.is_json() {
        output.data(&serde_json::json!({
            "stage": stage,
            "group": group.map(|g| g.as_str()),
            "approved": count,
        }));
    } else {
        output.success(&format!("Approved {} {} item(s)", count, stage));
    }
    Ok(())
}

/// Deletes a pending item
pub fn reject(
    output: &Output,
    root: Option<&Path>,
    stage: Stage,
    name: &DocName,
    chunk: Option<u32>,
    reason: Option<&str>,
) -> Result<()> {
    let project = open_project(root)?;
    let reason = reason.unwrap_or("No reason provided");
    let removed = project
        .store()
        .reject(stage, name, chunk_for(stage, chunk)?, reason)?;

    if !removed {
        bail!("Nothing pending for {} {}", stage, name);
    }

    let key = match chunk {
        Some(n) if !stage.is_document() => format!("{}/{}", name, crate::domain::chunk_identifier(n)),
        _ => name.to_string(),
    };
    if output.is_json() {
        output.data(&serde_json::json!({
            "stage": stage,
            "rejected": key,
            "reason": reason,
        }));
    } else {
        output.success(&format!("Rejected {} {}: {}", stage, key, reason));
    }
    Ok(())
}

/// Chunks need an index; documents must not get one
fn chunk_for(stage: Stage, chunk: Option<u32>) -> Result<Option<u32>> {
    match (stage.is_document(), chunk) {
        (false, None) => bail!("--chunk is required for chunked items"),
        (true, Some(_)) => bail!("--chunk only applies to chunked items"),
        (_, chunk) => Ok(chunk),
    }
}

fn read_record(path: &Path) -> Result<Metadata> {
    let raw = read_input(path)?;
    match serde_json::from_str(&raw).with_context(|| format!("Invalid JSON in {}", path.display()))? {
        Value::Object(record) => Ok(record),
        _ => bail!("Chunk record must be a JSON object"),
    }
}

fn print_item(item: &Item, area: Area) {
    println!("{} {} ({})", item.stage, item.key(), area);
    if let Some(at) = item.published_at {
        println!("Published: {}", crate::domain::format_timestamp(at));
    }
    println!();

    if let Some(content) = &item.content {
        println!("{}", content);
        println!();
    }

    if !item.metadata.is_empty() {
        println!("Metadata:");
        for (key, value) in &item.metadata {
            let rendered = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            println!("  {}: {}", key, rendered);
        }
    }
}
