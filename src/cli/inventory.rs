//! Approved content: counts, listing and deletion

use std::path::Path;

use anyhow::Result;

use super::output::Output;
use super::open_project;
use crate::domain::DocName;
use crate::storage::DeleteScope;

/// Shows pending/approved counts per stage
pub fn stats(output: &Output, root: Option<&Path>) -> Result<()> {
    let project = open_project(root)?;
    let stats = project.store().stats()?;

    if output.is_json() {
        output.data(&stats);
        return Ok(());
    }

    println!("{:<10} {:>8} {:>9}", "STAGE", "PENDING", "APPROVED");
    println!("{}", "-".repeat(29));
    for (stage, counts) in [
        ("raw", stats.raw),
        ("cleaned", stats.cleaned),
        ("chunked", stats.chunked),
    ] {
        println!("{:<10} {:>8} {:>9}", stage, counts.pending, counts.approved);
    }
    println!("{}", "-".repeat(29));
    println!(
        "{:<10} {:>8} {:>9}",
        "total", stats.totals.pending, stats.totals.approved
    );
    Ok(())
}

/// Lists approved documents with their push status
pub fn approved(output: &Output, root: Option<&Path>) -> Result<()> {
    let project = open_project(root)?;
    let files = project.store().approved_files()?;

    if output.is_json() {
        output.data(&files);
        return Ok(());
    }

    if files.is_empty() {
        println!("No approved files.");
        return Ok(());
    }

    println!("{:<30} {:<8} {:<8} CHUNKS", "FILE", "RAW", "CLEANED");
    println!("{}", "-".repeat(60));
    for file in &files {
        let chunks = if file.chunks == 0 {
            "-".to_string()
        } else {
            format!("{}/{} pushed", file.chunks_pushed, file.chunks)
        };
        println!(
            "{:<30} {:<8} {:<8} {}",
            file.filename,
            presence(file.raw, file.raw_pushed),
            presence(file.cleaned, file.cleaned_pushed),
            chunks
        );
    }
    println!();
    println!("{} approved file(s)", files.len());
    Ok(())
}

/// Deletes approved content of one document
pub fn delete(output: &Output, root: Option<&Path>, name: &DocName, scope: DeleteScope) -> Result<()> {
    let project = open_project(root)?;
    let removed = project.store().delete_approved(name, scope)?;

    if output.is_json() {
        output.data(&serde_json::json!({
            "filename": name.as_str(),
            "deleted": removed,
        }));
    } else {
        let stages: Vec<&str> = removed.iter().map(|s| s.as_str()).collect();
        output.success(&format!("Deleted {} ({})", name, stages.join(", ")));
    }
    Ok(())
}

fn presence(present: bool, pushed: bool) -> &'static str {
    match (present, pushed) {
        (false, _) => "-",
        (true, false) => "yes",
        (true, true) => "pushed",
    }
}
