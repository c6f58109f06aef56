//! Push approved content to the hub

use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use super::output::Output;
use super::open_project;
use crate::domain::DocName;
use crate::publish::{HttpHub, Publisher, PushRequest, PushRunner, PushScope};

/// Flags of `stagehub push`
pub struct PushArgs {
    pub scope: PushScope,
    pub name: Option<DocName>,
    pub token: Option<String>,
    pub raw_repo: Option<String>,
    pub cleaned_repo: Option<String>,
    pub chunked_repo: Option<String>,
    pub batch_size: Option<usize>,
    pub max_retries: Option<u32>,
}

pub fn run(output: &Output, root: Option<&Path>, args: PushArgs) -> Result<()> {
    let project = open_project(root)?;
    let config = &project.config().project;

    let hub = HttpHub::new(&config.hub.endpoint, args.token.unwrap_or_default())?
        .with_repo_type(config.hub.repo_type.clone())
        .with_revision(config.hub.revision.clone());

    let mut publish = config.publish.clone();
    if let Some(batch_size) = args.batch_size {
        publish.batch_size = batch_size;
    }
    if let Some(max_retries) = args.max_retries {
        publish.max_retries = max_retries;
    }
    let options = publish.to_options().context("Invalid publish settings")?;
    debug!(?options, scope = %args.scope, "starting push");

    let store = project.store();
    let publisher = Publisher::new(hub, options);
    let runner = PushRunner::new(&store, &publisher, &config.hub);
    let request = PushRequest {
        scope: args.scope,
        name: args.name,
        raw_repo: args.raw_repo,
        cleaned_repo: args.cleaned_repo,
        chunked_repo: args.chunked_repo,
    };
    let summary = runner.run(&request)?;

    if output.is_json() {
        output.data(&serde_json::json!({
            "success": true,
            "message": summary.message(),
            "uploaded": summary.uploaded(),
            "failed": summary.failed(),
            "skipped": summary.skipped(),
            "stages": summary.stages,
        }));
        return Ok(());
    }

    if summary.stages.is_empty() {
        println!("Nothing approved to push.");
        return Ok(());
    }

    for stage in &summary.stages {
        println!(
            "{} -> {}: {} uploaded, {} failed, {} already pushed",
            stage.stage, stage.repo, stage.uploaded, stage.failed, stage.skipped
        );
        for item in &stage.failed_items {
            output.warn(&format!("not pushed: {}", item));
        }
    }
    println!();
    output.success(&summary.message());
    Ok(())
}
