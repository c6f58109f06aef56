//! Main CLI application structure

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use super::output::{Output, OutputFormat};
use super::parse_key_value;
use super::push_cmd::{self, PushArgs};
use super::submit::{self, SubmitCommands};
use super::{inventory, review};
use crate::domain::{DocName, Stage};
use crate::publish::PushScope;
use crate::storage::{Config, DeleteScope, Project};

#[derive(Parser)]
#[command(name = "stagehub")]
#[command(author, version, about = "Review staged text and publish approved content to a dataset hub")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format (defaults to `default_format` in the global config)
    #[arg(long, short = 'f', global = true)]
    pub format: Option<OutputFormat>,

    /// Enable debug logging on stderr
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Project directory (defaults to the nearest parent holding .stagehub)
    #[arg(long, global = true, value_name = "DIR")]
    pub root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new stagehub project
    Init {
        /// Path to initialize (defaults to current directory)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Submit content for review
    #[command(subcommand)]
    Submit(SubmitCommands),

    /// List everything waiting for review
    Pending,

    /// Show one item
    Show {
        /// Stage (raw, cleaned, chunked)
        stage: Stage,

        /// Document name
        name: DocName,

        /// Chunk index (chunked only)
        #[arg(long)]
        chunk: Option<u32>,

        /// Read from the approved area instead of pending
        #[arg(long)]
        approved: bool,
    },

    /// Edit a pending item
    Update {
        /// Stage (raw, cleaned, chunked)
        stage: Stage,

        /// Document name
        name: DocName,

        /// Chunk index (chunked only)
        #[arg(long)]
        chunk: Option<u32>,

        /// Replacement text file (raw and cleaned)
        #[arg(long)]
        content: Option<PathBuf>,

        /// Replacement chunk record, a JSON file (chunked)
        #[arg(long)]
        record: Option<PathBuf>,

        /// Metadata entry to merge (repeatable)
        #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_key_value)]
        set: Vec<(String, Value)>,
    },

    /// Approve a pending item
    Approve {
        /// Stage (raw, cleaned, chunked)
        stage: Stage,

        /// Document name
        name: DocName,

        /// Chunk index (chunked only)
        #[arg(long)]
        chunk: Option<u32>,
    },

    /// Approve every pending item of a stage
    ApproveAll {
        /// Stage (raw, cleaned, chunked)
        stage: Stage,

        /// Document name (required for chunked)
        #[arg(long)]
        group: Option<DocName>,
    },

    /// Delete a pending item
    Reject {
        /// Stage (raw, cleaned, chunked)
        stage: Stage,

        /// Document name
        name: DocName,

        /// Chunk index (chunked only)
        #[arg(long)]
        chunk: Option<u32>,

        /// Reason, recorded in the log
        #[arg(long)]
        reason: Option<String>,
    },

    /// Show pending/approved counts
    Stats,

    /// List approved documents and their push status
    Approved,

    /// Delete approved content of a document
    Delete {
        /// Document name
        name: DocName,

        /// What to delete (raw, cleaned, chunks, all)
        #[arg(long, default_value = "all")]
        stage: DeleteScope,
    },

    /// Push approved content to the hub
    Push {
        /// Stages to push (raw, cleaned, chunked, all)
        #[arg(long, default_value = "all")]
        stage: PushScope,

        /// Only push this document
        #[arg(long)]
        name: Option<DocName>,

        /// Hub access token
        #[arg(long, env = "HF_TOKEN", hide_env_values = true)]
        token: Option<String>,

        /// Destination for raw files (overrides hub.raw_repo)
        #[arg(long)]
        raw_repo: Option<String>,

        /// Destination for cleaned files (overrides hub.cleaned_repo)
        #[arg(long)]
        cleaned_repo: Option<String>,

        /// Destination for chunks (overrides hub.chunked_repo)
        #[arg(long)]
        chunked_repo: Option<String>,

        /// Items per commit (overrides publish.batch_size)
        #[arg(long)]
        batch_size: Option<usize>,

        /// Commit attempts per batch (overrides publish.max_retries)
        #[arg(long)]
        max_retries: Option<u32>,
    },
}

/// Main entry point for the CLI
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let format = match cli.format {
        Some(format) => format,
        None => match Config::load_global() {
            Ok(global) => global.default_format.into(),
            Err(e) => {
                warn!("Ignoring global config: {:#}", e);
                OutputFormat::default()
            }
        },
    };
    let output = Output::new(format);
    let root = cli.root.as_deref();

    debug!("stagehub starting");

    match cli.command {
        Commands::Init { path } => init(&output, root, &path)?,

        Commands::Submit(cmd) => submit::run(cmd, &output, root)?,

        Commands::Pending => review::pending(&output, root)?,
        Commands::Show {
            stage,
            name,
            chunk,
            approved,
        } => review::show(&output, root, stage, &name, chunk, approved)?,
        Commands::Update {
            stage,
            name,
            chunk,
            content,
            record,
            set,
        } => review::update(
            &output,
            root,
            stage,
            &name,
            chunk,
            content.as_deref(),
            record.as_deref(),
            set,
        )?,
        Commands::Approve { stage, name, chunk } => {
            review::approve(&output, root, stage, &name, chunk)?
        }
        Commands::ApproveAll { stage, group } => {
            review::approve_all(&output, root, stage, group.as_ref())?
        }
        Commands::Reject {
            stage,
            name,
            chunk,
            reason,
        } => review::reject(&output, root, stage, &name, chunk, reason.as_deref())?,

        Commands::Stats => inventory::stats(&output, root)?,
        Commands::Approved => inventory::approved(&output, root)?,
        Commands::Delete { name, stage } => inventory::delete(&output, root, &name, stage)?,

        Commands::Push {
            stage,
            name,
            token,
            raw_repo,
            cleaned_repo,
            chunked_repo,
            batch_size,
            max_retries,
        } => push_cmd::run(
            &output,
            root,
            PushArgs {
                scope: stage,
                name,
                token,
                raw_repo,
                cleaned_repo,
                chunked_repo,
                batch_size,
                max_retries,
            },
        )?,
    }

    debug!("command completed");
    Ok(())
}

/// `--root` wins over the positional path when both are given
fn init(output: &Output, root: Option<&Path>, path: &Path) -> Result<()> {
    let target = root.unwrap_or(path);
    let project = Project::init(target)?;

    if output.is_json() {
        output.data(&serde_json::json!({
            "success": true,
            "root": project.root().display().to_string(),
            "dir": project.stagehub_dir().display().to_string(),
        }));
    } else {
        output.success(&format!(
            "Initialized stagehub project at {}",
            project.root().display()
        ));
    }
    Ok(())
}

/// Logs go to stderr; `RUST_LOG` overrides the verbosity flag
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
