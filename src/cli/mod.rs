//! # Command-Line Interface
//!
//! User-facing CLI commands and output formatting.
//!
//! ## Command Groups
//!
//! | Group | Purpose | Examples |
//! |-------|---------|----------|
//! | Core | Project management | `init` |
//! | Submit | Add content to the pending area | `submit raw`, `submit chunk` |
//! | Review | Inspect and moderate pending content | `pending`, `show`, `update`, `approve`, `reject` |
//! | Inventory | Approved content | `stats`, `approved`, `delete` |
//! | Publish | Send approved content to the hub | `push` |
//!
//! ## Output Formats
//!
//! All commands support `--format` flag:
//! - `text` (default, or `default_format` from the global config) - Human-readable output
//! - `json` - Machine-parseable JSON
//!
//! ## Logging
//!
//! Logs go to stderr. `RUST_LOG` sets the filter; otherwise `--verbose`
//! selects debug output:
//! ```bash
//! stagehub --verbose push --stage chunked
//! ```
//!
//! ## Entry Point
//!
//! Call [`run()`] to parse arguments and execute the appropriate command.

mod app;
mod inventory;
mod output;
mod push_cmd;
mod review;
mod submit;

pub use app::{run, Cli, Commands};
pub use output::{Output, OutputFormat};

use std::fs;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;

use crate::storage::Project;

/// Opens the project containing `root`, or the current directory
fn open_project(root: Option<&Path>) -> Result<Project> {
    Project::discover(root)
}

/// Reads a file argument; `-` reads stdin
fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read stdin")?;
        return Ok(buf);
    }
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

/// Parses `key=value`; the value is JSON when it parses, a string otherwise
fn parse_key_value(s: &str) -> Result<(String, Value), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", s))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{}'", s));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}
