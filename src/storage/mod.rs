//! # Storage Layer
//!
//! Persistence layer for stagehub with plain, reviewable file formats.
//!
//! ## Storage Formats
//!
//! | Data | Format | Location |
//! |------|--------|----------|
//! | Raw / cleaned text | UTF-8 text | `.stagehub/{area}/{stage}/{name}.txt` |
//! | Raw / cleaned metadata | JSON object | `.stagehub/{area}/{stage}/{name}.meta.json` |
//! | Chunks | JSON object per chunk | `.stagehub/{area}/chunked/{name}/chunk_{NN}.json` |
//! | Config | TOML | `.stagehub/config.toml` |
//!
//! ## Concurrency Safety
//!
//! - [`StagedStore`] serializes writers with an `fs2` lock on `.stagehub/store.lock`
//! - All writes are atomic (temp file + rename)
//!
//! ## Key Types
//!
//! - [`Project`] - Entry point for accessing a stagehub project
//! - [`StagedStore`] - Read/write/move staged submissions
//! - [`Config`] - Project and global configuration

mod config;
mod project;
mod staged;

pub use config::{
    Config, ConfigError, GlobalConfig, HubConfig, OutputFormat, ProjectConfig, PublishConfig,
};
pub use project::{Project, ProjectError};
pub use staged::{
    is_not_found, ApprovedFile, DeleteScope, GroupLoad, ItemUpdate, PendingOverview, StageCounts,
    StagedStore, StoreError, StoreStats,
};
