//! Staged file store
//!
//! Submissions live under `.stagehub/{pending,approved}/{raw,cleaned,chunked}`:
//!
//! - raw / cleaned: `{name}.txt` (content) + `{name}.meta.json` (metadata)
//! - chunked: `{group}/chunk_{NN}.json` (one JSON record per chunk)
//!
//! Every mutating operation holds an exclusive lock on `.stagehub/store.lock`
//! for its whole duration; reads hold a shared lock. Locks are taken once per
//! public operation and never nested. Individual files are written to a temp
//! file and renamed into place.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::{
    chunk_identifier, format_timestamp, Area, DocName, Item, Metadata, Stage, CHUNK_INDEX_KEY,
};

const LOCK_FILE: &str = "store.lock";
const CONTENT_EXT: &str = ".txt";
const META_EXT: &str = ".meta.json";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{area} {stage} item not found: {key}")]
    NotFound {
        area: Area,
        stage: Stage,
        key: String,
    },

    #[error("Pending {stage} item already exists: {key}")]
    AlreadyExists { stage: Stage, key: String },

    #[error("A chunk index is required for chunked items")]
    MissingChunkIndex,

    #[error("Chunked items are submitted as chunk records, not documents")]
    NotADocument,

    #[error("Approving all chunks requires a document name")]
    GroupRequired,

    #[error("Expected a JSON object in {0}")]
    NotAnObject(PathBuf),

    #[error("Nothing found to delete for '{name}' ({scope})")]
    NothingToDelete { name: String, scope: DeleteScope },
}

/// Which approved stages `delete_approved` removes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteScope {
    Raw,
    Cleaned,
    Chunks,
    All,
}

impl DeleteScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeleteScope::Raw => "raw",
            DeleteScope::Cleaned => "cleaned",
            DeleteScope::Chunks => "chunks",
            DeleteScope::All => "all",
        }
    }

    fn includes(&self, stage: Stage) -> bool {
        match self {
            DeleteScope::All => true,
            DeleteScope::Raw => stage == Stage::Raw,
            DeleteScope::Cleaned => stage == Stage::Cleaned,
            DeleteScope::Chunks => stage == Stage::Chunked,
        }
    }
}

impl std::fmt::Display for DeleteScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeleteScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "raw" => Ok(DeleteScope::Raw),
            "cleaned" => Ok(DeleteScope::Cleaned),
            "chunks" | "chunk" | "chunked" => Ok(DeleteScope::Chunks),
            "all" => Ok(DeleteScope::All),
            other => Err(format!(
                "invalid delete scope '{}': expected raw, cleaned, chunks or all",
                other
            )),
        }
    }
}

/// Changes applied by `update_pending`
#[derive(Debug, Clone, Default)]
pub struct ItemUpdate {
    /// Replacement text (raw and cleaned only)
    pub content: Option<String>,

    /// Keys merged into the existing metadata
    pub metadata: Option<Metadata>,

    /// Full replacement chunk record (chunked only)
    pub record: Option<Metadata>,
}

/// Items of one group plus the entries that could not be read
#[derive(Debug, Clone, Default)]
pub struct GroupLoad {
    pub items: Vec<Item>,

    /// `(file name, reason)` for every unreadable entry
    pub unreadable: Vec<(String, String)>,
}

/// Pending/approved counts for one stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StageCounts {
    pub pending: usize,
    pub approved: usize,
}

/// Store-wide counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub raw: StageCounts,
    pub cleaned: StageCounts,
    pub chunked: StageCounts,
    pub totals: StageCounts,
}

/// One approved document and its push status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApprovedFile {
    pub filename: String,
    pub raw: bool,
    pub raw_pushed: bool,
    pub cleaned: bool,
    pub cleaned_pushed: bool,
    pub chunks: usize,
    pub chunks_pushed: usize,
}

/// Everything waiting for review
#[derive(Debug, Clone, Default, Serialize)]
pub struct PendingOverview {
    pub raw: Vec<Item>,
    pub cleaned: Vec<Item>,
    pub chunked: BTreeMap<String, Vec<Item>>,
}

impl PendingOverview {
    pub fn chunk_count(&self) -> usize {
        self.chunked.values().map(Vec::len).sum()
    }

    pub fn total(&self) -> usize {
        self.raw.len() + self.cleaned.len() + self.chunk_count()
    }
}

/// Filesystem-backed store for staged submissions
pub struct StagedStore {
    dir: PathBuf,
    reviewer: String,
}

impl StagedStore {
    /// Creates a store rooted at the given `.stagehub` directory
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            reviewer: "admin".to_string(),
        }
    }

    /// Creates the default store for a project
    pub fn for_project(project_root: &Path) -> Self {
        Self::new(project_root.join(".stagehub"))
    }

    /// Sets the name recorded in `approved_by` / `updated_by`
    pub fn with_reviewer(mut self, reviewer: impl Into<String>) -> Self {
        self.reviewer = reviewer.into();
        self
    }

    /// Returns the store directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the directory holding one stage of one area
    pub fn stage_dir(&self, area: Area, stage: Stage) -> PathBuf {
        self.dir.join(area.as_str()).join(stage.as_str())
    }

    /// Creates every area/stage directory
    pub fn ensure_layout(&self) -> Result<()> {
        for area in [Area::Pending, Area::Approved] {
            for stage in Stage::ALL {
                let dir = self.stage_dir(area, stage);
                fs::create_dir_all(&dir)
                    .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
            }
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Submission
    // ---------------------------------------------------------------------

    /// Writes a new raw or cleaned document into the pending area
    pub fn submit_document(
        &self,
        stage: Stage,
        name: &DocName,
        content: &str,
        mut metadata: Metadata,
    ) -> Result<Item> {
        if !stage.is_document() {
            return Err(StoreError::NotADocument.into());
        }
        let _lock = self.lock_exclusive()?;

        let content_path = self.content_path(Area::Pending, stage, name);
        if content_path.exists() {
            return Err(StoreError::AlreadyExists {
                stage,
                key: name.to_string(),
            }
            .into());
        }

        metadata.insert("filename".to_string(), Value::String(name.to_string()));
        metadata.insert("status".to_string(), Value::String("pending".to_string()));
        metadata.insert("submitted_at".to_string(), Value::String(now()));

        let item = Item::document(stage, name, content, metadata);
        self.write_document(Area::Pending, &item)?;
        debug!(stage = %stage, name = %name, "submitted document");
        Ok(item)
    }

    /// Writes a new chunk record into the pending area
    pub fn submit_chunk(&self, group: &DocName, mut record: Metadata) -> Result<Item> {
        record.insert("status".to_string(), Value::String("pending".to_string()));
        record.insert("submitted_at".to_string(), Value::String(now()));
        let item = Item::chunk(group, record)?;

        let _lock = self.lock_exclusive()?;
        let path = self.chunk_path(Area::Pending, group, ordinal_of(&item)?);
        if path.exists() {
            return Err(StoreError::AlreadyExists {
                stage: Stage::Chunked,
                key: item.key(),
            }
            .into());
        }

        self.write_chunk(Area::Pending, &item)?;
        debug!(group = %group, chunk = %item.identifier, "submitted chunk");
        Ok(item)
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    /// Returns the sorted document names present in one stage of one area
    pub fn groups(&self, area: Area, stage: Stage) -> Result<Vec<DocName>> {
        let _lock = self.lock_shared()?;
        self.list_groups(area, stage)
    }

    /// Reads every item of one group, keeping unreadable entries aside
    pub fn load_group(&self, area: Area, stage: Stage, group: &DocName) -> Result<GroupLoad> {
        let _lock = self.lock_shared()?;
        self.load_group_unlocked(area, stage, group)
    }

    /// Lists items of one stage, optionally restricted to one group
    ///
    /// Sorted by group, then by ordinal. Unreadable entries are logged and skipped.
    pub fn list(&self, area: Area, stage: Stage, group: Option<&DocName>) -> Result<Vec<Item>> {
        let _lock = self.lock_shared()?;
        self.list_unlocked(area, stage, group)
    }

    /// Reads one item
    pub fn get(
        &self,
        area: Area,
        stage: Stage,
        name: &DocName,
        ordinal: Option<u32>,
    ) -> Result<Item> {
        let _lock = self.lock_shared()?;
        self.read_item(area, stage, name, ordinal)
    }

    /// Everything waiting for review
    pub fn pending_overview(&self) -> Result<PendingOverview> {
        let _lock = self.lock_shared()?;

        let mut overview = PendingOverview {
            raw: self.list_unlocked(Area::Pending, Stage::Raw, None)?,
            cleaned: self.list_unlocked(Area::Pending, Stage::Cleaned, None)?,
            chunked: BTreeMap::new(),
        };

        for item in self.list_unlocked(Area::Pending, Stage::Chunked, None)? {
            overview
                .chunked
                .entry(item.group.clone())
                .or_default()
                .push(item);
        }

        Ok(overview)
    }

    /// Pending/approved counts per stage
    pub fn stats(&self) -> Result<StoreStats> {
        let _lock = self.lock_shared()?;

        let mut stats = StoreStats::default();
        for stage in Stage::ALL {
            let counts = StageCounts {
                pending: self.count_records(Area::Pending, stage)?,
                approved: self.count_records(Area::Approved, stage)?,
            };
            match stage {
                Stage::Raw => stats.raw = counts,
                Stage::Cleaned => stats.cleaned = counts,
                Stage::Chunked => stats.chunked = counts,
            }
            stats.totals.pending += counts.pending;
            stats.totals.approved += counts.approved;
        }

        Ok(stats)
    }

    /// Every approved document with its push status, sorted by name
    pub fn approved_files(&self) -> Result<Vec<ApprovedFile>> {
        let _lock = self.lock_shared()?;

        let mut files: BTreeMap<String, ApprovedFile> = BTreeMap::new();

        for stage in [Stage::Raw, Stage::Cleaned] {
            for name in self.list_groups(Area::Approved, stage)? {
                let pushed = match self.read_document(Area::Approved, stage, &name) {
                    Ok(item) => item.is_published(),
                    Err(err) => {
                        warn!(stage = %stage, name = %name, "unreadable approved document: {:#}", err);
                        false
                    }
                };
                let row = approved_row(&mut files, &name);
                if stage == Stage::Raw {
                    row.raw = true;
                    row.raw_pushed = pushed;
                } else {
                    row.cleaned = true;
                    row.cleaned_pushed = pushed;
                }
            }
        }

        for group in self.list_groups(Area::Approved, Stage::Chunked)? {
            let load = self.load_group_unlocked(Area::Approved, Stage::Chunked, &group)?;
            let row = approved_row(&mut files, &group);
            row.chunks = load.items.len() + load.unreadable.len();
            row.chunks_pushed = load.items.iter().filter(|i| i.is_published()).count();
        }

        Ok(files.into_values().collect())
    }

    // ---------------------------------------------------------------------
    // Review
    // ---------------------------------------------------------------------

    /// Edits a pending item and stamps `updated_at` / `updated_by`
    pub fn update_pending(
        &self,
        stage: Stage,
        name: &DocName,
        ordinal: Option<u32>,
        update: ItemUpdate,
    ) -> Result<Item> {
        let _lock = self.lock_exclusive()?;
        let mut item = self.read_item(Area::Pending, stage, name, ordinal)?;

        if stage.is_document() {
            if let Some(content) = update.content {
                item.content = Some(content);
            }
        } else if let Some(mut record) = update.record {
            // The file name decides the position, not the submitted record
            record.insert(CHUNK_INDEX_KEY.to_string(), Value::from(ordinal_of(&item)?));
            item = Item::chunk(name, record)?;
        }

        if let Some(patch) = update.metadata {
            item.metadata.extend(patch);
        }
        item.metadata
            .insert("updated_at".to_string(), Value::String(now()));
        item.metadata.insert(
            "updated_by".to_string(),
            Value::String(self.reviewer.clone()),
        );

        self.write_item(Area::Pending, &item)?;
        debug!(stage = %stage, key = %item.key(), "updated pending item");
        Ok(item)
    }

    /// Moves one pending item into the approved area
    pub fn approve(&self, stage: Stage, name: &DocName, ordinal: Option<u32>) -> Result<Item> {
        let _lock = self.lock_exclusive()?;
        self.approve_unlocked(stage, name, ordinal)
    }

    /// Approves every pending document of a stage, or every chunk of one group
    pub fn approve_all(&self, stage: Stage, group: Option<&DocName>) -> Result<usize> {
        let _lock = self.lock_exclusive()?;
        let mut approved = 0;

        if stage.is_document() {
            let names = match group {
                Some(name) => vec![name.clone()],
                None => self.list_groups(Area::Pending, stage)?,
            };
            for name in names {
                self.approve_unlocked(stage, &name, None)?;
                approved += 1;
            }
        } else {
            let group = group.ok_or(StoreError::GroupRequired)?;
            let load = self.load_group_unlocked(Area::Pending, Stage::Chunked, group)?;
            for (file, reason) in &load.unreadable {
                warn!(group = %group, file = %file, "skipping unreadable chunk: {}", reason);
            }
            for item in load.items {
                self.approve_unlocked(Stage::Chunked, group, item.ordinal)?;
                approved += 1;
            }
        }

        info!(stage = %stage, count = approved, "approved pending items");
        Ok(approved)
    }

    /// Deletes a pending item. Returns false when nothing was there.
    pub fn reject(
        &self,
        stage: Stage,
        name: &DocName,
        ordinal: Option<u32>,
        reason: &str,
    ) -> Result<bool> {
        let _lock = self.lock_exclusive()?;

        let removed = if stage.is_document() {
            let content = remove_if_exists(&self.content_path(Area::Pending, stage, name))?;
            let meta = remove_if_exists(&self.meta_path(Area::Pending, stage, name))?;
            content || meta
        } else {
            let ordinal = ordinal.ok_or(StoreError::MissingChunkIndex)?;
            let removed = remove_if_exists(&self.chunk_path(Area::Pending, name, ordinal))?;
            self.prune_chunk_dir(Area::Pending, name)?;
            removed
        };

        if removed {
            info!(stage = %stage, name = %name, ?ordinal, reason, "rejected submission");
        }
        Ok(removed)
    }

    // ---------------------------------------------------------------------
    // Publishing support
    // ---------------------------------------------------------------------

    /// Persists the published marker on an approved item
    ///
    /// Returns false if the item already carried a marker; an existing marker
    /// is never replaced.
    pub fn mark_published(
        &self,
        stage: Stage,
        name: &DocName,
        ordinal: Option<u32>,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let _lock = self.lock_exclusive()?;
        let mut item = self.read_item(Area::Approved, stage, name, ordinal)?;

        if !item.mark_published(at) {
            return Ok(false);
        }

        if stage.is_document() {
            // Only the metadata changes; leave the content file alone
            self.write_json(&self.meta_path(Area::Approved, stage, name), &item.record())?;
        } else {
            self.write_chunk(Area::Approved, &item)?;
        }
        Ok(true)
    }

    /// Removes approved stages of one document. Returns the stages removed.
    pub fn delete_approved(&self, name: &DocName, scope: DeleteScope) -> Result<Vec<Stage>> {
        let _lock = self.lock_exclusive()?;
        let mut deleted = Vec::new();

        for stage in Stage::ALL.into_iter().filter(|s| scope.includes(*s)) {
            let removed = if stage.is_document() {
                let content = remove_if_exists(&self.content_path(Area::Approved, stage, name))?;
                let meta = remove_if_exists(&self.meta_path(Area::Approved, stage, name))?;
                content || meta
            } else {
                let dir = self.chunk_dir(Area::Approved, name);
                if dir.is_dir() {
                    fs::remove_dir_all(&dir)
                        .with_context(|| format!("Failed to remove {}", dir.display()))?;
                    true
                } else {
                    false
                }
            };
            if removed {
                deleted.push(stage);
            }
        }

        if deleted.is_empty() {
            return Err(StoreError::NothingToDelete {
                name: name.to_string(),
                scope,
            }
            .into());
        }

        info!(name = %name, ?deleted, "deleted approved records");
        Ok(deleted)
    }

    // ---------------------------------------------------------------------
    // Unlocked helpers (callers hold the lock)
    // ---------------------------------------------------------------------

    fn approve_unlocked(&self, stage: Stage, name: &DocName, ordinal: Option<u32>) -> Result<Item> {
        let mut item = self.read_item(Area::Pending, stage, name, ordinal)?;
        item.metadata
            .insert("status".to_string(), Value::String("approved".to_string()));
        item.metadata
            .insert("approved_at".to_string(), Value::String(now()));
        item.metadata.insert(
            "approved_by".to_string(),
            Value::String(self.reviewer.clone()),
        );

        if stage.is_document() {
            self.write_document(Area::Approved, &item)?;
            remove_if_exists(&self.content_path(Area::Pending, stage, name))?;
            remove_if_exists(&self.meta_path(Area::Pending, stage, name))?;
        } else {
            let ordinal = ordinal_of(&item)?;
            self.write_chunk(Area::Approved, &item)?;
            remove_if_exists(&self.chunk_path(Area::Pending, name, ordinal))?;
            self.prune_chunk_dir(Area::Pending, name)?;
        }

        debug!(stage = %stage, key = %item.key(), "approved item");
        Ok(item)
    }

    fn list_unlocked(&self, area: Area, stage: Stage, group: Option<&DocName>) -> Result<Vec<Item>> {
        let groups = match group {
            Some(name) => vec![name.clone()],
            None => self.list_groups(area, stage)?,
        };

        let mut items = Vec::new();
        for name in groups {
            let load = match self.load_group_unlocked(area, stage, &name) {
                Ok(load) => load,
                Err(err) if is_not_found(&err) => continue,
                Err(err) => return Err(err),
            };
            for (file, reason) in &load.unreadable {
                warn!(area = %area, stage = %stage, file = %file, "skipping unreadable record: {}", reason);
            }
            items.extend(load.items);
        }
        Ok(items)
    }

    fn list_groups(&self, area: Area, stage: Stage) -> Result<Vec<DocName>> {
        let dir = self.stage_dir(area, stage);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err).with_context(|| format!("Failed to read {}", dir.display()))
            }
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.with_context(|| format!("Failed to read entry in {}", dir.display()))?;
            let path = entry.path();
            let file_name = entry.file_name().to_string_lossy().to_string();

            let candidate = if stage.is_document() {
                match file_name.strip_suffix(CONTENT_EXT) {
                    Some(stem) if path.is_file() => stem.to_string(),
                    _ => continue,
                }
            } else if path.is_dir() {
                file_name
            } else {
                continue;
            };

            // Temp files and stray entries are not documents
            if let Ok(name) = candidate.parse::<DocName>() {
                names.push(name);
            }
        }

        names.sort();
        Ok(names)
    }

    fn load_group_unlocked(&self, area: Area, stage: Stage, group: &DocName) -> Result<GroupLoad> {
        let mut load = GroupLoad::default();

        if stage.is_document() {
            if !self.content_path(area, stage, group).exists() {
                return Err(not_found(area, stage, group.to_string()));
            }
            match self.read_document(area, stage, group) {
                Ok(item) => load.items.push(item),
                Err(err) => load
                    .unreadable
                    .push((format!("{}{}", group, META_EXT), format!("{:#}", err))),
            }
            return Ok(load);
        }

        let dir = self.chunk_dir(area, group);
        if !dir.is_dir() {
            return Err(not_found(area, stage, group.to_string()));
        }

        let mut files: Vec<PathBuf> = fs::read_dir(&dir)
            .with_context(|| format!("Failed to read {}", dir.display()))?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|ext| ext == "json").unwrap_or(false))
            .collect();
        files.sort();

        for path in files {
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            let parsed = read_json_object(&path)
                .and_then(|record| Item::chunk(group, record).map_err(anyhow::Error::from));
            match parsed {
                // Markers are written back through the ordinal, so the file must sit
                // at its canonical path. This also rules out duplicate ordinals.
                Ok(item) => match item.ordinal.map(chunk_identifier) {
                    Some(expected) if file_name == format!("{}.json", expected) => {
                        load.items.push(item)
                    }
                    _ => load.unreadable.push((
                        file_name,
                        format!(
                            "file name does not match chunk_index (expected {}.json)",
                            item.identifier
                        ),
                    )),
                },
                Err(err) => load.unreadable.push((file_name, format!("{:#}", err))),
            }
        }

        load.items.sort_by_key(|item| item.ordinal);
        Ok(load)
    }

    fn read_item(
        &self,
        area: Area,
        stage: Stage,
        name: &DocName,
        ordinal: Option<u32>,
    ) -> Result<Item> {
        if stage.is_document() {
            self.read_document(area, stage, name)
        } else {
            let ordinal = ordinal.ok_or(StoreError::MissingChunkIndex)?;
            self.read_chunk(area, name, ordinal)
        }
    }

    fn read_document(&self, area: Area, stage: Stage, name: &DocName) -> Result<Item> {
        let content_path = self.content_path(area, stage, name);
        let content = match fs::read_to_string(&content_path) {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(not_found(area, stage, name.to_string()))
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("Failed to read {}", content_path.display()))
            }
        };

        let meta_path = self.meta_path(area, stage, name);
        let metadata = if meta_path.exists() {
            read_json_object(&meta_path)?
        } else {
            Metadata::new()
        };

        Ok(Item::document(stage, name, content, metadata))
    }

    fn read_chunk(&self, area: Area, group: &DocName, ordinal: u32) -> Result<Item> {
        let path = self.chunk_path(area, group, ordinal);
        if !path.exists() {
            return Err(not_found(
                area,
                Stage::Chunked,
                format!("{}/{}", group, chunk_identifier(ordinal)),
            ));
        }
        let record = read_json_object(&path)?;
        Ok(Item::chunk(group, record)?)
    }

    fn write_item(&self, area: Area, item: &Item) -> Result<()> {
        if item.stage.is_document() {
            self.write_document(area, item)
        } else {
            self.write_chunk(area, item)
        }
    }

    fn write_document(&self, area: Area, item: &Item) -> Result<()> {
        let name: DocName = item.identifier.parse()?;
        let content = item.content.as_deref().unwrap_or_default();
        write_atomic(&self.content_path(area, item.stage, &name), content.as_bytes())?;
        self.write_json(&self.meta_path(area, item.stage, &name), &item.record())
    }

    fn write_chunk(&self, area: Area, item: &Item) -> Result<()> {
        let group: DocName = item.group.parse()?;
        let path = self.chunk_path(area, &group, ordinal_of(item)?);
        self.write_json(&path, &item.record())
    }

    fn write_json(&self, path: &Path, record: &Metadata) -> Result<()> {
        let mut json = serde_json::to_string_pretty(record).context("Failed to serialize record")?;
        json.push('\n');
        write_atomic(path, json.as_bytes())
    }

    fn count_records(&self, area: Area, stage: Stage) -> Result<usize> {
        let groups = self.list_groups(area, stage)?;
        if stage.is_document() {
            return Ok(groups.len());
        }

        let mut count = 0;
        for group in groups {
            let dir = self.chunk_dir(area, &group);
            count += fs::read_dir(&dir)
                .with_context(|| format!("Failed to read {}", dir.display()))?
                .filter_map(|e| e.ok())
                .filter(|e| e.path().extension().map(|ext| ext == "json").unwrap_or(false))
                .count();
        }
        Ok(count)
    }

    fn prune_chunk_dir(&self, area: Area, group: &DocName) -> Result<()> {
        let dir = self.chunk_dir(area, group);
        let is_empty = match fs::read_dir(&dir) {
            Ok(mut entries) => entries.next().is_none(),
            Err(_) => return Ok(()),
        };
        if is_empty {
            fs::remove_dir(&dir).with_context(|| format!("Failed to remove {}", dir.display()))?;
        }
        Ok(())
    }

    fn content_path(&self, area: Area, stage: Stage, name: &DocName) -> PathBuf {
        self.stage_dir(area, stage)
            .join(format!("{}{}", name, CONTENT_EXT))
    }

    fn meta_path(&self, area: Area, stage: Stage, name: &DocName) -> PathBuf {
        self.stage_dir(area, stage).join(format!("{}{}", name, META_EXT))
    }

    fn chunk_dir(&self, area: Area, group: &DocName) -> PathBuf {
        self.stage_dir(area, Stage::Chunked).join(group.as_str())
    }

    fn chunk_path(&self, area: Area, group: &DocName, ordinal: u32) -> PathBuf {
        self.chunk_dir(area, group)
            .join(format!("{}.json", chunk_identifier(ordinal)))
    }

    fn lock_file(&self) -> Result<File> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create directory: {}", self.dir.display()))?;
        let path = self.dir.join(LOCK_FILE);
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .with_context(|| format!("Failed to open lock file: {}", path.display()))
    }

    fn lock_shared(&self) -> Result<File> {
        let file = self.lock_file()?;
        file.lock_shared()
            .context("Failed to acquire read lock on staged store")?;
        Ok(file)
    }

    fn lock_exclusive(&self) -> Result<File> {
        let file = self.lock_file()?;
        file.lock_exclusive()
            .context("Failed to acquire write lock on staged store")?;
        Ok(file)
    }
}

/// Returns true if the error is a [`StoreError::NotFound`]
pub fn is_not_found(err: &anyhow::Error) -> bool {
    matches!(err.downcast_ref::<StoreError>(), Some(StoreError::NotFound { .. }))
}

fn approved_row<'a>(
    files: &'a mut BTreeMap<String, ApprovedFile>,
    name: &DocName,
) -> &'a mut ApprovedFile {
    files
        .entry(name.to_string())
        .or_insert_with(|| ApprovedFile {
            filename: name.to_string(),
            ..ApprovedFile::default()
        })
}

fn not_found(area: Area, stage: Stage, key: String) -> anyhow::Error {
    StoreError::NotFound { area, stage, key }.into()
}

fn ordinal_of(item: &Item) -> Result<u32> {
    item.ordinal
        .ok_or_else(|| StoreError::MissingChunkIndex.into())
}

fn now() -> String {
    format_timestamp(Utc::now())
}

fn read_json_object(path: &Path) -> Result<Metadata> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let value: Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(StoreError::NotAnObject(path.to_path_buf()).into()),
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);

    fs::write(&temp_path, bytes)
        .with_context(|| format!("Failed to write temp file: {}", temp_path.display()))?;
    fs::rename(&temp_path, path).with_context(|| {
        format!(
            "Failed to rename {} to {}",
            temp_path.display(),
            path.display()
        )
    })
}

fn remove_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err).with_context(|| format!("Failed to remove {}", path.display())),
    }
}
