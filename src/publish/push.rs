//! Push orchestration
//!
//! Walks the approved area stage by stage and group by group, hands each
//! group to the [`Publisher`] and persists the published marker for every
//! item the hub accepted. Running it twice is safe: marked items are skipped.

use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Result};
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::domain::{Area, DocName, Stage};
use crate::storage::{HubConfig, StagedStore};

use super::backoff::Sleeper;
use super::batch::Publisher;
use super::hub::HubClient;

/// Stages covered by one push
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PushScope {
    Raw,
    Cleaned,
    Chunked,
    #[default]
    All,
}

impl PushScope {
    pub fn stages(&self) -> Vec<Stage> {
        match self {
            PushScope::Raw => vec![Stage::Raw],
            PushScope::Cleaned => vec![Stage::Cleaned],
            PushScope::Chunked => vec![Stage::Chunked],
            PushScope::All => Stage::ALL.to_vec(),
        }
    }
}

impl FromStr for PushScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(PushScope::All),
            other => other
                .parse::<Stage>()
                .map(|stage| match stage {
                    Stage::Raw => PushScope::Raw,
                    Stage::Cleaned => PushScope::Cleaned,
                    Stage::Chunked => PushScope::Chunked,
                })
                .map_err(|_| format!("Invalid push scope '{}': expected raw, cleaned, chunked or all", s)),
        }
    }
}

impl fmt::Display for PushScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PushScope::All => f.write_str("all"),
            PushScope::Raw => f.write_str("raw"),
            PushScope::Cleaned => f.write_str("cleaned"),
            PushScope::Chunked => f.write_str("chunked"),
        }
    }
}

/// What to push and where
#[derive(Debug, Clone, Default)]
pub struct PushRequest {
    pub scope: PushScope,
    /// Restrict the push to one document name
    pub name: Option<DocName>,
    pub raw_repo: Option<String>,
    pub cleaned_repo: Option<String>,
    pub chunked_repo: Option<String>,
}

impl PushRequest {
    fn override_for(&self, stage: Stage) -> Option<&str> {
        let repo = match stage {
            Stage::Raw => self.raw_repo.as_deref(),
            Stage::Cleaned => self.cleaned_repo.as_deref(),
            Stage::Chunked => self.chunked_repo.as_deref(),
        };
        repo.map(str::trim).filter(|r| !r.is_empty())
    }
}

/// Per-document counts within one stage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilePush {
    pub name: String,
    pub uploaded: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Outcome of one stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StagePush {
    pub stage: Stage,
    pub repo: String,
    pub uploaded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub files: Vec<FilePush>,
    /// `group/identifier` of every item that did not reach the hub
    pub failed_items: Vec<String>,
}

/// Outcome of a whole push
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PushSummary {
    pub stages: Vec<StagePush>,
}

impl PushSummary {
    pub fn uploaded(&self) -> usize {
        self.stages.iter().map(|s| s.uploaded).sum()
    }

    pub fn failed(&self) -> usize {
        self.stages.iter().map(|s| s.failed).sum()
    }

    pub fn skipped(&self) -> usize {
        self.stages.iter().map(|s| s.skipped).sum()
    }

    pub fn message(&self) -> String {
        format!(
            "Pushed {} items, {} failed, {} already pushed",
            self.uploaded(),
            self.failed(),
            self.skipped()
        )
    }
}

/// Pushes approved content from a store through a publisher
pub struct PushRunner<'a, H, S> {
    store: &'a StagedStore,
    publisher: &'a Publisher<H, S>,
    hub: &'a HubConfig,
}

impl<'a, H: HubClient, S: Sleeper> PushRunner<'a, H, S> {
    pub fn new(store: &'a StagedStore, publisher: &'a Publisher<H, S>, hub: &'a HubConfig) -> Self {
        Self {
            store,
            publisher,
            hub,
        }
    }

    /// Pushes every stage in scope
    ///
    /// Fails before any commit if a stage with approved content has no
    /// destination repository. Commit failures never fail the run; they are
    /// reported in the summary.
    pub fn run(&self, request: &PushRequest) -> Result<PushSummary> {
        let mut plan = Vec::new();
        for stage in request.scope.stages() {
            let groups = self.groups(stage, request.name.as_ref())?;
            if groups.is_empty() {
                continue;
            }
            let repo = match request.override_for(stage).or(self.hub.repo_for(stage)) {
                Some(repo) => repo.to_string(),
                None => bail!(
                    "No destination repository for {} content (set hub.{}_repo or pass --{}-repo)",
                    stage,
                    stage,
                    stage
                ),
            };
            plan.push((stage, repo, groups));
        }

        let mut summary = PushSummary::default();
        for (stage, repo, groups) in plan {
            summary.stages.push(self.push_stage(stage, repo, &groups));
        }

        info!("{}", summary.message());
        Ok(summary)
    }

    fn groups(&self, stage: Stage, name: Option<&DocName>) -> Result<Vec<DocName>> {
        let groups = self.store.groups(Area::Approved, stage)?;
        Ok(match name {
            Some(name) => groups.into_iter().filter(|g| g == name).collect(),
            None => groups,
        })
    }

    fn push_stage(&self, stage: Stage, repo: String, groups: &[DocName]) -> StagePush {
        let mut result = StagePush {
            stage,
            repo,
            uploaded: 0,
            failed: 0,
            skipped: 0,
            files: Vec::new(),
            failed_items: Vec::new(),
        };

        for group in groups {
            let mut file = FilePush {
                name: group.to_string(),
                ..FilePush::default()
            };

            let load = match self.store.load_group(Area::Approved, stage, group) {
                Ok(load) => load,
                Err(e) => {
                    warn!("Failed to load approved {} {}: {:#}", stage, group, e);
                    file.failed += 1;
                    result.failed += 1;
                    result.failed_items.push(group.to_string());
                    result.files.push(file);
                    continue;
                }
            };

            for (entry, reason) in &load.unreadable {
                warn!("Skipping unreadable {} entry {}/{}: {}", stage, group, entry, reason);
                file.failed += 1;
                result.failed_items.push(format!("{}/{}", group, entry));
            }

            let report = self.publisher.publish(group.as_str(), &load.items, &result.repo);

            let now = Utc::now();
            for identifier in &report.uploaded_identifiers {
                let Some(item) = load.items.iter().find(|i| &i.identifier == identifier) else {
                    continue;
                };
                if let Err(e) = self.store.mark_published(stage, group, item.ordinal, now) {
                    warn!("Failed to record push of {}: {:#}", item.key(), e);
                }
            }

            file.uploaded += report.uploaded_count;
            file.failed += report.failed_count;
            file.skipped += report.skipped_count;
            result.failed_items.extend(
                report
                    .failed_identifiers
                    .iter()
                    .map(|id| format!("{}/{}", group, id)),
            );

            result.uploaded += file.uploaded;
            result.failed += file.failed;
            result.skipped += file.skipped;
            result.files.push(file);
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Metadata;
    use crate::publish::{Commit, HubError, PublishOptions, Sleeper};
    use serde_json::json;
    use std::cell::RefCell;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    #[derive(Default)]
    struct FakeHub {
        commits: RefCell<Vec<Commit>>,
        reject_repo: Option<String>,
    }

    impl HubClient for FakeHub {
        fn create_commit(&self, commit: &Commit) -> Result<(), HubError> {
            if self.reject_repo.as_deref() == Some(commit.repo.as_str()) {
                return Err(HubError::from_status(500, "down"));
            }
            self.commits.borrow_mut().push(commit.clone());
            Ok(())
        }
    }

    struct NoSleep;

    impl Sleeper for NoSleep {
        fn sleep(&self, _: Duration) {}
    }

    fn name(s: &str) -> DocName {
        s.parse().unwrap()
    }

    fn hub_config() -> HubConfig {
        HubConfig {
            raw_repo: "org/raw".into(),
            cleaned_repo: "org/cleaned".into(),
            chunked_repo: "org/chunks".into(),
            ..HubConfig::default()
        }
    }

    fn seeded_store(dir: &TempDir) -> StagedStore {
        let store = StagedStore::new(dir.path().join(".stagehub"));
        store.ensure_layout().unwrap();
        store
            .submit_document(Stage::Raw, &name("report"), "raw text", Metadata::new())
            .unwrap();
        store
            .submit_document(Stage::Cleaned, &name("report"), "clean text", Metadata::new())
            .unwrap();
        for i in 1..=3 {
            let record = json!({"chunk_index": i, "text": format!("part {}", i)});
            store
                .submit_chunk(&name("report"), record.as_object().unwrap().clone())
                .unwrap();
        }
        store.approve_all(Stage::Raw, None).unwrap();
        store.approve_all(Stage::Cleaned, None).unwrap();
        store.approve_all(Stage::Chunked, Some(&name("report"))).unwrap();
        store
    }

    fn publisher(hub: FakeHub) -> Publisher<FakeHub, NoSleep> {
        Publisher::new(hub, PublishOptions::default()).with_sleeper(NoSleep)
    }

    #[test]
    fn push_all_marks_everything() {
        let dir = TempDir::new().unwrap();
        let store = seeded_store(&dir);
        let publisher = publisher(FakeHub::default());
        let config = hub_config();
        let runner = PushRunner::new(&store, &publisher, &config);

        let summary = runner.run(&PushRequest::default()).unwrap();

        assert_eq!(summary.uploaded(), 5);
        assert_eq!(summary.failed(), 0);
        assert_eq!(summary.message(), "Pushed 5 items, 0 failed, 0 already pushed");

        let chunks = store
            .list(Area::Approved, Stage::Chunked, Some(&name("report")))
            .unwrap();
        assert!(chunks.iter().all(|c| c.is_published()));
        let raw = store
            .get(Area::Approved, Stage::Raw, &name("report"), None)
            .unwrap();
        assert!(raw.is_published());
    }

    #[test]
    fn second_run_skips_everything() {
        let dir = TempDir::new().unwrap();
        let store = seeded_store(&dir);
        let publisher = publisher(FakeHub::default());
        let config = hub_config();
        let runner = PushRunner::new(&store, &publisher, &config);

        runner.run(&PushRequest::default()).unwrap();
        let again = runner.run(&PushRequest::default()).unwrap();

        assert_eq!(again.uploaded(), 0);
        assert_eq!(again.skipped(), 5);
    }

    #[test]
    fn failed_stage_leaves_items_unmarked() {
        let dir = TempDir::new().unwrap();
        let store = seeded_store(&dir);
        let publisher = publisher(FakeHub {
            reject_repo: Some("org/chunks".into()),
            ..FakeHub::default()
        });
        let config = hub_config();
        let runner = PushRunner::new(&store, &publisher, &config);

        let summary = runner.run(&PushRequest::default()).unwrap();

        assert_eq!(summary.uploaded(), 2);
        assert_eq!(summary.failed(), 3);
        let chunked = summary
            .stages
            .iter()
            .find(|s| s.stage == Stage::Chunked)
            .unwrap();
        assert_eq!(chunked.failed_items[0], "report/chunk_01");
        let chunks = store
            .list(Area::Approved, Stage::Chunked, Some(&name("report")))
            .unwrap();
        assert!(chunks.iter().all(|c| !c.is_published()));
    }

    #[test]
    fn unreadable_chunk_counts_as_failed() {
        let dir = TempDir::new().unwrap();
        let store = seeded_store(&dir);
        fs::write(
            store
                .stage_dir(Area::Approved, Stage::Chunked)
                .join("report")
                .join("chunk_09.json"),
            "{ not json",
        )
        .unwrap();
        let publisher = publisher(FakeHub::default());
        let config = hub_config();
        let runner = PushRunner::new(&store, &publisher, &config);

        let request = PushRequest {
            scope: PushScope::Chunked,
            ..PushRequest::default()
        };
        let summary = runner.run(&request).unwrap();

        assert_eq!(summary.uploaded(), 3);
        assert_eq!(summary.failed(), 1);
        assert_eq!(summary.stages[0].failed_items, vec!["report/chunk_09.json"]);
    }

    #[test]
    fn misnamed_chunk_is_never_uploaded() {
        let dir = TempDir::new().unwrap();
        let store = seeded_store(&dir);
        fs::write(
            store
                .stage_dir(Area::Approved, Stage::Chunked)
                .join("report")
                .join("chunk_5.json"),
            r#"{"chunk_index": 5}"#,
        )
        .unwrap();
        let publisher = publisher(FakeHub::default());
        let config = hub_config();
        let runner = PushRunner::new(&store, &publisher, &config);
        let request = PushRequest {
            scope: PushScope::Chunked,
            ..PushRequest::default()
        };

        let first = runner.run(&request).unwrap();
        assert_eq!(first.uploaded(), 3);
        assert_eq!(first.stages[0].failed_items, vec!["report/chunk_5.json"]);

        let second = runner.run(&request).unwrap();
        assert_eq!(second.uploaded(), 0);
        assert_eq!(second.skipped(), 3);
        assert_eq!(second.failed(), 1);
    }

    #[test]
    fn group_that_fails_to_load_does_not_stop_the_run() {
        let dir = TempDir::new().unwrap();
        let store = seeded_store(&dir);
        let publisher = publisher(FakeHub::default());
        let config = hub_config();
        let runner = PushRunner::new(&store, &publisher, &config);

        let groups = vec![name("gone"), name("report")];
        let result = runner.push_stage(Stage::Chunked, "org/chunks".into(), &groups);

        assert_eq!(result.failed, 1);
        assert_eq!(result.failed_items, vec!["gone"]);
        assert_eq!(result.uploaded, 3);
        assert_eq!(result.files.len(), 2);
        assert_eq!(result.files[0].failed, 1);
    }

    #[test]
    fn missing_repo_fails_before_any_commit() {
        let dir = TempDir::new().unwrap();
        let store = seeded_store(&dir);
        let publisher = publisher(FakeHub::default());
        let config = HubConfig {
            chunked_repo: String::new(),
            ..hub_config()
        };
        let runner = PushRunner::new(&store, &publisher, &config);

        let err = runner.run(&PushRequest::default()).unwrap_err();
        assert!(err.to_string().contains("chunked"));
        assert!(publisher_commits(&runner).is_empty());
    }

    #[test]
    fn override_and_name_filter() {
        let dir = TempDir::new().unwrap();
        let store = seeded_store(&dir);
        store
            .submit_document(Stage::Raw, &name("other"), "x", Metadata::new())
            .unwrap();
        store.approve(Stage::Raw, &name("other"), None).unwrap();

        let publisher = publisher(FakeHub::default());
        let config = hub_config();
        let runner = PushRunner::new(&store, &publisher, &config);

        let request = PushRequest {
            scope: PushScope::Raw,
            name: Some(name("other")),
            raw_repo: Some("me/raw-mirror".into()),
            ..PushRequest::default()
        };
        let summary = runner.run(&request).unwrap();

        assert_eq!(summary.uploaded(), 1);
        assert_eq!(summary.stages[0].repo, "me/raw-mirror");
        assert_eq!(summary.stages[0].files[0].name, "other");
    }

    #[test]
    fn scope_parsing() {
        assert_eq!("all".parse::<PushScope>(), Ok(PushScope::All));
        assert_eq!("chunks".parse::<PushScope>(), Ok(PushScope::Chunked));
        assert_eq!("Raw".parse::<PushScope>(), Ok(PushScope::Raw));
        assert!("nope".parse::<PushScope>().is_err());
    }

    fn publisher_commits(runner: &PushRunner<'_, FakeHub, NoSleep>) -> Vec<Commit> {
        runner.publisher.hub().commits.borrow().clone()
    }
}
