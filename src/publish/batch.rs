//! Batch publisher
//!
//! Splits the items of one group into fixed-size batches and sends each
//! batch as a single commit, retrying with exponential backoff. The
//! publisher keeps no state between calls and never fails as a whole: every
//! outcome ends up in the returned [`PublishReport`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::domain::{Item, Stage};

use super::backoff::{backoff_delay, Sleeper, ThreadSleeper};
use super::hub::{Commit, CommitFile, HubClient, HubError};
use super::layout;
use super::report::{BatchOutcome, PublishReport};

#[derive(Debug, Error, PartialEq)]
pub enum OptionsError {
    #[error("batch_size must be greater than zero")]
    ZeroBatchSize,

    #[error("max_retries must be greater than zero")]
    ZeroRetries,
}

/// Which commit errors are worth another attempt
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryPolicy {
    /// Every error is retried until attempts run out
    #[default]
    All,
    /// Rate limits, server and transport errors only
    TransientOnly,
}

impl RetryPolicy {
    pub fn allows(&self, err: &HubError) -> bool {
        match self {
            RetryPolicy::All => true,
            RetryPolicy::TransientOnly => err.is_transient(),
        }
    }
}

/// Batch size and retry settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishOptions {
    batch_size: usize,
    max_retries: u32,
    backoff_base: Duration,
    retry: RetryPolicy,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            batch_size: 50,
            max_retries: 3,
            backoff_base: Duration::from_secs(1),
            retry: RetryPolicy::All,
        }
    }
}

impl PublishOptions {
    /// `max_retries` is the total number of attempts per batch
    pub fn new(batch_size: usize, max_retries: u32) -> Result<Self, OptionsError> {
        if batch_size == 0 {
            return Err(OptionsError::ZeroBatchSize);
        }
        if max_retries == 0 {
            return Err(OptionsError::ZeroRetries);
        }
        Ok(Self {
            batch_size,
            max_retries,
            ..Self::default()
        })
    }

    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn backoff_base(&self) -> Duration {
        self.backoff_base
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }
}

/// Publishes groups of items to a hub
pub struct Publisher<H, S = ThreadSleeper> {
    hub: H,
    sleeper: S,
    options: PublishOptions,
}

impl<H: HubClient> Publisher<H> {
    pub fn new(hub: H, options: PublishOptions) -> Self {
        Self {
            hub,
            sleeper: ThreadSleeper,
            options,
        }
    }
}

impl<H: HubClient, S: Sleeper> Publisher<H, S> {
    /// Replaces the sleeper used between attempts
    pub fn with_sleeper<T: Sleeper>(self, sleeper: T) -> Publisher<H, T> {
        Publisher {
            hub: self.hub,
            sleeper,
            options: self.options,
        }
    }

    pub fn options(&self) -> &PublishOptions {
        &self.options
    }

    pub fn hub(&self) -> &H {
        &self.hub
    }

    /// Publishes the items of one group to `destination`
    ///
    /// Already-published items are counted as skipped. Items that belong to
    /// another group or stage, or that cannot be rendered, are counted as
    /// failed without being sent.
    pub fn publish(&self, group: &str, items: &[Item], destination: &str) -> PublishReport {
        let mut report = PublishReport::new(destination, group);
        let stage = items.iter().find(|i| !i.is_published()).map(|i| i.stage);

        let mut ready: Vec<(&Item, Vec<CommitFile>)> = Vec::new();
        for item in items {
            if item.is_published() {
                debug!(item = %item.key(), "Already published, skipping");
                report.record_skipped();
                continue;
            }
            if item.group != group || Some(item.stage) != stage {
                warn!(
                    item = %item.key(),
                    "Item does not belong to {} group '{}'",
                    stage.map(|s| s.as_str()).unwrap_or("?"),
                    group
                );
                report.record_failed(&item.identifier);
                continue;
            }
            match layout::remote_files(item) {
                Ok(files) => ready.push((item, files)),
                Err(e) => {
                    warn!(item = %item.key(), "Cannot publish item: {}", e);
                    report.record_failed(&item.identifier);
                }
            }
        }

        let Some(stage) = stage else {
            return report;
        };

        for (index, batch) in ready.chunks(self.options.batch_size).enumerate() {
            let first = index * self.options.batch_size + 1;
            let outcome = self.publish_batch(stage, group, destination, first, batch);
            report.commit_attempts += outcome.attempts;

            for (item, _) in batch {
                if outcome.committed {
                    report.record_uploaded(&item.identifier);
                } else {
                    report.record_failed(&item.identifier);
                }
            }
            report.batches.push(outcome);
        }

        info!(
            group,
            destination,
            uploaded = report.uploaded_count,
            failed = report.failed_count,
            skipped = report.skipped_count,
            "Published {} group",
            stage
        );
        report
    }

    fn publish_batch(
        &self,
        stage: Stage,
        group: &str,
        destination: &str,
        first: usize,
        batch: &[(&Item, Vec<CommitFile>)],
    ) -> BatchOutcome {
        let items: Vec<&Item> = batch.iter().map(|(item, _)| *item).collect();
        let commit = Commit {
            repo: destination.to_string(),
            message: layout::commit_message(stage, group, first, &items),
            files: batch
                .iter()
                .flat_map(|(_, files)| files.iter().cloned())
                .collect(),
        };
        let last = first + batch.len() - 1;

        info!(
            destination,
            "Committing {} items {}-{} of '{}' ({} files)",
            stage,
            first,
            last,
            group,
            commit.files.len()
        );

        let (attempts, result) = self.commit_with_retry(&commit);
        match result {
            Ok(()) => BatchOutcome {
                first,
                last,
                size: batch.len(),
                attempts,
                committed: true,
                error: None,
            },
            Err(err) => {
                error!(
                    destination,
                    "Batch {}-{} of '{}' failed after {} attempt(s): {}",
                    first,
                    last,
                    group,
                    attempts,
                    err
                );
                BatchOutcome {
                    first,
                    last,
                    size: batch.len(),
                    attempts,
                    committed: false,
                    error: Some(err.to_string()),
                }
            }
        }
    }

    /// Returns the number of attempts made and the final result
    fn commit_with_retry(&self, commit: &Commit) -> (u32, Result<(), HubError>) {
        let max = self.options.max_retries;
        let mut attempt = 1;

        loop {
            let err = match self.hub.create_commit(commit) {
                Ok(()) => return (attempt, Ok(())),
                Err(err) => err,
            };

            if attempt >= max || !self.options.retry.allows(&err) {
                return (attempt, Err(err));
            }

            let delay = backoff_delay(self.options.backoff_base, attempt);
            if err.is_rate_limited() {
                warn!(
                    "Rate limited by hub, waiting {:?} before attempt {}/{}",
                    delay,
                    attempt + 1,
                    max
                );
            } else {
                warn!(
                    "Commit attempt {}/{} failed: {}; retrying in {:?}",
                    attempt, max, err, delay
                );
            }
            self.sleeper.sleep(delay);
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DocName, Metadata};
    use proptest::prelude::*;
    use serde_json::json;
    use std::cell::{Cell, RefCell};

    /// Records commits and fails those the rule picks
    struct FakeHub {
        commits: RefCell<Vec<Commit>>,
        calls: Cell<usize>,
        rule: Box<dyn Fn(usize, &Commit) -> Option<HubError>>,
    }

    impl FakeHub {
        fn ok() -> Self {
            Self::failing(|_, _| None)
        }

        fn failing(rule: impl Fn(usize, &Commit) -> Option<HubError> + 'static) -> Self {
            Self {
                commits: RefCell::new(Vec::new()),
                calls: Cell::new(0),
                rule: Box::new(rule),
            }
        }

        fn calls(&self) -> usize {
            self.calls.get()
        }

        fn committed(&self) -> Vec<Commit> {
            self.commits.borrow().clone()
        }
    }

    impl HubClient for FakeHub {
        fn create_commit(&self, commit: &Commit) -> Result<(), HubError> {
            let call = self.calls.get() + 1;
            self.calls.set(call);
            match (self.rule)(call, commit) {
                Some(err) => Err(err),
                None => {
                    self.commits.borrow_mut().push(commit.clone());
                    Ok(())
                }
            }
        }
    }

    #[derive(Default)]
    struct RecordingSleeper {
        waits: RefCell<Vec<Duration>>,
    }

    impl Sleeper for RecordingSleeper {
        fn sleep(&self, duration: Duration) {
            self.waits.borrow_mut().push(duration);
        }
    }

    fn name(s: &str) -> DocName {
        s.parse().unwrap()
    }

    fn chunks(group: &str, count: u32) -> Vec<Item> {
        (1..=count)
            .map(|i| {
                Item::chunk_from_value(&name(group), json!({"chunk_index": i, "text": "t"}))
                    .unwrap()
            })
            .collect()
    }

    fn options(batch_size: usize, max_retries: u32) -> PublishOptions {
        PublishOptions::new(batch_size, max_retries).unwrap()
    }

    #[test]
    fn options_reject_zero() {
        assert_eq!(PublishOptions::new(0, 3), Err(OptionsError::ZeroBatchSize));
        assert_eq!(PublishOptions::new(50, 0), Err(OptionsError::ZeroRetries));
    }

    #[test]
    fn splits_223_items_into_5_batches() {
        let hub = FakeHub::ok();
        let sleeper = RecordingSleeper::default();
        let publisher = Publisher::new(&hub, options(50, 3)).with_sleeper(&sleeper);

        let items = chunks("doc", 223);
        let report = publisher.publish("doc", &items, "org/chunks");

        assert_eq!(report.uploaded_count, 223);
        assert_eq!(report.failed_count, 0);
        assert_eq!(report.commit_attempts, 5);

        let sizes: Vec<usize> = hub.committed().iter().map(|c| c.files.len()).collect();
        assert_eq!(sizes, vec![50, 50, 50, 50, 23]);
        assert_eq!(hub.committed()[0].message, "Add chunks 1-50 for doc");
        assert_eq!(hub.committed()[4].message, "Add chunks 201-223 for doc");
        assert_eq!(hub.committed()[0].repo, "org/chunks");
        assert!(sleeper.waits.borrow().is_empty());

        let expected: Vec<String> = items.iter().map(|i| i.identifier.clone()).collect();
        assert_eq!(report.uploaded_identifiers, expected);
    }

    #[test]
    fn one_failing_batch_does_not_stop_the_rest() {
        let hub = FakeHub::failing(|_, commit| {
            commit
                .message
                .contains("51-100")
                .then(|| HubError::from_status(500, "boom"))
        });
        let sleeper = RecordingSleeper::default();
        let publisher = Publisher::new(&hub, options(50, 3)).with_sleeper(&sleeper);

        let items = chunks("doc", 223);
        let report = publisher.publish("doc", &items, "org/chunks");

        assert_eq!(report.uploaded_count, 173);
        assert_eq!(report.failed_count, 50);
        assert_eq!(report.failed_identifiers.first().unwrap(), "chunk_51");
        assert_eq!(report.failed_identifiers.last().unwrap(), "chunk_100");
        assert_eq!(report.commit_attempts, 4 + 3);
        assert_eq!(hub.calls(), 7);

        let failed = &report.batches[1];
        assert!(!failed.committed);
        assert_eq!(failed.attempts, 3);
        assert!(failed.error.is_some());
        assert!(report.batches.iter().filter(|b| b.committed).count() == 4);
    }

    #[test]
    fn already_published_items_are_skipped() {
        let hub = FakeHub::ok();
        let publisher = Publisher::new(&hub, options(50, 3)).with_sleeper(RecordingSleeper::default());

        let mut items = chunks("doc", 3);
        items[1].mark_published(chrono::Utc::now());
        let report = publisher.publish("doc", &items, "org/chunks");

        assert_eq!(report.uploaded_count, 2);
        assert_eq!(report.skipped_count, 1);
        assert!(!report.uploaded_identifiers.contains(&"chunk_02".to_string()));
        assert!(!report.failed_identifiers.contains(&"chunk_02".to_string()));
        assert_eq!(hub.committed()[0].files.len(), 2);
    }

    #[test]
    fn all_published_means_no_commit() {
        let hub = FakeHub::ok();
        let publisher = Publisher::new(&hub, options(50, 3)).with_sleeper(RecordingSleeper::default());

        let mut items = chunks("doc", 4);
        for item in &mut items {
            item.mark_published(chrono::Utc::now());
        }
        let report = publisher.publish("doc", &items, "org/chunks");

        assert_eq!(report.skipped_count, 4);
        assert_eq!(report.commit_attempts, 0);
        assert_eq!(hub.calls(), 0);
    }

    #[test]
    fn empty_input_is_an_empty_report() {
        let hub = FakeHub::ok();
        let publisher = Publisher::new(&hub, options(50, 3));

        let report = publisher.publish("doc", &[], "org/chunks");
        assert_eq!(report.total(), 0);
        assert!(report.batches.is_empty());
    }

    #[test]
    fn backoff_grows_between_attempts() {
        let hub = FakeHub::failing(|call, _| {
            (call < 4).then(|| HubError::RateLimited("too many requests".into()))
        });
        let sleeper = RecordingSleeper::default();
        let publisher = Publisher::new(
            &hub,
            options(10, 4).with_backoff_base(Duration::from_millis(100)),
        )
        .with_sleeper(&sleeper);

        let report = publisher.publish("doc", &chunks("doc", 5), "org/chunks");

        assert_eq!(report.uploaded_count, 5);
        assert_eq!(report.commit_attempts, 4);
        assert_eq!(
            *sleeper.waits.borrow(),
            vec![
                Duration::from_millis(200),
                Duration::from_millis(400),
                Duration::from_millis(800)
            ]
        );
    }

    #[test]
    fn rate_limit_on_last_attempt_is_a_failure() {
        let hub = FakeHub::failing(|_, _| Some(HubError::RateLimited("429".into())));
        let sleeper = RecordingSleeper::default();
        let publisher = Publisher::new(&hub, options(10, 3)).with_sleeper(&sleeper);

        let report = publisher.publish("doc", &chunks("doc", 3), "org/chunks");

        assert_eq!(report.failed_count, 3);
        assert_eq!(report.uploaded_count, 0);
        assert_eq!(hub.calls(), 3);
        // No wait after the final attempt
        assert_eq!(sleeper.waits.borrow().len(), 2);
    }

    #[test]
    fn transient_only_fails_fast_on_not_found() {
        let hub = FakeHub::failing(|_, _| Some(HubError::NotFound("org/missing".into())));
        let sleeper = RecordingSleeper::default();
        let publisher = Publisher::new(
            &hub,
            options(10, 3).with_retry_policy(RetryPolicy::TransientOnly),
        )
        .with_sleeper(&sleeper);

        let report = publisher.publish("doc", &chunks("doc", 2), "org/missing");

        assert_eq!(report.failed_count, 2);
        assert_eq!(report.commit_attempts, 1);
        assert!(sleeper.waits.borrow().is_empty());
    }

    #[test]
    fn retry_all_retries_not_found() {
        let hub = FakeHub::failing(|_, _| Some(HubError::NotFound("org/missing".into())));
        let publisher = Publisher::new(&hub, options(10, 3)).with_sleeper(RecordingSleeper::default());

        let report = publisher.publish("doc", &chunks("doc", 2), "org/missing");
        assert_eq!(report.commit_attempts, 3);
    }

    #[test]
    fn foreign_and_unrenderable_items_fail_without_sending() {
        let hub = FakeHub::ok();
        let publisher = Publisher::new(&hub, options(10, 3));

        let mut items = chunks("doc", 2);
        items.extend(chunks("other", 1));
        let mut broken = Item::document(Stage::Chunked, &name("doc"), "x", Metadata::new());
        broken.identifier = "chunk_99".into();
        items.push(broken);

        let report = publisher.publish("doc", &items, "org/chunks");

        assert_eq!(report.uploaded_count, 2);
        assert_eq!(report.failed_count, 2);
        assert_eq!(report.total(), items.len());
        assert_eq!(hub.committed().len(), 1);
        assert_eq!(hub.committed()[0].files.len(), 2);
    }

    #[test]
    fn raw_documents_commit_text_and_meta() {
        let hub = FakeHub::ok();
        let publisher = Publisher::new(&hub, options(50, 3));

        let item = Item::document(Stage::Raw, &name("notes"), "hello", Metadata::new());
        let report = publisher.publish("notes", &[item], "org/raw");

        assert_eq!(report.uploaded_identifiers, vec!["notes"]);
        let commit = &hub.committed()[0];
        assert_eq!(commit.message, "Add raw file: notes");
        assert_eq!(commit.files.len(), 2);
    }

    proptest! {
        #[test]
        fn every_item_is_accounted_for(
            count in 0u32..120,
            batch_size in 1usize..40,
            failing_batch in 0usize..6,
            published in proptest::collection::vec(any::<bool>(), 0..120),
        ) {
            let hub = FakeHub::failing(move |_, commit| {
                commit
                    .message
                    .starts_with(&format!("Add chunks {}-", failing_batch * batch_size + 1))
                    .then(|| HubError::from_status(500, "down"))
            });
            let publisher = Publisher::new(&hub, options(batch_size, 2))
                .with_sleeper(RecordingSleeper::default());

            let mut items = chunks("doc", count);
            for (item, flag) in items.iter_mut().zip(&published) {
                if *flag {
                    item.mark_published(chrono::Utc::now());
                }
            }
            let report = publisher.publish("doc", &items, "org/chunks");

            prop_assert_eq!(report.total(), items.len());
            for batch in &report.batches {
                prop_assert!(batch.attempts <= 2);
                prop_assert!(batch.size <= batch_size);
            }
        }

        #[test]
        fn happy_path_needs_ceil_m_over_n_commits(count in 0u32..300, batch_size in 1usize..64) {
            let hub = FakeHub::ok();
            let publisher = Publisher::new(&hub, options(batch_size, 3));

            let report = publisher.publish("doc", &chunks("doc", count), "org/chunks");

            let expected = (count as usize).div_ceil(batch_size);
            prop_assert_eq!(report.commit_attempts as usize, expected);
            prop_assert_eq!(report.uploaded_count, count as usize);
        }

        #[test]
        fn second_publish_after_marking_uploads_nothing(count in 1u32..80) {
            let hub = FakeHub::ok();
            let publisher = Publisher::new(&hub, options(25, 3));

            let mut items = chunks("doc", count);
            let first = publisher.publish("doc", &items, "org/chunks");
            for item in &mut items {
                if first.uploaded_identifiers.contains(&item.identifier) {
                    item.mark_published(chrono::Utc::now());
                }
            }
            let second = publisher.publish("doc", &items, "org/chunks");

            prop_assert_eq!(second.uploaded_count, 0);
            prop_assert_eq!(second.skipped_count, count as usize);
        }
    }
}
