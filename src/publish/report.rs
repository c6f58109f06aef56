//! Publish outcomes

use serde::Serialize;

/// What happened to one batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    /// 1-based position of the batch's first item among the batched items
    pub first: usize,
    /// 1-based position of the batch's last item
    pub last: usize,
    pub size: usize,
    pub attempts: u32,
    pub committed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of one `publish` call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PublishReport {
    pub target_collection: String,
    pub group: String,
    pub uploaded_count: usize,
    /// Identifiers committed by this call, in input order
    pub uploaded_identifiers: Vec<String>,
    pub failed_count: usize,
    /// Identifiers that did not reach the remote collection, first failure first
    pub failed_identifiers: Vec<String>,
    /// Items that already carried a published marker
    pub skipped_count: usize,
    pub commit_attempts: u32,
    pub batches: Vec<BatchOutcome>,
}

impl PublishReport {
    pub fn new(target_collection: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            target_collection: target_collection.into(),
            group: group.into(),
            ..Self::default()
        }
    }

    pub(crate) fn record_uploaded(&mut self, identifier: &str) {
        self.uploaded_count += 1;
        self.uploaded_identifiers.push(identifier.to_string());
    }

    pub(crate) fn record_failed(&mut self, identifier: &str) {
        self.failed_count += 1;
        if !self.failed_identifiers.iter().any(|id| id == identifier) {
            self.failed_identifiers.push(identifier.to_string());
        }
    }

    pub(crate) fn record_skipped(&mut self) {
        self.skipped_count += 1;
    }

    /// Number of items accounted for; always the number of input items
    pub fn total(&self) -> usize {
        self.uploaded_count + self.failed_count + self.skipped_count
    }

    pub fn has_failures(&self) -> bool {
        self.failed_count > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_identifiers_are_a_set() {
        let mut report = PublishReport::new("org/data", "doc");
        report.record_failed("chunk_01");
        report.record_failed("chunk_02");
        report.record_failed("chunk_01");

        assert_eq!(report.failed_count, 3);
        assert_eq!(report.failed_identifiers, vec!["chunk_01", "chunk_02"]);
    }

    #[test]
    fn total_counts_every_outcome() {
        let mut report = PublishReport::new("org/data", "doc");
        report.record_uploaded("a");
        report.record_failed("b");
        report.record_skipped();

        assert_eq!(report.total(), 3);
        assert!(report.has_failures());
    }
}
