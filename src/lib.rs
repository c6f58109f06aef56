//! stagehub - staged review and batch publishing for text datasets
//!
//! Submissions move through raw, cleaned and chunked stages. Each waits in a
//! pending area until a reviewer approves it; approved content is pushed to
//! a remote dataset hub in batched, retried commits and marked as published
//! so later pushes skip it.

pub mod cli;
pub mod domain;
pub mod publish;
pub mod storage;

pub use domain::{Area, DocName, Item, Stage};
pub use publish::{HubClient, PublishOptions, PublishReport, Publisher};
pub use storage::{Project, StagedStore};
