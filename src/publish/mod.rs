//! # Publishing
//!
//! Sends approved content to a remote dataset hub.
//!
//! - [`Publisher`] batches the items of one group into commits and retries
//!   failed commits with exponential backoff
//! - [`PushRunner`] walks the approved area and records what was published
//! - [`HttpHub`] is the HTTP [`HubClient`]

mod backoff;
mod batch;
mod http;
mod hub;
mod layout;
mod push;
mod report;

pub use backoff::{backoff_delay, Sleeper, ThreadSleeper};
pub use batch::{OptionsError, PublishOptions, Publisher, RetryPolicy};
pub use http::HttpHub;
pub use hub::{Commit, CommitFile, HubClient, HubError};
pub use layout::{commit_message, remote_files, RenderError};
pub use push::{FilePush, PushRequest, PushRunner, PushScope, PushSummary, StagePush};
pub use report::{BatchOutcome, PublishReport};
