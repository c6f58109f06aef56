//! Domain models for stagehub
//!
//! Contains the staged-content model without any I/O concerns.

mod item;
mod name;
mod stage;

pub use item::{
    chunk_identifier, format_timestamp, Item, ItemError, Metadata, CHUNK_INDEX_KEY, PUBLISHED_KEY,
};
pub use name::{DocName, NameError};
pub use stage::{Area, Stage, StageError};
