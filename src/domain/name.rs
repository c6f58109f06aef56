//! Document names
//!
//! A document name is the stable key shared by a submission's raw text, its
//! cleaned text and its chunk folder (e.g. `grade_10_science`). Names become
//! file and directory names both locally and in the remote collection, so
//! anything that could escape a directory is rejected up front.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum NameError {
    #[error("Document name must not be empty")]
    Empty,

    #[error("Invalid document name '{0}': must not contain path separators or NUL")]
    Separator(String),

    #[error("Invalid document name '{0}': must not start with '.'")]
    Hidden(String),
}

/// Validated document name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocName(String);

impl DocName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DocName {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(NameError::Empty);
        }
        if s.contains(['/', '\\', '\0']) {
            return Err(NameError::Separator(s.to_string()));
        }
        // Also covers "." and ".."
        if s.starts_with('.') {
            return Err(NameError::Hidden(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for DocName {
    type Error = NameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DocName> for String {
    fn from(name: DocName) -> Self {
        name.0
    }
}

impl AsRef<str> for DocName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
