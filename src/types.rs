//! SIEVE - Core Type Definitions
//! Defines fundamental types used across the filter backends.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SieveError};

/// Name of one logical filter (usually the project name).
///
/// Doubles as the image file name for local filters and as the bitmap key
/// for shared filters, so it must be a single path component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FilterIdentity(String);

impl FilterIdentity {
    /// Validate and wrap an identity.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(SieveError::Config("filter identity must not be empty".into()));
        }
        if name == "." || name == ".." {
            return Err(SieveError::Config(format!(
                "filter identity '{}' is not a valid file name",
                name
            )));
        }
        if name.contains(['/', '\\', '\0']) {
            return Err(SieveError::Config(format!(
                "filter identity '{}' must not contain path separators",
                name
            )));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FilterIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for FilterIdentity {
    type Error = SieveError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<FilterIdentity> for String {
    fn from(id: FilterIdentity) -> Self {
        id.0
    }
}

/// Which backend a filter runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Local,
    Shared,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Local => f.write_str("local"),
            BackendKind::Shared => f.write_str("shared"),
        }
    }
}
