//! Output schema versioning.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};

/// Schema version written by this build
pub const CURRENT_SCHEMA_VERSION: &str = "1.0.0";

/// Layout version of the columnar artifacts (`info.json::codebase_version`)
pub const CODEBASE_VERSION: &str = "v3.0";

/// Semantic version triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SchemaVersion {
    /// Breaking changes
    pub major: u32,
    /// Additive changes
    pub minor: u32,
    /// Fixes
    pub patch: u32,
}

impl SchemaVersion {
    /// Parse `MAJOR.MINOR.PATCH`.
    pub fn parse(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.trim().split('.').collect();
        if parts.len() != 3 {
            return Err(CoreError::InvalidSchemaVersion(s.to_string()));
        }
        let num = |p: &str| {
            p.parse::<u32>()
                .map_err(|_| CoreError::InvalidSchemaVersion(s.to_string()))
        };
        Ok(SchemaVersion {
            major: num(parts[0])?,
            minor: num(parts[1])?,
            patch: num(parts[2])?,
        })
    }

    /// The version this build writes
    pub fn current() -> Self {
        SchemaVersion {
            major: 1,
            minor: 0,
            patch: 0,
        }
    }

    /// Readable by a reader of `other` (same major)
    pub fn is_compatible_with(&self, other: &SchemaVersion) -> bool {
        self.major == other.major
    }
}

impl std::fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}
