//! Store configuration.

use crate::StoreResult;
use serde::{Deserialize, Serialize};

/// What happens to a write made through a view outside of any mutation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnauthorizedWritePolicy {
    /// Log a warning, drop the write and report success to the caller.
    #[default]
    Ignore,
    /// Log a warning and fail with `StoreError::UnauthorizedWrite`.
    Reject,
}

/// Tunables for a [`Store`](crate::Store).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Handling of writes made outside a mutation.
    pub unauthorized_writes: UnauthorizedWritePolicy,
    /// Drop pending redo entries when a new history entry is pushed.
    pub clear_redo_on_commit: bool,
    /// Maximum number of history entries kept; `None` keeps everything.
    ///
    /// At least one entry always remains as the base for undo.
    pub history_limit: Option<usize>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            unauthorized_writes: UnauthorizedWritePolicy::Ignore,
            clear_redo_on_commit: true,
            history_limit: None,
        }
    }
}

impl StoreConfig {
    /// Set the unauthorized write policy.
    #[must_use]
    pub fn with_unauthorized_writes(mut self, policy: UnauthorizedWritePolicy) -> Self {
        self.unauthorized_writes = policy;
        self
    }

    /// Keep or drop pending redo entries on new commits.
    #[must_use]
    pub fn with_clear_redo_on_commit(mut self, clear: bool) -> Self {
        self.clear_redo_on_commit = clear;
        self
    }

    /// Bound the number of history entries.
    #[must_use]
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = Some(limit.max(1));
        self
    }

    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> StoreResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.unauthorized_writes, UnauthorizedWritePolicy::Ignore);
        assert!(config.clear_redo_on_commit);
        assert_eq!(config.history_limit, None);
    }

    #[test]
    fn test_from_json_partial() {
        let config =
            StoreConfig::from_json(r#"{"unauthorized_writes": "reject", "history_limit": 10}"#)
                .unwrap();
        assert_eq!(config.unauthorized_writes, UnauthorizedWritePolicy::Reject);
        assert_eq!(config.history_limit, Some(10));
        assert!(config.clear_redo_on_commit);
    }

    #[test]
    fn test_history_limit_floor() {
        assert_eq!(StoreConfig::default().with_history_limit(0).history_limit, Some(1));
    }
}
