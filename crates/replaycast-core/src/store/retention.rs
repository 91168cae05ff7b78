//! Retention policy: how long finished tasks stay pollable.

use std::time::Duration;

use serde::Deserialize;

/// Bounds on finished (succeeded or failed) records.
///
/// Pending and running records are never evicted. A `None` bound disables
/// that half of the policy.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetentionPolicy {
    /// Drop finished records older than this.
    #[serde(with = "crate::config::duration_secs_opt")]
    pub ttl: Option<Duration>,

    /// Keep at most this many finished records (oldest go first).
    #[serde(with = "crate::config::count_opt")]
    pub max_entries: Option<usize>,
}

impl RetentionPolicy {
    /// Keep everything for the life of the process.
    pub fn unbounded() -> Self {
        Self {
            ttl: None,
            max_entries: None,
        }
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            ttl: Some(Duration::from_secs(60 * 60)),
            max_entries: Some(256),
        }
    }
}
