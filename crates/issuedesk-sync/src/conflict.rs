//! Optimistic-concurrency conflict reporting.

use std::sync::Arc;

use crate::error::SyncError;

pub const CONFLICT_TITLE: &str = "Sync Conflict";

pub const CONFLICT_MESSAGE: &str = "Your local changes could not be applied because the item \
     changed on the server. Refresh to get the latest version, then reapply your edit.";

/// Placeholder used when the caller did not describe its change.
pub const UNKNOWN_LOCAL_CHANGES: &str = "No description of the local changes was recorded.";

/// Alert payload raised when a queued mutation hits a 409/412.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictNotice {
    pub title: String,
    pub message: String,
    /// What the user was trying to do, kept so it can be reapplied by hand.
    pub local_changes: String,
}

impl ConflictNotice {
    pub fn new(local_changes: Option<&str>) -> Self {
        let local_changes = local_changes
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .unwrap_or(UNKNOWN_LOCAL_CHANGES);

        Self {
            title: CONFLICT_TITLE.to_string(),
            message: CONFLICT_MESSAGE.to_string(),
            local_changes: local_changes.to_string(),
        }
    }
}

/// Callback registered by the UI to present conflict notices.
pub type ConflictHandler = Arc<dyn Fn(ConflictNotice) + Send + Sync>;

/// Where a queued mutation ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    Succeeded,
    /// Any failure other than a concurrency conflict.
    FailedTransient,
    FailedConflict,
}

impl MutationOutcome {
    pub fn classify<T>(result: &Result<T, SyncError>) -> Self {
        match result {
            Ok(_) => MutationOutcome::Succeeded,
            Err(e) if e.is_conflict() => MutationOutcome::FailedConflict,
            Err(_) => MutationOutcome::FailedTransient,
        }
    }

    /// Only conflicts produce a notice.
    pub fn emits_notice(self) -> bool {
        matches!(self, MutationOutcome::FailedConflict)
    }
}
