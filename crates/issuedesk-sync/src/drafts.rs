//! Durable ledger of new-issue submissions.
//!
//! Every submission is recorded before the network call so that a crash or
//! a failed request never loses what the user typed. The ledger also
//! provides the defaults for the next new-issue form.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LedgerError;
use crate::types::IssueDraft;

pub const DEFAULT_DRAFTS_FILE: &str = "issue_drafts.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DraftStatus {
    Pending,
    Submitted,
    Failed,
}

impl DraftStatus {
    /// Allowed moves. Nothing returns to `Pending`, `Submitted` is final.
    pub fn can_transition_to(self, next: DraftStatus) -> bool {
        matches!(
            (self, next),
            (DraftStatus::Pending, DraftStatus::Submitted)
                | (DraftStatus::Pending, DraftStatus::Failed)
                | (DraftStatus::Failed, DraftStatus::Submitted)
                | (DraftStatus::Failed, DraftStatus::Failed)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueDraftRecord {
    pub id: String,
    pub draft: IssueDraft,
    pub status: DraftStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_error: Option<String>,
}

/// File-backed draft ledger.
///
/// All operations go through one lock and rewrite the whole file, which is
/// replaced by rename so readers only ever see a complete collection.
pub struct DraftLedger {
    path: PathBuf,
    lock: Mutex<()>,
}

impl DraftLedger {
    /// Ledger stored at `path`. The file is created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Ledger stored as `issue_drafts.json` inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(DEFAULT_DRAFTS_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record a new pending draft and persist it before returning.
    pub fn save_draft(&self, draft: IssueDraft) -> Result<IssueDraftRecord, LedgerError> {
        let _guard = self.lock.lock();
        let mut records = self.load()?;

        let now = Utc::now();
        let record = IssueDraftRecord {
            id: Uuid::new_v4().to_string(),
            draft,
            status: DraftStatus::Pending,
            created_at: now,
            updated_at: now,
            submitted_at: None,
            last_error: None,
        };
        records.push(record.clone());
        self.store(&records)?;

        tracing::debug!("Saved draft {}", record.id);
        Ok(record)
    }

    /// Mark a draft as accepted by the server. `Ok(None)` for unknown ids.
    pub fn mark_draft_submitted(&self, id: &str) -> Result<Option<IssueDraftRecord>, LedgerError> {
        self.transition(id, DraftStatus::Submitted, None)
    }

    /// Mark a draft as rejected, keeping the error text. `Ok(None)` for unknown ids.
    pub fn mark_draft_failed(
        &self,
        id: &str,
        error: &str,
    ) -> Result<Option<IssueDraftRecord>, LedgerError> {
        self.transition(id, DraftStatus::Failed, Some(error))
    }

    fn transition(
        &self,
        id: &str,
        next: DraftStatus,
        error: Option<&str>,
    ) -> Result<Option<IssueDraftRecord>, LedgerError> {
        let _guard = self.lock.lock();
        let mut records = self.load()?;

        let Some(record) = records.iter_mut().find(|r| r.id == id) else {
            return Ok(None);
        };

        if !record.status.can_transition_to(next) {
            tracing::debug!(
                "Ignoring {:?} -> {:?} for draft {}",
                record.status,
                next,
                id
            );
            return Ok(Some(record.clone()));
        }

        let now = Utc::now();
        record.status = next;
        record.updated_at = now;
        match next {
            DraftStatus::Submitted => {
                record.submitted_at = Some(now);
                record.last_error = None;
            }
            DraftStatus::Failed => record.last_error = error.map(str::to_string),
            DraftStatus::Pending => {}
        }

        let updated = record.clone();
        self.store(&records)?;
        Ok(Some(updated))
    }

    /// Payload of the most recently submitted draft, for prefilling the form.
    pub fn latest_submitted_draft(&self) -> Result<Option<IssueDraft>, LedgerError> {
        let _guard = self.lock.lock();
        let records = self.load()?;

        Ok(records
            .into_iter()
            .filter(|r| r.status == DraftStatus::Submitted)
            .filter_map(|r| r.submitted_at.map(|at| (at, r.draft)))
            .max_by_key(|(at, _)| *at)
            .map(|(_, draft)| draft))
    }

    /// Replace the payload of a draft. Status is unchanged.
    pub fn update_draft(
        &self,
        id: &str,
        draft: IssueDraft,
    ) -> Result<Option<IssueDraftRecord>, LedgerError> {
        let _guard = self.lock.lock();
        let mut records = self.load()?;

        let Some(record) = records.iter_mut().find(|r| r.id == id) else {
            return Ok(None);
        };
        record.draft = draft;
        record.updated_at = Utc::now();

        let updated = record.clone();
        self.store(&records)?;
        Ok(Some(updated))
    }

    /// Remove a draft. Returns whether anything was removed.
    pub fn delete_draft(&self, id: &str) -> Result<bool, LedgerError> {
        let _guard = self.lock.lock();
        let mut records = self.load()?;

        let before = records.len();
        records.retain(|r| r.id != id);
        if records.len() == before {
            return Ok(false);
        }

        self.store(&records)?;
        Ok(true)
    }

    /// All records in creation order.
    pub fn drafts(&self) -> Result<Vec<IssueDraftRecord>, LedgerError> {
        let _guard = self.lock.lock();
        self.load()
    }

    pub fn draft(&self, id: &str) -> Result<Option<IssueDraftRecord>, LedgerError> {
        Ok(self.drafts()?.into_iter().find(|r| r.id == id))
    }

    /// Drafts whose submission never resolved, e.g. the process died mid-request.
    pub fn pending_drafts(&self) -> Result<Vec<IssueDraftRecord>, LedgerError> {
        Ok(self
            .drafts()?
            .into_iter()
            .filter(|r| r.status == DraftStatus::Pending)
            .collect())
    }

    /// Drafts that may be offered for resubmission.
    pub fn resubmittable_drafts(&self) -> Result<Vec<IssueDraftRecord>, LedgerError> {
        Ok(self
            .drafts()?
            .into_iter()
            .filter(|r| r.status != DraftStatus::Submitted)
            .collect())
    }

    fn load(&self) -> Result<Vec<IssueDraftRecord>, LedgerError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let json = fs::read_to_string(&self.path)?;
        if json.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&json)?)
    }

    fn store(&self, records: &[IssueDraftRecord]) -> Result<(), LedgerError> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent)?;

        let json = serde_json::to_string_pretty(records)?;
        let tmp_path = self.path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        // Persist the rename itself; directories can't be opened on every platform
        if let Ok(dir) = fs::File::open(parent) {
            let _ = dir.sync_all();
        }
        Ok(())
    }
}
