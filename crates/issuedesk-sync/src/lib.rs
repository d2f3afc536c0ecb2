//! Offline-first synchronization engine for IssueDesk.
//!
//! Provides the serial operation queue, the sync coordinator with its
//! cache fallback and conflict reporting, the SQLite issue cache and the
//! durable draft ledger.

pub mod cache;
pub mod conflict;
pub mod coordinator;
pub mod drafts;
pub mod error;
pub mod flags;
pub mod queue;
pub mod repository;
pub mod types;

pub use cache::{CacheResult, LocalCache, SqliteIssueCache};
pub use conflict::{ConflictHandler, ConflictNotice, MutationOutcome};
pub use coordinator::SyncCoordinator;
pub use drafts::{DraftLedger, DraftStatus, IssueDraftRecord};
pub use error::{LedgerError, SyncError, SyncResult};
pub use flags::SyncFlags;
pub use queue::{QueueActivity, SerialOperationQueue};
pub use repository::IssueRepository;
pub use types::{
    AssigneeChange, AssigneeFilter, Board, Comment, IssueDetail, IssueDraft, IssueFilters,
    IssuePatch, IssuePriority, IssueQuery, IssueSort, IssueStatus, IssueSummary, Page, Person,
    SortDirection, SortField,
};
