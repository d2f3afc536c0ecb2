//! Remote tracker contract consumed by the coordinator.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::SyncResult;
use crate::types::{Board, Comment, IssueDetail, IssueDraft, IssuePatch, IssueQuery, IssueSummary};

/// Remote issue tracker.
///
/// Implementations must report non-2xx responses as `SyncError::Remote`
/// with the HTTP status, so conflicts (409/412) can be told apart from
/// other rejections. Retry policy, if any, lives in the implementation.
#[async_trait]
pub trait IssueRepository: Send + Sync {
    async fn fetch_issues(&self, query: &IssueQuery) -> SyncResult<Vec<IssueSummary>>;

    async fn fetch_issue_detail(&self, issue: &IssueSummary) -> SyncResult<IssueDetail>;

    async fn create_issue(&self, draft: &IssueDraft) -> SyncResult<IssueSummary>;

    /// `last_seen` is the `updated_at` of the summary the patch was made
    /// against; implementations send it as a concurrency precondition.
    async fn update_issue(
        &self,
        id: &str,
        patch: &IssuePatch,
        last_seen: Option<DateTime<Utc>>,
    ) -> SyncResult<IssueSummary>;

    async fn add_comment(&self, issue_id: &str, text: &str) -> SyncResult<Comment>;

    async fn fetch_boards(&self, project_id: &str) -> SyncResult<Vec<Board>>;
}
