//! Facade for every remote read and write.
//!
//! Reads go through the queue and fall back to the local cache on any
//! failure. Writes go through the queue and always report their failure,
//! raising a [`ConflictNotice`] first when the server rejected them as stale.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;

use crate::cache::LocalCache;
use crate::conflict::{ConflictHandler, ConflictNotice, MutationOutcome};
use crate::drafts::DraftLedger;
use crate::error::{SyncError, SyncResult};
use crate::queue::{QueueActivity, SerialOperationQueue};
use crate::repository::IssueRepository;
use crate::types::{Board, Comment, IssueDetail, IssueDraft, IssuePatch, IssueQuery, IssueSummary};

pub const DEFAULT_CONFLICT_BUFFER: usize = 16;

struct ConflictSink {
    handler: RwLock<Option<ConflictHandler>>,
    tx: broadcast::Sender<ConflictNotice>,
}

impl ConflictSink {
    fn deliver(&self, local_changes: Option<&str>) {
        let notice = ConflictNotice::new(local_changes);
        tracing::warn!("Sync conflict, local changes: {}", notice.local_changes);

        // Clone out so the handler may re-register without deadlocking
        let handler = self.handler.read().clone();
        if let Some(handler) = handler {
            handler(notice.clone());
        }
        let _ = self.tx.send(notice);
    }
}

pub struct SyncCoordinator {
    repository: Arc<dyn IssueRepository>,
    cache: Arc<dyn LocalCache>,
    queue: SerialOperationQueue,
    ledger: Option<Arc<DraftLedger>>,
    conflicts: Arc<ConflictSink>,
    /// Last summary seen per issue id, the base for optimistic updates.
    known: Mutex<HashMap<String, IssueSummary>>,
}

impl SyncCoordinator {
    pub fn new(
        repository: Arc<dyn IssueRepository>,
        cache: Arc<dyn LocalCache>,
        queue: SerialOperationQueue,
    ) -> Self {
        Self::with_conflict_buffer(repository, cache, queue, DEFAULT_CONFLICT_BUFFER)
    }

    pub fn with_conflict_buffer(
        repository: Arc<dyn IssueRepository>,
        cache: Arc<dyn LocalCache>,
        queue: SerialOperationQueue,
        buffer: usize,
    ) -> Self {
        let (tx, _) = broadcast::channel(buffer.max(1));
        Self {
            repository,
            cache,
            queue,
            ledger: None,
            conflicts: Arc::new(ConflictSink {
                handler: RwLock::new(None),
                tx,
            }),
            known: Mutex::new(HashMap::new()),
        }
    }

    /// Record new-issue submissions in `ledger`.
    pub fn with_draft_ledger(mut self, ledger: Arc<DraftLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn queue(&self) -> &SerialOperationQueue {
        &self.queue
    }

    pub fn draft_ledger(&self) -> Option<&Arc<DraftLedger>> {
        self.ledger.as_ref()
    }

    pub fn activity(&self) -> QueueActivity {
        self.queue.activity()
    }

    pub fn subscribe_activity(&self) -> broadcast::Receiver<QueueActivity> {
        self.queue.subscribe()
    }

    /// Register the single handler that presents conflict notices.
    /// Replaces any previous handler.
    pub fn set_conflict_handler(&self, handler: ConflictHandler) {
        *self.conflicts.handler.write() = Some(handler);
    }

    pub fn clear_conflict_handler(&self) {
        *self.conflicts.handler.write() = None;
    }

    /// Stream of conflict notices, for listeners besides the handler.
    pub fn subscribe_conflicts(&self) -> broadcast::Receiver<ConflictNotice> {
        self.conflicts.tx.subscribe()
    }

    /// Run `operation` on the queue and raise a conflict notice if it fails
    /// with 409/412.
    ///
    /// The queue position is taken when this method is called. The notice is
    /// raised by the queued task itself, so it is delivered even when the
    /// returned future is dropped. `local_changes` describes the user's edit.
    pub fn enqueue<T, F, Fut>(
        &self,
        label: impl Into<String>,
        local_changes: Option<String>,
        operation: F,
    ) -> impl Future<Output = SyncResult<T>> + Send + 'static
    where
        T: Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = SyncResult<T>> + Send + 'static,
    {
        let conflicts = self.conflicts.clone();
        self.queue.enqueue(label, move || async move {
            let result = operation().await;
            if MutationOutcome::classify(&result).emits_notice() {
                conflicts.deliver(local_changes.as_deref());
            }
            result
        })
    }

    /// Fetch issues for `query`, caching them. Falls back to the cached
    /// list on any failure.
    pub async fn refresh_issues(&self, query: &IssueQuery) -> Vec<IssueSummary> {
        let repository = self.repository.clone();
        let cache = self.cache.clone();
        let request = query.clone();

        let result = self
            .queue
            .enqueue("Sync issues", move || async move {
                let issues = repository.fetch_issues(&request).await?;
                if let Err(e) = cache.save_issues(&request, &issues) {
                    tracing::error!("Failed to cache issue list: {}", e);
                }
                Ok(issues)
            })
            .await;

        match result {
            Ok(issues) => {
                tracing::info!("Synced {} issues", issues.len());
                self.remember(&issues);
                issues
            }
            Err(e) => {
                tracing::warn!("Issue sync failed, using cache: {}", e);
                self.load_cached_issues(query)
            }
        }
    }

    /// Cached issues for `query`. Never touches the network.
    ///
    /// Cached summaries only seed ids not known yet; they never replace an
    /// optimistic edit.
    pub fn load_cached_issues(&self, query: &IssueQuery) -> Vec<IssueSummary> {
        match self.cache.load_cached_issues(query) {
            Ok(issues) => {
                let mut known = self.known.lock();
                for issue in &issues {
                    known
                        .entry(issue.id.clone())
                        .or_insert_with(|| issue.clone());
                }
                issues
            }
            Err(e) => {
                tracing::warn!("Failed to read cached issues: {}", e);
                Vec::new()
            }
        }
    }

    /// Apply `patch` to the last known summary for `id` in memory.
    ///
    /// Returns `None` when the issue has not been loaded yet. The change is
    /// not written to the cache and not rolled back if the remote update
    /// fails; the next successful remote refresh replaces it.
    pub fn apply_optimistic_update(&self, id: &str, patch: &IssuePatch) -> Option<IssueSummary> {
        let mut known = self.known.lock();
        let summary = known.get_mut(id)?;
        *summary = patch.apply_to(summary);
        Some(summary.clone())
    }

    /// Last summary the coordinator has seen for `id`, including optimistic edits.
    pub fn last_known(&self, id: &str) -> Option<IssueSummary> {
        self.known.lock().get(id).cloned()
    }

    /// Optimistically patch the issue, then send the patch to the server.
    ///
    /// # Errors
    /// Returns the queue or repository error. A conflict also raises a
    /// notice carrying the patch description.
    pub async fn update_issue(&self, id: &str, patch: IssuePatch) -> SyncResult<IssueSummary> {
        let last_seen: Option<DateTime<Utc>> = self.known.lock().get(id).map(|s| s.updated_at);
        self.apply_optimistic_update(id, &patch);

        let repository = self.repository.clone();
        let issue_id = id.to_string();
        let local_changes = patch.describe();

        let updated = self
            .enqueue("Update issue", Some(local_changes), move || async move {
                repository.update_issue(&issue_id, &patch, last_seen).await
            })
            .await?;

        self.remember(std::slice::from_ref(&updated));
        Ok(updated)
    }

    /// Create an issue, recording the attempt in the draft ledger first.
    ///
    /// # Errors
    /// Returns `SyncError::Ledger` if the draft could not be recorded (the
    /// request is not sent), otherwise the queue or repository error.
    pub async fn create_issue(&self, draft: IssueDraft) -> SyncResult<IssueSummary> {
        let record_id = match &self.ledger {
            Some(ledger) => Some(ledger.save_draft(draft.clone())?.id),
            None => None,
        };

        let repository = self.repository.clone();
        let local_changes = format!("New issue: {}", draft.title);
        let result = self
            .enqueue("Create issue", Some(local_changes), move || async move {
                repository.create_issue(&draft).await
            })
            .await;

        if let (Some(ledger), Some(id)) = (&self.ledger, record_id) {
            let marked = match &result {
                Ok(_) => ledger.mark_draft_submitted(&id),
                Err(e) => ledger.mark_draft_failed(&id, &e.to_string()),
            };
            // The server outcome stands even if the ledger can't record it
            if let Err(e) = marked {
                tracing::error!("Failed to update draft {}: {}", id, e);
            }
        }

        let created = result?;
        tracing::info!("Created issue {}", created.key);
        self.remember(std::slice::from_ref(&created));
        Ok(created)
    }

    /// # Errors
    /// Returns the queue or repository error.
    pub async fn add_comment(&self, issue_id: &str, text: &str) -> SyncResult<Comment> {
        let repository = self.repository.clone();
        let issue_id = issue_id.to_string();
        let body = text.to_string();

        self.enqueue("Add comment", Some(text.to_string()), move || async move {
            repository.add_comment(&issue_id, &body).await
        })
        .await
    }

    /// Fetch the full issue, caching it. Falls back to the cached detail.
    pub async fn fetch_issue_detail(&self, issue: &IssueSummary) -> Option<IssueDetail> {
        let repository = self.repository.clone();
        let cache = self.cache.clone();
        let request = issue.clone();

        let result = self
            .queue
            .enqueue("Load issue", move || async move {
                let detail = repository.fetch_issue_detail(&request).await?;
                if let Err(e) = cache.save_issue_detail(&detail) {
                    tracing::error!("Failed to cache issue {}: {}", detail.summary.id, e);
                }
                Ok(detail)
            })
            .await;

        match result {
            Ok(detail) => {
                self.remember(std::slice::from_ref(&detail.summary));
                Some(detail)
            }
            Err(e) => {
                tracing::warn!("Loading issue {} failed, using cache: {}", issue.id, e);
                self.cache.load_issue_detail(&issue.id).unwrap_or_else(|e| {
                    tracing::warn!("Failed to read cached issue {}: {}", issue.id, e);
                    None
                })
            }
        }
    }

    /// Remember that the user has looked at `issue` as of its `updated_at`.
    pub fn mark_issue_seen(&self, issue: &IssueSummary) {
        if let Err(e) = self.cache.mark_issue_seen(&issue.id, issue.updated_at) {
            tracing::warn!("Failed to mark issue {} seen: {}", issue.id, e);
        }
    }

    /// Seen markers for `ids`; issues never seen are absent.
    pub fn load_issue_seen_updates(&self, ids: &[String]) -> HashMap<String, DateTime<Utc>> {
        self.cache.load_issue_seen_updates(ids).unwrap_or_else(|e| {
            tracing::warn!("Failed to read seen markers: {}", e);
            HashMap::new()
        })
    }

    /// Drop cached lists and details, ordered after work already queued.
    ///
    /// # Errors
    /// Returns `SyncError::Cache` if the cache could not be cleared.
    pub async fn clear_cached_issues(&self) -> SyncResult<()> {
        let cache = self.cache.clone();
        let result = self
            .queue
            .enqueue("Clear cache", move || async move {
                cache.clear_cached_issues().map_err(SyncError::from)
            })
            .await;

        match result {
            // Clearing is local, so a refusing queue must not block it
            Err(SyncError::SyncingDisabled) | Err(SyncError::RuntimeUnavailable) => {
                self.cache.clear_cached_issues().map_err(SyncError::from)
            }
            other => other,
        }?;

        self.known.lock().clear();
        tracing::info!("Cleared cached issues");
        Ok(())
    }

    /// Fetch boards for `project_id`, caching them. Falls back to the cache.
    pub async fn refresh_boards(&self, project_id: &str) -> Vec<Board> {
        let repository = self.repository.clone();
        let cache = self.cache.clone();
        let project = project_id.to_string();

        let result = self
            .queue
            .enqueue("Sync boards", move || async move {
                let boards = repository.fetch_boards(&project).await?;
                if let Err(e) = cache.save_boards(&project, &boards) {
                    tracing::error!("Failed to cache boards for {}: {}", project, e);
                }
                Ok(boards)
            })
            .await;

        match result {
            Ok(boards) => boards,
            Err(e) => {
                tracing::warn!("Board sync failed, using cache: {}", e);
                self.load_cached_boards(project_id)
            }
        }
    }

    pub fn load_cached_boards(&self, project_id: &str) -> Vec<Board> {
        self.cache.load_boards(project_id).unwrap_or_else(|e| {
            tracing::warn!("Failed to read cached boards: {}", e);
            Vec::new()
        })
    }

    /// Record server-confirmed summaries.
    fn remember(&self, issues: &[IssueSummary]) {
        let mut known = self.known.lock();
        for issue in issues {
            known.insert(issue.id.clone(), issue.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;
    use crate::cache::SqliteIssueCache;
    use crate::flags::SyncFlags;
    use crate::types::{AssigneeChange, IssuePriority, IssueStatus, Person};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Repository that answers every call from a fixed script.
    struct ScriptedRepository {
        issues: Vec<IssueSummary>,
        fail_status: Mutex<Option<u16>>,
        calls: AtomicUsize,
    }

    impl ScriptedRepository {
        fn ok(issues: Vec<IssueSummary>) -> Self {
            Self {
                issues,
                fail_status: Mutex::new(None),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing(status: u16) -> Self {
            Self {
                issues: Vec::new(),
                fail_status: Mutex::new(Some(status)),
                calls: AtomicUsize::new(0),
            }
        }

        /// Fail every later call with `status`, or succeed again with `None`.
        fn fail_with(&self, status: Option<u16>) {
            *self.fail_status.lock() = status;
        }

        fn check(&self) -> SyncResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match *self.fail_status.lock() {
                Some(status) => Err(SyncError::remote(status, "scripted failure")),
                None => Ok(()),
            }
        }
    }

    #[async_trait]
    impl IssueRepository for ScriptedRepository {
        async fn fetch_issues(&self, _query: &IssueQuery) -> SyncResult<Vec<IssueSummary>> {
            self.check()?;
            Ok(self.issues.clone())
        }

        async fn fetch_issue_detail(&self, issue: &IssueSummary) -> SyncResult<IssueDetail> {
            self.check()?;
            Ok(IssueDetail {
                summary: issue.clone(),
                reporter: None,
                module: None,
                comments: Vec::new(),
                created_at: issue.updated_at,
            })
        }

        async fn create_issue(&self, draft: &IssueDraft) -> SyncResult<IssueSummary> {
            self.check()?;
            let mut created = summary("new-1");
            created.title = draft.title.clone();
            Ok(created)
        }

        async fn update_issue(
            &self,
            id: &str,
            patch: &IssuePatch,
            _last_seen: Option<DateTime<Utc>>,
        ) -> SyncResult<IssueSummary> {
            self.check()?;
            Ok(patch.apply_to(&summary(id)))
        }

        async fn add_comment(&self, issue_id: &str, text: &str) -> SyncResult<Comment> {
            self.check()?;
            Ok(Comment {
                id: "c1".to_string(),
                issue_id: issue_id.to_string(),
                author: person(),
                body: text.to_string(),
                created_at: Utc::now(),
            })
        }

        async fn fetch_boards(&self, project_id: &str) -> SyncResult<Vec<Board>> {
            self.check()?;
            Ok(vec![Board {
                id: "b1".to_string(),
                project_id: project_id.to_string(),
                name: "Sprint".to_string(),
            }])
        }
    }

    fn person() -> Person {
        Person {
            id: "u1".to_string(),
            display_name: "Sam".to_string(),
        }
    }

    fn summary(id: &str) -> IssueSummary {
        IssueSummary {
            id: id.to_string(),
            key: format!("CORE-{}", id),
            project_id: "core".to_string(),
            title: format!("Issue {}", id),
            description: None,
            status: IssueStatus::Todo,
            priority: IssuePriority::Normal,
            assignee: None,
            updated_at: "2026-03-01T10:00:00Z".parse().unwrap(),
        }
    }

    fn coordinator(repository: ScriptedRepository) -> (SyncCoordinator, Arc<SqliteIssueCache>) {
        coordinator_with(Arc::new(repository))
    }

    fn coordinator_with(
        repository: Arc<ScriptedRepository>,
    ) -> (SyncCoordinator, Arc<SqliteIssueCache>) {
        let cache = Arc::new(SqliteIssueCache::in_memory().unwrap());
        let queue = SerialOperationQueue::new(Arc::new(SyncFlags::default()));
        let coordinator = SyncCoordinator::new(repository, cache.clone(), queue);
        (coordinator, cache)
    }

    fn counting_handler(coordinator: &SyncCoordinator) -> Arc<Mutex<Vec<ConflictNotice>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        coordinator.set_conflict_handler(Arc::new(move |notice: ConflictNotice| sink.lock().push(notice)));
        seen
    }

    #[tokio::test]
    async fn test_refresh_persists_fresh_issues() {
        let (coordinator, cache) = coordinator(ScriptedRepository::ok(vec![summary("1")]));
        let query = IssueQuery::new().with_project("core");

        let issues = coordinator.refresh_issues(&query).await;
        assert_eq!(issues.len(), 1);
        assert_eq!(cache.load_cached_issues(&query).unwrap(), issues);
        assert!(coordinator.last_known("1").is_some());
    }

    #[tokio::test]
    async fn test_refresh_falls_back_to_cache() {
        let (coordinator, cache) = coordinator(ScriptedRepository::failing(500));
        let query = IssueQuery::new();
        cache.save_issues(&query, &[summary("cached")]).unwrap();

        let issues = coordinator.refresh_issues(&query).await;
        assert_eq!(issues, vec![summary("cached")]);

        let other = IssueQuery::new().with_search("nothing cached");
        assert!(coordinator.refresh_issues(&other).await.is_empty());
    }

    #[tokio::test]
    async fn test_optimistic_update_patches_known_summary() {
        let (coordinator, _cache) = coordinator(ScriptedRepository::ok(vec![summary("1")]));
        let patch = IssuePatch {
            status: Some(IssueStatus::Done),
            ..Default::default()
        };

        assert!(coordinator.apply_optimistic_update("1", &patch).is_none());

        coordinator.refresh_issues(&IssueQuery::new()).await;
        let patched = coordinator.apply_optimistic_update("1", &patch).unwrap();
        assert_eq!(patched.status, IssueStatus::Done);
        assert_eq!(coordinator.last_known("1").unwrap().status, IssueStatus::Done);
    }

    #[tokio::test]
    async fn test_update_conflict_notifies_with_patch_description() {
        let (coordinator, _cache) = coordinator(ScriptedRepository::failing(409));
        let seen = counting_handler(&coordinator);
        let mut stream = coordinator.subscribe_conflicts();

        let patch = IssuePatch {
            assignee: AssigneeChange::Clear,
            ..Default::default()
        };
        let err = coordinator.update_issue("1", patch).await.unwrap_err();
        assert!(err.is_conflict());

        let notices = seen.lock().clone();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].local_changes, "Assignee: (none)");
        assert_eq!(stream.try_recv().unwrap(), notices[0]);
    }

    #[tokio::test]
    async fn test_conflict_notice_delivered_when_caller_stops_waiting() {
        let (coordinator, _cache) = coordinator(ScriptedRepository::ok(Vec::new()));
        let seen = counting_handler(&coordinator);

        let abandoned =
            coordinator.enqueue("Update issue", Some("Status: done".to_string()), || async {
                Err::<(), _>(SyncError::remote(409, "stale"))
            });
        drop(abandoned);

        // Runs only after the abandoned operation has finished
        coordinator
            .queue()
            .enqueue("Barrier", || async { Ok(()) })
            .await
            .unwrap();

        let notices = seen.lock().clone();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].local_changes, "Status: done");
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_optimistic_edit() {
        let repository = Arc::new(ScriptedRepository::ok(vec![summary("1")]));
        let (coordinator, _cache) = coordinator_with(repository.clone());
        let query = IssueQuery::new();
        coordinator.refresh_issues(&query).await;

        let patch = IssuePatch {
            status: Some(IssueStatus::Done),
            ..Default::default()
        };
        coordinator.apply_optimistic_update("1", &patch).unwrap();

        repository.fail_with(Some(503));
        let cached = coordinator.refresh_issues(&query).await;
        assert_eq!(cached[0].status, IssueStatus::Todo);
        assert_eq!(coordinator.last_known("1").unwrap().status, IssueStatus::Done);

        repository.fail_with(None);
        coordinator.refresh_issues(&query).await;
        assert_eq!(coordinator.last_known("1").unwrap().status, IssueStatus::Todo);
    }

    #[tokio::test]
    async fn test_failed_update_keeps_optimistic_value() {
        let repository = Arc::new(ScriptedRepository::ok(vec![summary("1")]));
        let (coordinator, _cache) = coordinator_with(repository.clone());
        coordinator.refresh_issues(&IssueQuery::new()).await;
        let seen = counting_handler(&coordinator);

        repository.fail_with(Some(412));
        let patch = IssuePatch {
            title: Some("Renamed".to_string()),
            ..Default::default()
        };
        let err = coordinator.update_issue("1", patch).await.unwrap_err();
        assert!(err.is_conflict());

        assert_eq!(coordinator.last_known("1").unwrap().title, "Renamed");
        assert_eq!(seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_non_conflict_failure_is_silent() {
        let (coordinator, _cache) = coordinator(ScriptedRepository::failing(404));
        let seen = counting_handler(&coordinator);

        let err = coordinator.add_comment("1", "hello").await.unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert!(seen.lock().is_empty());
    }

    #[tokio::test]
    async fn test_create_issue_records_ledger_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Arc::new(DraftLedger::in_dir(dir.path()));
        let (coordinator, _cache) = coordinator(ScriptedRepository::ok(Vec::new()));
        let coordinator = coordinator.with_draft_ledger(ledger.clone());

        let draft = IssueDraft {
            project_id: "core".to_string(),
            module: None,
            title: "Add export".to_string(),
            description: None,
            assignee: Some(person()),
            priority: IssuePriority::Urgent,
        };
        let created = coordinator.create_issue(draft.clone()).await.unwrap();
        assert_eq!(created.title, "Add export");
        assert_eq!(ledger.latest_submitted_draft().unwrap(), Some(draft));
    }

    #[tokio::test]
    async fn test_failed_create_marks_draft_failed() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Arc::new(DraftLedger::in_dir(dir.path()));
        let (coordinator, _cache) = coordinator(ScriptedRepository::failing(503));
        let coordinator = coordinator.with_draft_ledger(ledger.clone());

        let draft = IssueDraft {
            project_id: "core".to_string(),
            module: None,
            title: "Lost?".to_string(),
            description: None,
            assignee: None,
            priority: IssuePriority::Normal,
        };
        assert!(coordinator.create_issue(draft).await.is_err());

        let drafts = ledger.resubmittable_drafts().unwrap();
        assert_eq!(drafts.len(), 1);
        assert!(drafts[0].last_error.as_deref().unwrap().contains("503"));
        assert!(ledger.latest_submitted_draft().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_detail_and_boards_fall_back_to_cache() {
        let (coordinator, cache) = coordinator(ScriptedRepository::failing(502));
        let issue = summary("1");
        assert!(coordinator.fetch_issue_detail(&issue).await.is_none());
        assert!(coordinator.refresh_boards("core").await.is_empty());

        let board = Board {
            id: "b9".to_string(),
            project_id: "core".to_string(),
            name: "Cached".to_string(),
        };
        cache.save_boards("core", std::slice::from_ref(&board)).unwrap();
        assert_eq!(coordinator.refresh_boards("core").await, vec![board]);
    }

    #[tokio::test]
    async fn test_seen_markers_and_clear() {
        let (coordinator, cache) = coordinator(ScriptedRepository::ok(vec![summary("1")]));
        let query = IssueQuery::new();
        let issues = coordinator.refresh_issues(&query).await;
        coordinator.mark_issue_seen(&issues[0]);

        coordinator.clear_cached_issues().await.unwrap();
        assert!(coordinator.load_cached_issues(&query).is_empty());
        assert!(coordinator.last_known("1").is_none());
        assert_eq!(cache.cached_list_count().unwrap(), 0);

        let seen = coordinator.load_issue_seen_updates(&["1".to_string(), "2".to_string()]);
        assert_eq!(seen.get("1"), Some(&issues[0].updated_at));
        assert!(!seen.contains_key("2"));
    }

    #[tokio::test]
    async fn test_clear_works_while_syncing_disabled() {
        let flags = Arc::new(SyncFlags::new(true));
        let cache = Arc::new(SqliteIssueCache::in_memory().unwrap());
        let coordinator = SyncCoordinator::new(
            Arc::new(ScriptedRepository::ok(Vec::new())),
            cache.clone(),
            SerialOperationQueue::new(flags),
        );
        cache.save_issues(&IssueQuery::new(), &[summary("1")]).unwrap();

        coordinator.clear_cached_issues().await.unwrap();
        assert_eq!(cache.cached_list_count().unwrap(), 0);
    }
}
