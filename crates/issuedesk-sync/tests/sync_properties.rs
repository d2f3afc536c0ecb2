//! Behavioural tests for the queue, coordinator and draft ledger.
//!
//! These run the public API end to end against an in-memory cache and a
//! scripted repository.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use issuedesk_sync::{
    Board, Comment, ConflictNotice, DraftLedger, IssueDetail, IssueDraft, IssuePatch,
    IssuePriority, IssueQuery, IssueRepository, IssueStatus, IssueSummary, LocalCache,
    QueueActivity, SerialOperationQueue, SqliteIssueCache, SyncCoordinator, SyncError, SyncFlags,
    SyncResult,
};
use parking_lot::Mutex;
use tokio::sync::broadcast::error::TryRecvError;

fn summary(id: &str, title: &str) -> IssueSummary {
    IssueSummary {
        id: id.to_string(),
        key: format!("APP-{}", id),
        project_id: "app".to_string(),
        title: title.to_string(),
        description: None,
        status: IssueStatus::Backlog,
        priority: IssuePriority::Normal,
        assignee: None,
        updated_at: "2026-02-10T08:30:00Z".parse().unwrap(),
    }
}

fn draft(title: &str, project: &str) -> IssueDraft {
    IssueDraft {
        project_id: project.to_string(),
        module: Some("editor".to_string()),
        title: title.to_string(),
        description: Some("Steps to reproduce".to_string()),
        assignee: None,
        priority: IssuePriority::High,
    }
}

/// Repository that can be switched offline; fetches fail with a 503 then.
struct SwitchableRepository {
    online: AtomicBool,
    issues: Vec<IssueSummary>,
}

impl SwitchableRepository {
    fn new(issues: Vec<IssueSummary>) -> Self {
        Self {
            online: AtomicBool::new(true),
            issues,
        }
    }

    fn go_offline(&self) {
        self.online.store(false, Ordering::SeqCst);
    }

    fn check(&self) -> SyncResult<()> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SyncError::remote(503, "Service Unavailable"))
        }
    }
}

#[async_trait]
impl IssueRepository for SwitchableRepository {
    async fn fetch_issues(&self, _query: &IssueQuery) -> SyncResult<Vec<IssueSummary>> {
        self.check()?;
        Ok(self.issues.clone())
    }

    async fn fetch_issue_detail(&self, _issue: &IssueSummary) -> SyncResult<IssueDetail> {
        Err(SyncError::transport("not used"))
    }

    async fn create_issue(&self, _draft: &IssueDraft) -> SyncResult<IssueSummary> {
        Err(SyncError::transport("not used"))
    }

    async fn update_issue(
        &self,
        _id: &str,
        _patch: &IssuePatch,
        _last_seen: Option<DateTime<Utc>>,
    ) -> SyncResult<IssueSummary> {
        Err(SyncError::transport("not used"))
    }

    async fn add_comment(&self, _issue_id: &str, _text: &str) -> SyncResult<Comment> {
        Err(SyncError::transport("not used"))
    }

    async fn fetch_boards(&self, _project_id: &str) -> SyncResult<Vec<Board>> {
        Err(SyncError::transport("not used"))
    }
}

fn fresh_queue() -> SerialOperationQueue {
    SerialOperationQueue::new(Arc::new(SyncFlags::default()))
}

fn drain(rx: &mut tokio::sync::broadcast::Receiver<QueueActivity>) -> Vec<QueueActivity> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            Err(TryRecvError::Lagged(n)) => panic!("lagged by {}", n),
        }
    }
    events
}

fn activity(pending_count: usize, label: Option<&str>) -> QueueActivity {
    QueueActivity {
        pending_count,
        current_label: label.map(str::to_string),
    }
}

#[tokio::test]
async fn test_first_second_scenario() {
    let queue = fresh_queue();
    let mut events = queue.subscribe();
    let order = Arc::new(Mutex::new(Vec::new()));

    let first = {
        let order = order.clone();
        queue.enqueue("First", move || async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            order.lock().push("First");
            Ok(())
        })
    };

    tokio::time::sleep(Duration::from_millis(5)).await;

    let second = {
        let order = order.clone();
        queue.enqueue("Second", move || async move {
            order.lock().push("Second");
            Ok(())
        })
    };

    let (a, b) = tokio::join!(first, second);
    a.unwrap();
    b.unwrap();

    assert_eq!(*order.lock(), vec!["First", "Second"]);
    assert_eq!(
        drain(&mut events),
        vec![
            activity(1, Some("First")),
            activity(0, None),
            activity(1, Some("Second")),
            activity(0, None),
        ]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_submissions_run_one_at_a_time() {
    let queue = fresh_queue();
    let mut events = queue.subscribe();
    let running = Arc::new(AtomicUsize::new(0));
    let overlap = Arc::new(AtomicBool::new(false));
    let started = Arc::new(Mutex::new(Vec::new()));

    // Submission order is the order of the enqueue calls below
    let mut pending = Vec::new();
    for i in 0..20usize {
        let running = running.clone();
        let overlap = overlap.clone();
        let started = started.clone();
        pending.push(queue.enqueue(format!("op-{}", i), move || async move {
            if running.fetch_add(1, Ordering::SeqCst) != 0 {
                overlap.store(true, Ordering::SeqCst);
            }
            started.lock().push(i);
            tokio::time::sleep(Duration::from_millis(1)).await;
            running.fetch_sub(1, Ordering::SeqCst);
            Ok(i)
        }));
    }

    let handles: Vec<_> = pending.into_iter().map(tokio::spawn).collect();
    for (i, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.await.unwrap().unwrap(), i);
    }

    assert!(!overlap.load(Ordering::SeqCst));
    assert_eq!(*started.lock(), (0..20).collect::<Vec<_>>());

    let events = drain(&mut events);
    assert_eq!(events.len(), 40);
    for event in &events {
        assert_eq!(event.pending_count == 0, event.current_label.is_none());
    }
    assert_eq!(queue.activity(), QueueActivity::default());
}

#[tokio::test]
async fn test_failure_does_not_poison_queue() {
    let queue = fresh_queue();

    let failed: SyncResult<()> = queue
        .enqueue("A", || async { Err(SyncError::remote(500, "Internal Server Error")) })
        .await;
    assert_eq!(failed.unwrap_err().status(), Some(500));

    let value = queue.enqueue("B", || async { Ok("recovered") }).await.unwrap();
    assert_eq!(value, "recovered");
}

#[tokio::test]
async fn test_disabled_short_circuit_never_runs_body() {
    let flags = Arc::new(SyncFlags::new(true));
    let queue = SerialOperationQueue::new(flags.clone());
    let mut events = queue.subscribe();
    let invoked = Arc::new(AtomicUsize::new(0));

    for _ in 0..3 {
        let invoked = invoked.clone();
        let result = queue
            .enqueue("Skipped", move || async move {
                invoked.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(SyncError::SyncingDisabled)));
    }

    assert_eq!(invoked.load(Ordering::SeqCst), 0);
    assert!(drain(&mut events).is_empty());

    // Re-enabling does not replay the skipped work
    flags.set_syncing_disabled(false);
    queue.enqueue("Fresh", || async { Ok(()) }).await.unwrap();
    assert_eq!(invoked.load(Ordering::SeqCst), 0);
}

fn coordinator_with(repository: Arc<SwitchableRepository>) -> (SyncCoordinator, Arc<SqliteIssueCache>) {
    let cache = Arc::new(SqliteIssueCache::in_memory().unwrap());
    let coordinator = SyncCoordinator::new(repository, cache.clone(), fresh_queue());
    (coordinator, cache)
}

fn record_notices(coordinator: &SyncCoordinator) -> Arc<Mutex<Vec<ConflictNotice>>> {
    let notices = Arc::new(Mutex::new(Vec::new()));
    let sink = notices.clone();
    coordinator.set_conflict_handler(Arc::new(move |notice: ConflictNotice| sink.lock().push(notice)));
    notices
}

async fn fail_with(
    coordinator: &SyncCoordinator,
    status: u16,
    local_changes: Option<&str>,
) -> SyncError {
    coordinator
        .enqueue("Update issue", local_changes.map(str::to_string), move || async move {
            Err::<(), _>(SyncError::remote(status, "rejected"))
        })
        .await
        .unwrap_err()
}

#[tokio::test]
async fn test_conflict_statuses_notify_exactly_once() {
    let (coordinator, _cache) = coordinator_with(Arc::new(SwitchableRepository::new(Vec::new())));
    let notices = record_notices(&coordinator);

    let err = fail_with(&coordinator, 409, Some("Status: done")).await;
    assert_eq!(err.status(), Some(409));
    {
        let seen = notices.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].title, "Sync Conflict");
        assert_eq!(seen[0].local_changes, "Status: done");
    }

    fail_with(&coordinator, 412, None).await;
    fail_with(&coordinator, 412, Some("   ")).await;

    let seen = notices.lock();
    assert_eq!(seen.len(), 3);
    assert_eq!(seen[1].local_changes, issuedesk_sync::conflict::UNKNOWN_LOCAL_CHANGES);
    assert_eq!(seen[2].local_changes, issuedesk_sync::conflict::UNKNOWN_LOCAL_CHANGES);
}

#[tokio::test]
async fn test_other_statuses_do_not_notify() {
    let (coordinator, _cache) = coordinator_with(Arc::new(SwitchableRepository::new(Vec::new())));
    let notices = record_notices(&coordinator);
    let mut stream = coordinator.subscribe_conflicts();

    assert_eq!(fail_with(&coordinator, 404, Some("Title: x")).await.status(), Some(404));
    assert_eq!(fail_with(&coordinator, 500, Some("Title: x")).await.status(), Some(500));

    let transport: SyncResult<()> = coordinator
        .enqueue("Add comment", Some("hi".to_string()), || async {
            Err(SyncError::transport("connection reset"))
        })
        .await;
    assert!(matches!(transport, Err(SyncError::Transport(_))));

    assert!(notices.lock().is_empty());
    assert!(matches!(stream.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn test_conflict_without_handler_still_returns_error() {
    let (coordinator, _cache) = coordinator_with(Arc::new(SwitchableRepository::new(Vec::new())));
    let notices = record_notices(&coordinator);
    coordinator.clear_conflict_handler();

    let err = fail_with(&coordinator, 409, Some("Priority: urgent")).await;
    assert!(err.is_conflict());
    assert!(notices.lock().is_empty());
}

#[tokio::test]
async fn test_refresh_returns_cache_when_offline() {
    let repository = Arc::new(SwitchableRepository::new(vec![
        summary("1", "Cursor jumps"),
        summary("2", "Slow save"),
    ]));
    let (coordinator, cache) = coordinator_with(repository.clone());
    let query = IssueQuery::new().with_project("app").with_search("  save ");

    let fresh = coordinator.refresh_issues(&query).await;
    assert_eq!(fresh.len(), 2);
    assert_eq!(cache.load_cached_issues(&query).unwrap(), fresh);

    repository.go_offline();
    let offline = coordinator.refresh_issues(&query).await;
    assert_eq!(offline, fresh);

    // Same effective query from a different construction hits the same entry
    let equivalent = IssueQuery::new().with_search("save").with_project("app");
    assert_eq!(coordinator.load_cached_issues(&equivalent), fresh);
}

#[tokio::test]
async fn test_refresh_with_syncing_disabled_reads_cache() {
    let repository = Arc::new(SwitchableRepository::new(vec![summary("9", "Fresh")]));
    let cache = Arc::new(SqliteIssueCache::in_memory().unwrap());
    let query = IssueQuery::new();
    cache.save_issues(&query, &[summary("1", "Stale")]).unwrap();

    let coordinator = SyncCoordinator::new(
        repository,
        cache,
        SerialOperationQueue::new(Arc::new(SyncFlags::new(true))),
    );
    let issues = coordinator.refresh_issues(&query).await;
    assert_eq!(issues, vec![summary("1", "Stale")]);
}

#[test]
fn test_ledger_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = DraftLedger::in_dir(dir.path());

    let only = ledger.save_draft(draft("Crash on paste", "app")).unwrap();
    ledger.mark_draft_submitted(&only.id).unwrap();
    assert_eq!(
        ledger.latest_submitted_draft().unwrap(),
        Some(draft("Crash on paste", "app"))
    );
}

#[test]
fn test_ledger_latest_is_second_only_submission() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = DraftLedger::in_dir(dir.path());

    let _first = ledger.save_draft(draft("First", "app")).unwrap();
    let second = ledger.save_draft(draft("Second", "web")).unwrap();
    ledger.mark_draft_submitted(&second.id).unwrap();

    let latest = ledger.latest_submitted_draft().unwrap().unwrap();
    assert_eq!(latest.title, "Second");
    assert_eq!(latest.project_id, "web");

    // A new process sees the same state
    let reopened = DraftLedger::in_dir(dir.path());
    assert_eq!(reopened.pending_drafts().unwrap().len(), 1);
    assert_eq!(reopened.latest_submitted_draft().unwrap().unwrap().title, "Second");
}
