use std::sync::Arc;

use anyhow::{Context, Result};
use issuedesk_core::{AppError, Config};
use issuedesk_services::RestIssueRepository;
use issuedesk_sync::{
    ConflictNotice, DraftLedger, IssueQuery, QueueActivity, SerialOperationQueue,
    SqliteIssueCache, SyncCoordinator, SyncFlags,
};
use tokio::sync::broadcast::{self, error::RecvError};

#[tokio::main]
async fn main() -> Result<()> {
    issuedesk_core::init()?;

    if let Err(e) = run().await {
        let err = AppError::from_anyhow(e);
        tracing::error!("{}", err);
        eprintln!("{}", err.user_message());
        std::process::exit(1);
    }

    Ok(())
}

async fn run() -> Result<()> {
    let (config, _warnings) = Config::load_validated()?;
    let coordinator = build_coordinator(&config)?;

    coordinator.set_conflict_handler(Arc::new(|notice: ConflictNotice| {
        println!("{}: {}", notice.title, notice.message);
        println!("  Your changes:\n  {}", notice.local_changes.replace('\n', "\n  "));
    }));

    report_drafts(&coordinator);

    tokio::spawn(log_activity(coordinator.subscribe_activity()));

    let query = IssueQuery::new().with_page(config.sync.page_size, 0);
    let cached = coordinator.load_cached_issues(&query);
    let issues = coordinator.refresh_issues(&query).await;

    let ids: Vec<String> = issues.iter().map(|i| i.id.clone()).collect();
    let seen = coordinator.load_issue_seen_updates(&ids);

    println!("IssueDesk - {}", config.server.base_url);
    println!("  Cached issues: {}", cached.len());
    println!("  Current issues: {}", issues.len());
    for issue in &issues {
        let unread = seen.get(&issue.id).map_or(true, |at| *at < issue.updated_at);
        let marker = if unread { "*" } else { " " };
        println!(
            "  {} {:<10} {:<12} {}",
            marker,
            issue.key,
            issue.status.as_str(),
            issue.title
        );
    }

    Ok(())
}

/// Log queue activity until the queue goes away. Returns the number of
/// events logged.
async fn log_activity(mut activity: broadcast::Receiver<QueueActivity>) -> usize {
    let mut logged = 0;
    loop {
        match activity.recv().await {
            Ok(event) => {
                match event.current_label {
                    Some(label) => tracing::debug!("{} ({} running)", label, event.pending_count),
                    None => tracing::debug!("Sync idle"),
                }
                logged += 1;
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!("Activity log fell behind, skipped {} events", skipped);
            }
            Err(RecvError::Closed) => break,
        }
    }
    logged
}

fn build_coordinator(config: &Config) -> Result<SyncCoordinator> {
    let data_dir = config.storage.data_dir();
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;

    let cache = Arc::new(SqliteIssueCache::new(config.storage.cache_path())?);
    let ledger = Arc::new(DraftLedger::new(config.storage.drafts_path()));
    let repository = Arc::new(RestIssueRepository::from_config(config)?);

    let flags = SyncFlags::global();
    flags.set_syncing_disabled(config.sync.syncing_disabled);
    let queue = SerialOperationQueue::with_activity_buffer(flags, config.sync.activity_buffer);

    Ok(SyncCoordinator::with_conflict_buffer(
        repository,
        cache,
        queue,
        config.sync.conflict_buffer,
    )
    .with_draft_ledger(ledger))
}

/// Tell the user about drafts a previous run never finished submitting.
fn report_drafts(coordinator: &SyncCoordinator) {
    let Some(ledger) = coordinator.draft_ledger() else {
        return;
    };

    match ledger.resubmittable_drafts() {
        Ok(drafts) if drafts.is_empty() => {}
        Ok(drafts) => {
            println!("Unsent issue drafts: {}", drafts.len());
            for record in drafts {
                let reason = record.last_error.as_deref().unwrap_or("interrupted");
                println!("  - {} ({})", record.draft.title, reason);
            }
        }
        Err(e) => tracing::error!("Failed to read draft ledger: {}", e),
    }

    if let Ok(Some(defaults)) = ledger.latest_submitted_draft() {
        tracing::debug!("New issues default to project {}", defaults.project_id);
    }
}
