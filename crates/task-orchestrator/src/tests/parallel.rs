use super::*;
use crate::{Checkpoint, NotificationLevel, RunStatus, MAX_PARALLEL_AGENTS};
use backing_store::RepositoryRef;

#[tokio::test]
async fn failing_agent_does_not_affect_siblings() {
    let store = MemoryBackingStore::new();
    let invoker = Arc::new(ScriptedInvoker::failing_on(&store, "[agent 2/3]"));
    let orchestrator = orchestrator(&store, Arc::clone(&invoker));

    let summary = orchestrator
        .execute_parallel(Some(&alice()), "refactor auth", 3, None, None)
        .await
        .unwrap();

    assert_eq!(summary.runs.len(), 3);
    assert_eq!(summary.completed, 2);
    assert_eq!(summary.failed, 1);

    for run in &summary.runs {
        if run.agent_index == 2 {
            assert_eq!(run.status, RunStatus::Error);
            assert_eq!(run.checkpoint, Checkpoint::Planning);
            assert_eq!(run.progress, 40);
            assert_eq!(run.estimated_time_remaining, 0);
            assert!(run.error.as_deref().unwrap().contains("500"));
            assert!(run.changes.is_empty());
            assert_eq!(run.actual_cost, None);
        } else {
            assert_eq!(run.status, RunStatus::Completed);
            assert_eq!(run.progress, 100);
            assert_eq!(run.estimated_time_remaining, 0);
            assert_eq!(run.files_changed, 1);
            assert_eq!(run.lines_added, 10);
            assert_eq!(run.actual_cost, Some(0.01));
            assert!(run.error.is_none());
        }
    }

    let task_ids: Vec<&str> = summary.runs.iter().filter_map(|r| r.task_id.as_deref()).collect();
    assert_eq!(task_ids.len(), 3);
    assert_eq!(store.rows(Collection::Tasks).len(), 3);
    assert_eq!(invoker.calls().len(), 3);
}

#[tokio::test]
async fn every_agent_gets_its_own_task_row() {
    let store = MemoryBackingStore::new();
    let orchestrator = orchestrator(&store, Arc::new(ScriptedInvoker::new(&store)));

    let repository = RepositoryRef::parse("acme/web").unwrap();
    orchestrator
        .execute_parallel(Some(&alice()), "add dark mode", 2, Some(repository), None)
        .await
        .unwrap();

    let mut instructions: Vec<String> = store
        .rows(Collection::Tasks)
        .iter()
        .map(|row| row["instruction"].as_str().unwrap().to_string())
        .collect();
    instructions.sort();
    assert_eq!(instructions, vec!["add dark mode [agent 1/2]", "add dark mode [agent 2/2]"]);
    for row in store.rows(Collection::Tasks) {
        assert_eq!(row["metadata"]["repository"]["name"], "web");
        assert_eq!(row["status"], "pending");
    }
    assert_eq!(orchestrator.cache().len(), 2);
}

#[tokio::test]
async fn explicit_token_overrides_session_credential() {
    let store = MemoryBackingStore::new();
    let invoker = Arc::new(ScriptedInvoker::new(&store));
    let orchestrator = orchestrator(&store, Arc::clone(&invoker));

    orchestrator
        .execute_parallel(Some(&alice()), "bump deps", 2, None, Some("ghp_override".to_string()))
        .await
        .unwrap();

    assert!(invoker
        .calls()
        .iter()
        .all(|(_, credential)| credential.as_deref() == Some("ghp_override")));
}

#[tokio::test]
async fn agent_count_is_bounded() {
    let store = MemoryBackingStore::new();
    let orchestrator = orchestrator(&store, Arc::new(ScriptedInvoker::new(&store)));

    for count in [0, MAX_PARALLEL_AGENTS + 1] {
        let err = orchestrator
            .execute_parallel(Some(&alice()), "bump deps", count, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::ValidationFailed(_)));
    }
    assert_eq!(store.total_calls(), 0);
    assert!(orchestrator.runs().is_empty());
}

#[tokio::test]
async fn parallel_without_user_is_rejected() {
    let store = MemoryBackingStore::new();
    let orchestrator = orchestrator(&store, Arc::new(ScriptedInvoker::new(&store)));

    let err = orchestrator
        .execute_parallel(None, "bump deps", 2, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::AuthenticationRequired));
    assert_eq!(store.total_calls(), 0);
}

#[tokio::test]
async fn progress_never_moves_backwards() {
    let store = MemoryBackingStore::new();
    let orchestrator = orchestrator(&store, Arc::new(ScriptedInvoker::failing_on(&store, "[agent 1/2]")));
    let mut board = orchestrator.runs().watch();

    let watcher = tokio::spawn(async move {
        let mut last: std::collections::HashMap<String, u8> = std::collections::HashMap::new();
        while board.changed().await.is_ok() {
            let runs = board.borrow_and_update().clone();
            for run in runs.iter() {
                let previous = last.insert(run.id.clone(), run.progress).unwrap_or(0);
                assert!(run.progress >= previous, "progress went from {} to {}", previous, run.progress);
            }
            if runs.len() == 2 && runs.iter().all(|r| r.is_finished()) {
                break;
            }
        }
    });

    orchestrator
        .execute_parallel(Some(&alice()), "rename module", 2, None, None)
        .await
        .unwrap();
    tokio::time::timeout(std::time::Duration::from_secs(2), watcher)
        .await
        .expect("watcher did not finish")
        .unwrap();
}

#[tokio::test]
async fn clear_runs_keeps_remote_rows() {
    let store = MemoryBackingStore::new();
    let orchestrator = orchestrator(&store, Arc::new(ScriptedInvoker::new(&store)));

    orchestrator
        .execute_parallel(Some(&alice()), "write docs", 3, None, None)
        .await
        .unwrap();
    assert_eq!(orchestrator.runs().len(), 3);

    orchestrator.clear_runs();

    assert!(orchestrator.runs().is_empty());
    assert_eq!(store.rows(Collection::Tasks).len(), 3);
}

#[tokio::test]
async fn failure_is_notified_per_agent() {
    let store = MemoryBackingStore::new();
    let orchestrator = orchestrator(&store, Arc::new(ScriptedInvoker::failing_on(&store, "[agent 3/3]")));
    let mut notifications = orchestrator.notifier().subscribe();

    orchestrator
        .execute_parallel(Some(&alice()), "write docs", 3, None, None)
        .await
        .unwrap();

    let mut errors = Vec::new();
    while let Ok(notification) = notifications.try_recv() {
        if notification.level == NotificationLevel::Error {
            errors.push(notification.title);
        }
    }
    assert_eq!(errors, vec!["Agent 3 failed".to_string()]);
}

async fn finished_level(orchestrator: &TaskOrchestrator) -> NotificationLevel {
    let mut notifications = orchestrator.notifier().subscribe();
    orchestrator
        .execute_parallel(Some(&alice()), "write docs", 2, None, None)
        .await
        .unwrap();

    let mut level = None;
    while let Ok(notification) = notifications.try_recv() {
        if notification.title == "Agents finished" {
            level = Some(notification.level);
        }
    }
    level.expect("batch summary was not notified")
}

#[tokio::test]
async fn batch_summary_warns_when_any_agent_failed() {
    let store = MemoryBackingStore::new();
    let clean = orchestrator(&store, Arc::new(ScriptedInvoker::new(&store)));
    assert_eq!(finished_level(&clean).await, NotificationLevel::Success);

    let failing = orchestrator(&store, Arc::new(ScriptedInvoker::failing_on(&store, "[agent 1/2]")));
    assert_eq!(finished_level(&failing).await, NotificationLevel::Warning);
}
