use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use mailsweep::engine::batch::{
    ActionError, BatchCoordinator, BatchPolicy, BatchResponse, FailedId, FailedMessage,
    HaltReason, PermanentReason, TrashStore,
};
use mailsweep::engine::selection::SelectionSet;
use mailsweep::retry::Backoff;
use tokio_util::sync::CancellationToken;

type Reply = Result<BatchResponse, ActionError>;

/// Answers each call from a script, then succeeds for everything.
struct ScriptedStore {
    script: Mutex<VecDeque<Reply>>,
    calls: Mutex<Vec<Vec<String>>>,
    limit: usize,
    cancel_after_first: Option<CancellationToken>,
}

impl ScriptedStore {
    fn new(script: Vec<Reply>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
            limit: 1_000,
            cancel_after_first: None,
        }
    }

    fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl TrashStore for ScriptedStore {
    fn max_batch_size(&self) -> usize {
        self.limit
    }

    async fn move_to_trash(&self, ids: &[String]) -> Reply {
        self.calls.lock().unwrap().push(ids.to_vec());
        if let Some(cancel) = &self.cancel_after_first {
            cancel.cancel();
        }
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(BatchResponse::all_succeeded(ids)))
    }
}

fn ids(count: usize) -> SelectionSet {
    (0..count).map(|i| format!("id{i:03}")).collect()
}

fn policy(max_attempts: u32) -> BatchPolicy {
    BatchPolicy {
        concurrency: 1,
        retry: Backoff::immediate(max_attempts),
        ..BatchPolicy::default()
    }
}

fn transient() -> Reply {
    Err(ActionError::Transient("429 rate limited".to_string()))
}

#[tokio::test]
async fn transient_failures_are_retried_until_success() {
    let store = ScriptedStore::new(vec![transient(), transient()]);

    let outcome = BatchCoordinator::new(&store, policy(4))
        .trash(ids(10), &CancellationToken::new())
        .await;

    assert_eq!(store.call_count(), 3);
    assert_eq!(outcome.succeeded, 10);
    assert!(outcome.failed.is_empty());
    assert_eq!(outcome.batches[0].attempts, 3);
    assert!(outcome.is_clean());
}

#[tokio::test]
async fn exhausted_retries_record_every_id_as_failed() {
    let store = ScriptedStore::new(vec![transient(), transient()]);
    let policy = BatchPolicy {
        max_consecutive_exhausted: 5,
        ..policy(2)
    };

    let outcome = BatchCoordinator::new(&store, policy)
        .trash(ids(4), &CancellationToken::new())
        .await;

    assert_eq!(store.call_count(), 2);
    assert_eq!(outcome.succeeded, 0);
    assert_eq!(outcome.failed.len(), 4);
    assert!(outcome.failed[0].reason.contains("gave up after 2 attempts"));
    assert!(outcome.halted.is_none());
}

#[tokio::test]
async fn already_trashed_messages_count_as_success() {
    let selection = ids(3);
    let store = ScriptedStore::new(vec![Ok(BatchResponse {
        succeeded: vec!["id000".to_string(), "id001".to_string()],
        failed: vec![FailedId {
            id: "id002".to_string(),
            error: ActionError::Permanent(PermanentReason::NotFound),
        }],
    })]);

    let outcome = BatchCoordinator::new(&store, policy(4))
        .trash(selection, &CancellationToken::new())
        .await;

    assert_eq!(store.call_count(), 1);
    assert_eq!(outcome.succeeded, 3);
    assert_eq!(outcome.already_trashed, 1);
    assert!(outcome.failed.is_empty());
}

fn not_found() -> Reply {
    Err(ActionError::Permanent(PermanentReason::NotFound))
}

#[tokio::test]
async fn batch_level_not_found_is_resolved_per_message() {
    let store = ScriptedStore::new(vec![
        not_found(),
        not_found(),
        Err(ActionError::Permanent(PermanentReason::Rejected(
            "invalid id".to_string(),
        ))),
    ]);

    let outcome = BatchCoordinator::new(&store, policy(4))
        .trash(ids(4), &CancellationToken::new())
        .await;

    let calls = store.calls.lock().unwrap().clone();
    assert_eq!(
        calls,
        [
            vec!["id000", "id001", "id002", "id003"],
            vec!["id000"],
            vec!["id001"],
            vec!["id002"],
            vec!["id003"],
        ]
    );
    assert_eq!(outcome.attempted, 4);
    assert_eq!(outcome.already_trashed, 1);
    assert_eq!(outcome.succeeded, 3);
    assert_eq!(
        outcome.failed,
        [FailedMessage {
            id: "id001".to_string(),
            reason: "rejected: invalid id".to_string(),
        }]
    );
}

#[tokio::test]
async fn transient_answer_while_resolving_not_found_is_retried() {
    let store = ScriptedStore::new(vec![not_found(), not_found(), transient()]);

    let outcome = BatchCoordinator::new(&store, policy(3))
        .trash(ids(2), &CancellationToken::new())
        .await;

    let calls = store.calls.lock().unwrap().clone();
    assert_eq!(
        calls,
        [
            vec!["id000", "id001"],
            vec!["id000"],
            vec!["id001"],
            vec!["id001"],
        ]
    );
    assert_eq!(outcome.succeeded, 2);
    assert_eq!(outcome.already_trashed, 1);
    assert!(outcome.failed.is_empty());
}

#[tokio::test]
async fn permanent_failure_is_recorded_and_run_continues() {
    let store = ScriptedStore::new(vec![Err(ActionError::Permanent(
        PermanentReason::PermissionDenied("read-only token".to_string()),
    ))])
    .with_limit(5);

    let outcome = BatchCoordinator::new(&store, policy(4))
        .trash(ids(12), &CancellationToken::new())
        .await;

    assert_eq!(store.call_count(), 3);
    assert_eq!(outcome.attempted, 12);
    assert_eq!(outcome.failed.len(), 5);
    assert_eq!(outcome.succeeded, 7);
    assert!(
        outcome
            .failed
            .iter()
            .all(|failed| failed.reason == "permission denied: read-only token")
    );
    assert!(outcome.halted.is_none());
}

#[tokio::test]
async fn retries_only_the_ids_that_failed_transiently() {
    let store = ScriptedStore::new(vec![Ok(BatchResponse {
        succeeded: vec!["id000".to_string()],
        failed: vec![FailedId {
            id: "id001".to_string(),
            error: ActionError::Transient("backend busy".to_string()),
        }],
    })]);

    let outcome = BatchCoordinator::new(&store, policy(3))
        .trash(ids(2), &CancellationToken::new())
        .await;

    let calls = store.calls.lock().unwrap().clone();
    assert_eq!(calls, [vec!["id000", "id001"], vec!["id001"]]);
    assert_eq!(outcome.succeeded, 2);
}

#[tokio::test]
async fn unreachable_store_halts_and_skips_the_rest() {
    let script = (0..6).map(|_| transient()).collect::<Vec<_>>();
    let store = ScriptedStore::new(script).with_limit(10);
    let policy = BatchPolicy {
        max_consecutive_exhausted: 3,
        ..policy(2)
    };

    let outcome = BatchCoordinator::new(&store, policy)
        .trash(ids(50), &CancellationToken::new())
        .await;

    assert_eq!(store.call_count(), 6);
    assert_eq!(outcome.attempted, 30);
    assert_eq!(outcome.succeeded, 0);
    assert_eq!(outcome.failed.len(), 30);
    assert_eq!(outcome.skipped, 20);
    assert_eq!(
        outcome.halted,
        Some(HaltReason::StoreUnreachable {
            consecutive_failed_batches: 3
        })
    );
    assert!(!outcome.is_clean());
}

#[tokio::test]
async fn store_unreachable_on_the_last_batch_still_halts() {
    let script = (0..6).map(|_| transient()).collect::<Vec<_>>();
    let store = ScriptedStore::new(script).with_limit(10);
    let policy = BatchPolicy {
        max_consecutive_exhausted: 3,
        ..policy(2)
    };

    let outcome = BatchCoordinator::new(&store, policy)
        .trash(ids(30), &CancellationToken::new())
        .await;

    assert_eq!(store.call_count(), 6);
    assert_eq!(outcome.failed.len(), 30);
    assert_eq!(outcome.skipped, 0);
    assert_eq!(
        outcome.halted,
        Some(HaltReason::StoreUnreachable {
            consecutive_failed_batches: 3
        })
    );
}

#[tokio::test]
async fn cancellation_lets_the_running_batch_finish() {
    let cancel = CancellationToken::new();
    let store = ScriptedStore {
        cancel_after_first: Some(cancel.clone()),
        ..ScriptedStore::new(Vec::new()).with_limit(10)
    };

    let outcome = BatchCoordinator::new(&store, policy(4))
        .trash(ids(30), &cancel)
        .await;

    assert_eq!(store.call_count(), 1);
    assert_eq!(outcome.succeeded, 10);
    assert_eq!(outcome.skipped, 20);
    assert_eq!(outcome.halted, Some(HaltReason::Cancelled));
    assert_eq!(outcome.batches.len(), 3);
}
