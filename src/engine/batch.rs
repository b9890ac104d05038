//! Bulk move-to-trash against a remote, rate-limited store.
//!
//! The only action this module can issue is a reversible move to trash.
//! [`TrashStore`] has no other operation, whatever the caller selected.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::retry::Backoff;

use super::selection::SelectionSet;

/// Gmail accepts at most this many ids per batch call.
pub const MAX_BATCH_SIZE: usize = 1_000;
pub const MAX_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchPolicy {
    pub batch_size: usize,
    /// In-flight batch calls.
    pub concurrency: usize,
    #[serde(flatten)]
    pub retry: Backoff,
    /// Batches in a row that exhaust their retries without any success
    /// before the run halts.
    pub max_consecutive_exhausted: u32,
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self {
            batch_size: MAX_BATCH_SIZE,
            concurrency: 3,
            retry: Backoff::default(),
            max_consecutive_exhausted: 3,
        }
    }
}

impl BatchPolicy {
    pub fn batch_size_for(&self, store_limit: usize) -> usize {
        self.batch_size.clamp(1, store_limit.clamp(1, MAX_BATCH_SIZE))
    }

    pub fn effective_concurrency(&self) -> usize {
        self.concurrency.clamp(1, MAX_CONCURRENCY)
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Error, Serialize)]
pub enum PermanentReason {
    /// The message is gone or already in trash.
    #[error("not found")]
    NotFound,
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, Eq, PartialEq, Error, Serialize)]
pub enum ActionError {
    /// Rate limits and network blips; worth retrying.
    #[error("transient failure: {0}")]
    Transient(String),
    #[error("{0}")]
    Permanent(#[from] PermanentReason),
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FailedId {
    pub id: String,
    pub error: ActionError,
}

/// The store's answer for one batch call.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct BatchResponse {
    pub succeeded: Vec<String>,
    pub failed: Vec<FailedId>,
}

impl BatchResponse {
    pub fn all_succeeded(ids: &[String]) -> Self {
        Self {
            succeeded: ids.to_vec(),
            failed: Vec::new(),
        }
    }
}

/// A remote mailbox that can move messages to its trash.
#[async_trait]
pub trait TrashStore: Send + Sync {
    /// Largest batch the store accepts in one call.
    fn max_batch_size(&self) -> usize {
        MAX_BATCH_SIZE
    }

    /// Moves `ids` to trash. An `Err` applies to the whole batch.
    async fn move_to_trash(&self, ids: &[String]) -> Result<BatchResponse, ActionError>;
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct FailedMessage {
    pub id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum HaltReason {
    Cancelled,
    StoreUnreachable { consecutive_failed_batches: u32 },
}

impl fmt::Display for HaltReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => f.write_str("cancelled by user"),
            Self::StoreUnreachable {
                consecutive_failed_batches,
            } => write!(
                f,
                "mail store unreachable ({consecutive_failed_batches} consecutive batches failed)"
            ),
        }
    }
}

#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize)]
pub struct BatchReport {
    pub index: usize,
    pub size: usize,
    pub attempts: u32,
    pub succeeded: usize,
    pub already_trashed: usize,
    pub failed: Vec<FailedMessage>,
    pub skipped: bool,
    /// Retries ran out with ids still pending.
    pub exhausted: bool,
}

/// Summary of one cleanup run.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize)]
pub struct BatchOutcome {
    pub attempted: usize,
    /// Includes ids that were already in trash.
    pub succeeded: usize,
    pub already_trashed: usize,
    pub failed: Vec<FailedMessage>,
    /// Ids never sent because the run stopped.
    pub skipped: usize,
    pub batches: Vec<BatchReport>,
    pub halted: Option<HaltReason>,
}

impl BatchOutcome {
    fn from_reports(mut reports: Vec<BatchReport>, halted: Option<HaltReason>) -> Self {
        reports.sort_by_key(|report| report.index);

        let mut outcome = Self {
            halted,
            ..Self::default()
        };
        for report in &reports {
            if report.skipped {
                outcome.skipped += report.size;
                continue;
            }
            outcome.attempted += report.size;
            outcome.succeeded += report.succeeded;
            outcome.already_trashed += report.already_trashed;
            outcome.failed.extend(report.failed.iter().cloned());
        }
        outcome.batches = reports;
        outcome
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.halted.is_none() && self.skipped == 0
    }
}

pub struct BatchCoordinator<'a, S: ?Sized> {
    store: &'a S,
    policy: BatchPolicy,
}

impl<'a, S> BatchCoordinator<'a, S>
where
    S: TrashStore + ?Sized,
{
    pub fn new(store: &'a S, policy: BatchPolicy) -> Self {
        Self { store, policy }
    }

    /// Moves every selected message to trash.
    ///
    /// Cancelling `cancel` lets in-flight batches finish and stops new ones.
    /// The outcome is returned in every case.
    pub async fn trash(&self, selection: SelectionSet, cancel: &CancellationToken) -> BatchOutcome {
        if selection.is_empty() {
            debug!("empty selection, nothing to trash");
            return BatchOutcome::default();
        }

        let batch_size = self.policy.batch_size_for(self.store.max_batch_size());
        let ids = selection.into_vec();
        let batches = ids
            .chunks(batch_size)
            .map(<[String]>::to_vec)
            .collect::<Vec<_>>();
        info!(
            messages = ids.len(),
            batches = batches.len(),
            batch_size,
            "moving messages to trash"
        );

        let halt = cancel.child_token();
        let streak = FailureStreak::default();
        let reports = stream::iter(batches.into_iter().enumerate())
            .map(|(index, batch)| self.run_batch(index, batch, &halt, &streak))
            .buffer_unordered(self.policy.effective_concurrency())
            .collect::<Vec<_>>()
            .await;

        let any_skipped = reports.iter().any(|report| report.skipped);
        let halted = match streak.tripped_at.load(Ordering::SeqCst) {
            0 if any_skipped && cancel.is_cancelled() => Some(HaltReason::Cancelled),
            0 => None,
            consecutive_failed_batches => Some(HaltReason::StoreUnreachable {
                consecutive_failed_batches,
            }),
        };
        if let Some(reason) = halted {
            warn!("cleanup halted: {reason}");
        }

        BatchOutcome::from_reports(reports, halted)
    }

    async fn run_batch(
        &self,
        index: usize,
        ids: Vec<String>,
        halt: &CancellationToken,
        streak: &FailureStreak,
    ) -> BatchReport {
        let mut report = BatchReport {
            index,
            size: ids.len(),
            ..BatchReport::default()
        };
        if halt.is_cancelled() {
            report.skipped = true;
            return report;
        }

        let attempts = self.policy.retry.attempts();
        let mut pending = ids;
        let mut last_transient = String::new();

        for attempt in 1..=attempts {
            report.attempts = attempt;
            match self.store.move_to_trash(&pending).await {
                Ok(response) => {
                    let mut retry = Vec::new();
                    absorb(&mut report, response, &mut retry, &mut last_transient);
                    pending = retry;
                }
                Err(ActionError::Transient(reason)) => last_transient = reason,
                // A whole-batch not-found names no id, so ask about each one.
                Err(ActionError::Permanent(PermanentReason::NotFound)) if pending.len() > 1 => {
                    debug!(
                        batch = index,
                        ids = pending.len(),
                        "batch not found, trashing ids one at a time"
                    );
                    let mut retry = Vec::new();
                    for id in pending.drain(..) {
                        match self.store.move_to_trash(std::slice::from_ref(&id)).await {
                            Ok(response) => {
                                absorb(&mut report, response, &mut retry, &mut last_transient);
                            }
                            Err(ActionError::Transient(reason)) => {
                                last_transient = reason;
                                retry.push(id);
                            }
                            Err(ActionError::Permanent(reason)) => {
                                record_permanent(&mut report, id, &reason);
                            }
                        }
                    }
                    pending = retry;
                }
                Err(ActionError::Permanent(reason)) => {
                    for id in pending.drain(..) {
                        record_permanent(&mut report, id, &reason);
                    }
                }
            }

            if pending.is_empty() {
                break;
            }
            if attempt < attempts {
                warn!(
                    batch = index,
                    attempt,
                    pending = pending.len(),
                    "transient trash failure: {last_transient}; retrying"
                );
                self.policy.retry.sleep(attempt).await;
            }
        }

        if !pending.is_empty() {
            report.exhausted = true;
            let reason = format!("gave up after {attempts} attempts: {last_transient}");
            report
                .failed
                .extend(pending.into_iter().map(|id| FailedMessage {
                    id,
                    reason: reason.clone(),
                }));
        }

        if report.exhausted && report.succeeded == 0 {
            let failed_in_row = streak.consecutive.fetch_add(1, Ordering::SeqCst) + 1;
            if failed_in_row >= self.policy.max_consecutive_exhausted.max(1) {
                let _ = streak.tripped_at.compare_exchange(
                    0,
                    failed_in_row,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                );
                halt.cancel();
            }
        } else {
            streak.consecutive.store(0, Ordering::SeqCst);
        }

        info!(
            batch = index,
            succeeded = report.succeeded,
            failed = report.failed.len(),
            attempts = report.attempts,
            "batch finished"
        );
        report
    }
}

/// Exhausted batches in a row, and the count at which the run was halted.
#[derive(Debug, Default)]
struct FailureStreak {
    consecutive: AtomicU32,
    tripped_at: AtomicU32,
}

fn absorb(
    report: &mut BatchReport,
    response: BatchResponse,
    retry: &mut Vec<String>,
    last_transient: &mut String,
) {
    report.succeeded += response.succeeded.len();
    for FailedId { id, error } in response.failed {
        match error {
            ActionError::Transient(reason) => {
                *last_transient = reason;
                retry.push(id);
            }
            ActionError::Permanent(reason) => record_permanent(report, id, &reason),
        }
    }
}

fn record_permanent(report: &mut BatchReport, id: String, reason: &PermanentReason) {
    match reason {
        PermanentReason::NotFound => {
            report.succeeded += 1;
            report.already_trashed += 1;
        }
        other => report.failed.push(FailedMessage {
            id,
            reason: other.to_string(),
        }),
    }
}
