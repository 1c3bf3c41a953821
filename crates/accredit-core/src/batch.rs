//! Batch submission of draft records.
//!
//! Every record is pre-validated before anything is written. Valid records
//! are committed in fixed-size chunks; each chunk is one atomic repository
//! commit, and chunks for different records run concurrently.

use std::collections::HashSet;
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::engine::WorkflowEngine;
use crate::error::{EngineError, ErrorKind, StoreError};
use crate::traits::RecordWrite;
use crate::workflow::{authorize, Actor, Authority, WorkflowState};

const REPEATED_ITEM: &str = "record listed more than once in batch";

/// Progress reporting trait.
pub trait BatchProgress: Send + Sync {
    /// Called after each chunk commit with (records processed, total valid records).
    fn on_progress(&self, completed: usize, total: usize);
}

/// No-op progress reporter.
pub struct NoopProgress;

impl BatchProgress for NoopProgress {
    fn on_progress(&self, _: usize, _: usize) {}
}

/// Outcome for one record in a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItemResult {
    pub record_id: Uuid,
    pub submitted: bool,
    #[serde(default)]
    pub error_kind: Option<ErrorKind>,
    #[serde(default)]
    pub error: Option<String>,
}

/// A per-record failure.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchItemError {
    pub record_id: Uuid,
    pub error: EngineError,
}

/// Result of a batch submit.
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    /// Records now in `Submitted`.
    pub submitted: Vec<Uuid>,
    /// Records that were left untouched, with the reason.
    pub errors: Vec<BatchItemError>,
}

impl BatchOutcome {
    /// One entry per requested record, in request order.
    ///
    /// Repeats of an id are reported with the last error recorded for it.
    pub fn items(&self, requested: &[Uuid]) -> Vec<BatchItemResult> {
        let mut seen = HashSet::new();
        requested
            .iter()
            .map(|id| {
                let error = if seen.insert(*id) {
                    if self.submitted.contains(id) {
                        None
                    } else {
                        self.errors.iter().find(|e| e.record_id == *id)
                    }
                } else {
                    self.errors.iter().rev().find(|e| e.record_id == *id)
                };
                (id, error)
            })
            .map(|(id, error)| match error {
                Some(err) => BatchItemResult {
                    record_id: *id,
                    submitted: false,
                    error_kind: Some(err.error.kind()),
                    error: Some(err.error.to_string()),
                },
                None => BatchItemResult {
                    record_id: *id,
                    submitted: self.submitted.contains(id),
                    error_kind: None,
                    error: None,
                },
            })
            .collect()
    }
}

/// Applies the `Draft -> Submitted` transition to many records.
pub struct BatchProcessor {
    engine: Arc<WorkflowEngine>,
}

impl BatchProcessor {
    pub fn new(engine: Arc<WorkflowEngine>) -> Self {
        Self { engine }
    }

    /// Submit draft records of one subject assignment.
    ///
    /// Fails as a whole only if the assignment does not exist or the actor
    /// does not own it. Per-record problems are collected in the outcome.
    pub async fn submit_batch(
        &self,
        actor: &Actor,
        subject_assignment_id: &str,
        record_ids: &[Uuid],
        progress: &dyn BatchProgress,
    ) -> Result<BatchOutcome, EngineError> {
        let assignment = self.engine.assignment(subject_assignment_id).await?;
        authorize(Authority::EntryOwner, actor, &actor.id, &assignment)?;

        let now = self.engine.now();
        let mut outcome = BatchOutcome::default();
        let mut writes = Vec::new();
        let mut seen = HashSet::new();
        let mut repeated = Vec::new();

        for &record_id in record_ids {
            if !seen.insert(record_id) {
                tracing::debug!(%record_id, "batch item repeated");
                repeated.push(BatchItemError {
                    record_id,
                    error: EngineError::Validation(REPEATED_ITEM.into()),
                });
                continue;
            }
            let prepared = async {
                let record = self.engine.load(record_id).await?;
                if record.subject_assignment_id != subject_assignment_id {
                    return Err(EngineError::Validation(format!(
                        "record belongs to subject assignment {}",
                        record.subject_assignment_id
                    )));
                }
                if record.state != WorkflowState::Draft {
                    return Err(EngineError::InvalidTransition {
                        from: record.state,
                        to: WorkflowState::Submitted,
                    });
                }
                self.engine.prepare_transition(
                    &record,
                    WorkflowState::Submitted,
                    actor,
                    None,
                    &assignment,
                    now,
                )
            }
            .await;

            match prepared {
                Ok(write) => writes.push(write),
                Err(error) => {
                    tracing::debug!(%record_id, "batch item rejected: {error}");
                    outcome.errors.push(BatchItemError { record_id, error });
                }
            }
        }

        let total = writes.len();
        let batch_size = self.engine.config().batch_size.max(1);
        let semaphore = Arc::new(Semaphore::new(
            self.engine.config().batch_parallelism.max(1),
        ));
        let mut completed = 0usize;

        let chunks: Vec<Vec<RecordWrite>> = writes
            .chunks(batch_size)
            .map(|chunk| chunk.to_vec())
            .collect();

        let mut futures = FuturesUnordered::new();
        for chunk in chunks {
            let semaphore = Arc::clone(&semaphore);
            let marks = Arc::clone(self.engine.marks());
            futures.push(async move {
                let ids: Vec<Uuid> = chunk.iter().map(|w| w.record.id).collect();
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => marks.commit(&chunk).await.map_err(EngineError::from),
                    Err(_) => Err(EngineError::Store(StoreError::Backend(
                        "semaphore closed".into(),
                    ))),
                };
                (ids, result)
            });
        }

        while let Some((ids, result)) = futures.next().await {
            completed += ids.len();
            match result {
                Ok(()) => {
                    tracing::info!(
                        subject_assignment = subject_assignment_id,
                        count = ids.len(),
                        "batch chunk submitted"
                    );
                    outcome.submitted.extend(ids);
                }
                Err(e) => {
                    tracing::error!(
                        subject_assignment = subject_assignment_id,
                        count = ids.len(),
                        "batch chunk failed: {e}"
                    );
                    outcome.errors.extend(ids.into_iter().map(|record_id| BatchItemError {
                        record_id,
                        error: e.clone(),
                    }));
                }
            }
            progress.on_progress(completed, total);
        }

        outcome.errors.extend(repeated);
        Ok(outcome)
    }
}
