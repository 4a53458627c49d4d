//! Bounded fan-out of one upload attempt.
//!
//! `run_batch` is stateless and never retries: it uploads every file it is
//! given exactly once (per-phase backoff inside the file contract aside) and
//! returns the three-way partition. Retrying failed files across attempts is
//! the caller's job.

use crate::file::CaseFile;
use crate::observer::{UploadEvent, UploadObserver};
use crate::outcome::BatchOutcome;
use crate::retry::RetryPolicy;
use crate::CoreError;
use skarv_meta::CaseId;
use skarv_remote::ArchiveBackend;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// Upload `files` under `case_id` over a pool of `workers` threads.
///
/// Workers pop one file at a time from a shared queue; completion order is
/// arbitrary. Every input file lands in exactly one bucket of the returned
/// [`BatchOutcome`]; a miscount is a fatal consistency error.
pub fn run_batch(
    files: Vec<CaseFile>,
    case_id: &CaseId,
    client: &dyn ArchiveBackend,
    workers: usize,
    policy: &RetryPolicy,
    observer: &dyn UploadObserver,
) -> Result<BatchOutcome, CoreError> {
    if case_id.is_empty() {
        return Err(CoreError::InvalidArgument(
            "case id must not be empty".to_owned(),
        ));
    }
    if workers == 0 {
        return Err(CoreError::InvalidArgument(
            "worker count must be at least 1".to_owned(),
        ));
    }

    let total = files.len();
    if total == 0 {
        return Ok(BatchOutcome::default());
    }

    let pool = workers.min(total);
    debug!("uploading {total} files with {pool} workers");

    let queue = Mutex::new(VecDeque::from(files));
    let results: Mutex<Vec<_>> = Mutex::new(Vec::with_capacity(total));
    let first_error: Mutex<Option<CoreError>> = Mutex::new(None);

    std::thread::scope(|scope| {
        for _ in 0..pool {
            scope.spawn(|| loop {
                let next = queue
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .pop_front();
                let Some(file) = next else { break };

                match file.upload(case_id, client, policy) {
                    Ok(outcome) => {
                        observer.on_event(&UploadEvent::FileDone { outcome: &outcome });
                        results
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .push(outcome);
                    }
                    Err(err) => {
                        let mut slot = first_error.lock().unwrap_or_else(PoisonError::into_inner);
                        if slot.is_none() {
                            *slot = Some(err);
                        }
                    }
                }
            });
        }
    });

    if let Some(err) = first_error.into_inner().unwrap_or_else(PoisonError::into_inner) {
        return Err(err);
    }

    let outcomes = results.into_inner().unwrap_or_else(PoisonError::into_inner);
    let batch = BatchOutcome::partition(outcomes);
    if batch.total() != total {
        return Err(CoreError::OutcomePartition {
            expected: total,
            actual: batch.total(),
        });
    }
    Ok(batch)
}
