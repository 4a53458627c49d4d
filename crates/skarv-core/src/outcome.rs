//! Per-file and per-batch upload results.
//!
//! Every file fed into one engine call ends up in exactly one of the three
//! buckets of [`BatchOutcome`]; the partition is checked by the engine and
//! violating it is a fatal consistency error, not a retryable one.

use crate::file::CaseFile;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Instant;

/// Classification of one upload attempt for one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    /// Both phases accepted with 200 or 201.
    Ok,
    /// Transient condition; eligible for the batch retry loop.
    Failed,
    /// Permanently refused (auth, malformed metadata); never retried.
    Rejected,
}

impl std::fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Ok => "ok",
            Self::Failed => "failed",
            Self::Rejected => "rejected",
        };
        f.write_str(label)
    }
}

/// Timing and response capture for one upload phase (metadata or blob).
///
/// The elapsed time spans every try of the phase, backoff sleeps included;
/// status code and response text are from the last try.
#[derive(Debug, Clone, Serialize)]
pub struct PhaseStats {
    pub status_code: Option<u16>,
    pub response: String,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

impl PhaseStats {
    /// Status code as text, `-` when the failure never reached the remote.
    #[must_use]
    pub fn status_label(&self) -> String {
        self.status_code
            .map_or_else(|| "-".to_owned(), |code| code.to_string())
    }
}

/// Captures the start of a phase and stamps out [`PhaseStats`] per try.
pub(crate) struct PhaseTimer {
    started_at: DateTime<Utc>,
    clock: Instant,
}

impl PhaseTimer {
    pub(crate) fn start() -> Self {
        Self {
            started_at: Utc::now(),
            clock: Instant::now(),
        }
    }

    pub(crate) fn stats(&self, status_code: Option<u16>, response: String) -> PhaseStats {
        PhaseStats {
            status_code,
            response,
            started_at: self.started_at,
            elapsed_ms: u64::try_from(self.clock.elapsed().as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// Result of one upload attempt for one file. Owns the file so the batch
/// retry loop can re-feed failed files without copying them.
#[derive(Debug)]
pub struct FileOutcome {
    pub file: CaseFile,
    pub status: UploadStatus,
    pub metadata: PhaseStats,
    /// `None` when the metadata phase never succeeded.
    pub blob: Option<PhaseStats>,
}

/// The three outcome buckets of one engine call.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub ok: Vec<FileOutcome>,
    pub failed: Vec<FileOutcome>,
    pub rejected: Vec<FileOutcome>,
}

impl BatchOutcome {
    pub(crate) fn partition(outcomes: Vec<FileOutcome>) -> Self {
        let mut batch = Self::default();
        for outcome in outcomes {
            match outcome.status {
                UploadStatus::Ok => batch.ok.push(outcome),
                UploadStatus::Failed => batch.failed.push(outcome),
                UploadStatus::Rejected => batch.rejected.push(outcome),
            }
        }
        batch
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.ok.len() + self.failed.len() + self.rejected.len()
    }
}
