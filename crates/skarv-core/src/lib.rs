//! Concurrent batch upload engine for simulation case results.
//!
//! This crate ties together sidecar metadata, the archive backend, and a
//! bounded worker pool into the upload pipeline: `Case` owns the files
//! discovered on disk and drives the batch retry loop, `run_batch` fans one
//! attempt out over worker threads, and `CaseFile` carries the per-file
//! upload contract (metadata first, then the blob, with a compensating
//! delete when the blob cannot follow the metadata).

pub mod case;
pub mod discovery;
pub mod engine;
pub mod file;
pub mod observer;
pub mod outcome;
pub mod retry;

pub use case::{Case, UploadOptions, UploadReport, DEFAULT_MAX_ATTEMPTS, DEFAULT_WORKERS};
pub use discovery::DiscoveryReport;
pub use engine::run_batch;
pub use file::CaseFile;
pub use observer::{NoopObserver, UploadEvent, UploadObserver};
pub use outcome::{BatchOutcome, FileOutcome, PhaseStats, UploadStatus};
pub use retry::RetryPolicy;

use skarv_meta::CaseUuid;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("metadata error: {0}")]
    Meta(#[from] skarv_meta::MetaError),
    #[error("remote error: {0}")]
    Remote(#[from] skarv_remote::RemoteError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("case {0} is not registered in the archive; register it first")]
    NotRegistered(CaseUuid),
    #[error("no files to upload; check the search pattern")]
    NoFilesToUpload,
    #[error("found {hits} archive cases for uuid {uuid}; expected at most one")]
    DuplicateCase { uuid: CaseUuid, hits: usize },
    #[error("outcome partition mismatch: {actual} outcomes for {expected} files")]
    OutcomePartition { expected: usize, actual: usize },
}
