//! Archive access for skarv: the backend contract and its HTTP implementation.
//!
//! This crate defines the wire-level boundary the upload core depends on: the
//! [`ArchiveBackend`] trait (register a case, upload object metadata, upload a
//! blob, query by case uuid, delete an object), the classified [`RemoteError`]
//! the engine switches on, and [`HttpBackend`], a blocking `ureq` client for
//! the archive's REST API. Endpoint configuration lives in [`RemoteConfig`].

pub mod config;
pub mod http;
pub mod memory;

pub use config::{ConfigError, RemoteConfig};
pub use http::HttpBackend;
pub use memory::{Fault, MemoryArchive};

use serde_json::Value;
use skarv_meta::{CaseId, CaseUuid, ObjectId};
use std::fmt;
use thiserror::Error;

/// How a failed archive call should be treated by the caller.
///
/// This is a closed set on purpose: the upload engine switches on it and
/// nothing else. `Transient` is retried with backoff, `Auth` and `Permanent`
/// are surfaced as rejected without another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Transient,
    Auth,
    Permanent,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let word = match self {
            FailureKind::Transient => "transient",
            FailureKind::Auth => "authentication",
            FailureKind::Permanent => "permanent",
        };
        f.write_str(word)
    }
}

/// A classified failure from an archive call.
///
/// `status` is present when the failure came from an HTTP response rather
/// than the transport; `message` carries the response text for diagnostics.
#[derive(Debug, Clone, Error)]
#[error("{kind} error: {message}")]
pub struct RemoteError {
    pub kind: FailureKind,
    pub status: Option<u16>,
    pub message: String,
}

impl RemoteError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Transient,
            status: None,
            message: message.into(),
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Auth,
            status: None,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Permanent,
            status: None,
            message: message.into(),
        }
    }

    /// Classify an HTTP error status: auth codes are `Auth`, the rest of the
    /// 400 class is `Permanent`, everything else (5xx, 429) is `Transient`.
    pub fn from_status(status: u16, body: &str) -> Self {
        let kind = match status {
            401 | 403 => FailureKind::Auth,
            429 => FailureKind::Transient,
            400..=499 => FailureKind::Permanent,
            _ => FailureKind::Transient,
        };
        let message = if body.trim().is_empty() {
            format!("HTTP {status}")
        } else {
            format!("HTTP {status}: {}", body.trim())
        };
        Self {
            kind,
            status: Some(status),
            message,
        }
    }
}

impl From<std::io::Error> for RemoteError {
    fn from(e: std::io::Error) -> Self {
        Self::transient(e.to_string())
    }
}

impl From<ureq::Error> for RemoteError {
    fn from(e: ureq::Error) -> Self {
        match e {
            ureq::Error::StatusCode(code) => Self::from_status(code, ""),
            // Transport-level failures: refused connection, reset, DNS.
            other => Self::transient(other.to_string()),
        }
    }
}

/// Result of an object-metadata upload.
///
/// The ids are populated only when the archive accepted the document with
/// 200 or 201; other success-class codes return the receipt for the caller
/// to classify.
#[derive(Debug, Clone)]
pub struct MetaReceipt {
    pub status: u16,
    pub object_id: Option<ObjectId>,
    pub blob_target: Option<String>,
    pub response: String,
}

/// Result of a blob upload.
#[derive(Debug, Clone)]
pub struct BlobReceipt {
    pub status: u16,
    pub response: String,
}

/// The archive API as the upload core sees it.
///
/// Implementations must be shareable read-only across worker threads; the
/// credential is part of the backend, never passed per call.
pub trait ArchiveBackend: Send + Sync {
    /// Create a new case container from its manifest document.
    fn register_case(&self, meta: &Value) -> Result<CaseId, RemoteError>;

    /// All case ids carrying the given case uuid (capped to a small probe
    /// limit; the caller only distinguishes zero, one, and many).
    fn find_cases(&self, uuid: &CaseUuid) -> Result<Vec<CaseId>, RemoteError>;

    /// Upload one object's metadata document under a case.
    fn put_object_meta(&self, case_id: &CaseId, meta: &Value) -> Result<MetaReceipt, RemoteError>;

    /// Upload an object's raw bytes to the target returned by
    /// [`ArchiveBackend::put_object_meta`].
    fn put_blob(
        &self,
        object_id: &ObjectId,
        blob_target: &str,
        data: &[u8],
    ) -> Result<BlobReceipt, RemoteError>;

    /// Delete an object's metadata document (the compensating action when a
    /// blob upload cannot complete). Returns the status code.
    fn delete_object(&self, object_id: &ObjectId) -> Result<u16, RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification_table() {
        assert_eq!(RemoteError::from_status(401, "").kind, FailureKind::Auth);
        assert_eq!(RemoteError::from_status(403, "").kind, FailureKind::Auth);
        assert_eq!(
            RemoteError::from_status(429, "").kind,
            FailureKind::Transient
        );
        assert_eq!(
            RemoteError::from_status(400, "").kind,
            FailureKind::Permanent
        );
        assert_eq!(
            RemoteError::from_status(422, "").kind,
            FailureKind::Permanent
        );
        assert_eq!(
            RemoteError::from_status(500, "").kind,
            FailureKind::Transient
        );
        assert_eq!(
            RemoteError::from_status(503, "").kind,
            FailureKind::Transient
        );
    }

    #[test]
    fn from_status_keeps_code_and_body() {
        let err = RemoteError::from_status(400, "schema validation failed");
        assert_eq!(err.status, Some(400));
        assert!(err.to_string().contains("HTTP 400"));
        assert!(err.to_string().contains("schema validation failed"));
    }

    #[test]
    fn io_errors_are_transient() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err = RemoteError::from(io);
        assert_eq!(err.kind, FailureKind::Transient);
        assert_eq!(err.status, None);
    }

    #[test]
    fn kind_display_words() {
        assert_eq!(FailureKind::Transient.to_string(), "transient");
        assert_eq!(FailureKind::Auth.to_string(), "authentication");
        assert_eq!(FailureKind::Permanent.to_string(), "permanent");
    }
}
