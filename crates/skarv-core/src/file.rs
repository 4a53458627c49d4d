//! One local result file and its upload contract.
//!
//! A `CaseFile` is a data file plus its parsed sidecar document. Everything
//! derived (size, checksum, relative path) is computed at construction, and
//! the sidecar document is augmented exactly once with the blob info block
//! and the relative path before the first upload.

use crate::outcome::{FileOutcome, PhaseStats, PhaseTimer, UploadStatus};
use crate::retry::RetryPolicy;
use crate::CoreError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use skarv_meta::{sidecar_path, CaseId, MetaError, MetadataDoc, ObjectId};
use skarv_remote::{ArchiveBackend, FailureKind, MetaReceipt};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug)]
pub struct CaseFile {
    path: PathBuf,
    sidecar: PathBuf,
    metadata: MetadataDoc,
    bytes: Vec<u8>,
    size: u64,
    checksum_md5: String,
    relative_path: String,
    remote_object_id: Option<ObjectId>,
    remote_case_id: Option<CaseId>,
}

impl CaseFile {
    /// Load a data file with its conventional sidecar (`/dir/f.bin` pairs
    /// with `/dir/.f.bin.yml`).
    pub fn from_path(
        path: impl AsRef<Path>,
        case_root: impl AsRef<Path>,
    ) -> Result<Self, CoreError> {
        let path = path.as_ref();
        Self::with_sidecar(path, &sidecar_path(path), case_root.as_ref())
    }

    /// Load a data file with an explicit sidecar path.
    pub fn with_sidecar(path: &Path, sidecar: &Path, case_root: &Path) -> Result<Self, CoreError> {
        let mut metadata = MetadataDoc::from_yaml_file(sidecar).map_err(|err| match err {
            MetaError::Io(e) if e.kind() == std::io::ErrorKind::NotFound => {
                MetaError::SidecarMissing(sidecar.to_path_buf())
            }
            other => other,
        })?;
        let bytes = std::fs::read(path)?;
        let size = bytes.len() as u64;
        let checksum_md5 = STANDARD.encode(md5::compute(&bytes).0);
        let relative_path = path
            .strip_prefix(case_root)
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned();

        metadata.attach_blob_info(size, &checksum_md5);
        metadata.set_relative_path(&relative_path);

        Ok(Self {
            path: path.to_path_buf(),
            sidecar: sidecar.to_path_buf(),
            metadata,
            bytes,
            size,
            checksum_md5,
            relative_path,
            remote_object_id: None,
            remote_case_id: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sidecar(&self) -> &Path {
        &self.sidecar
    }

    pub fn metadata(&self) -> &MetadataDoc {
        &self.metadata
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Base64-encoded MD5 digest of the file content.
    pub fn checksum_md5(&self) -> &str {
        &self.checksum_md5
    }

    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }

    /// Set on the first accepted metadata upload; overwritten, never
    /// duplicated, when the same file goes through another attempt.
    pub fn remote_object_id(&self) -> Option<&ObjectId> {
        self.remote_object_id.as_ref()
    }

    pub fn remote_case_id(&self) -> Option<&CaseId> {
        self.remote_case_id.as_ref()
    }

    /// Upload this file under `case_id`: metadata first, then the blob.
    ///
    /// Transient failures retry per `policy.backoff` within each phase.
    /// Authentication and permanent failures reject immediately. Whenever
    /// the metadata object was created but the blob did not follow, the
    /// metadata object is deleted before the outcome is returned; an
    /// orphaned metadata object must never remain.
    pub fn upload(
        mut self,
        case_id: &CaseId,
        client: &dyn ArchiveBackend,
        policy: &RetryPolicy,
    ) -> Result<FileOutcome, CoreError> {
        if case_id.is_empty() {
            return Err(CoreError::InvalidArgument(
                "case id must not be empty".to_owned(),
            ));
        }

        let tries = policy.tries();
        let meta_timer = PhaseTimer::start();
        let mut meta_stats: Option<PhaseStats> = None;
        let mut receipt: Option<MetaReceipt> = None;

        for try_no in 0..tries {
            match client.put_object_meta(case_id, self.metadata.as_json()) {
                Ok(r) => {
                    meta_stats = Some(meta_timer.stats(Some(r.status), r.response.clone()));
                    receipt = Some(r);
                    break;
                }
                Err(err) => {
                    let stats = meta_timer.stats(err.status, err.message.clone());
                    match err.kind {
                        FailureKind::Transient => {
                            debug!(
                                "transient metadata failure for {} (try {}/{tries}): {err}",
                                self.relative_path,
                                try_no + 1,
                            );
                            meta_stats = Some(stats);
                            if let Some(delay) = policy.backoff.get(try_no) {
                                std::thread::sleep(*delay);
                            }
                        }
                        FailureKind::Auth | FailureKind::Permanent => {
                            debug!("metadata for {} rejected: {err}", self.relative_path);
                            return Ok(self.outcome(UploadStatus::Rejected, stats, None));
                        }
                    }
                }
            }
        }

        let metadata = meta_stats.unwrap_or_else(|| meta_timer.stats(None, String::new()));
        let Some(receipt) = receipt else {
            debug!("metadata retries exhausted for {}", self.relative_path);
            return Ok(self.outcome(UploadStatus::Failed, metadata, None));
        };
        if !matches!(receipt.status, 200 | 201) {
            debug!(
                "metadata for {} answered {}",
                self.relative_path, receipt.status
            );
            return Ok(self.outcome(UploadStatus::Failed, metadata, None));
        }
        let (Some(object_id), Some(blob_target)) = (receipt.object_id, receipt.blob_target) else {
            warn!(
                "metadata accepted for {} but the response carried no object id",
                self.relative_path
            );
            return Ok(self.outcome(UploadStatus::Failed, metadata, None));
        };

        self.remote_case_id = Some(case_id.clone());
        self.remote_object_id = Some(object_id.clone());

        let blob_timer = PhaseTimer::start();
        let mut blob_stats: Option<PhaseStats> = None;
        let mut accepted = false;
        let mut blob_rejected = false;

        for try_no in 0..tries {
            match client.put_blob(&object_id, &blob_target, &self.bytes) {
                Ok(r) => {
                    accepted = matches!(r.status, 200 | 201);
                    blob_stats = Some(blob_timer.stats(Some(r.status), r.response.clone()));
                    break;
                }
                Err(err) => {
                    blob_stats = Some(blob_timer.stats(err.status, err.message.clone()));
                    match err.kind {
                        FailureKind::Transient => {
                            debug!(
                                "transient blob failure for {} (try {}/{tries}): {err}",
                                self.relative_path,
                                try_no + 1,
                            );
                            if let Some(delay) = policy.backoff.get(try_no) {
                                std::thread::sleep(*delay);
                            }
                        }
                        FailureKind::Auth | FailureKind::Permanent => {
                            debug!("blob for {} rejected: {err}", self.relative_path);
                            blob_rejected = true;
                            break;
                        }
                    }
                }
            }
        }

        let blob = blob_stats.unwrap_or_else(|| blob_timer.stats(None, String::new()));
        let status = if accepted {
            UploadStatus::Ok
        } else if blob_rejected {
            UploadStatus::Rejected
        } else {
            UploadStatus::Failed
        };

        if status != UploadStatus::Ok {
            delete_metadata(client, &object_id, &self.relative_path);
        }

        Ok(self.outcome(status, metadata, Some(blob)))
    }

    fn outcome(
        self,
        status: UploadStatus,
        metadata: PhaseStats,
        blob: Option<PhaseStats>,
    ) -> FileOutcome {
        FileOutcome {
            file: self,
            status,
            metadata,
            blob,
        }
    }
}

/// Compensating delete for a metadata object whose blob never arrived.
/// Failure is logged and swallowed; the outcome status stands either way.
fn delete_metadata(client: &dyn ArchiveBackend, object_id: &ObjectId, rel_path: &str) {
    debug!("deleting metadata object {object_id} for {rel_path}");
    if let Err(err) = client.delete_object(object_id) {
        warn!("could not delete metadata object {object_id} for {rel_path}: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skarv_remote::{Fault, MemoryArchive, RemoteError};

    fn write_pair(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
        let data = dir.join(name);
        if let Some(parent) = data.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&data, content).unwrap();
        std::fs::write(sidecar_path(&data), "class: surface\nname: test\n").unwrap();
        data
    }

    fn ready_archive() -> (MemoryArchive, CaseId) {
        let archive = MemoryArchive::new();
        let case_id = archive.seed_case("u-1");
        (archive, case_id)
    }

    #[test]
    fn construction_derives_checksum_size_and_relative_path() {
        let dir = tempfile::tempdir().unwrap();
        let data = write_pair(&dir.path().join("results"), "a.bin", b"hello world");
        let file = CaseFile::from_path(&data, dir.path()).unwrap();

        assert_eq!(file.size(), 11);
        assert_eq!(file.checksum_md5(), "XrY7u+Ae7tCTyyK7j1rNww==");
        assert_eq!(file.relative_path(), "results/a.bin");
        assert!(file.remote_object_id().is_none());
    }

    #[test]
    fn metadata_gains_blob_block_and_relative_path() {
        let dir = tempfile::tempdir().unwrap();
        let data = write_pair(dir.path(), "a.bin", b"abc");
        let file = CaseFile::from_path(&data, dir.path()).unwrap();

        let json = file.metadata().as_json();
        assert_eq!(json["_skarv"]["blob_size"], 3);
        assert_eq!(json["_skarv"]["blob_md5"], file.checksum_md5());
        assert_eq!(json["file"]["relative_path"], "a.bin");
        assert_eq!(json["class"], "surface");
    }

    #[test]
    fn missing_sidecar_is_a_metadata_error() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("orphan.bin");
        std::fs::write(&data, b"data").unwrap();

        let err = CaseFile::from_path(&data, dir.path()).unwrap_err();
        assert!(matches!(err, CoreError::Meta(MetaError::SidecarMissing(_))));
    }

    #[test]
    fn upload_happy_path_sets_remote_ids_and_stores_blob() {
        let dir = tempfile::tempdir().unwrap();
        let data = write_pair(dir.path(), "a.bin", b"payload");
        let file = CaseFile::from_path(&data, dir.path()).unwrap();
        let (archive, case_id) = ready_archive();

        let outcome = file
            .upload(&case_id, &archive, &RetryPolicy::immediate())
            .unwrap();

        assert_eq!(outcome.status, UploadStatus::Ok);
        assert_eq!(outcome.metadata.status_code, Some(200));
        assert_eq!(outcome.blob.as_ref().unwrap().status_code, Some(200));
        assert_eq!(outcome.file.remote_case_id(), Some(&case_id));
        assert!(outcome.file.remote_object_id().is_some());
        assert_eq!(archive.blob_of("a.bin").unwrap(), b"payload");
    }

    #[test]
    fn empty_case_id_is_invalid_argument() {
        let dir = tempfile::tempdir().unwrap();
        let data = write_pair(dir.path(), "a.bin", b"x");
        let file = CaseFile::from_path(&data, dir.path()).unwrap();
        let (archive, _) = ready_archive();

        let err = file
            .upload(&CaseId::new(""), &archive, &RetryPolicy::immediate())
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidArgument(_)));
    }

    #[test]
    fn auth_failure_rejects_without_blob_or_delete() {
        let dir = tempfile::tempdir().unwrap();
        let data = write_pair(dir.path(), "a.bin", b"x");
        let file = CaseFile::from_path(&data, dir.path()).unwrap();
        let (archive, case_id) = ready_archive();
        archive.fail_meta(
            "a.bin",
            vec![Fault::Error(RemoteError::auth("bad token"))],
        );

        let outcome = file
            .upload(&case_id, &archive, &RetryPolicy::immediate())
            .unwrap();

        assert_eq!(outcome.status, UploadStatus::Rejected);
        assert!(outcome.blob.is_none());
        assert_eq!(archive.meta_calls("a.bin"), 1);
        assert_eq!(archive.blob_calls("a.bin"), 0);
        assert_eq!(archive.delete_calls("a.bin"), 0);
    }

    #[test]
    fn transient_metadata_retries_then_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let data = write_pair(dir.path(), "a.bin", b"x");
        let file = CaseFile::from_path(&data, dir.path()).unwrap();
        let (archive, case_id) = ready_archive();
        archive.fail_meta(
            "a.bin",
            vec![
                Fault::Error(RemoteError::transient("blip")),
                Fault::Error(RemoteError::transient("blip again")),
            ],
        );

        let outcome = file
            .upload(&case_id, &archive, &RetryPolicy::immediate())
            .unwrap();

        assert_eq!(outcome.status, UploadStatus::Ok);
        assert_eq!(archive.meta_calls("a.bin"), 3);
    }

    #[test]
    fn transient_metadata_exhaustion_is_failed() {
        let dir = tempfile::tempdir().unwrap();
        let data = write_pair(dir.path(), "a.bin", b"x");
        let file = CaseFile::from_path(&data, dir.path()).unwrap();
        let (archive, case_id) = ready_archive();
        archive.fail_meta(
            "a.bin",
            vec![Fault::Error(RemoteError::transient("down")); 3],
        );

        let outcome = file
            .upload(&case_id, &archive, &RetryPolicy::immediate())
            .unwrap();

        assert_eq!(outcome.status, UploadStatus::Failed);
        assert!(outcome.blob.is_none());
        assert_eq!(archive.meta_calls("a.bin"), 3);
        assert_eq!(archive.delete_calls("a.bin"), 0);
    }

    #[test]
    fn permanent_blob_failure_rejects_and_deletes_once() {
        let dir = tempfile::tempdir().unwrap();
        let data = write_pair(dir.path(), "a.bin", b"x");
        let file = CaseFile::from_path(&data, dir.path()).unwrap();
        let (archive, case_id) = ready_archive();
        archive.fail_blob(
            "a.bin",
            vec![Fault::Error(RemoteError::permanent("bad digest"))],
        );

        let outcome = file
            .upload(&case_id, &archive, &RetryPolicy::immediate())
            .unwrap();

        assert_eq!(outcome.status, UploadStatus::Rejected);
        assert_eq!(archive.delete_calls("a.bin"), 1);
        assert_eq!(archive.object_count(), 0);
    }

    #[test]
    fn transient_blob_exhaustion_fails_and_deletes_once() {
        let dir = tempfile::tempdir().unwrap();
        let data = write_pair(dir.path(), "a.bin", b"x");
        let file = CaseFile::from_path(&data, dir.path()).unwrap();
        let (archive, case_id) = ready_archive();
        archive.fail_blob(
            "a.bin",
            vec![Fault::Error(RemoteError::transient("flaky")); 3],
        );

        let outcome = file
            .upload(&case_id, &archive, &RetryPolicy::immediate())
            .unwrap();

        assert_eq!(outcome.status, UploadStatus::Failed);
        assert_eq!(archive.blob_calls("a.bin"), 3);
        assert_eq!(archive.delete_calls("a.bin"), 1);
    }

    #[test]
    fn odd_metadata_status_is_failed_without_ids() {
        let dir = tempfile::tempdir().unwrap();
        let data = write_pair(dir.path(), "a.bin", b"x");
        let file = CaseFile::from_path(&data, dir.path()).unwrap();
        let (archive, case_id) = ready_archive();
        archive.fail_meta("a.bin", vec![Fault::Status(202)]);

        let outcome = file
            .upload(&case_id, &archive, &RetryPolicy::immediate())
            .unwrap();

        assert_eq!(outcome.status, UploadStatus::Failed);
        assert_eq!(outcome.metadata.status_code, Some(202));
        assert!(outcome.file.remote_object_id().is_none());
        assert_eq!(archive.blob_calls("a.bin"), 0);
        assert_eq!(archive.delete_calls("a.bin"), 0);
    }

    #[test]
    fn failed_compensating_delete_keeps_outcome_status() {
        let dir = tempfile::tempdir().unwrap();
        let data = write_pair(dir.path(), "a.bin", b"x");
        let file = CaseFile::from_path(&data, dir.path()).unwrap();
        let (archive, case_id) = ready_archive();
        archive.fail_blob(
            "a.bin",
            vec![Fault::Error(RemoteError::permanent("bad digest"))],
        );
        archive.fail_delete(
            "a.bin",
            vec![Fault::Error(RemoteError::transient("delete hiccup"))],
        );

        let outcome = file
            .upload(&case_id, &archive, &RetryPolicy::immediate())
            .unwrap();

        assert_eq!(outcome.status, UploadStatus::Rejected);
        assert_eq!(archive.delete_calls("a.bin"), 1);
    }

    #[test]
    fn reupload_overwrites_remote_ids() {
        let dir = tempfile::tempdir().unwrap();
        let data = write_pair(dir.path(), "a.bin", b"x");
        let file = CaseFile::from_path(&data, dir.path()).unwrap();
        let (archive, case_id) = ready_archive();
        archive.fail_blob(
            "a.bin",
            vec![Fault::Error(RemoteError::transient("flaky")); 3],
        );

        let first = file
            .upload(&case_id, &archive, &RetryPolicy::immediate())
            .unwrap();
        assert_eq!(first.status, UploadStatus::Failed);
        let first_id = first.file.remote_object_id().cloned().unwrap();

        let second = first
            .file
            .upload(&case_id, &archive, &RetryPolicy::immediate())
            .unwrap();
        assert_eq!(second.status, UploadStatus::Ok);
        let second_id = second.file.remote_object_id().cloned().unwrap();
        assert_ne!(first_id, second_id);
    }
}
