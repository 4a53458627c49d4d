//! A case on disk: the manifest, the files gathered for it, and the
//! upload orchestration against the archive.

use crate::discovery::{self, DiscoveryReport};
use crate::engine::run_batch;
use crate::file::CaseFile;
use crate::observer::{UploadEvent, UploadObserver};
use crate::outcome::FileOutcome;
use crate::retry::RetryPolicy;
use crate::CoreError;
use skarv_meta::{CaseId, CaseManifest, CaseUuid};
use skarv_remote::ArchiveBackend;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Parallel uploads per batch unless the caller says otherwise.
pub const DEFAULT_WORKERS: usize = 4;
/// Batch passes over still-failing files before giving up.
pub const DEFAULT_MAX_ATTEMPTS: usize = 3;

/// Knobs for [`Case::upload`].
#[derive(Debug, Clone)]
pub struct UploadOptions {
    pub workers: usize,
    pub max_attempts: usize,
    /// Register the case on upload when the archive does not know it yet.
    pub auto_register: bool,
    pub policy: RetryPolicy,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            auto_register: false,
            policy: RetryPolicy::default(),
        }
    }
}

/// Final accounting for one [`Case::upload`] call. Every file handed to the
/// engine ends up in exactly one of the three buckets.
#[derive(Debug, Default)]
pub struct UploadReport {
    pub ok: Vec<FileOutcome>,
    pub failed: Vec<FileOutcome>,
    pub rejected: Vec<FileOutcome>,
    /// Batch passes actually run.
    pub attempts: usize,
    pub wall_time: Duration,
}

impl UploadReport {
    pub fn total(&self) -> usize {
        self.ok.len() + self.failed.len() + self.rejected.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.rejected.is_empty()
    }
}

/// A simulation case rooted at the directory holding its manifest.
#[derive(Debug)]
pub struct Case {
    manifest: CaseManifest,
    root: PathBuf,
    remote_id: Option<CaseId>,
    files: Vec<CaseFile>,
}

impl Case {
    /// Load the case manifest and anchor the case at its directory.
    pub fn open(manifest_path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let manifest_path = manifest_path.as_ref();
        let manifest = CaseManifest::load(manifest_path)?;
        // A bare file name has an empty parent, which walkdir cannot open.
        let root = match manifest_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        debug!("opened case {} at {}", manifest.uuid(), root.display());
        Ok(Self {
            manifest,
            root,
            remote_id: None,
            files: Vec::new(),
        })
    }

    pub fn uuid(&self) -> &CaseUuid {
        self.manifest.uuid()
    }

    pub fn name(&self) -> Option<&str> {
        self.manifest.name()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn files(&self) -> &[CaseFile] {
        &self.files
    }

    /// Archive id once the case has been resolved or registered.
    pub fn remote_id(&self) -> Option<&CaseId> {
        self.remote_id.as_ref()
    }

    /// Search the case root for files matching `pattern` and queue them for
    /// upload. Repeated calls append; paths are not deduplicated.
    pub fn add_files(&mut self, pattern: &str) -> Result<DiscoveryReport, CoreError> {
        let (files, skipped) = discovery::discover(&self.root, pattern)?;
        let added = files.len();
        self.files.extend(files);
        debug!("added {added} files for pattern '{pattern}' ({skipped} skipped)");
        Ok(DiscoveryReport { added, skipped })
    }

    /// Look the case up in the archive by uuid. `None` means the case is not
    /// registered; more than one hit is fatal. The answer is cached, so later
    /// calls skip the query.
    pub fn resolve_remote_id(
        &mut self,
        client: &dyn ArchiveBackend,
    ) -> Result<Option<CaseId>, CoreError> {
        if let Some(id) = &self.remote_id {
            return Ok(Some(id.clone()));
        }
        let hits = client.find_cases(self.manifest.uuid())?;
        match hits.as_slice() {
            [] => Ok(None),
            [id] => {
                debug!("case {} resolved to {id}", self.manifest.uuid());
                self.remote_id = Some(id.clone());
                Ok(Some(id.clone()))
            }
            _ => Err(CoreError::DuplicateCase {
                uuid: self.manifest.uuid().clone(),
                hits: hits.len(),
            }),
        }
    }

    /// Push the case manifest to the archive. Always issues the call, even
    /// when the case already resolved; the returned id replaces any cached
    /// one.
    pub fn register(&mut self, client: &dyn ArchiveBackend) -> Result<CaseId, CoreError> {
        info!("registering case {} with the archive", self.manifest.uuid());
        let id = client.register_case(self.manifest.as_json())?;
        self.remote_id = Some(id.clone());
        Ok(id)
    }

    /// Upload every queued file, re-running failed ones in further batch
    /// passes up to `max_attempts`. Queued files move into the report; a
    /// fatal error drops the in-flight cohort.
    pub fn upload(
        &mut self,
        client: &dyn ArchiveBackend,
        options: &UploadOptions,
        observer: &dyn UploadObserver,
    ) -> Result<UploadReport, CoreError> {
        let case_id = match self.resolve_remote_id(client)? {
            Some(id) => id,
            None if options.auto_register => {
                info!("case {} is not registered, registering now", self.uuid());
                self.register(client)?
            }
            None => return Err(CoreError::NotRegistered(self.uuid().clone())),
        };

        if self.files.is_empty() {
            return Err(CoreError::NoFilesToUpload);
        }

        let total = self.files.len();
        info!("uploading {total} files to case {case_id}");

        let started = Instant::now();
        let mut ok = Vec::new();
        let mut rejected = Vec::new();
        let mut failed: Vec<FileOutcome> = Vec::new();
        let mut to_upload: Vec<CaseFile> = self.files.drain(..).collect();
        let mut attempts = 0_usize;

        loop {
            attempts += 1;
            observer.on_event(&UploadEvent::AttemptStarted {
                attempt: attempts,
                files: to_upload.len(),
            });

            let batch = run_batch(
                to_upload,
                &case_id,
                client,
                options.workers,
                &options.policy,
                observer,
            )?;
            observer.on_event(&UploadEvent::AttemptFinished {
                attempt: attempts,
                ok: batch.ok.len(),
                failed: batch.failed.len(),
                rejected: batch.rejected.len(),
            });

            ok.extend(batch.ok);
            rejected.extend(batch.rejected);
            failed = batch.failed;

            if failed.is_empty() || attempts >= options.max_attempts {
                break;
            }

            debug!(
                "retrying {} failed uploads after {:?} pause",
                failed.len(),
                options.policy.batch_pause
            );
            std::thread::sleep(options.policy.batch_pause);
            to_upload = failed.drain(..).map(|outcome| outcome.file).collect();
        }

        if !failed.is_empty() {
            warn!(
                "stopping after {attempts} attempts, {} files still failing",
                failed.len()
            );
            log_outcome_sample("failed", &failed);
        }
        if !rejected.is_empty() {
            warn!("{} files rejected by the archive", rejected.len());
            log_outcome_sample("rejected", &rejected);
        }

        let report = UploadReport {
            ok,
            failed,
            rejected,
            attempts,
            wall_time: started.elapsed(),
        };
        info!(
            "upload finished: total {}, ok {}, failed {}, rejected {}, wall time {:.2}s",
            report.total(),
            report.ok.len(),
            report.failed.len(),
            report.rejected.len(),
            report.wall_time.as_secs_f64()
        );
        Ok(report)
    }
}

/// Log details for the first few outcomes of a bucket.
fn log_outcome_sample(label: &str, outcomes: &[FileOutcome]) {
    for outcome in outcomes.iter().take(4) {
        warn!("{label}: {}", outcome.file.path().display());
        warn!(
            "  metadata: [{}] {}",
            outcome.metadata.status_label(),
            outcome.metadata.response
        );
        if let Some(blob) = &outcome.blob {
            warn!("  blob: [{}] {}", blob.status_label(), blob.response);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::NoopObserver;
    use skarv_meta::sidecar_path;
    use skarv_remote::MemoryArchive;

    const MANIFEST: &str = "\
case:
  uuid: 11d0ffee-dead-beef-aaaa-0123456789ab
  name: drogon-demo
access:
  asset: Drogon
";

    fn write_case(dir: &Path) -> PathBuf {
        let path = dir.join("case.yml");
        std::fs::write(&path, MANIFEST).unwrap();
        path
    }

    fn write_pair(dir: &Path, name: &str, data: &[u8]) {
        let path = dir.join(name);
        std::fs::write(&path, data).unwrap();
        std::fs::write(sidecar_path(&path), "class: surface\n").unwrap();
    }

    fn quick_options() -> UploadOptions {
        UploadOptions {
            workers: 2,
            policy: RetryPolicy::immediate(),
            ..UploadOptions::default()
        }
    }

    #[test]
    fn open_reads_uuid_and_name() {
        let dir = tempfile::tempdir().unwrap();
        let case = Case::open(write_case(dir.path())).unwrap();
        assert_eq!(
            case.uuid().as_str(),
            "11d0ffee-dead-beef-aaaa-0123456789ab"
        );
        assert_eq!(case.name(), Some("drogon-demo"));
        assert_eq!(case.root(), dir.path());
        assert!(case.remote_id().is_none());
    }

    #[test]
    fn manifest_without_uuid_is_a_metadata_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("case.yml");
        std::fs::write(&path, "case:\n  name: nameless\n").unwrap();
        let err = Case::open(&path).unwrap_err();
        assert!(matches!(err, CoreError::Meta(_)));
    }

    #[test]
    fn add_files_appends_without_deduplication() {
        let dir = tempfile::tempdir().unwrap();
        let mut case = Case::open(write_case(dir.path())).unwrap();
        write_pair(dir.path(), "a.bin", b"aa");
        write_pair(dir.path(), "b.bin", b"bb");

        let report = case.add_files("*.bin").unwrap();
        assert_eq!(report.added, 2);
        assert_eq!(report.skipped, 0);
        assert_eq!(case.files().len(), 2);

        case.add_files("a.bin").unwrap();
        assert_eq!(case.files().len(), 3);
    }

    #[test]
    fn resolve_unregistered_case_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let mut case = Case::open(write_case(dir.path())).unwrap();
        let archive = MemoryArchive::new();

        assert!(case.resolve_remote_id(&archive).unwrap().is_none());
        assert!(case.remote_id().is_none());
        assert_eq!(archive.find_calls(), 1);
    }

    #[test]
    fn resolve_caches_after_a_single_hit() {
        let dir = tempfile::tempdir().unwrap();
        let mut case = Case::open(write_case(dir.path())).unwrap();
        let archive = MemoryArchive::new();
        let seeded = archive.seed_case(case.uuid().as_str());

        let first = case.resolve_remote_id(&archive).unwrap().unwrap();
        let second = case.resolve_remote_id(&archive).unwrap().unwrap();
        assert_eq!(first, seeded);
        assert_eq!(second, seeded);
        assert_eq!(archive.find_calls(), 1);
    }

    #[test]
    fn duplicate_remote_cases_are_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut case = Case::open(write_case(dir.path())).unwrap();
        let archive = MemoryArchive::new();
        archive.seed_case(case.uuid().as_str());
        archive.seed_case(case.uuid().as_str());

        let err = case.resolve_remote_id(&archive).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateCase { hits: 2, .. }));
    }

    #[test]
    fn register_overwrites_the_cached_id() {
        let dir = tempfile::tempdir().unwrap();
        let mut case = Case::open(write_case(dir.path())).unwrap();
        let archive = MemoryArchive::new();

        let first = case.register(&archive).unwrap();
        let second = case.register(&archive).unwrap();
        assert_ne!(first, second);
        assert_eq!(case.remote_id(), Some(&second));
        assert_eq!(archive.case_count(), 2);
    }

    #[test]
    fn upload_without_registration_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let mut case = Case::open(write_case(dir.path())).unwrap();
        write_pair(dir.path(), "a.bin", b"aa");
        case.add_files("*.bin").unwrap();
        let archive = MemoryArchive::new();

        let err = case
            .upload(&archive, &quick_options(), &NoopObserver)
            .unwrap_err();
        assert!(matches!(err, CoreError::NotRegistered(_)));
        assert_eq!(archive.total_meta_calls(), 0);
    }

    #[test]
    fn auto_register_uploads_to_a_fresh_case() {
        let dir = tempfile::tempdir().unwrap();
        let mut case = Case::open(write_case(dir.path())).unwrap();
        write_pair(dir.path(), "a.bin", b"aa");
        case.add_files("*.bin").unwrap();
        let archive = MemoryArchive::new();

        let options = UploadOptions {
            auto_register: true,
            ..quick_options()
        };
        let report = case.upload(&archive, &options, &NoopObserver).unwrap();
        assert!(report.is_complete());
        assert_eq!(report.ok.len(), 1);
        assert_eq!(archive.case_count(), 1);
        assert!(case.remote_id().is_some());
    }

    #[test]
    fn upload_without_files_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let mut case = Case::open(write_case(dir.path())).unwrap();
        let archive = MemoryArchive::new();
        archive.seed_case(case.uuid().as_str());

        let err = case
            .upload(&archive, &quick_options(), &NoopObserver)
            .unwrap_err();
        assert!(matches!(err, CoreError::NoFilesToUpload));
    }

    #[test]
    fn upload_drains_the_queue_into_the_report() {
        let dir = tempfile::tempdir().unwrap();
        let mut case = Case::open(write_case(dir.path())).unwrap();
        write_pair(dir.path(), "a.bin", b"aa");
        write_pair(dir.path(), "b.bin", b"bb");
        case.add_files("*.bin").unwrap();
        let archive = MemoryArchive::new();
        archive.seed_case(case.uuid().as_str());

        let report = case
            .upload(&archive, &quick_options(), &NoopObserver)
            .unwrap();
        assert_eq!(report.total(), 2);
        assert_eq!(report.attempts, 1);
        assert!(case.files().is_empty());
        assert_eq!(archive.object_count(), 2);
    }
}
