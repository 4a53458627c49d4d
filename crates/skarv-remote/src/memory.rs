//! In-memory archive backend with scripted fault injection.
//!
//! Engine and orchestration tests run against this backend instead of a
//! live server. It mirrors the reference server's semantics (case and
//! object storage, blob targets, deletes) and adds per-path failure
//! scripting so tests can drive every classification branch.

use crate::{ArchiveBackend, BlobReceipt, MetaReceipt, RemoteError};
use serde_json::Value;
use skarv_meta::{CaseId, CaseUuid, ObjectId};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Scripted behavior for one backend call, consumed in FIFO order.
#[derive(Debug, Clone)]
pub enum Fault {
    /// The call fails with this error.
    Error(RemoteError),
    /// The call succeeds but reports this status code and carries no ids.
    Status(u16),
}

#[derive(Debug, Clone)]
struct StoredCase {
    id: CaseId,
    meta: Value,
}

#[derive(Debug, Clone)]
struct StoredObject {
    meta: Value,
    rel_path: String,
    blob_target: String,
    blob: Option<Vec<u8>>,
}

#[derive(Debug, Default)]
struct CallLog {
    register: usize,
    find: usize,
    meta: Vec<String>,
    blob: Vec<String>,
    delete: Vec<String>,
}

#[derive(Debug, Default)]
struct ArchiveState {
    next_case: u64,
    next_object: u64,
    cases: Vec<StoredCase>,
    objects: HashMap<String, StoredObject>,
    meta_faults: HashMap<String, VecDeque<Fault>>,
    blob_faults: HashMap<String, VecDeque<Fault>>,
    delete_faults: HashMap<String, VecDeque<Fault>>,
    register_faults: VecDeque<RemoteError>,
    find_faults: VecDeque<RemoteError>,
    calls: CallLog,
}

pub struct MemoryArchive {
    state: Mutex<ArchiveState>,
}

impl Default for MemoryArchive {
    fn default() -> Self {
        Self {
            state: Mutex::new(ArchiveState::default()),
        }
    }
}

fn rel_path_of(meta: &Value) -> String {
    meta.get("file")
        .and_then(|file| file.get("relative_path"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned()
}

impl MemoryArchive {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ArchiveState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a minimal case for the given uuid, bypassing fault scripts.
    /// Call twice to simulate a duplicated remote case.
    pub fn seed_case(&self, uuid: &str) -> CaseId {
        let mut state = self.lock();
        state.next_case += 1;
        let id = CaseId::from(format!("case-{}", state.next_case));
        state.cases.push(StoredCase {
            id: id.clone(),
            meta: serde_json::json!({"case": {"uuid": uuid}}),
        });
        id
    }

    /// Queue an error for the next `register_case` call.
    pub fn fail_register(&self, error: RemoteError) {
        self.lock().register_faults.push_back(error);
    }

    /// Queue an error for the next `find_cases` call.
    pub fn fail_find(&self, error: RemoteError) {
        self.lock().find_faults.push_back(error);
    }

    /// Queue faults for `put_object_meta` calls carrying this relative path.
    pub fn fail_meta(&self, rel_path: &str, faults: Vec<Fault>) {
        self.lock()
            .meta_faults
            .entry(rel_path.to_owned())
            .or_default()
            .extend(faults);
    }

    /// Queue faults for `put_blob` calls belonging to this relative path.
    pub fn fail_blob(&self, rel_path: &str, faults: Vec<Fault>) {
        self.lock()
            .blob_faults
            .entry(rel_path.to_owned())
            .or_default()
            .extend(faults);
    }

    /// Queue faults for `delete_object` calls belonging to this relative path.
    pub fn fail_delete(&self, rel_path: &str, faults: Vec<Fault>) {
        self.lock()
            .delete_faults
            .entry(rel_path.to_owned())
            .or_default()
            .extend(faults);
    }

    #[must_use]
    pub fn case_count(&self) -> usize {
        self.lock().cases.len()
    }

    /// Live objects, deletions subtracted.
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.lock().objects.len()
    }

    #[must_use]
    pub fn object_id_for(&self, rel_path: &str) -> Option<ObjectId> {
        self.lock()
            .objects
            .iter()
            .find(|(_, object)| object.rel_path == rel_path)
            .map(|(id, _)| ObjectId::from(id.as_str()))
    }

    #[must_use]
    pub fn object_meta_for(&self, rel_path: &str) -> Option<Value> {
        self.lock()
            .objects
            .values()
            .find(|object| object.rel_path == rel_path)
            .map(|object| object.meta.clone())
    }

    #[must_use]
    pub fn blob_of(&self, rel_path: &str) -> Option<Vec<u8>> {
        self.lock()
            .objects
            .values()
            .find(|object| object.rel_path == rel_path)
            .and_then(|object| object.blob.clone())
    }

    #[must_use]
    pub fn register_calls(&self) -> usize {
        self.lock().calls.register
    }

    #[must_use]
    pub fn find_calls(&self) -> usize {
        self.lock().calls.find
    }

    /// `put_object_meta` calls seen for this relative path.
    #[must_use]
    pub fn meta_calls(&self, rel_path: &str) -> usize {
        let state = self.lock();
        state.calls.meta.iter().filter(|p| *p == rel_path).count()
    }

    #[must_use]
    pub fn blob_calls(&self, rel_path: &str) -> usize {
        let state = self.lock();
        state.calls.blob.iter().filter(|p| *p == rel_path).count()
    }

    #[must_use]
    pub fn delete_calls(&self, rel_path: &str) -> usize {
        let state = self.lock();
        state.calls.delete.iter().filter(|p| *p == rel_path).count()
    }

    #[must_use]
    pub fn total_meta_calls(&self) -> usize {
        self.lock().calls.meta.len()
    }
}

impl ArchiveBackend for MemoryArchive {
    fn register_case(&self, meta: &Value) -> Result<CaseId, RemoteError> {
        let mut state = self.lock();
        state.calls.register += 1;
        if let Some(error) = state.register_faults.pop_front() {
            return Err(error);
        }
        state.next_case += 1;
        let id = CaseId::from(format!("case-{}", state.next_case));
        state.cases.push(StoredCase {
            id: id.clone(),
            meta: meta.clone(),
        });
        Ok(id)
    }

    fn find_cases(&self, uuid: &CaseUuid) -> Result<Vec<CaseId>, RemoteError> {
        let mut state = self.lock();
        state.calls.find += 1;
        if let Some(error) = state.find_faults.pop_front() {
            return Err(error);
        }
        let hits = state
            .cases
            .iter()
            .filter(|case| {
                case.meta
                    .get("case")
                    .and_then(|c| c.get("uuid"))
                    .and_then(Value::as_str)
                    == Some(uuid.as_str())
            })
            .map(|case| case.id.clone())
            .collect();
        Ok(hits)
    }

    fn put_object_meta(&self, case_id: &CaseId, meta: &Value) -> Result<MetaReceipt, RemoteError> {
        let rel_path = rel_path_of(meta);
        let mut state = self.lock();
        state.calls.meta.push(rel_path.clone());

        if let Some(fault) = state
            .meta_faults
            .get_mut(&rel_path)
            .and_then(VecDeque::pop_front)
        {
            return match fault {
                Fault::Error(error) => Err(error),
                Fault::Status(status) => Ok(MetaReceipt {
                    status,
                    object_id: None,
                    blob_target: None,
                    response: format!("scripted status {status}"),
                }),
            };
        }

        if !state.cases.iter().any(|case| case.id == *case_id) {
            return Err(RemoteError::from_status(404, "no such case"));
        }

        state.next_object += 1;
        let object_id = format!("obj-{}", state.next_object);
        let blob_target = format!("/blobs/{object_id}");
        state.objects.insert(
            object_id.clone(),
            StoredObject {
                meta: meta.clone(),
                rel_path,
                blob_target: blob_target.clone(),
                blob: None,
            },
        );
        Ok(MetaReceipt {
            status: 200,
            object_id: Some(ObjectId::from(object_id)),
            blob_target: Some(blob_target),
            response: String::new(),
        })
    }

    fn put_blob(
        &self,
        object_id: &ObjectId,
        blob_target: &str,
        data: &[u8],
    ) -> Result<BlobReceipt, RemoteError> {
        let mut state = self.lock();
        let rel_path = state
            .objects
            .get(object_id.as_str())
            .map(|object| object.rel_path.clone())
            .unwrap_or_default();
        state.calls.blob.push(rel_path.clone());

        if let Some(fault) = state
            .blob_faults
            .get_mut(&rel_path)
            .and_then(VecDeque::pop_front)
        {
            return match fault {
                Fault::Error(error) => Err(error),
                Fault::Status(status) => Ok(BlobReceipt {
                    status,
                    response: format!("scripted status {status}"),
                }),
            };
        }

        let Some(object) = state.objects.get_mut(object_id.as_str()) else {
            return Err(RemoteError::from_status(404, "no such object"));
        };
        if object.blob_target != blob_target {
            return Err(RemoteError::from_status(400, "wrong blob target"));
        }
        object.blob = Some(data.to_vec());
        Ok(BlobReceipt {
            status: 200,
            response: String::new(),
        })
    }

    fn delete_object(&self, object_id: &ObjectId) -> Result<u16, RemoteError> {
        let mut state = self.lock();
        let rel_path = state
            .objects
            .get(object_id.as_str())
            .map(|object| object.rel_path.clone())
            .unwrap_or_else(|| object_id.to_string());
        state.calls.delete.push(rel_path.clone());

        if let Some(fault) = state
            .delete_faults
            .get_mut(&rel_path)
            .and_then(VecDeque::pop_front)
        {
            return match fault {
                Fault::Error(error) => Err(error),
                Fault::Status(status) => Ok(status),
            };
        }

        if state.objects.remove(object_id.as_str()).is_none() {
            return Err(RemoteError::from_status(404, "no such object"));
        }
        Ok(200)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FailureKind;

    fn object_meta(rel_path: &str) -> Value {
        serde_json::json!({
            "class": "surface",
            "file": {"relative_path": rel_path},
        })
    }

    #[test]
    fn register_then_find_roundtrip() {
        let archive = MemoryArchive::new();
        let meta = serde_json::json!({"case": {"uuid": "u-1", "name": "demo"}});
        let id = archive.register_case(&meta).unwrap();

        let hits = archive.find_cases(&CaseUuid::new("u-1")).unwrap();
        assert_eq!(hits, vec![id]);
        assert!(archive.find_cases(&CaseUuid::new("other")).unwrap().is_empty());
    }

    #[test]
    fn seeding_twice_yields_two_hits() {
        let archive = MemoryArchive::new();
        archive.seed_case("u-dup");
        archive.seed_case("u-dup");
        assert_eq!(archive.find_cases(&CaseUuid::new("u-dup")).unwrap().len(), 2);
    }

    #[test]
    fn object_and_blob_roundtrip() {
        let archive = MemoryArchive::new();
        let case_id = archive.seed_case("u-1");

        let receipt = archive
            .put_object_meta(&case_id, &object_meta("results/a.bin"))
            .unwrap();
        assert_eq!(receipt.status, 200);
        let object_id = receipt.object_id.unwrap();
        let target = receipt.blob_target.unwrap();

        let blob = archive.put_blob(&object_id, &target, b"bytes").unwrap();
        assert_eq!(blob.status, 200);
        assert_eq!(archive.blob_of("results/a.bin").unwrap(), b"bytes");
    }

    #[test]
    fn meta_faults_pop_in_order() {
        let archive = MemoryArchive::new();
        let case_id = archive.seed_case("u-1");
        archive.fail_meta(
            "a.bin",
            vec![
                Fault::Error(RemoteError::transient("blip")),
                Fault::Status(202),
            ],
        );

        let err = archive
            .put_object_meta(&case_id, &object_meta("a.bin"))
            .unwrap_err();
        assert_eq!(err.kind, FailureKind::Transient);

        let receipt = archive
            .put_object_meta(&case_id, &object_meta("a.bin"))
            .unwrap();
        assert_eq!(receipt.status, 202);
        assert!(receipt.object_id.is_none());

        let receipt = archive
            .put_object_meta(&case_id, &object_meta("a.bin"))
            .unwrap();
        assert_eq!(receipt.status, 200);
        assert_eq!(archive.meta_calls("a.bin"), 3);
    }

    #[test]
    fn delete_removes_object() {
        let archive = MemoryArchive::new();
        let case_id = archive.seed_case("u-1");
        let receipt = archive
            .put_object_meta(&case_id, &object_meta("a.bin"))
            .unwrap();
        let object_id = receipt.object_id.unwrap();

        assert_eq!(archive.object_count(), 1);
        assert_eq!(archive.delete_object(&object_id).unwrap(), 200);
        assert_eq!(archive.object_count(), 0);
        assert_eq!(archive.delete_calls("a.bin"), 1);

        let err = archive.delete_object(&object_id).unwrap_err();
        assert_eq!(err.status, Some(404));
    }

    #[test]
    fn unknown_case_is_permanent() {
        let archive = MemoryArchive::new();
        let err = archive
            .put_object_meta(&CaseId::new("case-404"), &object_meta("a.bin"))
            .unwrap_err();
        assert_eq!(err.kind, FailureKind::Permanent);
    }
}
