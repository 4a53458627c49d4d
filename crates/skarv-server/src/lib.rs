//! Reference HTTP server for the skarv archive protocol.
//!
//! Implements the case and object routes the `HttpBackend` client speaks:
//! case registration and lookup under `/api/v1/cases`, object metadata under
//! `/api/v1/cases/{id}/objects`, blob upload under `/api/v1/blobs/{id}`.
//! Everything is held in memory; restarting the server forgets all data.
//!
//! The [`TestServer`] helper starts a server on a random port for
//! integration testing.

use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tiny_http::{Header, Method, Response, Server, StatusCode};
use tracing::{debug, info};

struct CaseRecord {
    id: String,
    meta: Value,
}

struct ObjectRecord {
    case_id: String,
    meta: Value,
    blob: Option<Vec<u8>>,
}

/// In-memory archive state: registered cases, object metadata and blobs.
///
/// Cases live in a `Vec` so registration order is kept and the same uuid can
/// be registered more than once, which is what the duplicate-detection flow
/// in the client needs to observe.
pub struct Store {
    token: Option<String>,
    cases: RwLock<Vec<CaseRecord>>,
    objects: RwLock<HashMap<String, ObjectRecord>>,
    next_case: AtomicU64,
    next_object: AtomicU64,
}

impl Store {
    /// A store that requires `Authorization: Bearer <token>` on every route
    /// except `/health` when a token is given.
    pub fn new(token: Option<String>) -> Self {
        Self {
            token,
            cases: RwLock::new(Vec::new()),
            objects: RwLock::new(HashMap::new()),
            next_case: AtomicU64::new(0),
            next_object: AtomicU64::new(0),
        }
    }

    pub fn register_case(&self, meta: Value) -> String {
        let n = self.next_case.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("case-{n}");
        let mut cases = self.cases.write().expect("case table lock poisoned");
        cases.push(CaseRecord {
            id: id.clone(),
            meta,
        });
        id
    }

    pub fn find_cases(&self, uuid: &str, limit: usize) -> Vec<String> {
        let cases = self.cases.read().expect("case table lock poisoned");
        cases
            .iter()
            .filter(|record| record.meta["case"]["uuid"].as_str() == Some(uuid))
            .map(|record| record.id.clone())
            .take(limit)
            .collect()
    }

    /// Store object metadata under a fresh id. `None` when the case is
    /// unknown. Returns the id and the server-relative blob target.
    pub fn create_object(&self, case_id: &str, meta: Value) -> Option<(String, String)> {
        {
            let cases = self.cases.read().expect("case table lock poisoned");
            if !cases.iter().any(|record| record.id == case_id) {
                return None;
            }
        }
        let n = self.next_object.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("obj-{n}");
        let blob_url = format!("/api/v1/blobs/{id}");
        let mut objects = self.objects.write().expect("object table lock poisoned");
        objects.insert(
            id.clone(),
            ObjectRecord {
                case_id: case_id.to_owned(),
                meta,
                blob: None,
            },
        );
        Some((id, blob_url))
    }

    /// Attach blob bytes to an object. False when the object is unknown.
    pub fn put_blob(&self, object_id: &str, data: Vec<u8>) -> bool {
        let mut objects = self.objects.write().expect("object table lock poisoned");
        match objects.get_mut(object_id) {
            Some(record) => {
                record.blob = Some(data);
                true
            }
            None => false,
        }
    }

    /// Remove an object and its blob. False when the object is unknown.
    pub fn delete_object(&self, object_id: &str) -> bool {
        let mut objects = self.objects.write().expect("object table lock poisoned");
        objects.remove(object_id).is_some()
    }

    pub fn case_count(&self) -> usize {
        self.cases.read().expect("case table lock poisoned").len()
    }

    pub fn case_ids(&self) -> Vec<String> {
        let cases = self.cases.read().expect("case table lock poisoned");
        cases.iter().map(|record| record.id.clone()).collect()
    }

    pub fn case_meta(&self, case_id: &str) -> Option<Value> {
        let cases = self.cases.read().expect("case table lock poisoned");
        cases
            .iter()
            .find(|record| record.id == case_id)
            .map(|record| record.meta.clone())
    }

    pub fn object_count(&self) -> usize {
        self.objects.read().expect("object table lock poisoned").len()
    }

    pub fn object_meta(&self, object_id: &str) -> Option<Value> {
        let objects = self.objects.read().expect("object table lock poisoned");
        objects.get(object_id).map(|record| record.meta.clone())
    }

    pub fn object_case(&self, object_id: &str) -> Option<String> {
        let objects = self.objects.read().expect("object table lock poisoned");
        objects.get(object_id).map(|record| record.case_id.clone())
    }

    pub fn blob(&self, object_id: &str) -> Option<Vec<u8>> {
        let objects = self.objects.read().expect("object table lock poisoned");
        objects.get(object_id).and_then(|record| record.blob.clone())
    }

    fn authorized(&self, req: &tiny_http::Request) -> bool {
        let Some(expected) = &self.token else {
            return true;
        };
        let wanted = format!("Bearer {expected}");
        req.headers()
            .iter()
            .any(|h| h.field.equiv("Authorization") && h.value.as_str() == wanted)
    }
}

/// Extract the case id from `/api/v1/cases/{id}/objects`.
fn parse_objects_route(path: &str) -> Option<&str> {
    let case_id = path
        .strip_prefix("/api/v1/cases/")?
        .strip_suffix("/objects")?;
    if case_id.is_empty() || case_id.contains('/') {
        return None;
    }
    Some(case_id)
}

fn query_param<'a>(query: &'a str, key: &str) -> Option<&'a str> {
    query.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        (k == key).then_some(v)
    })
}

fn respond_json_with(req: tiny_http::Request, code: u16, body: String) {
    let header = Header::from_bytes("Content-Type", "application/json").expect("valid header");
    let _ = req.respond(
        Response::from_data(body.into_bytes())
            .with_header(header)
            .with_status_code(StatusCode(code)),
    );
}

fn respond_json(req: tiny_http::Request, body: String) {
    respond_json_with(req, 200, body);
}

fn respond_error(req: tiny_http::Request, code: u16, msg: &str) {
    respond_json_with(req, code, json!({ "error": msg }).to_string());
}

fn read_body(req: &mut tiny_http::Request) -> Option<Vec<u8>> {
    let mut body = Vec::new();
    if req.as_reader().read_to_end(&mut body).is_ok() {
        Some(body)
    } else {
        None
    }
}

/// Read the request body as a JSON object, or answer 400 and return `None`.
fn read_json_object(mut req: tiny_http::Request) -> Option<(tiny_http::Request, Value)> {
    let Some(body) = read_body(&mut req) else {
        respond_error(req, 500, "read error");
        return None;
    };
    match serde_json::from_slice::<Value>(&body) {
        Ok(value) if value.is_object() => Some((req, value)),
        _ => {
            respond_error(req, 400, "malformed JSON");
            None
        }
    }
}

fn handle_register(store: &Store, req: tiny_http::Request) {
    let Some((req, meta)) = read_json_object(req) else {
        return;
    };
    let id = store.register_case(meta);
    info!("registered case {id}");
    respond_json(req, json!({ "case_id": id }).to_string());
}

fn handle_find(store: &Store, req: tiny_http::Request, query: &str) {
    let Some(uuid) = query_param(query, "uuid") else {
        respond_error(req, 400, "missing uuid parameter");
        return;
    };
    let limit = query_param(query, "limit")
        .and_then(|raw| raw.parse::<usize>().ok())
        .unwrap_or(usize::MAX);
    let hits = store.find_cases(uuid, limit);
    respond_json(req, json!({ "hits": hits }).to_string());
}

fn handle_create_object(store: &Store, req: tiny_http::Request, case_id: &str) {
    let Some((req, meta)) = read_json_object(req) else {
        return;
    };
    match store.create_object(case_id, meta) {
        Some((object_id, blob_url)) => {
            info!("created object {object_id} in {case_id}");
            respond_json_with(
                req,
                201,
                json!({ "object_id": object_id, "blob_url": blob_url }).to_string(),
            );
        }
        None => respond_error(req, 404, "unknown case"),
    }
}

fn handle_put_blob(store: &Store, mut req: tiny_http::Request, object_id: &str) {
    let Some(body) = read_body(&mut req) else {
        respond_error(req, 500, "read error");
        return;
    };
    if store.put_blob(object_id, body) {
        let _ = req.respond(Response::from_string("ok"));
    } else {
        respond_error(req, 404, "unknown object");
    }
}

fn handle_delete_object(store: &Store, req: tiny_http::Request, object_id: &str) {
    if store.delete_object(object_id) {
        info!("deleted object {object_id}");
        let _ = req.respond(Response::from_string("ok"));
    } else {
        respond_error(req, 404, "unknown object");
    }
}

/// Handle a single HTTP request, dispatching to the appropriate route handler.
pub fn handle_request(store: &Store, req: tiny_http::Request) {
    let method = req.method().clone();
    let url = req.url().to_owned();
    debug!("{method} {url}");

    let (path, query) = match url.split_once('?') {
        Some((path, query)) => (path, query),
        None => (url.as_str(), ""),
    };

    if path == "/health" && method == Method::Get {
        let _ = req.respond(Response::from_string(r#"{"status":"ok"}"#));
        return;
    }

    if !store.authorized(&req) {
        respond_error(req, 401, "unauthorized");
        return;
    }

    if path == "/api/v1/cases" {
        match method {
            Method::Post => handle_register(store, req),
            Method::Get => handle_find(store, req, query),
            _ => respond_error(req, 405, "method not allowed"),
        }
    } else if let Some(case_id) = parse_objects_route(path) {
        if method == Method::Post {
            handle_create_object(store, req, case_id);
        } else {
            respond_error(req, 405, "method not allowed");
        }
    } else if let Some(object_id) = path.strip_prefix("/api/v1/blobs/") {
        if method == Method::Put {
            handle_put_blob(store, req, object_id);
        } else {
            respond_error(req, 405, "method not allowed");
        }
    } else if let Some(object_id) = path.strip_prefix("/api/v1/objects/") {
        if method == Method::Delete {
            handle_delete_object(store, req, object_id);
        } else {
            respond_error(req, 405, "method not allowed");
        }
    } else {
        respond_error(req, 404, "not found");
    }
}

/// Start the server loop, blocking the current thread.
pub fn run_server(store: &Arc<Store>, addr: &str) {
    let server = Server::http(addr).expect("failed to bind HTTP server");
    for request in server.incoming_requests() {
        handle_request(store, request);
    }
}

/// A test helper that starts a skarv-server on a random port in a background
/// thread. Drop stops the server via `Server::unblock`.
pub struct TestServer {
    pub url: String,
    pub port: u16,
    pub store: Arc<Store>,
    server: Arc<Server>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl TestServer {
    /// Start a test server with no auth token on `127.0.0.1:0`.
    pub fn start() -> Self {
        Self::with_token(None)
    }

    pub fn with_token(token: Option<String>) -> Self {
        let server =
            Arc::new(Server::http("127.0.0.1:0").expect("failed to bind test HTTP server"));
        let port = server.server_addr().to_ip().expect("not an IP addr").port();
        let url = format!("http://127.0.0.1:{port}");

        let store = Arc::new(Store::new(token));
        let srv = Arc::clone(&server);
        let state = Arc::clone(&store);
        let handle = std::thread::spawn(move || {
            for request in srv.incoming_requests() {
                handle_request(&state, request);
            }
        });

        Self {
            url,
            port,
            store,
            server,
            handle: Some(handle),
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.server.unblock();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn case_meta(uuid: &str) -> Value {
        json!({ "case": { "uuid": uuid, "name": "demo" } })
    }

    #[test]
    fn register_assigns_sequential_ids() {
        let store = Store::new(None);
        assert_eq!(store.register_case(case_meta("u-1")), "case-1");
        assert_eq!(store.register_case(case_meta("u-2")), "case-2");
        assert_eq!(store.case_count(), 2);
        assert_eq!(store.case_ids(), vec!["case-1", "case-2"]);
    }

    #[test]
    fn find_filters_by_uuid_and_limit() {
        let store = Store::new(None);
        store.register_case(case_meta("u-1"));
        store.register_case(case_meta("u-2"));
        store.register_case(case_meta("u-1"));

        assert_eq!(store.find_cases("u-1", usize::MAX), vec!["case-1", "case-3"]);
        assert_eq!(store.find_cases("u-1", 1), vec!["case-1"]);
        assert!(store.find_cases("u-9", usize::MAX).is_empty());
    }

    #[test]
    fn objects_require_a_known_case() {
        let store = Store::new(None);
        assert!(store.create_object("case-1", json!({})).is_none());

        store.register_case(case_meta("u-1"));
        let (id, blob_url) = store.create_object("case-1", json!({"class": "surface"})).unwrap();
        assert_eq!(id, "obj-1");
        assert_eq!(blob_url, "/api/v1/blobs/obj-1");
        assert_eq!(store.object_case("obj-1"), Some("case-1".to_owned()));
    }

    #[test]
    fn blob_roundtrip_and_delete() {
        let store = Store::new(None);
        store.register_case(case_meta("u-1"));
        let (id, _) = store.create_object("case-1", json!({})).unwrap();

        assert!(store.blob(&id).is_none());
        assert!(store.put_blob(&id, b"payload".to_vec()));
        assert_eq!(store.blob(&id), Some(b"payload".to_vec()));

        assert!(store.delete_object(&id));
        assert!(!store.delete_object(&id));
        assert_eq!(store.object_count(), 0);
        assert!(!store.put_blob(&id, b"late".to_vec()));
    }

    #[test]
    fn objects_route_parses_only_well_formed_paths() {
        assert_eq!(parse_objects_route("/api/v1/cases/case-1/objects"), Some("case-1"));
        assert!(parse_objects_route("/api/v1/cases//objects").is_none());
        assert!(parse_objects_route("/api/v1/cases/a/b/objects").is_none());
        assert!(parse_objects_route("/api/v1/cases/case-1").is_none());
        assert!(parse_objects_route("/api/v1/objects/o-1").is_none());
    }

    #[test]
    fn query_params_split_on_ampersands() {
        assert_eq!(query_param("uuid=abc&limit=2", "uuid"), Some("abc"));
        assert_eq!(query_param("uuid=abc&limit=2", "limit"), Some("2"));
        assert_eq!(query_param("uuid=abc", "limit"), None);
        assert_eq!(query_param("", "uuid"), None);
    }
}
