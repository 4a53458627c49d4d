use crate::{ArchiveBackend, BlobReceipt, MetaReceipt, RemoteConfig, RemoteError};
use serde_json::Value;
use skarv_meta::{CaseId, CaseUuid, ObjectId};
use std::io::Read;

/// How many hits a case query asks for. Two is enough to tell "exactly one"
/// from "more than one".
const CASE_QUERY_LIMIT: usize = 2;

/// Blocking HTTP client for the archive REST API.
///
/// Routes:
/// - `POST /api/v1/cases` registers a case container
/// - `GET /api/v1/cases?uuid=..&limit=..` queries case ids by case uuid
/// - `POST /api/v1/cases/<id>/objects` uploads object metadata
/// - `PUT <blob target>` uploads object bytes
/// - `DELETE /api/v1/objects/<id>` deletes an object
///
/// The blob target comes back from the metadata upload and may be
/// server-relative or absolute.
pub struct HttpBackend {
    config: RemoteConfig,
    agent: ureq::Agent,
}

impl HttpBackend {
    pub fn new(config: RemoteConfig) -> Self {
        // Non-2xx responses are classified here, body included, so they must
        // arrive as responses rather than transport errors.
        let agent_config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build();
        Self {
            config,
            agent: ureq::Agent::new_with_config(agent_config),
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{path}", self.config.url)
    }

    fn blob_url(&self, target: &str) -> String {
        if target.starts_with("http://") || target.starts_with("https://") {
            target.to_owned()
        } else if target.starts_with('/') {
            format!("{}{target}", self.config.url)
        } else {
            format!("{}/{target}", self.config.url)
        }
    }

    fn auth_header(&self) -> Option<String> {
        self.config
            .auth_token
            .as_ref()
            .map(|token| format!("Bearer {token}"))
    }

    fn post_json(&self, url: &str, payload: &Value) -> Result<(u16, String), RemoteError> {
        let body = serde_json::to_vec(payload)
            .map_err(|e| RemoteError::permanent(format!("encode payload: {e}")))?;
        let mut req = self
            .agent
            .post(url)
            .header("Content-Type", "application/json");
        if let Some(auth) = self.auth_header() {
            req = req.header("Authorization", &auth);
        }
        let resp = req.send(&body[..])?;
        read_response(resp)
    }

    fn put_bytes(&self, url: &str, data: &[u8]) -> Result<(u16, String), RemoteError> {
        let mut req = self
            .agent
            .put(url)
            .header("Content-Type", "application/octet-stream");
        if let Some(auth) = self.auth_header() {
            req = req.header("Authorization", &auth);
        }
        let resp = req.send(data)?;
        read_response(resp)
    }

    fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<(u16, String), RemoteError> {
        let mut req = self.agent.get(url);
        for (key, value) in query {
            req = req.query(*key, *value);
        }
        if let Some(auth) = self.auth_header() {
            req = req.header("Authorization", &auth);
        }
        let resp = req.call()?;
        read_response(resp)
    }

    fn delete(&self, url: &str) -> Result<(u16, String), RemoteError> {
        let mut req = self.agent.delete(url);
        if let Some(auth) = self.auth_header() {
            req = req.header("Authorization", &auth);
        }
        let resp = req.call()?;
        read_response(resp)
    }
}

fn read_response(resp: ureq::http::Response<ureq::Body>) -> Result<(u16, String), RemoteError> {
    let status = resp.status().as_u16();
    let mut reader = resp.into_body().into_reader();
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf)?;
    Ok((status, String::from_utf8_lossy(&buf).into_owned()))
}

fn success(status: u16) -> bool {
    (200..=299).contains(&status)
}

impl ArchiveBackend for HttpBackend {
    fn register_case(&self, meta: &Value) -> Result<CaseId, RemoteError> {
        let url = self.api_url("/api/v1/cases");
        tracing::debug!("POST {url}");
        let (status, body) = self.post_json(&url, meta)?;
        if !matches!(status, 200 | 201) {
            return Err(RemoteError::from_status(status, &body));
        }
        let parsed: Value = serde_json::from_str(&body)
            .map_err(|e| RemoteError::permanent(format!("malformed register response: {e}")))?;
        match parsed.get("case_id").and_then(Value::as_str) {
            Some(id) if !id.is_empty() => Ok(CaseId::from(id)),
            _ => Err(RemoteError::permanent("register response missing case_id")),
        }
    }

    fn find_cases(&self, uuid: &CaseUuid) -> Result<Vec<CaseId>, RemoteError> {
        let url = self.api_url("/api/v1/cases");
        let limit = CASE_QUERY_LIMIT.to_string();
        tracing::debug!("GET {url}?uuid={uuid}");
        let (status, body) = self.get(&url, &[("uuid", uuid.as_str()), ("limit", &limit)])?;
        if status != 200 {
            return Err(RemoteError::from_status(status, &body));
        }
        let parsed: Value = serde_json::from_str(&body)
            .map_err(|e| RemoteError::permanent(format!("malformed query response: {e}")))?;
        let hits = parsed
            .get("hits")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(Value::as_str)
                    .map(CaseId::from)
                    .collect()
            })
            .unwrap_or_default();
        Ok(hits)
    }

    fn put_object_meta(&self, case_id: &CaseId, meta: &Value) -> Result<MetaReceipt, RemoteError> {
        let url = self.api_url(&format!("/api/v1/cases/{case_id}/objects"));
        tracing::debug!("POST {url}");
        let (status, body) = self.post_json(&url, meta)?;
        if !success(status) {
            return Err(RemoteError::from_status(status, &body));
        }
        // Best-effort id capture; present only on a well-formed 200/201.
        let parsed: Option<Value> = serde_json::from_str(&body).ok();
        let object_id = parsed
            .as_ref()
            .and_then(|v| v.get("object_id"))
            .and_then(Value::as_str)
            .map(ObjectId::from);
        let blob_target = parsed
            .as_ref()
            .and_then(|v| v.get("blob_url"))
            .and_then(Value::as_str)
            .map(ToOwned::to_owned);
        Ok(MetaReceipt {
            status,
            object_id,
            blob_target,
            response: body,
        })
    }

    fn put_blob(
        &self,
        object_id: &ObjectId,
        blob_target: &str,
        data: &[u8],
    ) -> Result<BlobReceipt, RemoteError> {
        let url = self.blob_url(blob_target);
        tracing::debug!("PUT {url} for {object_id} ({} bytes)", data.len());
        let (status, body) = self.put_bytes(&url, data)?;
        if !success(status) {
            return Err(RemoteError::from_status(status, &body));
        }
        Ok(BlobReceipt {
            status,
            response: body,
        })
    }

    fn delete_object(&self, object_id: &ObjectId) -> Result<u16, RemoteError> {
        let url = self.api_url(&format!("/api/v1/objects/{object_id}"));
        tracing::debug!("DELETE {url}");
        let (status, body) = self.delete(&url)?;
        if !success(status) {
            return Err(RemoteError::from_status(status, &body));
        }
        Ok(status)
    }
}
