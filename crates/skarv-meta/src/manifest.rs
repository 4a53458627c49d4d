use serde_json::Value;
use std::path::Path;

use crate::types::CaseUuid;
use crate::{MetaError, MetadataDoc};

/// The case manifest: a YAML document describing one ensemble run.
///
/// Only `case.uuid` (required) and `case.name` (optional) are interpreted;
/// the rest of the document is the registration payload, carried untouched.
#[derive(Debug, Clone)]
pub struct CaseManifest {
    doc: MetadataDoc,
    uuid: CaseUuid,
    name: Option<String>,
}

impl CaseManifest {
    /// Parse a manifest from YAML text. Fails when `case.uuid` is absent
    /// or empty.
    pub fn parse_str(input: &str) -> Result<Self, MetaError> {
        let doc = MetadataDoc::from_yaml_str(input)?;
        let uuid = match doc.get_str(&["case", "uuid"]) {
            Some(u) if !u.is_empty() => CaseUuid::from(u),
            _ => return Err(MetaError::MissingField("case.uuid".to_owned())),
        };
        let name = doc.get_str(&["case", "name"]).map(ToOwned::to_owned);
        Ok(Self { doc, uuid, name })
    }

    /// Load and parse a manifest file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, MetaError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse_str(&content)
    }

    pub fn uuid(&self) -> &CaseUuid {
        &self.uuid
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The full manifest as the JSON registration payload.
    pub fn as_json(&self) -> &Value {
        self.doc.as_json()
    }
}
