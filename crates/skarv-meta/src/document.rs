use serde_json::Value;
use std::fs;
use std::path::Path;

use crate::MetaError;

/// A sidecar metadata document: arbitrary nested YAML carried pass-through.
///
/// The document is held as a JSON value tree (key order preserved) so that
/// fields the uploader never looks at survive re-serialization unchanged.
/// Typed accessors cover the few fields the uploader does read, and the two
/// augmentation calls cover the fields it writes.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataDoc {
    root: Value,
}

impl MetadataDoc {
    /// Parse a YAML document. The top level must be a mapping.
    pub fn from_yaml_str(input: &str) -> Result<Self, MetaError> {
        let root: Value = serde_yaml::from_str(input)?;
        if root.is_object() {
            Ok(Self { root })
        } else {
            Err(MetaError::NotAMapping(json_type_name(&root).to_owned()))
        }
    }

    /// Read and parse a YAML document from disk.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, MetaError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Walk a nested key path and return the string value at its end, if any.
    pub fn get_str(&self, path: &[&str]) -> Option<&str> {
        let mut cur = &self.root;
        for key in path {
            cur = cur.get(key)?;
        }
        cur.as_str()
    }

    /// The full document as a JSON value, ready to be sent as a payload.
    pub fn as_json(&self) -> &Value {
        &self.root
    }

    /// Record blob size and MD5 checksum under the `_skarv` block.
    ///
    /// Calling this again replaces the block; the document never carries two.
    pub fn attach_blob_info(&mut self, size: u64, md5_b64: &str) {
        if let Value::Object(map) = &mut self.root {
            map.insert(
                "_skarv".to_owned(),
                serde_json::json!({ "blob_size": size, "blob_md5": md5_b64 }),
            );
        }
    }

    /// Record the path relative to the case root under `file.relative_path`.
    ///
    /// An existing `file` mapping is merged into; anything else under `file`
    /// is replaced. Calling this again replaces the field.
    pub fn set_relative_path(&mut self, rel: &str) {
        if let Value::Object(map) = &mut self.root {
            let file = map
                .entry("file".to_owned())
                .or_insert_with(|| Value::Object(serde_json::Map::new()));
            if !file.is_object() {
                *file = Value::Object(serde_json::Map::new());
            }
            if let Value::Object(file_map) = file {
                file_map.insert("relative_path".to_owned(), Value::String(rel.to_owned()));
            }
        }
    }
}

fn json_type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "mapping",
    }
}
