//! Metadata documents and naming conventions for skarv.
//!
//! This crate defines the metadata layer: YAML sidecar documents parsed into
//! a pass-through representation (`MetadataDoc`), the case manifest
//! (`CaseManifest`), the sidecar path convention (`sidecar_path`), and
//! newtype identifiers shared across the workspace.

pub mod document;
pub mod manifest;
pub mod sidecar;
pub mod types;

pub use document::MetadataDoc;
pub use manifest::CaseManifest;
pub use sidecar::{is_sidecar, sidecar_path};
pub use types::{CaseId, CaseUuid, ObjectId};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetaError {
    #[error("failed to read metadata file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse YAML: {0}")]
    ParseYaml(#[from] serde_yaml::Error),
    #[error("metadata document is not a mapping (found {0})")]
    NotAMapping(String),
    #[error("manifest is missing required field '{0}'")]
    MissingField(String),
    #[error("no sidecar metadata found at {}", .0.display())]
    SidecarMissing(std::path::PathBuf),
}
