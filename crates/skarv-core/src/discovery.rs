//! Glob-based search for uploadable file pairs under the case root.

use crate::file::CaseFile;
use crate::CoreError;
use skarv_meta::is_sidecar;
use std::path::Path;
use tracing::warn;
use walkdir::WalkDir;

/// What one `add_files` call found.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscoveryReport {
    pub added: usize,
    /// Candidates matching the pattern whose sidecar was missing or
    /// unparseable.
    pub skipped: usize,
}

/// Walk `root` and build a [`CaseFile`] for every regular file whose
/// root-relative path matches `pattern`. Sidecar files are never candidates;
/// candidates without a usable sidecar are skipped with a warning.
pub(crate) fn discover(root: &Path, pattern: &str) -> Result<(Vec<CaseFile>, usize), CoreError> {
    let matcher = globset::Glob::new(pattern)
        .map_err(|e| CoreError::InvalidArgument(format!("bad search pattern '{pattern}': {e}")))?
        .compile_matcher();

    let mut files = Vec::new();
    let mut skipped = 0_usize;
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if is_sidecar(path) {
            continue;
        }
        let rel = path.strip_prefix(root).unwrap_or(path);
        if !matcher.is_match(rel) {
            continue;
        }
        match CaseFile::from_path(path, root) {
            Ok(file) => files.push(file),
            Err(err) => {
                warn!("no usable sidecar for {}, skipping: {err}", path.display());
                skipped += 1;
            }
        }
    }

    if files.is_empty() {
        warn!(
            "no files matched pattern '{pattern}' under {}",
            root.display()
        );
    }
    Ok((files, skipped))
}
