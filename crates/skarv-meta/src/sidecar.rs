//! Sidecar naming convention: a data file `<dir>/<name>` is described by a
//! hidden YAML file `<dir>/.<name>.yml` in the same directory.

use std::path::{Path, PathBuf};

/// Return the sidecar metadata path for a data file.
///
/// `/run/maps/depth.grid` maps to `/run/maps/.depth.grid.yml`.
pub fn sidecar_path(data_path: &Path) -> PathBuf {
    let name = data_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    data_path.with_file_name(format!(".{name}.yml"))
}

/// True when `path` names a sidecar file (hidden, `.yml` extension).
///
/// Used by discovery to keep sidecars out of the data-file candidate set.
pub fn is_sidecar(path: &Path) -> bool {
    let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
        return false;
    };
    name.starts_with('.') && name.ends_with(".yml")
}
