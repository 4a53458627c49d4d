use super::{json_pretty, EXIT_SUCCESS};
use skarv_core::Case;
use std::path::Path;

pub fn run(manifest: &Path, patterns: &[String], json: bool) -> Result<u8, String> {
    let mut case = Case::open(manifest).map_err(|e| format!("manifest error: {e}"))?;
    let mut skipped = 0_usize;
    for pattern in patterns {
        let report = case.add_files(pattern).map_err(|e| e.to_string())?;
        skipped += report.skipped;
    }

    if json {
        let files: Vec<serde_json::Value> = case
            .files()
            .iter()
            .map(|file| {
                serde_json::json!({
                    "path": file.relative_path(),
                    "size": file.size(),
                    "checksum_md5": file.checksum_md5(),
                })
            })
            .collect();
        let payload = serde_json::json!({
            "uuid": case.uuid().as_str(),
            "files": files,
            "skipped": skipped,
        });
        println!("{}", json_pretty(&payload)?);
    } else if case.files().is_empty() {
        println!("no files matched");
        if skipped > 0 {
            println!("skipped {skipped} files with no usable sidecar");
        }
    } else {
        println!("{:>12} {:<26} PATH", "SIZE", "MD5");
        for file in case.files() {
            println!(
                "{:>12} {:<26} {}",
                file.size(),
                file.checksum_md5(),
                file.relative_path()
            );
        }
        let total: u64 = case.files().iter().map(skarv_core::CaseFile::size).sum();
        println!(
            "{} files, {total} bytes ({skipped} skipped)",
            case.files().len()
        );
    }
    Ok(EXIT_SUCCESS)
}
