use super::{colorize_status, json_pretty, make_backend, EXIT_PARTIAL_UPLOAD, EXIT_SUCCESS};
use indicatif::{ProgressBar, ProgressStyle};
use skarv_core::{Case, CoreError, NoopObserver, UploadEvent, UploadObserver, UploadOptions};
use std::path::Path;

/// Feeds engine events into a progress bar. `FileDone` arrives from worker
/// threads; indicatif handles the interleaving.
struct ProgressObserver {
    bar: ProgressBar,
}

impl ProgressObserver {
    fn new() -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg} [{bar:30.cyan/blue}] {pos}/{len}")
                .expect("valid template")
                .progress_chars("=> "),
        );
        Self { bar }
    }
}

impl UploadObserver for ProgressObserver {
    fn on_event(&self, event: &UploadEvent<'_>) {
        match event {
            UploadEvent::AttemptStarted { attempt, files } => {
                self.bar.set_length(*files as u64);
                self.bar.set_position(0);
                if *attempt > 1 {
                    self.bar.set_message(format!("retry pass {attempt}"));
                } else {
                    self.bar.set_message("uploading");
                }
            }
            UploadEvent::FileDone { outcome } => {
                self.bar.inc(1);
                self.bar
                    .set_message(outcome.file.relative_path().to_owned());
            }
            UploadEvent::AttemptFinished { .. } => {}
        }
    }
}

#[allow(clippy::too_many_arguments)]
pub fn run(
    manifest: &Path,
    patterns: &[String],
    workers: usize,
    attempts: usize,
    register: bool,
    remote_url: Option<&str>,
    json: bool,
) -> Result<u8, String> {
    let backend = make_backend(remote_url)?;

    let mut case = Case::open(manifest).map_err(|e| format!("manifest error: {e}"))?;
    let mut skipped = 0_usize;
    for pattern in patterns {
        let report = case.add_files(pattern).map_err(|e| e.to_string())?;
        skipped += report.skipped;
    }

    let options = UploadOptions {
        workers,
        max_attempts: attempts,
        auto_register: register,
        ..UploadOptions::default()
    };

    let result = if json {
        case.upload(&backend, &options, &NoopObserver)
    } else {
        let observer = ProgressObserver::new();
        let result = case.upload(&backend, &options, &observer);
        observer.bar.finish_and_clear();
        result
    };
    let report = result.map_err(|e| match e {
        CoreError::NotRegistered(uuid) => {
            format!("case {uuid} is not registered in the archive; pass --register or run 'skarv register' first")
        }
        other => other.to_string(),
    })?;

    let case_id = case
        .remote_id()
        .map_or_else(|| "-".to_owned(), ToString::to_string);

    if json {
        let files: Vec<serde_json::Value> = report
            .ok
            .iter()
            .chain(report.failed.iter())
            .chain(report.rejected.iter())
            .map(|outcome| {
                serde_json::json!({
                    "path": outcome.file.relative_path(),
                    "status": outcome.status,
                    "metadata": outcome.metadata,
                    "blob": outcome.blob,
                })
            })
            .collect();
        let payload = serde_json::json!({
            "case_id": case_id,
            "uuid": case.uuid().as_str(),
            "total": report.total(),
            "ok": report.ok.len(),
            "failed": report.failed.len(),
            "rejected": report.rejected.len(),
            "skipped": skipped,
            "attempts": report.attempts,
            "wall_time_s": report.wall_time.as_secs_f64(),
            "files": files,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!(
            "uploaded {}/{} files to case {} in {:.2}s ({} passes)",
            report.ok.len(),
            report.total(),
            case_id,
            report.wall_time.as_secs_f64(),
            report.attempts,
        );
        if skipped > 0 {
            println!("skipped {skipped} files with no usable sidecar");
        }
        for outcome in report.failed.iter().chain(report.rejected.iter()) {
            let phase = outcome.blob.as_ref().unwrap_or(&outcome.metadata);
            println!(
                "  {} {} (status {}: {})",
                colorize_status(&outcome.status.to_string()),
                outcome.file.relative_path(),
                phase.status_label(),
                phase.response.trim(),
            );
        }
    }

    if report.is_complete() {
        Ok(EXIT_SUCCESS)
    } else {
        Ok(EXIT_PARTIAL_UPLOAD)
    }
}
