pub mod completions;
pub mod register;
pub mod scan;
pub mod upload;

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_MANIFEST_ERROR: u8 = 2;
pub const EXIT_PARTIAL_UPLOAD: u8 = 3;

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .expect("valid template")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("✗ {msg}"));
}

pub fn colorize_status(status: &str) -> String {
    use console::Style;
    match status {
        "ok" => Style::new().green().apply_to(status).to_string(),
        "failed" => Style::new().red().apply_to(status).to_string(),
        "rejected" => Style::new().yellow().apply_to(status).to_string(),
        other => other.to_owned(),
    }
}

pub fn make_backend(remote_url: Option<&str>) -> Result<skarv_remote::HttpBackend, String> {
    let config =
        skarv_remote::RemoteConfig::resolve(remote_url, None).map_err(|e| e.to_string())?;
    tracing::debug!("using archive at {}", config.url);
    Ok(skarv_remote::HttpBackend::new(config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_pretty_serializes_object() {
        let val = serde_json::json!({"key": "value"});
        let result = json_pretty(&val).unwrap();
        assert!(result.contains("\"key\""));
        assert!(result.contains("\"value\""));
    }

    #[test]
    fn json_pretty_serializes_array() {
        let val = vec![1, 2, 3];
        let result = json_pretty(&val).unwrap();
        assert!(result.contains('1'));
    }

    #[test]
    fn colorize_status_ok() {
        assert!(colorize_status("ok").contains("ok"));
    }

    #[test]
    fn colorize_status_failed() {
        assert!(colorize_status("failed").contains("failed"));
    }

    #[test]
    fn colorize_status_rejected() {
        assert!(colorize_status("rejected").contains("rejected"));
    }

    #[test]
    fn colorize_status_unknown() {
        assert_eq!(colorize_status("skipped"), "skipped");
    }

    #[test]
    fn exit_codes_are_distinct() {
        assert_ne!(EXIT_SUCCESS, EXIT_FAILURE);
        assert_ne!(EXIT_FAILURE, EXIT_MANIFEST_ERROR);
        assert_ne!(EXIT_MANIFEST_ERROR, EXIT_PARTIAL_UPLOAD);
    }

    #[test]
    fn make_backend_with_url() {
        let backend = make_backend(Some("http://localhost:8431"));
        assert!(backend.is_ok());
    }

    #[test]
    fn spinner_creates_progress_bar() {
        let pb = spinner("testing...");
        spin_ok(&pb, "done");
    }

    #[test]
    fn spinner_fail_creates_progress_bar() {
        let pb = spinner("testing...");
        spin_fail(&pb, "failed");
    }
}
