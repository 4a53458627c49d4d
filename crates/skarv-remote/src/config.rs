use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable overriding the configured archive URL.
pub const ENV_URL: &str = "SKARV_ARCHIVE_URL";
/// Environment variable overriding the configured auth token.
pub const ENV_TOKEN: &str = "SKARV_ARCHIVE_TOKEN";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read archive config: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid archive config: {0}")]
    Parse(String),
    #[error("no archive URL configured (flag, {ENV_URL}, or config file)")]
    NoUrl,
    #[error("HOME not set, cannot locate config file")]
    NoHome,
}

/// Archive endpoint configuration: base URL plus optional bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub url: String,
    #[serde(default)]
    pub auth_token: Option<String>,
}

impl RemoteConfig {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.trim_end_matches('/').to_owned(),
            auth_token: None,
        }
    }

    #[must_use]
    pub fn with_token(mut self, token: &str) -> Self {
        self.auth_token = Some(token.to_owned());
        self
    }

    /// Load config from `~/.config/skarv/archive.json`.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path()?;
        Self::load(&path)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self =
            serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(Self::new(&config.url).with_opt_token(config.auth_token))
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Resolve the effective config with flag > environment > file
    /// precedence, applied per field.
    pub fn resolve(flag_url: Option<&str>, flag_token: Option<&str>) -> Result<Self, ConfigError> {
        let file = Self::load_default().ok();

        let url = flag_url
            .map(ToOwned::to_owned)
            .or_else(|| std::env::var(ENV_URL).ok().filter(|u| !u.is_empty()))
            .or_else(|| file.as_ref().map(|c| c.url.clone()))
            .ok_or(ConfigError::NoUrl)?;

        let auth_token = flag_token
            .map(ToOwned::to_owned)
            .or_else(|| std::env::var(ENV_TOKEN).ok().filter(|t| !t.is_empty()))
            .or_else(|| file.and_then(|c| c.auth_token));

        Ok(Self::new(&url).with_opt_token(auth_token))
    }

    fn with_opt_token(mut self, token: Option<String>) -> Self {
        self.auth_token = token;
        self
    }
}

fn default_config_path() -> Result<PathBuf, ConfigError> {
    let home = std::env::var("HOME").map_err(|_| ConfigError::NoHome)?;
    Ok(PathBuf::from(home).join(".config/skarv/archive.json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("archive.json");

        let config = RemoteConfig::new("https://archive.example.com/site").with_token("secret123");
        config.save(&path).unwrap();

        let loaded = RemoteConfig::load(&path).unwrap();
        assert_eq!(loaded.url, "https://archive.example.com/site");
        assert_eq!(loaded.auth_token.as_deref(), Some("secret123"));
    }

    #[test]
    fn config_strips_trailing_slash() {
        let config = RemoteConfig::new("https://example.com/");
        assert_eq!(config.url, "https://example.com");
    }

    #[test]
    fn load_normalizes_url() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("archive.json");
        std::fs::write(&path, r#"{"url": "http://example.com/api/"}"#).unwrap();

        let loaded = RemoteConfig::load(&path).unwrap();
        assert_eq!(loaded.url, "http://example.com/api");
        assert_eq!(loaded.auth_token, None);
    }

    #[test]
    fn load_rejects_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("archive.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            RemoteConfig::load(&path),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn resolve_prefers_flags() {
        // No env vars set for these names in the test environment
        let config = RemoteConfig::resolve(Some("http://flag.example/"), Some("flag-token"))
            .expect("flag url suffices");
        assert_eq!(config.url, "http://flag.example");
        assert_eq!(config.auth_token.as_deref(), Some("flag-token"));
    }
}
