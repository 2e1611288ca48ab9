//! Runner configuration loaded from `chainrun.config.yaml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

/// File name looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "chainrun.config.yaml";

/// Errors that can occur during config loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yml::Error),
    #[error("config file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("timeout-ms must be greater than 0")]
    InvalidTimeout,
    #[error("invalid base-url: {0}")]
    InvalidBaseUrl(String),
    #[error("unknown format: {0}. Valid formats: table, json")]
    InvalidFormat(String),
}

/// Settings shared by every run of one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct RunnerConfig {
    /// Caller base URL. Overrides step base URLs unless empty or the local placeholder.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Per-request timeout in milliseconds (default: 30000).
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Verify TLS certificates (default: false, targets are often self-signed).
    #[serde(default)]
    pub verify_tls: bool,

    /// Redirects followed per request (default: 10).
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Concurrent scenario limit (None = sequential).
    #[serde(default)]
    pub parallel: Option<usize>,

    /// Depth bound of the extraction fallback search (default: 5).
    #[serde(default = "default_fallback_depth")]
    pub fallback_depth: usize,
}

const fn default_timeout_ms() -> u64 {
    30_000
}

const fn default_max_redirects() -> usize {
    10
}

fn default_user_agent() -> String {
    format!("chainrun/{}", env!("CARGO_PKG_VERSION"))
}

const fn default_fallback_depth() -> usize {
    crate::path::DEFAULT_SEARCH_DEPTH
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_ms: default_timeout_ms(),
            verify_tls: false,
            max_redirects: default_max_redirects(),
            user_agent: default_user_agent(),
            parallel: None,
            fallback_depth: default_fallback_depth(),
        }
    }
}

/// Load configuration from `chainrun.config.yaml` in `dir`.
///
/// If the file doesn't exist, returns default configuration.
///
/// # Errors
/// Returns an error if the file exists but cannot be read or parsed, or the
/// values are invalid.
pub fn load_config(dir: &Path) -> Result<RunnerConfig, ConfigError> {
    let config_path = dir.join(CONFIG_FILE_NAME);
    if config_path.exists() {
        load_config_file(&config_path)
    } else {
        Ok(RunnerConfig::default())
    }
}

/// Load configuration from an explicit path, which must exist.
///
/// # Errors
/// Returns an error if the file is missing, unreadable, malformed or invalid.
pub fn load_config_file(path: &Path) -> Result<RunnerConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path)?;
    let config = if content.trim().is_empty() {
        RunnerConfig::default()
    } else {
        serde_yml::from_str(&content)?
    };
    validate_config(&config)?;
    Ok(config)
}

/// Validate the configuration.
///
/// # Errors
/// Returns an error for a zero timeout or a base URL that is not an absolute
/// http(s) URL.
pub fn validate_config(config: &RunnerConfig) -> Result<(), ConfigError> {
    if config.timeout_ms == 0 {
        return Err(ConfigError::InvalidTimeout);
    }
    if let Some(base) = config.base_url.as_deref().map(str::trim).filter(|b| !b.is_empty()) {
        let valid = Url::parse(base).is_ok_and(|url| matches!(url.scheme(), "http" | "https"));
        if !valid {
            return Err(ConfigError::InvalidBaseUrl(base.to_string()));
        }
    }
    Ok(())
}

/// CLI override options for configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub base_url: Option<String>,
    pub timeout: Option<u64>,
    pub verify_tls: Option<bool>,
    pub parallel: Option<usize>,
}

/// Apply CLI overrides to a configuration.
#[must_use]
pub fn apply_overrides(mut config: RunnerConfig, overrides: &ConfigOverrides) -> RunnerConfig {
    if let Some(ref base_url) = overrides.base_url {
        config.base_url = Some(base_url.clone());
    }
    if let Some(timeout) = overrides.timeout {
        config.timeout_ms = timeout;
    }
    if let Some(verify_tls) = overrides.verify_tls {
        config.verify_tls = verify_tls;
    }
    if let Some(parallel) = overrides.parallel {
        config.parallel = Some(parallel);
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn test_load_config_default_when_missing() -> TestResult {
        let dir = TempDir::new()?;
        let config = load_config(dir.path())?;
        assert_eq!(config, RunnerConfig::default());
        assert_eq!(config.timeout_ms, 30_000);
        assert!(!config.verify_tls);
        assert!(config.user_agent.starts_with("chainrun/"));
        Ok(())
    }

    #[test]
    fn test_load_config_from_file() -> TestResult {
        let dir = TempDir::new()?;
        let config_content = r"
base-url: https://staging.example.com
timeout-ms: 5000
verify-tls: true
parallel: 4
fallback-depth: 3
";
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), config_content)?;

        let config = load_config(dir.path())?;
        assert_eq!(config.base_url.as_deref(), Some("https://staging.example.com"));
        assert_eq!(config.timeout_ms, 5000);
        assert!(config.verify_tls);
        assert_eq!(config.parallel, Some(4));
        assert_eq!(config.fallback_depth, 3);
        assert_eq!(config.max_redirects, 10);
        Ok(())
    }

    #[test]
    fn test_load_config_empty_file_is_default() -> TestResult {
        let dir = TempDir::new()?;
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "\n")?;
        assert_eq!(load_config(dir.path())?, RunnerConfig::default());
        Ok(())
    }

    #[test]
    fn test_load_config_rejects_zero_timeout() -> TestResult {
        let dir = TempDir::new()?;
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "timeout-ms: 0\n")?;
        assert!(matches!(load_config(dir.path()), Err(ConfigError::InvalidTimeout)));
        Ok(())
    }

    #[test]
    fn test_load_config_rejects_bad_base_url() -> TestResult {
        let dir = TempDir::new()?;
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "base-url: ftp://files\n")?;
        assert!(matches!(
            load_config(dir.path()),
            Err(ConfigError::InvalidBaseUrl(_))
        ));
        Ok(())
    }

    #[test]
    fn test_load_config_rejects_unknown_keys() -> TestResult {
        let dir = TempDir::new()?;
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "retries: 3\n")?;
        assert!(matches!(load_config(dir.path()), Err(ConfigError::Yaml(_))));
        Ok(())
    }

    #[test]
    fn test_load_config_file_missing() {
        let result = load_config_file(Path::new("/nonexistent/chainrun.yaml"));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_apply_overrides() {
        let overrides = ConfigOverrides {
            base_url: Some("http://127.0.0.1:9000".to_string()),
            timeout: Some(1500),
            ..Default::default()
        };

        let result = apply_overrides(RunnerConfig::default(), &overrides);
        assert_eq!(result.base_url.as_deref(), Some("http://127.0.0.1:9000"));
        assert_eq!(result.timeout_ms, 1500);
        // Non-overridden values should remain default
        assert!(!result.verify_tls);
        assert_eq!(result.parallel, None);
    }

    #[test]
    fn test_apply_overrides_empty() {
        let config = RunnerConfig {
            verify_tls: true,
            ..RunnerConfig::default()
        };
        let result = apply_overrides(config.clone(), &ConfigOverrides::default());
        assert_eq!(result, config);
    }
}
