//! Typed configuration for the notifier and the archiver.
//!
//! A [`Config`] is built once in `main` from an optional TOML file plus
//! CLI/environment overrides, then threaded into every component. Nothing
//! below the process boundary reads the environment.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root configuration for both invocations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub alert: AlertConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
    /// Populated from CLI/env only, never from the file.
    #[serde(skip)]
    pub run: RunContext,
}

impl Config {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "loaded configuration");
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` when one is given, otherwise use compiled-in defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Self::load(p),
            None => {
                debug!("no config file given, using compiled-in defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.alert.threshold == 0 {
            return Err(ConfigError::Invalid(
                "alert.threshold must be at least 1".to_string(),
            ));
        }
        if self.alert.max_listed == 0 {
            return Err(ConfigError::Invalid(
                "alert.max_listed must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

/// Artifact locations, relative to the working directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Results report written by the test runner's JSON reporter.
    pub results_file: PathBuf,
    /// Condensed run summary written on every notifier invocation.
    pub summary_file: PathBuf,
    /// Persisted consecutive-failure counters.
    pub state_file: PathBuf,
    /// Append-only directory of archived summaries.
    pub history_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            results_file: PathBuf::from("test-results/results.json"),
            summary_file: PathBuf::from("test-results/summary.json"),
            state_file: PathBuf::from(".state/failure-state.json"),
            history_dir: PathBuf::from("results-history"),
        }
    }
}

// ---------------------------------------------------------------------------
// Alerting
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Consecutive failures before a test becomes alertable.
    pub threshold: u32,
    /// Tag that routes a test into the CRITICAL bucket.
    pub critical_tag: String,
    /// Failure-list entries shown before collapsing into "...and K more".
    pub max_listed: usize,
    /// Characters of error text shown per snippet.
    pub error_snippet_chars: usize,
    /// Optional suffix for the message header, e.g. the site under test.
    pub label: Option<String>,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            threshold: 2,
            critical_tag: "@critical".to_string(),
            max_listed: 10,
            error_snippet_chars: 100,
            label: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Webhook
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Incoming-webhook URL. Absent means delivery is a logged no-op.
    pub url: Option<String>,
    /// Upper bound on a single delivery call.
    pub timeout_secs: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: 10,
        }
    }
}

// ---------------------------------------------------------------------------
// Archive
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    pub committer_name: Option<String>,
    pub committer_email: Option<String>,
    pub push: bool,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            committer_name: Some("github-actions[bot]".to_string()),
            committer_email: Some("github-actions[bot]@users.noreply.github.com".to_string()),
            push: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Run context
// ---------------------------------------------------------------------------

/// Identifiers of the CI run being reported on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    /// Short (7 character) commit hash, or `"local"`.
    pub commit: String,
    pub branch: String,
    pub run_id: Option<String>,
    /// `owner/name` of the repository hosting the run.
    pub repository: Option<String>,
}

impl Default for RunContext {
    fn default() -> Self {
        Self {
            commit: "local".to_string(),
            branch: "local".to_string(),
            run_id: None,
            repository: None,
        }
    }
}

impl RunContext {
    /// Build a context from optional raw values, applying the fallbacks.
    pub fn new(
        commit: Option<String>,
        branch: Option<String>,
        run_id: Option<String>,
        repository: Option<String>,
    ) -> Self {
        let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        let commit = non_empty(commit)
            .map(|c| c.chars().take(7).collect())
            .unwrap_or_else(|| "local".to_string());
        Self {
            commit,
            branch: non_empty(branch).unwrap_or_else(|| "local".to_string()),
            run_id: non_empty(run_id),
            repository: non_empty(repository),
        }
    }

    /// Link to the CI run, when both the repository and run id are known.
    pub fn run_url(&self) -> Option<String> {
        match (&self.repository, &self.run_id) {
            (Some(repo), Some(id)) => Some(format!(
                "https://github.com/{}/actions/runs/{}",
                repo, id
            )),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.alert.threshold, 2);
        assert_eq!(cfg.alert.critical_tag, "@critical");
        assert_eq!(cfg.paths.state_file, PathBuf::from(".state/failure-state.json"));
        assert!(cfg.webhook.url.is_none());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let cfg: Config = toml::from_str(
            r#"
            [alert]
            threshold = 3

            [webhook]
            url = "https://hooks.example.com/T000"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.alert.threshold, 3);
        assert_eq!(cfg.alert.max_listed, 10);
        assert_eq!(cfg.webhook.timeout_secs, 10);
        assert_eq!(cfg.webhook.url.as_deref(), Some("https://hooks.example.com/T000"));
        assert_eq!(cfg.paths.history_dir, PathBuf::from("results-history"));
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("testpulse.toml");
        std::fs::write(&path, "[alert]\nthreshold = 0\n").unwrap();
        assert!(matches!(Config::load(&path), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load_or_default(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_run_context_fallbacks() {
        let ctx = RunContext::new(None, Some(String::new()), None, None);
        assert_eq!(ctx.commit, "local");
        assert_eq!(ctx.branch, "local");
        assert_eq!(ctx.run_url(), None);
    }

    #[test]
    fn test_run_context_url_and_short_commit() {
        let ctx = RunContext::new(
            Some("0123456789abcdef".to_string()),
            Some("main".to_string()),
            Some("42".to_string()),
            Some("acme/web".to_string()),
        );
        assert_eq!(ctx.commit, "0123456");
        assert_eq!(
            ctx.run_url().as_deref(),
            Some("https://github.com/acme/web/actions/runs/42")
        );
    }
}
