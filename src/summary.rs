//! Condensed per-run summary, written on every notifier invocation.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::config::RunContext;
use crate::report::{ParsedRun, TestStatus};

/// Max characters of error text kept per failure.
pub const ERROR_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    /// RFC 3339 time the summary was produced.
    pub timestamp: String,
    #[serde(alias = "commit")]
    pub commit_hash: String,
    pub branch: String,
    pub run_id: Option<String>,
    pub run_url: Option<String>,
    /// Run duration in milliseconds, from the runner's stats.
    pub duration: f64,
    pub total: u64,
    pub passed: u64,
    pub failed: u64,
    pub flaky: u64,
    pub skipped: u64,
    pub failures: Vec<FailureDigest>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureDigest {
    pub title: String,
    pub file: String,
    pub tags: BTreeSet<String>,
    pub duration: u64,
    pub error: String,
}

impl RunSummary {
    /// Reduce a parsed run into its summary. Counts come from the flattened
    /// records so they always agree with `failures`.
    pub fn build(run: &ParsedRun, ctx: &RunContext, now: DateTime<Utc>) -> Self {
        let passed = run.count(TestStatus::Passed) as u64;
        let failed = run.count(TestStatus::Failed) as u64;
        let flaky = run.count(TestStatus::Flaky) as u64;
        let skipped = run.count(TestStatus::Skipped) as u64;

        let failures = run
            .with_status(TestStatus::Failed)
            .map(|r| FailureDigest {
                title: r.title.clone(),
                file: r.file.clone(),
                tags: r.tags.clone(),
                duration: r.duration,
                error: truncate_chars(&r.error, ERROR_CHARS).to_string(),
            })
            .collect();

        Self {
            timestamp: now.to_rfc3339_opts(SecondsFormat::Millis, true),
            commit_hash: ctx.commit.clone(),
            branch: ctx.branch.clone(),
            run_id: ctx.run_id.clone(),
            run_url: ctx.run_url(),
            duration: run.stats.duration,
            total: passed + failed + flaky + skipped,
            passed,
            failed,
            flaky,
            skipped,
            failures,
        }
    }

    /// Write as pretty JSON, creating the parent directory if needed.
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }

    pub fn read(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str(&data).with_context(|| format!("malformed summary {}", path.display()))
    }
}

/// Build and write the summary. A failed write is logged, never returned:
/// the notification path continues regardless.
pub fn write_summary(
    run: &ParsedRun,
    ctx: &RunContext,
    path: &Path,
    now: DateTime<Utc>,
) -> RunSummary {
    let summary = RunSummary::build(run, ctx, now);
    match summary.write(path) {
        Ok(()) => info!(path = %path.display(), "Summary written"),
        Err(e) => error!(path = %path.display(), "Failed to write summary: {:#}", e),
    }
    summary
}

/// Longest prefix of `s` holding at most `max` characters.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
