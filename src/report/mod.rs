//! Results report model and loading.
//!
//! The report is the JSON written by the test runner's JSON reporter: a
//! `stats` block plus an arbitrarily nested tree of suites.

pub mod parser;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

pub use parser::{flatten, visit_specs};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("test results file not found at {path}; ensure the JSON reporter is configured and tests have run")]
    Missing { path: PathBuf },
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed JSON in {path}: {source}")]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },
}

// ---------------------------------------------------------------------------
// Wire model
// ---------------------------------------------------------------------------

/// Top-level results document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Report {
    #[serde(default)]
    pub stats: Stats,
    #[serde(default)]
    pub suites: Vec<Suite>,
}

/// Aggregate counters as reported by the runner.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Stats {
    pub expected: u64,
    pub unexpected: u64,
    pub flaky: u64,
    pub skipped: u64,
    /// Wall-clock duration of the whole run, in milliseconds.
    pub duration: f64,
    /// RFC 3339 start of the run.
    pub start_time: Option<String>,
}

impl Stats {
    pub fn total(&self) -> u64 {
        self.expected + self.unexpected + self.flaky + self.skipped
    }
}

/// A suite node. Suites nest to any depth and may carry specs at any level.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Suite {
    pub title: String,
    pub file: Option<String>,
    pub specs: Vec<Spec>,
    pub suites: Vec<Suite>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Spec {
    pub title: String,
    pub file: Option<String>,
    pub tags: Vec<String>,
    pub tests: Vec<SpecTest>,
}

/// One test of a spec (one per configured project).
#[derive(Debug, Clone, Deserialize)]
pub struct SpecTest {
    pub status: TestStatus,
    #[serde(default)]
    pub results: Vec<Attempt>,
}

/// A single timed execution attempt; retries produce further attempts.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Attempt {
    pub duration: f64,
    pub errors: Vec<AttemptError>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AttemptError {
    pub message: Option<String>,
}

/// Outcome of a test across its attempts, in the runner's vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TestStatus {
    #[serde(rename = "expected")]
    Passed,
    #[serde(rename = "unexpected")]
    Failed,
    #[serde(rename = "flaky")]
    Flaky,
    #[serde(rename = "skipped")]
    Skipped,
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestStatus::Passed => write!(f, "passed"),
            TestStatus::Failed => write!(f, "failed"),
            TestStatus::Flaky => write!(f, "flaky"),
            TestStatus::Skipped => write!(f, "skipped"),
        }
    }
}

// ---------------------------------------------------------------------------
// Flattened records
// ---------------------------------------------------------------------------

/// Representative outcome of one spec in this run. `title` is the
/// cross-run identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestRecord {
    pub title: String,
    pub file: String,
    pub tags: BTreeSet<String>,
    pub status: TestStatus,
    /// Milliseconds, from the first attempt.
    pub duration: u64,
    /// First error message of the first attempt, or empty.
    pub error: String,
}

impl TestRecord {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}

/// A parsed run: flat records plus the runner's own counters.
#[derive(Debug, Clone, Default)]
pub struct ParsedRun {
    pub records: Vec<TestRecord>,
    pub stats: Stats,
}

impl ParsedRun {
    pub fn from_report(report: &Report) -> Self {
        Self {
            records: flatten(report),
            stats: report.stats.clone(),
        }
    }

    pub fn with_status(&self, status: TestStatus) -> impl Iterator<Item = &TestRecord> {
        self.records.iter().filter(move |r| r.status == status)
    }

    pub fn count(&self, status: TestStatus) -> usize {
        self.with_status(status).count()
    }
}

/// Read and deserialize the report at `path`.
///
/// A missing file is reported as [`ReportError::Missing`], distinct from
/// unreadable or malformed content.
pub fn load(path: &Path) -> Result<Report, ReportError> {
    let data = std::fs::read_to_string(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            ReportError::Missing {
                path: path.to_path_buf(),
            }
        } else {
            ReportError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;
    serde_json::from_str(&data).map_err(|source| ReportError::Malformed {
        path: path.to_path_buf(),
        source,
    })
}

/// Load the report at `path` and flatten it.
pub fn parse_results(path: &Path) -> Result<ParsedRun, ReportError> {
    let report = load(path)?;
    let run = ParsedRun::from_report(&report);
    info!(
        path = %path.display(),
        total = run.records.len(),
        passed = run.count(TestStatus::Passed),
        failed = run.count(TestStatus::Failed),
        flaky = run.count(TestStatus::Flaky),
        skipped = run.count(TestStatus::Skipped),
        "Parsed test results"
    );
    Ok(run)
}
