//! Results history: timestamped run summaries committed to version control.
//!
//! Archiving is best-effort. A missing source artifact and a rejected push
//! are logged and reported as successful outcomes; a malformed artifact or a
//! failed commit is an error.

pub mod vcs;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::report::{self, visit_specs, Report, ReportError, TestStatus};
use crate::summary::RunSummary;

pub use vcs::{GitCli, VcsError, VersionControl};

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error(transparent)]
    Report(ReportError),
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed summary {path}: {source}")]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("run start time missing from {path}")]
    MissingTimestamp { path: PathBuf },
    #[error("invalid run timestamp {value:?}: {source}")]
    Timestamp {
        value: String,
        source: chrono::ParseError,
    },
    #[error("failed to write archive entry {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("no free archive file name left for {stamp}")]
    NameExhausted { stamp: String },
    #[error("failed to encode archive entry: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to configure committer identity: {0}")]
    Identity(#[source] VcsError),
    #[error("failed to stage {path}: {source}")]
    Stage { path: PathBuf, source: VcsError },
    #[error("failed to commit archive entry: {0}")]
    Commit(#[source] VcsError),
}

/// Which artifact is snapshotted into the history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArchiveSource {
    /// Full results report, compacted into an [`ArchiveSummary`].
    #[default]
    Report,
    /// The notifier's [`RunSummary`], archived as-is.
    Summary,
}

/// Compact digest of a full results report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArchiveSummary {
    pub timestamp: String,
    pub duration: f64,
    pub passed: u64,
    pub failed: u64,
    pub flaky: u64,
    pub skipped: u64,
    pub total: u64,
    pub tests: Vec<ArchivedTest>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArchivedTest {
    pub title: String,
    pub file: String,
    pub tags: BTreeSet<String>,
    pub status: TestStatus,
    /// Sum over all attempts, in milliseconds.
    pub duration: u64,
    pub retries: usize,
}

impl ArchiveSummary {
    /// Compact `report`. Counters come from the runner's stats; every test
    /// of every spec is listed, with all attempts accounted for.
    pub fn from_report(report: &Report, path: &Path) -> Result<Self, ArchiveError> {
        let stats = &report.stats;
        let timestamp = stats
            .start_time
            .clone()
            .ok_or_else(|| ArchiveError::MissingTimestamp {
                path: path.to_path_buf(),
            })?;

        let mut tests = Vec::new();
        visit_specs(&report.suites, &mut |file, spec| {
            for test in &spec.tests {
                let duration: f64 = test.results.iter().map(|a| a.duration.max(0.0)).sum();
                tests.push(ArchivedTest {
                    title: spec.title.clone(),
                    file: file.to_string(),
                    tags: spec.tags.iter().cloned().collect(),
                    status: test.status,
                    duration: duration.round() as u64,
                    retries: test.results.len().saturating_sub(1),
                });
            }
        });

        Ok(Self {
            timestamp,
            duration: stats.duration,
            passed: stats.expected,
            failed: stats.unexpected,
            flaky: stats.flaky,
            skipped: stats.skipped,
            total: stats.total(),
            tests,
        })
    }
}

/// The document written into the history directory.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ArchiveEntry {
    Compact(ArchiveSummary),
    Run(RunSummary),
}

impl ArchiveEntry {
    pub fn timestamp(&self) -> &str {
        match self {
            ArchiveEntry::Compact(s) => &s.timestamp,
            ArchiveEntry::Run(s) => &s.timestamp,
        }
    }

    pub fn passed(&self) -> u64 {
        match self {
            ArchiveEntry::Compact(s) => s.passed,
            ArchiveEntry::Run(s) => s.passed,
        }
    }

    pub fn total(&self) -> u64 {
        match self {
            ArchiveEntry::Compact(s) => s.total,
            ArchiveEntry::Run(s) => s.total,
        }
    }
}

/// Format an RFC 3339 timestamp for use in a file name: UTC, colons
/// replaced by `-`, sub-second precision dropped. `2026-02-16T14:30:00.123Z`
/// becomes `2026-02-16T14-30-00Z`.
pub fn file_timestamp(raw: &str) -> Result<String, ArchiveError> {
    let parsed = DateTime::parse_from_rfc3339(raw).map_err(|source| ArchiveError::Timestamp {
        value: raw.to_string(),
        source,
    })?;
    Ok(parsed.with_timezone(&Utc).format("%Y-%m-%dT%H-%M-%SZ").to_string())
}

pub fn commit_message(passed: u64, total: u64, timestamp: &str) -> String {
    format!("results: {}/{} passed ({})", passed, total, timestamp)
}

/// Runs starting within one second share a stamp; each gets its own file.
const MAX_SAME_SECOND_ENTRIES: u32 = 1000;

/// What one archiver invocation did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveOutcome {
    /// Source artifact absent; nothing archived.
    NoSource { path: PathBuf },
    /// Entry already archived with identical content; nothing committed.
    Unchanged { entry: PathBuf },
    Committed {
        entry: PathBuf,
        message: String,
        pushed: bool,
    },
}

/// Committer identity applied before committing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub email: String,
}

pub struct HistoryArchiver<V: VersionControl> {
    vcs: V,
    source: ArchiveSource,
    source_path: PathBuf,
    history_dir: PathBuf,
    identity: Option<Identity>,
    push: bool,
}

impl<V: VersionControl> HistoryArchiver<V> {
    pub fn new(
        vcs: V,
        source: ArchiveSource,
        source_path: impl Into<PathBuf>,
        history_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            vcs,
            source,
            source_path: source_path.into(),
            history_dir: history_dir.into(),
            identity: None,
            push: true,
        }
    }

    pub fn with_identity(mut self, identity: Option<Identity>) -> Self {
        self.identity = identity;
        self
    }

    pub fn with_push(mut self, push: bool) -> Self {
        self.push = push;
        self
    }

    pub fn vcs(&self) -> &V {
        &self.vcs
    }

    pub fn run(&self) -> Result<ArchiveOutcome, ArchiveError> {
        let Some(entry) = self.read_source()? else {
            warn!(
                path = %self.source_path.display(),
                "Source artifact not found, tests may not have run. Nothing to archive."
            );
            return Ok(ArchiveOutcome::NoSource {
                path: self.source_path.clone(),
            });
        };

        let stamp = file_timestamp(entry.timestamp())?;
        std::fs::create_dir_all(&self.history_dir).map_err(|source| ArchiveError::Write {
            path: self.history_dir.clone(),
            source,
        })?;
        let json = serde_json::to_string_pretty(&entry)?;
        let target = self.place_entry(&stamp, json.as_bytes())?;

        if let Some(identity) = &self.identity {
            self.vcs
                .configure_identity(&identity.name, &identity.email)
                .map_err(ArchiveError::Identity)?;
        }

        self.vcs
            .stage(&self.history_dir)
            .map_err(|source| ArchiveError::Stage {
                path: self.history_dir.clone(),
                source,
            })?;

        let changed = self
            .vcs
            .has_staged_changes(&self.history_dir)
            .map_err(|source| ArchiveError::Stage {
                path: self.history_dir.clone(),
                source,
            })?;
        if !changed {
            info!(path = %target.display(), "No new results to commit, entry already archived");
            return Ok(ArchiveOutcome::Unchanged { entry: target });
        }

        let message = commit_message(entry.passed(), entry.total(), &stamp);
        info!(%message, "Committing archive entry");
        self.vcs
            .commit(&message, &self.history_dir)
            .map_err(ArchiveError::Commit)?;

        let pushed = if self.push {
            match self.vcs.push() {
                Ok(()) => {
                    info!("Pushed results history");
                    true
                }
                Err(e) => {
                    warn!("Failed to push results history, possibly a concurrent push: {}", e);
                    false
                }
            }
        } else {
            info!("Push disabled, leaving commit local");
            false
        };

        Ok(ArchiveOutcome::Committed {
            entry: target,
            message,
            pushed,
        })
    }

    /// Find or create the history file holding `bytes`.
    ///
    /// Entries are never overwritten. A file already holding the same bytes
    /// is reused; when another run claimed `<stamp>.json` with different
    /// content, the entry goes to the first free `<stamp>-N.json`.
    fn place_entry(&self, stamp: &str, bytes: &[u8]) -> Result<PathBuf, ArchiveError> {
        for n in 0..MAX_SAME_SECOND_ENTRIES {
            let name = match n {
                0 => format!("{}.json", stamp),
                n => format!("{}-{}.json", stamp, n),
            };
            let target = self.history_dir.join(name);
            match std::fs::read(&target) {
                Ok(existing) if existing == bytes => {
                    debug!(path = %target.display(), "Archive entry already present");
                    return Ok(target);
                }
                Ok(_) => {
                    warn!(
                        path = %target.display(),
                        "Archive entry exists with different content, keeping it"
                    );
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    std::fs::write(&target, bytes).map_err(|source| ArchiveError::Write {
                        path: target.clone(),
                        source,
                    })?;
                    info!(path = %target.display(), "Archive entry written");
                    return Ok(target);
                }
                Err(source) => return Err(ArchiveError::Read { path: target, source }),
            }
        }
        Err(ArchiveError::NameExhausted {
            stamp: stamp.to_string(),
        })
    }

    /// `Ok(None)` when the source artifact does not exist.
    fn read_source(&self) -> Result<Option<ArchiveEntry>, ArchiveError> {
        match self.source {
            ArchiveSource::Report => match report::load(&self.source_path) {
                Ok(report) => Ok(Some(ArchiveEntry::Compact(ArchiveSummary::from_report(
                    &report,
                    &self.source_path,
                )?))),
                Err(ReportError::Missing { .. }) => Ok(None),
                Err(e) => Err(ArchiveError::Report(e)),
            },
            ArchiveSource::Summary => {
                let data = match std::fs::read_to_string(&self.source_path) {
                    Ok(data) => data,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
                    Err(source) => {
                        return Err(ArchiveError::Read {
                            path: self.source_path.clone(),
                            source,
                        })
                    }
                };
                let summary: RunSummary =
                    serde_json::from_str(&data).map_err(|source| ArchiveError::Malformed {
                        path: self.source_path.clone(),
                        source,
                    })?;
                Ok(Some(ArchiveEntry::Run(summary)))
            }
        }
    }
}
