//! Consecutive-failure tracking across runs.
//!
//! Each test title is either clean (no entry) or on a failure streak of
//! length `n` (an entry with `count == n`). A failure starts or extends the
//! streak, a pass removes the entry entirely. Tests whose streak has reached
//! the threshold are alertable on every run they keep failing.

pub mod store;

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::report::{TestRecord, TestStatus};

pub use store::{
    FileStateRepository, InMemoryStateRepository, StateError, StateLoad, StateRepository,
};

/// Streak bookkeeping for one failing test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureEntry {
    pub count: u32,
    pub last_failure: DateTime<Utc>,
}

/// Test title -> active failure streak. Persisted as a plain JSON object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FailureState {
    entries: BTreeMap<String, FailureEntry>,
}

impl FailureState {
    pub fn get(&self, title: &str) -> Option<&FailureEntry> {
        self.entries.get(title)
    }

    pub fn contains(&self, title: &str) -> bool {
        self.entries.contains_key(title)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FailureEntry)> {
        self.entries.iter()
    }

    fn record_failure(&mut self, title: &str, now: DateTime<Utc>) {
        self.entries
            .entry(title.to_string())
            .and_modify(|e| {
                e.count = e.count.saturating_add(1);
                e.last_failure = now;
            })
            .or_insert(FailureEntry {
                count: 1,
                last_failure: now,
            });
    }

    fn clear(&mut self, title: &str) -> bool {
        self.entries.remove(title).is_some()
    }
}

/// A currently failing test whose streak has reached the threshold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertableFailure {
    pub record: TestRecord,
    pub consecutive_failures: u32,
}

/// Result of applying one run to the previous state.
#[derive(Debug, Clone, Default)]
pub struct Transition {
    pub state: FailureState,
    pub alertable: Vec<AlertableFailure>,
    pub recovered: Vec<String>,
}

/// Apply one run's outcomes to `previous`.
///
/// Failures increment once per distinct title; passes clear the entry.
/// Alertable tests are those failing this run whose post-update count is at
/// least `threshold`, in the order they first appear in `records`.
pub fn advance(
    previous: FailureState,
    records: &[TestRecord],
    threshold: u32,
    now: DateTime<Utc>,
) -> Transition {
    let mut state = previous;

    let mut failing: Vec<&TestRecord> = Vec::new();
    let mut seen = HashSet::new();
    for record in records.iter().filter(|r| r.status == TestStatus::Failed) {
        if seen.insert(record.title.as_str()) {
            state.record_failure(&record.title, now);
            failing.push(record);
        }
    }

    let mut recovered = Vec::new();
    for record in records.iter().filter(|r| r.status == TestStatus::Passed) {
        if state.clear(&record.title) {
            recovered.push(record.title.clone());
        }
    }

    let alertable = failing
        .into_iter()
        .filter_map(|record| {
            let entry = state.get(&record.title)?;
            (entry.count >= threshold).then(|| AlertableFailure {
                record: record.clone(),
                consecutive_failures: entry.count,
            })
        })
        .collect();

    Transition {
        state,
        alertable,
        recovered,
    }
}

/// Loads, updates and persists failure state around [`advance`].
pub struct FailureTracker<R: StateRepository> {
    repo: R,
    threshold: u32,
}

impl<R: StateRepository> FailureTracker<R> {
    pub fn new(repo: R, threshold: u32) -> Self {
        Self { repo, threshold }
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    /// Update the persisted streaks with this run and return the alertable
    /// failures. State problems are logged and never abort the run.
    pub fn update(&self, records: &[TestRecord], now: DateTime<Utc>) -> Vec<AlertableFailure> {
        let previous = match self.repo.load() {
            StateLoad::FirstRun => {
                debug!("No failure state yet, starting fresh");
                FailureState::default()
            }
            StateLoad::Loaded(state) => {
                debug!(entries = state.len(), "Loaded failure state");
                state
            }
            StateLoad::Corrupt { error, backup } => {
                warn!(
                    error = %error,
                    backup = ?backup,
                    "Failure state is corrupt, discarding streak history"
                );
                FailureState::default()
            }
            StateLoad::Unreadable { error } => {
                warn!(error = %error, "Failed to load failure state, proceeding with empty state");
                FailureState::default()
            }
        };

        let transition = advance(previous, records, self.threshold, now);

        for title in &transition.recovered {
            info!(test = %title, "Test recovered, streak cleared");
        }

        if let Err(e) = self.repo.save(&transition.state) {
            warn!("Failed to save failure state: {}", e);
        }

        transition.alertable
    }
}
