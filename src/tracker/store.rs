//! Persistence of failure state.
//!
//! Loading never fails outright: the caller gets a [`StateLoad`] telling a
//! first run apart from state that existed but had to be discarded.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;

use super::FailureState;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to write failure state to {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to encode failure state: {0}")]
    Encode(#[from] serde_json::Error),
}

/// What a load attempt found.
#[derive(Debug)]
pub enum StateLoad {
    /// No state persisted yet.
    FirstRun,
    Loaded(FailureState),
    /// State exists but does not parse. `backup` is where the original
    /// bytes were preserved, when that succeeded.
    Corrupt {
        error: String,
        backup: Option<PathBuf>,
    },
    /// State exists but could not be read.
    Unreadable { error: String },
}

/// Storage for [`FailureState`] between invocations.
pub trait StateRepository {
    fn load(&self) -> StateLoad;
    fn save(&self, state: &FailureState) -> Result<(), StateError>;
}

/// JSON file repository. Read-modify-write with no locking; concurrent
/// invocations are last-write-wins.
#[derive(Debug, Clone)]
pub struct FileStateRepository {
    path: PathBuf,
}

impl FileStateRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Where a corrupt state file is copied before it gets overwritten.
    pub fn backup_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(".corrupt");
        PathBuf::from(name)
    }
}

impl StateRepository for FileStateRepository {
    fn load(&self) -> StateLoad {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return StateLoad::FirstRun,
            Err(e) => {
                return StateLoad::Unreadable {
                    error: e.to_string(),
                }
            }
        };

        let parsed = serde_json::from_str::<FailureState>(&data)
            .map_err(|e| e.to_string())
            .and_then(|state| {
                let zero = state
                    .iter()
                    .find(|(_, e)| e.count == 0)
                    .map(|(title, _)| format!("entry {:?} has a zero failure count", title));
                match zero {
                    Some(err) => Err(err),
                    None => Ok(state),
                }
            });
        match parsed {
            Ok(state) => StateLoad::Loaded(state),
            Err(error) => {
                let backup = self.backup_path();
                let backup = std::fs::write(&backup, &data).ok().map(|_| backup);
                StateLoad::Corrupt { error, backup }
            }
        }
    }

    fn save(&self, state: &FailureState) -> Result<(), StateError> {
        let io_err = |source| StateError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(state)?;
        std::fs::write(&self.path, json).map_err(io_err)?;
        Ok(())
    }
}

/// Process-local repository, for wiring the tracker without a filesystem.
#[derive(Debug, Default)]
pub struct InMemoryStateRepository {
    state: Mutex<Option<FailureState>>,
}

impl InMemoryStateRepository {
    pub fn with_state(state: FailureState) -> Self {
        Self {
            state: Mutex::new(Some(state)),
        }
    }

    /// Last saved state (empty if never saved).
    pub fn snapshot(&self) -> FailureState {
        self.state
            .lock()
            .map(|s| s.clone().unwrap_or_default())
            .unwrap_or_default()
    }
}

impl StateRepository for InMemoryStateRepository {
    fn load(&self) -> StateLoad {
        match self.state.lock() {
            Ok(guard) => match guard.as_ref() {
                Some(state) => StateLoad::Loaded(state.clone()),
                None => StateLoad::FirstRun,
            },
            Err(e) => StateLoad::Unreadable {
                error: e.to_string(),
            },
        }
    }

    fn save(&self, state: &FailureState) -> Result<(), StateError> {
        if let Ok(mut guard) = self.state.lock() {
            *guard = Some(state.clone());
        }
        Ok(())
    }
}
