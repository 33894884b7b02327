//! Version-control operations used by the archiver, and a `git` CLI backend.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum VcsError {
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },
    #[error("`{command}` exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },
}

pub trait VersionControl {
    /// Set the author/committer identity for subsequent commits.
    fn configure_identity(&self, name: &str, email: &str) -> Result<(), VcsError>;
    fn stage(&self, path: &Path) -> Result<(), VcsError>;
    /// Whether the index differs from HEAD under `path`.
    fn has_staged_changes(&self, path: &Path) -> Result<bool, VcsError>;
    /// Commit only what is staged under `path`; other staged changes stay
    /// in the index.
    fn commit(&self, message: &str, path: &Path) -> Result<(), VcsError>;
    fn push(&self) -> Result<(), VcsError>;
}

/// Shells out to `git` in a working tree.
#[derive(Debug, Clone)]
pub struct GitCli {
    work_tree: PathBuf,
}

impl GitCli {
    pub fn new(work_tree: impl Into<PathBuf>) -> Self {
        Self {
            work_tree: work_tree.into(),
        }
    }

    fn output(&self, args: &[&str]) -> Result<Output, VcsError> {
        let command = format!("git {}", args.join(" "));
        debug!(%command, "Running git");
        Command::new("git")
            .args(args)
            .current_dir(&self.work_tree)
            .output()
            .map_err(|source| VcsError::Spawn { command, source })
    }

    fn run(&self, args: &[&str]) -> Result<(), VcsError> {
        let out = self.output(args)?;
        if out.status.success() {
            Ok(())
        } else {
            Err(failed(args, &out))
        }
    }
}

fn failed(args: &[&str], out: &Output) -> VcsError {
    VcsError::Failed {
        command: format!("git {}", args.join(" ")),
        status: out.status.to_string(),
        stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
    }
}

impl VersionControl for GitCli {
    fn configure_identity(&self, name: &str, email: &str) -> Result<(), VcsError> {
        self.run(&["config", "user.name", name])?;
        self.run(&["config", "user.email", email])
    }

    fn stage(&self, path: &Path) -> Result<(), VcsError> {
        let path = path.to_string_lossy();
        self.run(&["add", "--", &*path])
    }

    fn has_staged_changes(&self, path: &Path) -> Result<bool, VcsError> {
        let path = path.to_string_lossy();
        let args = ["diff", "--cached", "--quiet", "--", &*path];
        let out = self.output(&args)?;
        // --quiet exits 1 when there are differences.
        match out.status.code() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(failed(&args, &out)),
        }
    }

    fn commit(&self, message: &str, path: &Path) -> Result<(), VcsError> {
        let path = path.to_string_lossy();
        self.run(&["commit", "--quiet", "-m", message, "--only", "--", &*path])
    }

    fn push(&self) -> Result<(), VcsError> {
        self.run(&["push"])
    }
}
