//! testpulse -- CI test-result notifier with consecutive-failure tracking.
//!
//! This crate provides the core library for parsing test-run reports,
//! tracking per-test failure streaks across runs, rendering and delivering
//! severity-based chat alerts, and archiving run summaries into a
//! version-controlled history.

pub mod alert;
pub mod archive;
pub mod config;
pub mod notify;
pub mod report;
pub mod summary;
pub mod tracker;

pub use config::{Config, RunContext};
