//! Severity classification, message rendering and delivery of alerts.

pub mod message;
pub mod sender;

use serde::{Deserialize, Serialize};

pub use crate::tracker::AlertableFailure;
pub use message::{Block, MessageBuilder, SlackMessage, TextObject};
pub use sender::{AlertSink, SendOutcome, WebhookSender};

/// Alert severity. Every alertable failure lands in exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Critical,
    Warning,
}

impl Severity {
    /// Header marker for this severity.
    pub fn icon(&self) -> &'static str {
        match self {
            Severity::Critical => "\u{1F6A8}",
            Severity::Warning => "\u{26A0}\u{FE0F}",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Critical => write!(f, "CRITICAL"),
            Severity::Warning => write!(f, "WARNING"),
        }
    }
}

/// Alertable failures split by severity, each in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classified {
    pub critical: Vec<AlertableFailure>,
    pub warning: Vec<AlertableFailure>,
}

impl Classified {
    /// Non-empty buckets, CRITICAL first.
    pub fn buckets(self) -> Vec<(Severity, Vec<AlertableFailure>)> {
        [(Severity::Critical, self.critical), (Severity::Warning, self.warning)]
            .into_iter()
            .filter(|(_, failures)| !failures.is_empty())
            .collect()
    }
}

/// Tests carrying `critical_tag` go to CRITICAL; everything else, tagged or
/// not, goes to WARNING.
pub fn classify(alertable: Vec<AlertableFailure>, critical_tag: &str) -> Classified {
    let (critical, warning): (Vec<_>, Vec<_>) = alertable
        .into_iter()
        .partition(|f| f.record.has_tag(critical_tag));
    Classified { critical, warning }
}

/// Everything needed to render one message.
#[derive(Debug, Clone)]
pub struct AlertPayload {
    pub severity: Severity,
    pub failures: Vec<AlertableFailure>,
    pub run_url: Option<String>,
    pub commit: String,
    pub branch: String,
}
