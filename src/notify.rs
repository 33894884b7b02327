//! The notification path: parse, summarize, track, classify, alert.

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::info;

use crate::alert::{
    classify, AlertPayload, AlertSink, MessageBuilder, SendOutcome, Severity, WebhookSender,
};
use crate::config::Config;
use crate::report::{self, TestStatus};
use crate::summary::{self, RunSummary};
use crate::tracker::{FailureTracker, FileStateRepository, StateRepository};

/// What one notifier invocation did.
#[derive(Debug, Clone)]
pub struct NotifyOutcome {
    pub summary: RunSummary,
    pub alertable: usize,
    /// One entry per non-empty severity bucket, CRITICAL first.
    pub deliveries: Vec<(Severity, SendOutcome)>,
}

/// Run the notifier against the files and endpoint named in `config`.
pub async fn run(config: &Config) -> Result<NotifyOutcome> {
    let tracker = FailureTracker::new(
        FileStateRepository::new(&config.paths.state_file),
        config.alert.threshold,
    );
    let sink = WebhookSender::new(&config.webhook)?;
    run_with(config, &tracker, &sink, Utc::now()).await
}

/// Run the notifier with injected state storage and alert sink.
///
/// Fails only when the results artifact is missing or malformed.
pub async fn run_with<R, S>(
    config: &Config,
    tracker: &FailureTracker<R>,
    sink: &S,
    now: DateTime<Utc>,
) -> Result<NotifyOutcome>
where
    R: StateRepository,
    S: AlertSink + ?Sized,
{
    info!("Starting notification run");

    let run = report::parse_results(&config.paths.results_file)?;
    let summary = summary::write_summary(&run, &config.run, &config.paths.summary_file, now);

    let failed = run.count(TestStatus::Failed);
    if failed == 0 {
        info!("All {} tests passed.", run.count(TestStatus::Passed));
    } else {
        info!("{} test(s) failed.", failed);
    }

    let alertable = tracker.update(&run.records, now);
    let alertable_count = alertable.len();
    if failed > 0 && alertable.is_empty() {
        info!("Failures detected but below consecutive threshold. No alert sent.");
    } else if !alertable.is_empty() {
        info!("{} test(s) reached alert threshold.", alertable_count);
    }

    let builder = MessageBuilder::new(&config.alert);
    let run_url = config.run.run_url();
    let mut deliveries = Vec::new();

    for (severity, failures) in classify(alertable, &config.alert.critical_tag).buckets() {
        info!(severity = %severity, count = failures.len(), "Sending alert");
        let payload = AlertPayload {
            severity,
            failures,
            run_url: run_url.clone(),
            commit: config.run.commit.clone(),
            branch: config.run.branch.clone(),
        };
        let message = builder.build(&payload, now);
        deliveries.push((severity, sink.send(&message).await));
    }

    Ok(NotifyOutcome {
        summary,
        alertable: alertable_count,
        deliveries,
    })
}
