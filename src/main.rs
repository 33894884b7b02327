use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};

use testpulse::alert::SendOutcome;
use testpulse::archive::{ArchiveOutcome, ArchiveSource, GitCli, HistoryArchiver, Identity};
use testpulse::{Config, RunContext};

#[derive(Parser)]
#[command(
    name = "testpulse",
    about = "CI test-result notifier with consecutive-failure tracking",
    version,
    long_about = None
)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true, env = "TESTPULSE_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse results, update failure streaks, write the summary and send alerts
    Notify {
        /// Results report written by the JSON reporter
        #[arg(long)]
        results: Option<PathBuf>,

        /// Where to write the run summary
        #[arg(long)]
        summary: Option<PathBuf>,

        /// Persisted failure-state file
        #[arg(long)]
        state: Option<PathBuf>,

        /// Incoming-webhook URL; unset means no notification is sent
        #[arg(long, env = "SLACK_WEBHOOK_URL", hide_env_values = true)]
        webhook_url: Option<String>,

        /// Consecutive failures before a test alerts
        #[arg(long, env = "ALERT_THRESHOLD")]
        threshold: Option<u32>,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Snapshot the latest results into the version-controlled history
    Archive {
        /// Artifact to archive
        #[arg(long, value_enum, default_value_t = SourceArg::Report)]
        source: SourceArg,

        /// Results report (used with --source report)
        #[arg(long)]
        results: Option<PathBuf>,

        /// Run summary (used with --source summary)
        #[arg(long)]
        summary: Option<PathBuf>,

        /// History directory inside the repository
        #[arg(long)]
        history_dir: Option<PathBuf>,

        /// Commit locally without pushing
        #[arg(long)]
        no_push: bool,

        /// Repository working tree; relative paths resolve against it
        #[arg(long, default_value = ".")]
        repo: PathBuf,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Commit hash of the run
    #[arg(long, env = "GITHUB_SHA")]
    commit: Option<String>,

    /// Branch name of the run
    #[arg(long, env = "GITHUB_REF_NAME")]
    branch: Option<String>,

    /// CI run identifier
    #[arg(long, env = "GITHUB_RUN_ID")]
    run_id: Option<String>,

    /// Repository as owner/name, used to link the run
    #[arg(long, env = "GITHUB_REPOSITORY")]
    repository: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum SourceArg {
    Report,
    Summary,
}

impl From<SourceArg> for ArchiveSource {
    fn from(arg: SourceArg) -> Self {
        match arg {
            SourceArg::Report => ArchiveSource::Report,
            SourceArg::Summary => ArchiveSource::Summary,
        }
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let mut config = Config::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Commands::Notify {
            results,
            summary,
            state,
            webhook_url,
            threshold,
            run,
        } => {
            if let Some(p) = results {
                config.paths.results_file = p;
            }
            if let Some(p) = summary {
                config.paths.summary_file = p;
            }
            if let Some(p) = state {
                config.paths.state_file = p;
            }
            if webhook_url.is_some() {
                config.webhook.url = webhook_url;
            }
            if let Some(t) = threshold {
                config.alert.threshold = t;
            }
            config.validate()?;
            config.run = RunContext::new(run.commit, run.branch, run.run_id, run.repository);

            let outcome = testpulse::notify::run(&config)
                .await
                .context("notification run failed")?;

            let failed_deliveries = outcome
                .deliveries
                .iter()
                .filter(|(_, o)| matches!(o, SendOutcome::Failed(_)))
                .count();
            tracing::info!(
                total = outcome.summary.total,
                failed = outcome.summary.failed,
                alertable = outcome.alertable,
                messages = outcome.deliveries.len(),
                failed_deliveries,
                "Notification run complete"
            );
        }
        Commands::Archive {
            source,
            results,
            summary,
            history_dir,
            no_push,
            repo,
        } => {
            let root = std::fs::canonicalize(&repo)
                .with_context(|| format!("repository directory {} not found", repo.display()))?;
            let source = ArchiveSource::from(source);
            let source_path = match source {
                ArchiveSource::Report => results.unwrap_or(config.paths.results_file),
                ArchiveSource::Summary => summary.unwrap_or(config.paths.summary_file),
            };
            let history_dir = history_dir.unwrap_or(config.paths.history_dir);

            let identity = match (config.archive.committer_name, config.archive.committer_email) {
                (Some(name), Some(email)) => Some(Identity { name, email }),
                _ => None,
            };

            let archiver = HistoryArchiver::new(
                GitCli::new(&root),
                source,
                root.join(source_path),
                root.join(history_dir),
            )
            .with_identity(identity)
            .with_push(config.archive.push && !no_push);

            match archiver.run().context("archiving results failed")? {
                ArchiveOutcome::NoSource { .. } => tracing::info!("Exiting gracefully."),
                ArchiveOutcome::Unchanged { .. } => {
                    tracing::info!("Results history already up to date.")
                }
                ArchiveOutcome::Committed { pushed, .. } => {
                    tracing::info!(pushed, "Archive run complete")
                }
            }
        }
    }

    Ok(())
}
