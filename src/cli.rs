//! Command-line interface

use clap::{Parser, Subcommand};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::auth;
use crate::client::GmailDirectoryClient;
use crate::config::Config;
use crate::engine::{CancellationFlag, ExtractionEngine, ExtractionReport};
use crate::error::{ExportError, Result};
use crate::export;
use crate::models::QueryWindow;
use crate::progress::{ProgressEvent, ProgressSink};

#[derive(Parser, Debug)]
#[command(name = "gmail-address-export")]
#[command(version = "0.1.0")]
#[command(about = "Export every correspondent address in a Gmail mailbox to CSV", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Path to OAuth2 credentials file
    #[arg(long, default_value = "credentials.json")]
    pub credentials: PathBuf,

    /// Path to token cache file
    #[arg(long, default_value = ".gmail-address-export/token.json")]
    pub token_cache: PathBuf,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Authenticate with Gmail API
    Auth {
        /// Force re-authentication even if token exists
        #[arg(long)]
        force: bool,
    },

    /// Collect addresses from every message and write them to CSV
    Export {
        /// CSV file to write (overrides output.path)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// First calendar year to search (overrides extraction.start_year)
        #[arg(long)]
        start_year: Option<i32>,

        /// Last calendar year to search, inclusive (overrides extraction.end_year)
        #[arg(long)]
        end_year: Option<i32>,
    },

    /// Generate example configuration file
    InitConfig {
        /// Path to create config file
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}

/// Progress reporter using indicatif
pub struct ProgressReporter {
    multi: MultiProgress,
    spinner_style: ProgressStyle,
}

impl ProgressReporter {
    /// `multi` must be the same instance the log writer prints through
    pub fn new(multi: MultiProgress) -> Self {
        let spinner_style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed:>6}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ");

        Self {
            multi,
            spinner_style,
        }
    }

    pub fn add_spinner(&self, msg: &str) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(self.spinner_style.clone());
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    /// Finish a spinner and clear it from the multi-progress display
    pub fn finish_spinner(&self, pb: &ProgressBar, msg: &str) {
        pb.finish_and_clear();
        let _ = self.multi.println(format!("  ✓ {}", msg));
    }

    /// Render engine events until the engine drops its sink
    pub fn render(&self, mut events: UnboundedReceiver<ProgressEvent>) -> JoinHandle<()> {
        let spinner = self.add_spinner("Starting extraction...");
        let multi = self.multi.clone();

        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match &event {
                    ProgressEvent::WindowCompleted { .. } => {
                        let _ = multi.println(format!("  ✓ {}", event));
                    }
                    ProgressEvent::RunFailed { .. } => {
                        let _ = multi.println(format!("  ✗ {}", event));
                    }
                    _ => spinner.set_message(event.to_string()),
                }
            }
            spinner.finish_and_clear();
        })
    }
}

/// What a successful export produced
#[derive(Debug)]
pub struct ExportOutcome {
    pub report: ExtractionReport,
    pub path: PathBuf,
    pub rows: usize,
}

/// Authenticate (optionally discarding the cached token) and return the account address
pub async fn run_auth(cli: &Cli, force: bool) -> Result<String> {
    if let Some(parent) = cli.token_cache.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    if force {
        auth::clear_token_cache(&cli.token_cache).await?;
    }

    let hub = auth::authenticate(&cli.credentials, &cli.token_cache).await?;
    auth::account_address(&hub).await
}

/// Load configuration, run the extraction over every yearly window and write the CSV
///
/// On failure the partial result is written next to the output file (when
/// configured) before the error is returned.
pub async fn run_export(
    cli: &Cli,
    output: Option<PathBuf>,
    start_year: Option<i32>,
    end_year: Option<i32>,
    multi: MultiProgress,
) -> Result<ExportOutcome> {
    let reporter = ProgressReporter::new(multi);

    let config_spinner = reporter.add_spinner("Loading configuration...");
    let mut config = Config::load(&cli.config).await?;
    if let Some(path) = output {
        config.output.path = path;
    }
    if let Some(year) = start_year {
        config.extraction.start_year = year;
    }
    if end_year.is_some() {
        config.extraction.end_year = end_year;
    }
    config.validate()?;
    reporter.finish_spinner(&config_spinner, &format!("Configuration loaded from {:?}", cli.config));

    let auth_spinner = reporter.add_spinner("Authenticating with Gmail API...");
    if let Some(parent) = cli.token_cache.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let hub = auth::authenticate(&cli.credentials, &cli.token_cache).await?;
    reporter.finish_spinner(&auth_spinner, "Gmail API authenticated");

    let extraction = config.extraction.clone();
    let client = GmailDirectoryClient::new(
        hub,
        extraction.page_size,
        extraction.include_spam_trash,
        Duration::from_secs(extraction.request_timeout_secs),
    );
    let windows = QueryWindow::yearly(extraction.start_year, extraction.resolved_end_year());
    info!(
        "Searching {} yearly windows ({} through {})",
        windows.len(),
        extraction.start_year,
        extraction.resolved_end_year()
    );

    let cancel = CancellationFlag::new();
    let signal_flag = cancel.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping before the next API call");
            signal_flag.cancel();
        }
    });

    let (sink, events) = ProgressSink::channel();
    let render = reporter.render(events);

    let mut engine = ExtractionEngine::new(Box::new(client), &config.quota, extraction)
        .with_progress(sink)
        .with_cancellation(cancel);
    let run = tokio::spawn(async move { engine.run(&windows).await });

    let joined = run.await;
    ctrl_c.abort();
    // The engine has been dropped with its task, closing the event channel
    let _ = render.await;

    let outcome = joined.map_err(|e| {
        ExportError::OperationCancelled(format!("extraction task did not finish: {}", e))
    })?;

    match outcome {
        Ok(report) => {
            let path = config.output.path.clone();
            let rows = export::export_to_path(&report.addresses, &path, config.output.one_row_per_email)?;
            Ok(ExportOutcome { report, path, rows })
        }
        Err(failure) => {
            error!("{}", failure);
            if config.output.write_partial_on_failure && !failure.partial.is_empty() {
                let partial = export::partial_path(&config.output.path);
                let rows = export::export_to_path(
                    &failure.partial,
                    &partial,
                    config.output.one_row_per_email,
                )?;
                warn!("Wrote {} partial rows to {}", rows, partial.display());
            }
            Err(failure.error)
        }
    }
}

/// Human-readable summary printed after a successful export
pub fn summarize(outcome: &ExportOutcome) -> String {
    let report = &outcome.report;
    let mut text = format!(
        "Exported {} rows to {}\n",
        outcome.rows,
        outcome.path.display()
    );
    text.push_str(&format!(
        "  {} distinct name/email pairs, {} distinct emails\n",
        report.addresses.len(),
        report.addresses.distinct_emails()
    ));
    text.push_str(&format!(
        "  {} messages in {} pages ({} skipped)\n",
        report.messages_fetched, report.pages_fetched, report.messages_skipped
    ));
    text.push_str(&format!(
        "  {} quota units used, {} rate-limit waits ({:.0}s)\n",
        report.quota.total_consumed,
        report.quota.waits,
        report.quota.total_waited.as_secs_f64()
    ));
    text.push_str(&format!(
        "  run {} took {}s",
        report.run_id,
        report.duration().num_seconds()
    ));
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulator::AddressAccumulator;
    use crate::rate_limiter::QuotaStats;
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn test_parse_export_command() {
        let cli = Cli::try_parse_from([
            "gmail-address-export",
            "--verbose",
            "export",
            "--output",
            "out.csv",
            "--start-year",
            "2010",
        ])
        .unwrap();

        assert!(cli.verbose);
        assert_eq!(cli.config, PathBuf::from("config.toml"));
        match cli.command {
            Commands::Export {
                output,
                start_year,
                end_year,
            } => {
                assert_eq!(output, Some(PathBuf::from("out.csv")));
                assert_eq!(start_year, Some(2010));
                assert_eq!(end_year, None);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_auth_and_init_config() {
        let cli = Cli::try_parse_from(["gmail-address-export", "auth", "--force"]).unwrap();
        assert!(matches!(cli.command, Commands::Auth { force: true }));

        let cli = Cli::try_parse_from(["gmail-address-export", "init-config"]).unwrap();
        match cli.command {
            Commands::InitConfig { output, force } => {
                assert_eq!(output, PathBuf::from("config.toml"));
                assert!(!force);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_missing_subcommand_is_rejected() {
        assert!(Cli::try_parse_from(["gmail-address-export"]).is_err());
    }

    #[test]
    fn test_summarize() {
        let mut addresses = AddressAccumulator::new();
        addresses.insert_pair("Bob", "bob@y.com");
        addresses.insert_pair("Robert", "bob@y.com");

        let now = Utc::now();
        let outcome = ExportOutcome {
            report: ExtractionReport {
                run_id: Uuid::new_v4(),
                started_at: now,
                finished_at: now,
                addresses,
                windows: Vec::new(),
                pages_fetched: 2,
                messages_fetched: 103,
                messages_skipped: 1,
                quota: QuotaStats {
                    total_consumed: 525,
                    ..Default::default()
                },
            },
            path: PathBuf::from("emails.csv"),
            rows: 1,
        };

        let text = summarize(&outcome);
        assert!(text.starts_with("Exported 1 rows to emails.csv"));
        assert!(text.contains("2 distinct name/email pairs, 1 distinct emails"));
        assert!(text.contains("103 messages in 2 pages (1 skipped)"));
        assert!(text.contains("525 quota units"));
    }
}
