//! Quota-aware extraction engine
//!
//! Drives the directory client through a sequence of query windows: every
//! search page is walked, every message on it is fetched header-only, and the
//! addresses found are merged into one run-scoped accumulator. All remote
//! calls are sequential and charged to a single [`QuotaGovernor`].

use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::accumulator::{AddressAccumulator, AddressRecord};
use crate::client::DirectoryClient;
use crate::config::{ExtractionConfig, QuotaConfig};
use crate::error::{ExportError, Result};
use crate::extract::{extract_addresses, ADDRESS_HEADERS};
use crate::models::{MessageRef, QueryWindow};
use crate::progress::{ProgressEvent, ProgressSink};
use crate::rate_limiter::{QuotaCost, QuotaGovernor, QuotaStats};
use crate::search::{observe_quota, SearchWalker};

/// Shared flag checked before every remote call
///
/// Clones observe the same flag, so a signal handler can hold one clone while
/// the engine holds another.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Window and page the engine was working on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunPosition {
    pub window_index: usize,
    /// Zero-based index of the search page within the window
    pub page_index: usize,
}

/// Lifecycle of one engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Running(RunPosition),
    Completed,
    Failed(String),
}

/// Per-window outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowSummary {
    pub label: String,
    pub pages: usize,
    pub messages: usize,
    pub new_addresses: usize,
}

/// Result of a completed run
#[derive(Debug, Clone)]
pub struct ExtractionReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub addresses: AddressAccumulator,
    pub windows: Vec<WindowSummary>,
    pub pages_fetched: usize,
    pub messages_fetched: usize,
    pub messages_skipped: usize,
    pub quota: QuotaStats,
}

impl ExtractionReport {
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// A run that stopped on an unrecovered error
///
/// Everything extracted before the error is kept in `partial`.
#[derive(Debug, Error)]
#[error("extraction stopped in window {window_label} (page {page}): {error}", page = .position.page_index + 1)]
pub struct ExtractionFailure {
    #[source]
    pub error: ExportError,
    pub partial: AddressAccumulator,
    pub position: RunPosition,
    pub window_label: String,
}

/// Counters accumulated while a run is in progress
#[derive(Debug, Default)]
struct RunTally {
    addresses: AddressAccumulator,
    windows: Vec<WindowSummary>,
    pages_fetched: usize,
    messages_fetched: usize,
    messages_skipped: usize,
}

pub struct ExtractionEngine {
    client: Box<dyn DirectoryClient>,
    governor: QuotaGovernor,
    settings: ExtractionConfig,
    progress: ProgressSink,
    cancel: CancellationFlag,
    state: EngineState,
}

impl ExtractionEngine {
    pub fn new(client: Box<dyn DirectoryClient>, quota: &QuotaConfig, settings: ExtractionConfig) -> Self {
        Self {
            client,
            governor: QuotaGovernor::new(quota),
            settings,
            progress: ProgressSink::disabled(),
            cancel: CancellationFlag::new(),
            state: EngineState::Idle,
        }
    }

    /// Send progress events to `sink`, including governor waits
    pub fn with_progress(mut self, sink: ProgressSink) -> Self {
        let waits = sink.clone();
        self.governor = self.governor.with_wait_observer(Arc::new(move |duration| {
            waits.emit(ProgressEvent::RateLimitWait { duration });
        }));
        self.progress = sink;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    /// Run every window in order and return the collected addresses
    ///
    /// Windows share one accumulator and one quota budget. The first
    /// unrecovered error stops the run; the failure carries what was collected
    /// up to that point.
    pub async fn run(
        &mut self,
        windows: &[QueryWindow],
    ) -> std::result::Result<ExtractionReport, ExtractionFailure> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!("Starting extraction run {} over {} windows", run_id, windows.len());
        self.progress.emit(ProgressEvent::RunStarted {
            windows: windows.len(),
        });

        let mut tally = RunTally::default();

        for (window_index, window) in windows.iter().enumerate() {
            self.state = EngineState::Running(RunPosition {
                window_index,
                page_index: 0,
            });
            self.progress.emit(ProgressEvent::WindowStarted {
                label: window.label.clone(),
                index: window_index,
                total: windows.len(),
            });

            if let Err(error) = self.run_window(window_index, window, &mut tally).await {
                let position = match self.state {
                    EngineState::Running(position) => position,
                    _ => RunPosition {
                        window_index,
                        page_index: 0,
                    },
                };
                error!("Extraction failed in window {}: {}", window.label, error);
                self.state = EngineState::Failed(error.to_string());
                self.progress.emit(ProgressEvent::RunFailed {
                    error: error.to_string(),
                    addresses: tally.addresses.len(),
                });
                return Err(ExtractionFailure {
                    error,
                    partial: tally.addresses,
                    position,
                    window_label: window.label.clone(),
                });
            }
        }

        self.state = EngineState::Completed;
        let quota = self.governor.stats().await;
        info!(
            "Extraction run {} complete: {} unique addresses from {} messages ({} skipped), {} quota units, {} waits",
            run_id,
            tally.addresses.len(),
            tally.messages_fetched,
            tally.messages_skipped,
            quota.total_consumed,
            quota.waits
        );
        self.progress.emit(ProgressEvent::RunCompleted {
            addresses: tally.addresses.len(),
            messages: tally.messages_fetched,
        });

        Ok(ExtractionReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            addresses: tally.addresses,
            windows: tally.windows,
            pages_fetched: tally.pages_fetched,
            messages_fetched: tally.messages_fetched,
            messages_skipped: tally.messages_skipped,
            quota,
        })
    }

    async fn run_window(
        &mut self,
        window_index: usize,
        window: &QueryWindow,
        tally: &mut RunTally,
    ) -> Result<()> {
        info!("Processing {} ({})", window.label, window.query);
        let before = tally.addresses.len();
        let mut summary = WindowSummary {
            label: window.label.clone(),
            pages: 0,
            messages: 0,
            new_addresses: 0,
        };

        let sub_batch_size = self.settings.sub_batch_size.max(1);
        let sub_batch_pause = Duration::from_millis(self.settings.sub_batch_pause_ms);
        let fields: Vec<String> = ADDRESS_HEADERS.iter().map(|h| h.to_string()).collect();

        let walker = SearchWalker::new(
            self.client.as_ref(),
            &self.governor,
            &self.cancel,
            &self.progress,
        );
        let mut pages = walker.pages(&window.query);

        loop {
            // Position names the page being requested, so a failed search reports it
            self.state = EngineState::Running(RunPosition {
                window_index,
                page_index: summary.pages,
            });
            let page = match pages.next().await {
                Some(page) => page?,
                None => break,
            };
            summary.pages += 1;
            tally.pages_fetched += 1;
            summary.messages += page.refs.len();

            self.progress.emit(ProgressEvent::PageFetched {
                label: window.label.clone(),
                page: summary.pages,
                messages: page.refs.len(),
            });

            let mut batches = page.refs.chunks(sub_batch_size).peekable();
            while let Some(batch) = batches.next() {
                for message in batch {
                    if self.cancel.is_cancelled() {
                        return Err(ExportError::OperationCancelled(format!(
                            "stopped before message {}",
                            message
                        )));
                    }

                    let result = self
                        .governor
                        .call_with_quota_retry(QuotaCost::Get, || {
                            observe_quota(
                                &self.progress,
                                self.client.fetch_headers(message, &fields),
                            )
                        })
                        .await;

                    match result {
                        Ok(headers) => {
                            tally.messages_fetched += 1;
                            let found = extract_addresses(&headers);
                            debug!("Message {}: {} addresses", message, found.len());
                            tally.addresses.extend(
                                found
                                    .iter()
                                    .filter_map(|a| AddressRecord::new(&a.name, &a.email)),
                            );
                        }
                        Err(ExportError::MessageNotFound(_)) => {
                            skip_message(&self.progress, message, "no longer exists");
                            tally.messages_skipped += 1;
                        }
                        Err(e) => return Err(e),
                    }
                }

                if batches.peek().is_some() && !sub_batch_pause.is_zero() {
                    tokio::time::sleep(sub_batch_pause).await;
                }
            }
        }

        summary.new_addresses = tally.addresses.len() - before;
        info!(
            "{}: {} messages, {} new addresses",
            window.label, summary.messages, summary.new_addresses
        );
        self.progress.emit(ProgressEvent::WindowCompleted {
            label: window.label.clone(),
            messages: summary.messages,
            new_addresses: summary.new_addresses,
            total_addresses: tally.addresses.len(),
        });
        tally.windows.push(summary);
        Ok(())
    }
}

fn skip_message(progress: &ProgressSink, message: &MessageRef, reason: &str) {
    warn!("Skipping message {}: {}", message, reason);
    progress.emit(ProgressEvent::MessageSkipped {
        message_id: message.to_string(),
        reason: reason.to_string(),
    });
}
