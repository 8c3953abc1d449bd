//! Gmail Address Exporter
//!
//! Collects every (display name, email) pair that appears in the From, To,
//! Cc and Bcc headers of a mailbox and writes the deduplicated set to CSV.
//!
//! # Overview
//!
//! - **Authentication**: OAuth2 installed-app flow with token caching, read-only scope
//! - **Directory access**: paginated search and header-only metadata fetch
//! - **Quota governor**: fixed-window budget that sleeps instead of tripping Gmail's per-minute limit
//! - **Extraction engine**: walks yearly query windows and merges addresses into one set
//! - **Export**: sorted `Name,Email` CSV
//!
//! # Example Usage
//!
//! ```no_run
//! use gmail_address_export::{auth, config::Config, export, models::QueryWindow};
//! use gmail_address_export::client::GmailDirectoryClient;
//! use gmail_address_export::engine::ExtractionEngine;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml".as_ref()).await?;
//!
//!     let hub = auth::authenticate(
//!         "credentials.json".as_ref(),
//!         ".gmail-address-export/token.json".as_ref(),
//!     ).await?;
//!
//!     let client = GmailDirectoryClient::new(hub, 100, false, Duration::from_secs(30));
//!     let mut engine = ExtractionEngine::new(
//!         Box::new(client),
//!         &config.quota,
//!         config.extraction.clone(),
//!     );
//!
//!     let report = engine.run(&QueryWindow::yearly(2020, 2024)).await?;
//!     export::export_to_path(&report.addresses, "emails.csv".as_ref(), true)?;
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`accumulator`] - Normalized address records and the run-wide set
//! - [`auth`] - OAuth2 authentication and Gmail API initialization
//! - [`cli`] - Command-line interface and export orchestration
//! - [`client`] - Directory client trait and its Gmail implementation
//! - [`config`] - Configuration management
//! - [`engine`] - Quota-aware extraction engine
//! - [`error`] - Error types and result aliases
//! - [`export`] - CSV output
//! - [`extract`] - Address-list parsing of message headers
//! - [`models`] - Core data structures
//! - [`progress`] - Progress events
//! - [`rate_limiter`] - Quota governor
//! - [`search`] - Paginated search walker

pub mod accumulator;
pub mod auth;
pub mod cli;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod export;
pub mod extract;
pub mod models;
pub mod progress;
pub mod rate_limiter;
pub mod search;

// Re-export commonly used types for convenience
pub use error::{ExportError, Result};

pub use accumulator::{AddressAccumulator, AddressRecord};
pub use client::{DirectoryClient, GmailDirectoryClient};
pub use config::Config;
pub use engine::{
    CancellationFlag, EngineState, ExtractionEngine, ExtractionFailure, ExtractionReport,
    RunPosition,
};
pub use models::{HeaderField, MessageRef, QueryWindow, SearchPage};
pub use progress::{ProgressEvent, ProgressSink};
pub use rate_limiter::{QuotaCost, QuotaGovernor, QuotaStats};
