//! Common test utilities and fixtures
#![allow(dead_code)]

use gmail_address_export::client::DirectoryClient;
use gmail_address_export::config::{ExtractionConfig, QuotaConfig};
use gmail_address_export::error::Result;
use gmail_address_export::models::{HeaderField, MessageRef, SearchPage};
use gmail_address_export::progress::ProgressEvent;
use mockall::mock;
use tokio::sync::mpsc::UnboundedReceiver;

// Mock implementation of DirectoryClient for testing
mock! {
    pub DirectoryClient {}

    #[async_trait::async_trait]
    impl DirectoryClient for DirectoryClient {
        async fn search(&self, query: &str, page_token: Option<String>) -> Result<SearchPage>;
        async fn fetch_headers(&self, message: &MessageRef, fields: &[String]) -> Result<Vec<HeaderField>>;
    }
}

/// Message ids `{prefix}{start}..{prefix}{end}` (end exclusive)
pub fn message_ids(prefix: &str, start: usize, end: usize) -> Vec<String> {
    (start..end).map(|n| format!("{}{}", prefix, n)).collect()
}

/// A search page over the given ids
pub fn search_page(ids: &[String], next_page_token: Option<&str>) -> SearchPage {
    SearchPage {
        refs: ids.iter().map(|id| MessageRef::new(id.clone())).collect(),
        next_page_token: next_page_token.map(str::to_string),
    }
}

/// Headers of a message sent from `from` to the test account
pub fn message_headers(from: &str) -> Vec<HeaderField> {
    vec![
        HeaderField::new("From", from),
        HeaderField::new("To", "Me <me@example.com>"),
    ]
}

/// Unique sender address derived from a message id
pub fn sender_for(message: &MessageRef) -> String {
    format!("Sender {} <{}@example.com>", message, message)
}

/// Extraction settings without sub-batch pauses
pub fn fast_extraction() -> ExtractionConfig {
    ExtractionConfig {
        sub_batch_pause_ms: 0,
        ..Default::default()
    }
}

/// Quota settings with a small ceiling
pub fn tight_quota(ceiling_units: u32) -> QuotaConfig {
    QuotaConfig {
        ceiling_units,
        window_secs: 60,
        safety_margin_ms: 1000,
        list_cost: 5,
        get_cost: 5,
    }
}

/// Drain every event once all senders are gone
pub async fn collect_events(mut rx: UnboundedReceiver<ProgressEvent>) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_ids() {
        assert_eq!(message_ids("m", 0, 3), vec!["m0", "m1", "m2"]);
    }

    #[test]
    fn test_search_page() {
        let page = search_page(&message_ids("m", 0, 2), Some("next"));
        assert_eq!(page.refs.len(), 2);
        assert_eq!(page.next_page_token.as_deref(), Some("next"));
    }
}
