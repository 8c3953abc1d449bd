//! Progress events emitted by the extraction engine
//!
//! Events travel over an unbounded Tokio channel so the engine never holds a
//! reference to anything that renders them.

use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Observable milestones of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    RunStarted {
        windows: usize,
    },
    WindowStarted {
        label: String,
        index: usize,
        total: usize,
    },
    PageFetched {
        label: String,
        page: usize,
        messages: usize,
    },
    WindowCompleted {
        label: String,
        messages: usize,
        new_addresses: usize,
        total_addresses: usize,
    },
    RateLimitWait {
        duration: Duration,
    },
    QuotaRetry {
        retry_after: u64,
    },
    MessageSkipped {
        message_id: String,
        reason: String,
    },
    RunCompleted {
        addresses: usize,
        messages: usize,
    },
    RunFailed {
        error: String,
        addresses: usize,
    },
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressEvent::RunStarted { windows } => {
                write!(f, "Starting extraction over {} query windows", windows)
            }
            ProgressEvent::WindowStarted { label, index, total } => {
                write!(f, "Processing {} ({}/{})", label, index + 1, total)
            }
            ProgressEvent::PageFetched {
                label,
                page,
                messages,
            } => write!(f, "{}: page {} with {} messages", label, page, messages),
            ProgressEvent::WindowCompleted {
                label,
                messages,
                new_addresses,
                total_addresses,
            } => write!(
                f,
                "{}: {} messages, {} new addresses ({} total)",
                label, messages, new_addresses, total_addresses
            ),
            ProgressEvent::RateLimitWait { duration } => write!(
                f,
                "Approaching quota limit, waiting {:.1} seconds",
                duration.as_secs_f64()
            ),
            ProgressEvent::QuotaRetry { retry_after } => write!(
                f,
                "Service reported quota exhaustion, retrying after at least {} seconds",
                retry_after
            ),
            ProgressEvent::MessageSkipped { message_id, reason } => {
                write!(f, "Skipped message {}: {}", message_id, reason)
            }
            ProgressEvent::RunCompleted {
                addresses,
                messages,
            } => write!(
                f,
                "Done: {} unique addresses from {} messages",
                addresses, messages
            ),
            ProgressEvent::RunFailed { error, addresses } => write!(
                f,
                "Extraction failed after collecting {} addresses: {}",
                addresses, error
            ),
        }
    }
}

/// Sending half handed to the engine; a disabled sink drops every event
#[derive(Debug, Clone, Default)]
pub struct ProgressSink {
    tx: Option<UnboundedSender<ProgressEvent>>,
}

impl ProgressSink {
    /// Create a connected sink and the receiver the caller drains
    pub fn channel() -> (Self, UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Deliver an event; a receiver that has gone away is not an error
    pub fn emit(&self, event: ProgressEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_delivers_in_order() {
        let (sink, mut rx) = ProgressSink::channel();
        sink.emit(ProgressEvent::RunStarted { windows: 3 });
        sink.emit(ProgressEvent::RateLimitWait {
            duration: Duration::from_secs(41),
        });
        drop(sink);

        assert_eq!(rx.recv().await, Some(ProgressEvent::RunStarted { windows: 3 }));
        assert_eq!(
            rx.recv().await,
            Some(ProgressEvent::RateLimitWait {
                duration: Duration::from_secs(41)
            })
        );
        assert_eq!(rx.recv().await, None);
    }

    #[test]
    fn test_emit_after_receiver_dropped() {
        let (sink, rx) = ProgressSink::channel();
        drop(rx);
        sink.emit(ProgressEvent::RunStarted { windows: 1 });
    }

    #[test]
    fn test_disabled_sink() {
        ProgressSink::disabled().emit(ProgressEvent::RunStarted { windows: 1 });
    }

    #[test]
    fn test_display() {
        let event = ProgressEvent::WindowStarted {
            label: "2019".to_string(),
            index: 0,
            total: 20,
        };
        assert_eq!(event.to_string(), "Processing 2019 (1/20)");

        let event = ProgressEvent::RateLimitWait {
            duration: Duration::from_millis(41_500),
        };
        assert_eq!(event.to_string(), "Approaching quota limit, waiting 41.5 seconds");

        let event = ProgressEvent::WindowCompleted {
            label: "2020".to_string(),
            messages: 103,
            new_addresses: 12,
            total_addresses: 40,
        };
        assert!(event.to_string().contains("103 messages"));
    }
}
