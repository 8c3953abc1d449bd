//! Paginated search over one query window

use async_stream::stream;
use futures::stream::Stream;
use std::pin::Pin;
use tracing::debug;

use crate::client::DirectoryClient;
use crate::engine::CancellationFlag;
use crate::error::{ExportError, Result};
use crate::models::SearchPage;
use crate::progress::{ProgressEvent, ProgressSink};
use crate::rate_limiter::{QuotaCost, QuotaGovernor};

/// Boxed stream of search pages
pub type PageStream<'a> = Pin<Box<dyn Stream<Item = Result<SearchPage>> + Send + 'a>>;

/// Walks every page of a search, charging the governor before each call
pub struct SearchWalker<'a> {
    client: &'a dyn DirectoryClient,
    governor: &'a QuotaGovernor,
    cancel: &'a CancellationFlag,
    progress: &'a ProgressSink,
}

impl<'a> SearchWalker<'a> {
    pub fn new(
        client: &'a dyn DirectoryClient,
        governor: &'a QuotaGovernor,
        cancel: &'a CancellationFlag,
        progress: &'a ProgressSink,
    ) -> Self {
        Self {
            client,
            governor,
            cancel,
            progress,
        }
    }

    /// Lazily yield one page per search call until a page has no continuation token
    ///
    /// The stream ends after the first error it yields. Nothing is requested
    /// until the stream is polled.
    pub fn pages(&self, query: &'a str) -> PageStream<'a> {
        let client = self.client;
        let governor = self.governor;
        let cancel = self.cancel;
        let progress = self.progress;

        Box::pin(stream! {
            let mut page_token: Option<String> = None;
            let mut page_number = 0usize;

            loop {
                if cancel.is_cancelled() {
                    yield Err(ExportError::OperationCancelled(format!(
                        "search for {:?} interrupted",
                        query
                    )));
                    break;
                }

                let token = page_token.clone();
                let result = governor
                    .call_with_quota_retry(QuotaCost::List, || {
                        observe_quota(progress, client.search(query, token.clone()))
                    })
                    .await;

                match result {
                    Ok(page) => {
                        page_number += 1;
                        debug!("Search page {} returned {} refs", page_number, page.refs.len());
                        page_token = page.next_page_token.clone();
                        let last = page_token.is_none();
                        yield Ok(page);
                        if last {
                            break;
                        }
                    }
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                }
            }
        })
    }
}

/// Report a service-side quota rejection before handing the result back
pub(crate) async fn observe_quota<T, Fut>(progress: &ProgressSink, call: Fut) -> Result<T>
where
    Fut: std::future::Future<Output = Result<T>>,
{
    let result = call.await;
    if let Err(ExportError::QuotaExceeded { retry_after }) = &result {
        progress.emit(ProgressEvent::QuotaRetry {
            retry_after: *retry_after,
        });
    }
    result
}
