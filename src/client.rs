//! Message directory access: paginated search and header-only metadata fetch

use async_trait::async_trait;
use google_gmail1::api::Message;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::auth::{GmailHub, READONLY_SCOPE};
use crate::error::{ExportError, Result};
use crate::models::{HeaderField, MessageRef, SearchPage};

/// Remote mailbox operations the extraction engine depends on
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// One page of message references matching `query`
    ///
    /// `page_token` is the continuation token from the previous page, `None`
    /// for the first page.
    async fn search(&self, query: &str, page_token: Option<String>) -> Result<SearchPage>;

    /// Only the named headers of one message
    async fn fetch_headers(&self, message: &MessageRef, fields: &[String]) -> Result<Vec<HeaderField>>;
}

#[async_trait]
impl<T: DirectoryClient + ?Sized> DirectoryClient for Arc<T> {
    async fn search(&self, query: &str, page_token: Option<String>) -> Result<SearchPage> {
        (**self).search(query, page_token).await
    }

    async fn fetch_headers(&self, message: &MessageRef, fields: &[String]) -> Result<Vec<HeaderField>> {
        (**self).fetch_headers(message, fields).await
    }
}

/// Production client over the Gmail v1 API
///
/// Quota is not handled here; the engine charges its governor before each
/// call. Every call is bounded by a request timeout.
pub struct GmailDirectoryClient {
    hub: GmailHub,
    page_size: u32,
    include_spam_trash: bool,
    request_timeout: Duration,
}

impl GmailDirectoryClient {
    /// # Arguments
    /// * `hub` - authenticated Gmail hub
    /// * `page_size` - `maxResults` for each search page (1..=500)
    /// * `include_spam_trash` - search spam and trash as well
    /// * `request_timeout` - upper bound on a single API call
    pub fn new(hub: GmailHub, page_size: u32, include_spam_trash: bool, request_timeout: Duration) -> Self {
        Self {
            hub,
            page_size,
            include_spam_trash,
            request_timeout,
        }
    }

    async fn with_timeout<T, Fut>(&self, operation_name: &str, call: Fut) -> Result<T>
    where
        Fut: Future<Output = std::result::Result<T, google_gmail1::Error>>,
    {
        match tokio::time::timeout(self.request_timeout, call).await {
            Ok(result) => result.map_err(ExportError::from),
            Err(_) => {
                warn!("{} timed out after {:?}", operation_name, self.request_timeout);
                Err(ExportError::TransportError(format!(
                    "{} timed out after {:?}",
                    operation_name, self.request_timeout
                )))
            }
        }
    }
}

#[async_trait]
impl DirectoryClient for GmailDirectoryClient {
    async fn search(&self, query: &str, page_token: Option<String>) -> Result<SearchPage> {
        let mut call = self
            .hub
            .users()
            .messages_list("me")
            .q(query)
            .max_results(self.page_size)
            .include_spam_trash(self.include_spam_trash);

        if let Some(token) = page_token {
            call = call.page_token(&token);
        }

        let (_, response) = self
            .with_timeout("messages.list", call.add_scope(READONLY_SCOPE).doit())
            .await?;

        let refs: Vec<MessageRef> = response
            .messages
            .unwrap_or_default()
            .into_iter()
            .filter_map(|m| m.id.map(MessageRef::new))
            .collect();

        debug!(
            "Search page for {:?}: {} refs, more: {}",
            query,
            refs.len(),
            response.next_page_token.is_some()
        );

        Ok(SearchPage {
            refs,
            next_page_token: response.next_page_token.filter(|t| !t.is_empty()),
        })
    }

    async fn fetch_headers(&self, message: &MessageRef, fields: &[String]) -> Result<Vec<HeaderField>> {
        let mut call = self
            .hub
            .users()
            .messages_get("me", message.as_str())
            .format("metadata");

        for field in fields {
            call = call.add_metadata_headers(field);
        }

        let result = self
            .with_timeout("messages.get", call.add_scope(READONLY_SCOPE).doit())
            .await;

        match result {
            Ok((_, msg)) => Ok(headers_of(msg)),
            Err(ExportError::MessageNotFound(_)) => {
                Err(ExportError::MessageNotFound(message.to_string()))
            }
            Err(e) => Err(e),
        }
    }
}

/// Header name/value pairs of a metadata response; a message without headers has none
fn headers_of(msg: Message) -> Vec<HeaderField> {
    msg.payload
        .and_then(|p| p.headers)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|header| match (header.name, header.value) {
            (Some(name), Some(value)) => Some(HeaderField { name, value }),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use google_gmail1::api::{MessagePart, MessagePartHeader};

    fn header(name: Option<&str>, value: Option<&str>) -> MessagePartHeader {
        MessagePartHeader {
            name: name.map(str::to_string),
            value: value.map(str::to_string),
        }
    }

    #[test]
    fn test_headers_of_metadata_message() {
        let msg = Message {
            id: Some("abc".to_string()),
            payload: Some(MessagePart {
                headers: Some(vec![
                    header(Some("From"), Some("Alice <alice@a.com>")),
                    header(Some("To"), Some("bob@b.com")),
                    header(None, Some("orphan value")),
                    header(Some("Cc"), None),
                ]),
                ..Default::default()
            }),
            ..Default::default()
        };

        assert_eq!(
            headers_of(msg),
            vec![
                HeaderField::new("From", "Alice <alice@a.com>"),
                HeaderField::new("To", "bob@b.com"),
            ]
        );
    }

    #[test]
    fn test_headers_of_message_without_payload() {
        let msg = Message {
            id: Some("abc".to_string()),
            ..Default::default()
        };
        assert!(headers_of(msg).is_empty());
    }
}
