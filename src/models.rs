//! Plain data types shared by the client and the engine

use serde::{Deserialize, Serialize};
use std::fmt;

/// Earliest year a query window may cover
pub const MIN_YEAR: i32 = 1970;
/// Latest year a query window may cover
pub const MAX_YEAR: i32 = 9999;

/// Opaque identifier of one remote message
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageRef(pub String);

impl MessageRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One page of search results
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPage {
    pub refs: Vec<MessageRef>,
    /// Continuation token; `None` on the last page
    pub next_page_token: Option<String>,
}

/// A single header returned by a metadata fetch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderField {
    pub name: String,
    pub value: String,
}

impl HeaderField {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A bounded search scope processed as one sequential pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryWindow {
    /// Human-readable label used in progress output
    pub label: String,
    /// Gmail search query
    pub query: String,
}

impl QueryWindow {
    pub fn new(label: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            query: query.into(),
        }
    }

    /// Window covering one calendar year
    pub fn for_year(year: i32) -> Self {
        Self {
            label: year.to_string(),
            query: format!("after:{}/01/01 before:{}/01/01", year, i64::from(year) + 1),
        }
    }

    /// One window per calendar year, `start` through `end` inclusive
    ///
    /// Years are clamped to `MIN_YEAR..=MAX_YEAR`.
    pub fn yearly(start: i32, end: i32) -> Vec<Self> {
        (start.max(MIN_YEAR)..=end.min(MAX_YEAR))
            .map(Self::for_year)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_window_for_year() {
        let window = QueryWindow::for_year(2019);
        assert_eq!(window.label, "2019");
        assert_eq!(window.query, "after:2019/01/01 before:2020/01/01");
    }

    #[test]
    fn test_query_window_yearly_is_inclusive_and_ordered() {
        let windows = QueryWindow::yearly(2005, 2008);
        let labels: Vec<&str> = windows.iter().map(|w| w.label.as_str()).collect();
        assert_eq!(labels, vec!["2005", "2006", "2007", "2008"]);
    }

    #[test]
    fn test_query_window_yearly_single_year() {
        assert_eq!(QueryWindow::yearly(2024, 2024).len(), 1);
        assert!(QueryWindow::yearly(2025, 2024).is_empty());
    }

    #[test]
    fn test_query_window_yearly_clamps_to_year_range() {
        let windows = QueryWindow::yearly(i32::MIN, 1971);
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].label, "1970");

        let windows = QueryWindow::yearly(9998, i32::MAX);
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[1].query, "after:9999/01/01 before:10000/01/01");
    }

    #[test]
    fn test_message_ref_display() {
        let id = MessageRef::new("18c1f2a3b4");
        assert_eq!(id.to_string(), "18c1f2a3b4");
        assert_eq!(id.as_str(), "18c1f2a3b4");
    }
}
