//! Display-name/email extraction from addressing headers (RFC 5322 §3.4)
//!
//! A header value is first split into its entries on top-level commas. Group
//! labels and terminators (`Team: ... ;`) act as separators, and empty entries
//! are dropped. Each entry is then parsed with `mailparse`, so quoted display
//! names, bare addresses and MIME encoded-words are understood. An entry that
//! fails to parse is dropped without affecting its neighbours.

use mailparse::{MailAddr, MailAddrList};
use tracing::debug;

use crate::error::{ExportError, Result};
use crate::models::HeaderField;

/// Headers that carry addresses worth exporting
pub const ADDRESS_HEADERS: [&str; 4] = ["From", "To", "Cc", "Bcc"];

/// A (display name, email) pair as written in the header, before normalization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAddress {
    pub name: String,
    pub email: String,
}

impl ParsedAddress {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

/// Header names are case-insensitive
pub fn is_address_header(name: &str) -> bool {
    ADDRESS_HEADERS
        .iter()
        .any(|header| header.eq_ignore_ascii_case(name.trim()))
}

/// Collect every address from the From/To/Cc/Bcc headers of one message
pub fn extract_addresses(headers: &[HeaderField]) -> Vec<ParsedAddress> {
    headers
        .iter()
        .filter(|header| is_address_header(&header.name))
        .flat_map(|header| parse_address_list(&header.name, &header.value))
        .collect()
}

/// Parse one header value into its addresses, in order
pub fn parse_address_list(header_name: &str, value: &str) -> Vec<ParsedAddress> {
    split_entries(value)
        .into_iter()
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .flat_map(|entry| match parse_value(header_name, entry) {
            Ok(list) => flatten(list),
            Err(e) => {
                debug!("Skipping address fragment {:?}: {}", entry, e);
                Vec::new()
            }
        })
        .collect()
}

fn parse_value(header_name: &str, value: &str) -> Result<MailAddrList> {
    // Encoded-words only decode through the header path, which expects ASCII input
    let parsed = if value.is_ascii() && value.contains("=?") {
        let raw = format!("{}: {}", header_name, value);
        mailparse::parse_header(raw.as_bytes())
            .and_then(|(header, _)| mailparse::addrparse_header(&header))
    } else {
        mailparse::addrparse(value)
    };

    parsed.map_err(|e| ExportError::AddressParse(e.to_string()))
}

fn flatten(list: MailAddrList) -> Vec<ParsedAddress> {
    let mut out = Vec::new();
    for addr in list.iter() {
        match addr {
            MailAddr::Single(info) => push_valid(&mut out, info.display_name.as_deref(), &info.addr),
            MailAddr::Group(group) => {
                for info in &group.addrs {
                    push_valid(&mut out, info.display_name.as_deref(), &info.addr);
                }
            }
        }
    }
    out
}

fn push_valid(out: &mut Vec<ParsedAddress>, name: Option<&str>, email: &str) {
    let email = email.trim();
    if !is_mailbox(email) {
        debug!("Skipping address without a mailbox: {:?}", email);
        return;
    }
    out.push(ParsedAddress::new(name.unwrap_or_default(), email));
}

/// `local@domain` with exactly one `@`, both sides non-empty, no commas or whitespace
fn is_mailbox(email: &str) -> bool {
    if email.chars().any(|c| c == ',' || c.is_whitespace()) {
        return false;
    }
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty() && !domain.contains('@'),
        None => false,
    }
}

/// Split a header value into its address entries
///
/// Commas outside quotes and angle brackets separate entries. A group label
/// (`Team:`) is discarded and the group terminator `;` ends an entry, so
/// `Team: a@b.com, c@d.com;, e@f.com` yields the three addresses.
fn split_entries(raw: &str) -> Vec<&str> {
    let mut entries = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    let mut in_angle = false;
    let mut escaped = false;

    for (i, ch) in raw.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            '<' if !in_quotes => in_angle = true,
            '>' if !in_quotes => in_angle = false,
            ':' if !in_quotes && !in_angle => start = i + 1,
            ',' | ';' if !in_quotes && !in_angle => {
                entries.push(&raw[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    entries.push(&raw[start..]);
    entries
}
