//! Run-scoped, deduplicated set of (display name, email) pairs

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// A normalized (display name, email) pair
///
/// The name is trimmed with its case preserved; the email is trimmed and
/// lower-cased. Equality and hashing cover the whole pair. Ordering is by
/// email first, then name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AddressRecord {
    email: String,
    name: String,
}

impl AddressRecord {
    /// Normalize a raw pair; `None` when the email is blank
    pub fn new(name: &str, email: &str) -> Option<Self> {
        let email = email.trim();
        if email.is_empty() {
            return None;
        }
        Some(Self {
            email: email.to_lowercase(),
            name: name.trim().to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn email(&self) -> &str {
        &self.email
    }
}

/// Set of [`AddressRecord`]s collected over a whole run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressAccumulator {
    records: HashSet<AddressRecord>,
}

impl AddressAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a normalized record, returning true if it was new
    pub fn insert(&mut self, record: AddressRecord) -> bool {
        self.records.insert(record)
    }

    /// Normalize and insert a raw pair; blank emails are ignored
    pub fn insert_pair(&mut self, name: &str, email: &str) -> bool {
        match AddressRecord::new(name, email) {
            Some(record) => self.insert(record),
            None => false,
        }
    }

    pub fn contains(&self, record: &AddressRecord) -> bool {
        self.records.contains(record)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of distinct normalized emails
    pub fn distinct_emails(&self) -> usize {
        self.records
            .iter()
            .map(AddressRecord::email)
            .collect::<HashSet<_>>()
            .len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AddressRecord> {
        self.records.iter()
    }

    /// Every distinct pair, ordered by email then name
    pub fn sorted(&self) -> Vec<&AddressRecord> {
        let mut rows: Vec<&AddressRecord> = self.records.iter().collect();
        rows.sort();
        rows
    }

    /// One record per email, ordered strictly by email
    ///
    /// When an email was seen under several names, the lexicographically
    /// smallest non-empty name wins; the name is empty only if no non-empty
    /// name was ever observed.
    pub fn one_per_email(&self) -> Vec<AddressRecord> {
        let mut by_email: BTreeMap<&str, &str> = BTreeMap::new();
        for record in &self.records {
            by_email
                .entry(record.email())
                .and_modify(|kept| {
                    if kept.is_empty() || (!record.name().is_empty() && record.name() < *kept) {
                        *kept = record.name();
                    }
                })
                .or_insert(record.name());
        }

        by_email
            .into_iter()
            .map(|(email, name)| AddressRecord {
                email: email.to_string(),
                name: name.to_string(),
            })
            .collect()
    }
}

impl Extend<AddressRecord> for AddressAccumulator {
    fn extend<I: IntoIterator<Item = AddressRecord>>(&mut self, iter: I) {
        self.records.extend(iter);
    }
}

impl FromIterator<AddressRecord> for AddressAccumulator {
    fn from_iter<I: IntoIterator<Item = AddressRecord>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}
