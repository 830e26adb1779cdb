//! In-memory registry of transaction hash subscriptions.
//!
//! Every operation holds the lock only for the duration of a map operation
//! and hands out value copies, so readers never observe a half-written
//! record and no I/O ever happens under the lock.

use std::collections::HashMap;

use chrono::{
    DateTime,
    Utc,
};
use parking_lot::RwLock;
use uuid::Uuid;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Subscription must track at least one domain")]
    InvalidSubscription,
    #[error("Subscription not found: {0}")]
    NotFound(String),
}

/// State tracked for a single subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashRecord {
    pub token: String,
    pub domains: Vec<String>,
    /// Start of the most recent refresh attempt.
    pub last_requested: Option<DateTime<Utc>>,
    /// Time of the most recent successful hash computation.
    pub last_updated: Option<DateTime<Utc>>,
    /// Hex-encoded digest of the last fetched payload.
    pub hash: Option<String>,
    /// Reason the most recent refresh failed, cleared on success.
    pub last_failure: Option<String>,
}

impl HashRecord {
    fn new(token: String, domains: Vec<String>) -> Self {
        Self {
            token,
            domains,
            last_requested: None,
            last_updated: None,
            hash: None,
            last_failure: None,
        }
    }
}

#[derive(Debug)]
struct Entry {
    seq: u64,
    record: HashRecord,
}

#[derive(Debug, Default)]
struct Inner {
    next_seq: u64,
    entries: HashMap<String, Entry>,
}

#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    inner: RwLock<Inner>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `domains` under a freshly generated token.
    pub fn add_new(&self, domains: Vec<String>) -> Result<String, RegistryError> {
        if domains.is_empty() {
            return Err(RegistryError::InvalidSubscription);
        }

        let mut inner = self.inner.write();
        let mut token = Uuid::new_v4().to_string();
        while inner.entries.contains_key(&token) {
            token = Uuid::new_v4().to_string();
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.entries.insert(
            token.clone(),
            Entry {
                seq,
                record: HashRecord::new(token.clone(), domains),
            },
        );
        metrics::gauge!("registry_subscriptions").set(inner.entries.len() as f64);

        Ok(token)
    }

    /// Removing an unknown token is a no-op.
    pub fn remove(&self, token: &str) {
        let mut inner = self.inner.write();
        if inner.entries.remove(token).is_some() {
            metrics::gauge!("registry_subscriptions").set(inner.entries.len() as f64);
        }
    }

    pub fn find(&self, token: &str) -> Result<HashRecord, RegistryError> {
        self.inner
            .read()
            .entries
            .get(token)
            .map(|entry| entry.record.clone())
            .ok_or_else(|| RegistryError::NotFound(token.to_string()))
    }

    /// Stores a freshly computed hash. Dropped if the subscription is gone.
    pub fn update(&self, token: &str, hash: String) {
        self.with_record(token, |record| {
            record.hash = Some(hash);
            record.last_updated = Some(Utc::now());
            record.last_failure = None;
        });
    }

    pub fn mark_requested(&self, token: &str) {
        self.with_record(token, |record| {
            record.last_requested = Some(Utc::now());
        });
    }

    pub fn record_failure(&self, token: &str, reason: String) {
        self.with_record(token, |record| {
            record.last_failure = Some(reason);
        });
    }

    /// Live tokens in subscription order.
    pub fn all_tokens(&self) -> Vec<String> {
        let inner = self.inner.read();
        let mut entries: Vec<_> = inner
            .entries
            .values()
            .map(|entry| (entry.seq, entry.record.token.clone()))
            .collect();
        entries.sort_unstable_by_key(|(seq, _)| *seq);
        entries.into_iter().map(|(_, token)| token).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn with_record(&self, token: &str, f: impl FnOnce(&mut HashRecord)) {
        if let Some(entry) = self.inner.write().entries.get_mut(token) {
            f(&mut entry.record);
        }
    }
}
