//! Request and token usage aggregation.
//!
//! Token counts are estimates at roughly four characters per token.

use crate::clock::{Clock, SystemClock};
use crate::storage::{Storage, StorageError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use tracing::info;

const USAGE_KEY: &str = "usage";

/// Most recent requests kept in the history
pub const HISTORY_LIMIT: usize = 20;

/// Longest title kept in a history entry, in characters
pub const HISTORY_TITLE_CHARS: usize = 80;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageEntry {
    pub title: String,
    pub tokens: u64,
    pub date: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageAggregate {
    pub request_count: u64,
    pub token_count: u64,
    pub unique_document_ids: BTreeSet<String>,
    /// Newest first
    pub history: Vec<UsageEntry>,
}

/// Rough token estimate for `chars` characters of English text.
pub fn estimate_tokens(chars: usize) -> u64 {
    // round-half-up of chars / 4
    ((chars as u64) + 2) / 4
}

pub struct UsageTracker {
    storage: Storage,
    clock: Arc<dyn Clock>,
    /// Serialises the read-modify-write of the stored aggregate
    write_lock: Mutex<()>,
}

impl UsageTracker {
    pub fn new(storage: Storage) -> Self {
        Self::with_clock(storage, Arc::new(SystemClock))
    }

    pub fn with_clock(storage: Storage, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage,
            clock,
            write_lock: Mutex::new(()),
        }
    }

    /// The stored aggregate, or an empty one.
    pub fn load(&self) -> Result<UsageAggregate, StorageError> {
        Ok(self
            .storage
            .get::<UsageAggregate>(USAGE_KEY)?
            .unwrap_or_default())
    }

    /// Record one completed summarization.
    pub fn record(
        &self,
        document_id: &str,
        title: &str,
        input_chars: usize,
        output_chars: usize,
    ) -> Result<UsageAggregate, StorageError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut usage = self.load()?;

        let tokens = estimate_tokens(input_chars) + estimate_tokens(output_chars);
        usage.request_count += 1;
        usage.token_count += tokens;
        usage.unique_document_ids.insert(document_id.to_string());
        usage.history.insert(
            0,
            UsageEntry {
                title: title.chars().take(HISTORY_TITLE_CHARS).collect(),
                tokens,
                date: self.clock.now(),
            },
        );
        usage.history.truncate(HISTORY_LIMIT);

        self.storage.put(USAGE_KEY, &usage)?;
        info!(document_id, tokens, total = usage.token_count, "usage recorded");
        Ok(usage)
    }

    /// Clear all counters and history.
    pub fn reset(&self) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.storage.put(USAGE_KEY, &UsageAggregate::default())
    }
}
