//! Summary cache keyed by paper id, with a seven day expiry checked on read.

use crate::clock::{Clock, SystemClock};
use crate::paper::{Document, DocumentSnapshot};
use crate::storage::{Storage, StorageError};
use crate::summary::SummaryResult;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

const CACHE_PREFIX: &str = "summary_";

/// A completed summary with the paper metadata shown alongside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub document: DocumentSnapshot,
    pub summary: SummaryResult,
    pub created_at: DateTime<Utc>,
}

pub struct SummaryCache {
    storage: Storage,
    clock: Arc<dyn Clock>,
    max_age: Duration,
}

impl SummaryCache {
    pub fn new(storage: Storage) -> Self {
        Self::with_clock(storage, Arc::new(SystemClock))
    }

    pub fn with_clock(storage: Storage, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage,
            clock,
            max_age: Duration::days(7),
        }
    }

    /// Storage key for a paper id
    pub fn key(paper_id: &str) -> String {
        format!("{CACHE_PREFIX}{paper_id}")
    }

    /// The cached entry for `paper_id`, unless it is missing or expired.
    ///
    /// Expired and undecodable entries are deleted.
    pub fn get(&self, paper_id: &str) -> Result<Option<CacheEntry>, StorageError> {
        let key = Self::key(paper_id);
        let entry = match self.storage.get::<CacheEntry>(&key) {
            Ok(Some(entry)) => entry,
            Ok(None) => return Ok(None),
            Err(StorageError::SerializationError(e)) => {
                warn!(paper_id, error = %e, "dropping unreadable cached summary");
                self.storage.remove(&key)?;
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        if self.clock.now() - entry.created_at > self.max_age {
            debug!(paper_id, "cached summary expired");
            self.storage.remove(&key)?;
            return Ok(None);
        }

        debug!(paper_id, "cache hit");
        Ok(Some(entry))
    }

    /// Store a summary for `paper_id`, replacing any previous entry.
    pub fn set(
        &self,
        paper_id: &str,
        document: &Document,
        summary: &SummaryResult,
    ) -> Result<CacheEntry, StorageError> {
        let entry = CacheEntry {
            document: document.snapshot(),
            summary: summary.clone(),
            created_at: self.clock.now(),
        };
        self.storage.put(&Self::key(paper_id), &entry)?;
        info!(paper_id, "summary cached");
        Ok(entry)
    }

    /// Drop the entry for `paper_id`, returning whether one existed.
    pub fn remove(&self, paper_id: &str) -> Result<bool, StorageError> {
        self.storage.remove(&Self::key(paper_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::paper::Section;

    fn document() -> Document {
        Document {
            id: "2301.00001".into(),
            title: "Sparse Attention".into(),
            authors: "Ada Lovelace".into(),
            r#abstract: "We study attention.".into(),
            sections: vec![Section {
                title: "Introduction".into(),
                text: "Long body text.".into(),
            }],
            full_text: "x".repeat(5_000),
        }
    }

    fn summary() -> SummaryResult {
        SummaryResult {
            problem: "- quadratic attention".into(),
            method: "- sparse blocks".into(),
            results: "- 3x faster".into(),
            limitations: String::new(),
        }
    }

    fn cache() -> (SummaryCache, Arc<ManualClock>, Storage) {
        let storage = Storage::temporary().unwrap();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        (
            SummaryCache::with_clock(storage.clone(), clock.clone()),
            clock,
            storage,
        )
    }

    #[test]
    fn round_trip_returns_summary_unchanged() {
        let (cache, _clock, _storage) = cache();
        cache.set("2301.00001", &document(), &summary()).unwrap();

        let entry = cache.get("2301.00001").unwrap().unwrap();
        assert_eq!(entry.summary, summary());
        assert_eq!(entry.document.title, "Sparse Attention");
        assert_eq!(entry.document.section_titles, vec!["Introduction".to_string()]);
    }

    #[test]
    fn snapshot_leaves_out_full_text() {
        let (cache, _clock, storage) = cache();
        cache.set("2301.00001", &document(), &summary()).unwrap();

        let raw: serde_json::Value = storage.get("summary_2301.00001").unwrap().unwrap();
        assert!(raw["document"].get("full_text").is_none());
    }

    #[test]
    fn entries_expire_after_seven_days() {
        let (cache, clock, storage) = cache();
        cache.set("2301.00001", &document(), &summary()).unwrap();

        clock.advance(Duration::days(7));
        assert!(cache.get("2301.00001").unwrap().is_some());

        clock.advance(Duration::seconds(1));
        assert!(cache.get("2301.00001").unwrap().is_none());
        assert!(!storage.contains("summary_2301.00001").unwrap());
    }

    #[test]
    fn set_overwrites_previous_entry() {
        let (cache, clock, _storage) = cache();
        cache.set("2301.00001", &document(), &summary()).unwrap();

        clock.advance(Duration::days(6));
        let mut newer = summary();
        newer.limitations = "- english only".into();
        cache.set("2301.00001", &document(), &newer).unwrap();

        clock.advance(Duration::days(6));
        let entry = cache.get("2301.00001").unwrap().unwrap();
        assert_eq!(entry.summary, newer);
    }

    #[test]
    fn unreadable_entry_is_dropped() {
        let (cache, _clock, storage) = cache();
        storage.put("summary_2301.00001", &"not an entry").unwrap();

        assert!(cache.get("2301.00001").unwrap().is_none());
        assert!(!storage.contains("summary_2301.00001").unwrap());

        cache.set("2301.00001", &document(), &summary()).unwrap();
        assert!(cache.get("2301.00001").unwrap().is_some());
    }

    #[test]
    fn missing_entry_is_absent() {
        let (cache, _clock, _storage) = cache();
        assert!(cache.get("nope").unwrap().is_none());
        assert!(!cache.remove("nope").unwrap());
    }
}
