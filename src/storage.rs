//! Sled-based key/value storage shared by the summary cache and usage tracker.
//!
//! Values are stored as JSON under plain string keys.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use thiserror::Error;

/// Key under which a user-supplied API key is kept.
pub const API_KEY_KEY: &str = "hf_api_key";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("database error: {0}")]
    DbError(#[from] sled::Error),
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Process-wide key/value store.
///
/// Cloning is cheap; clones share the same underlying database.
#[derive(Clone)]
pub struct Storage {
    db: sled::Db,
}

impl Storage {
    /// Open or create storage at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    /// Open a throwaway in-memory store, removed on drop.
    pub fn temporary() -> Result<Self, StorageError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    /// Read and decode the value under `key`
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        match self.db.get(key.as_bytes())? {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    /// Replace the value under `key`
    pub fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let data = serde_json::to_vec(value)?;
        self.db.insert(key.as_bytes(), data)?;
        self.db.flush()?;
        Ok(())
    }

    /// Delete the value under `key`, returning whether it existed
    pub fn remove(&self, key: &str) -> Result<bool, StorageError> {
        let existed = self.db.remove(key.as_bytes())?.is_some();
        self.db.flush()?;
        Ok(existed)
    }

    pub fn contains(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.db.contains_key(key.as_bytes())?)
    }

    /// The API key saved with `quickxiv key`, if any
    pub fn api_key(&self) -> Result<Option<String>, StorageError> {
        self.get(API_KEY_KEY)
    }

    pub fn set_api_key(&self, key: &str) -> Result<(), StorageError> {
        self.put(API_KEY_KEY, &key.trim())
    }
}
