//! Sample store and its persistence boundary.
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;
use thiserror::Error;

use crate::SampleStorage;
use crate::constants::LOG_TARGET;
use crate::history::SampleHistory;
use crate::key::ActivityKey;

/// Mapping from activity to its sample history.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Store {
    entries: BTreeMap<ActivityKey, SampleHistory>,
}

impl Store {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, key: &ActivityKey) -> Option<&SampleHistory> {
        self.entries.get(key)
    }

    #[must_use]
    pub fn contains(&self, key: &ActivityKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Append a sample to a key's history, creating the history if needed.
    pub fn record(&mut self, key: ActivityKey, sample: f64, capacity: usize) {
        self.entries
            .entry(key)
            .or_default()
            .push_bounded(sample, capacity);
    }

    /// Keep only entries whose key satisfies `keep`, returning the removed keys.
    pub fn retain_keys(&mut self, mut keep: impl FnMut(&ActivityKey) -> bool) -> Vec<ActivityKey> {
        let mut removed = Vec::new();
        self.entries.retain(|key, _| {
            let kept = keep(key);
            if !kept {
                removed.push(key.clone());
            }
            kept
        });
        removed
    }

    pub fn keys(&self) -> impl Iterator<Item = &ActivityKey> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ActivityKey, &SampleHistory)> {
        self.entries.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Serialize as a flat JSON object of formatted key to sample array.
    ///
    /// # Errors
    ///
    /// Returns an error if a sample cannot be represented in JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.entries)
    }

    /// Parse a persisted blob.
    ///
    /// The blob must be a JSON object. Individual entries with an unknown key
    /// format or a non-numeric history are skipped; histories longer than
    /// `capacity` keep their newest samples.
    ///
    /// # Errors
    ///
    /// Returns an error if the blob is not JSON or not an object.
    pub fn from_json(json: &str, capacity: usize) -> Result<Self, StorageError> {
        let value: Value = serde_json::from_str(json)?;
        let Value::Object(map) = value else {
            return Err(StorageError::NotAnObject);
        };

        let mut store = Self::new();
        for (raw_key, raw_samples) in map {
            let key = match raw_key.parse::<ActivityKey>() {
                Ok(key) => key,
                Err(err) => {
                    log::warn!(target: LOG_TARGET, "dropping stored entry: {err}");
                    continue;
                }
            };
            let Some(mut history) = parse_samples(&raw_samples) else {
                log::warn!(target: LOG_TARGET, "dropping stored entry '{raw_key}': samples are not finite numbers");
                continue;
            };
            history.truncate_to(capacity);
            store.entries.insert(key, history);
        }
        Ok(store)
    }
}

fn parse_samples(value: &Value) -> Option<SampleHistory> {
    value
        .as_array()?
        .iter()
        .map(|sample| sample.as_f64().filter(|s| s.is_finite()))
        .collect::<Option<Vec<f64>>>()
        .map(|samples| samples.into_iter().collect())
}

/// Errors surfaced by storage backends and blob decoding.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage error: {0}")]
    Backend(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("stored samples are not a JSON object")]
    NotAnObject,
}

/// Reads and writes the sample store as one named, versioned blob.
///
/// Every failure is recovered here: a missing or corrupt blob loads as an
/// empty store, and a failed write leaves the in-memory store authoritative.
pub struct PersistentStore<S: SampleStorage> {
    storage: S,
    storage_key: String,
    capacity: usize,
}

impl<S: SampleStorage> PersistentStore<S> {
    pub fn new(storage: S, storage_key: impl Into<String>, capacity: usize) -> Self {
        Self {
            storage,
            storage_key: storage_key.into(),
            capacity,
        }
    }

    #[must_use]
    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Load the persisted store, falling back to an empty one.
    #[must_use]
    pub fn load(&self) -> Store {
        let blob = match self.storage.read_blob(&self.storage_key) {
            Ok(Some(blob)) => blob,
            Ok(None) => return Store::new(),
            Err(err) => {
                log::warn!(target: LOG_TARGET, "failed to read '{}': {err}", self.storage_key);
                return Store::new();
            }
        };
        Store::from_json(&blob, self.capacity).unwrap_or_else(|err| {
            log::warn!(target: LOG_TARGET, "discarding corrupt '{}': {err}", self.storage_key);
            Store::new()
        })
    }

    /// Overwrite the persisted blob with `store`. Failures are logged only.
    pub fn save(&self, store: &Store) {
        let result = store
            .to_json()
            .map_err(StorageError::from)
            .and_then(|blob| {
                self.storage
                    .write_blob(&self.storage_key, &blob)
                    .map_err(|err| StorageError::Backend(err.to_string()))
            });
        if let Err(err) = result {
            log::warn!(target: LOG_TARGET, "failed to persist '{}': {err}", self.storage_key);
        }
    }

    /// Persist and return an empty store.
    #[must_use]
    pub fn reset(&self) -> Store {
        let store = Store::new();
        self.save(&store);
        store
    }
}

/// In-memory blob storage, shared between clones.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    blobs: Rc<RefCell<HashMap<String, String>>>,
    reject_writes: Rc<Cell<bool>>,
}

/// Raised by [`MemoryStorage`] while writes are being rejected.
#[derive(Debug, Error)]
#[error("storage quota exceeded")]
pub struct QuotaExceeded;

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a raw blob, bypassing serialization.
    pub fn insert_raw(&self, key: &str, blob: &str) {
        self.blobs
            .borrow_mut()
            .insert(key.to_string(), blob.to_string());
    }

    #[must_use]
    pub fn raw(&self, key: &str) -> Option<String> {
        self.blobs.borrow().get(key).cloned()
    }

    /// Make subsequent writes fail until turned off again.
    pub fn set_reject_writes(&self, reject: bool) {
        self.reject_writes.set(reject);
    }
}

impl SampleStorage for MemoryStorage {
    type Error = QuotaExceeded;

    fn read_blob(&self, key: &str) -> Result<Option<String>, Self::Error> {
        Ok(self.raw(key))
    }

    fn write_blob(&self, key: &str, blob: &str) -> Result<(), Self::Error> {
        if self.reject_writes.get() {
            return Err(QuotaExceeded);
        }
        self.insert_raw(key, blob);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "ratewatch.samples.v2";

    fn persistent(storage: &MemoryStorage) -> PersistentStore<MemoryStorage> {
        PersistentStore::new(storage.clone(), KEY, 30)
    }

    #[test]
    fn missing_blob_loads_empty() {
        let storage = MemoryStorage::new();
        assert!(persistent(&storage).load().is_empty());
    }

    #[test]
    fn corrupt_or_non_object_blob_loads_empty() {
        let storage = MemoryStorage::new();
        for blob in ["{not json", "[1,2,3]", "null", "42", "\"route-1-1\""] {
            storage.insert_raw(KEY, blob);
            assert!(persistent(&storage).load().is_empty(), "blob {blob}");
        }
    }

    #[test]
    fn save_then_load_preserves_histories() {
        let storage = MemoryStorage::new();
        let store_io = persistent(&storage);
        let mut store = Store::new();
        store.record(ActivityKey::route(1, 2), 12.5, 30);
        store.record(ActivityKey::gym("Brock"), 40.0, 30);
        store_io.save(&store);

        assert_eq!(
            storage.raw(KEY).as_deref(),
            Some(r#"{"route-1-2":[12.5],"gym-Brock":[40.0]}"#)
        );
        assert_eq!(store_io.load(), store);
    }

    #[test]
    fn invalid_entries_are_dropped_individually() {
        let storage = MemoryStorage::new();
        storage.insert_raw(
            KEY,
            r#"{"route-1-1":[1,2,3],"bogus":[1],"gym-Misty":["x"],"trainer-Rival":{"a":1}}"#,
        );
        let store = persistent(&storage).load();
        assert_eq!(store.len(), 1);
        let history = store.get(&ActivityKey::route(1, 1)).unwrap();
        assert_eq!(history.iter().collect::<Vec<_>>(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn oversized_histories_are_truncated_on_load() {
        let storage = MemoryStorage::new();
        storage.insert_raw(KEY, r#"{"route-1-1":[1,2,3,4,5]}"#);
        let store = PersistentStore::new(storage, KEY, 2).load();
        let history = store.get(&ActivityKey::route(1, 1)).unwrap();
        assert_eq!(history.iter().collect::<Vec<_>>(), vec![4.0, 5.0]);
    }

    #[test]
    fn write_failures_are_swallowed() {
        let storage = MemoryStorage::new();
        let store_io = persistent(&storage);
        storage.set_reject_writes(true);
        let mut store = Store::new();
        store.record(ActivityKey::route(1, 1), 3.0, 30);
        store_io.save(&store);
        assert!(storage.raw(KEY).is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn reset_persists_an_empty_object() {
        let storage = MemoryStorage::new();
        storage.insert_raw(KEY, r#"{"route-1-1":[5]}"#);
        let store = persistent(&storage).reset();
        assert!(store.is_empty());
        assert_eq!(storage.raw(KEY).as_deref(), Some("{}"));
    }

    #[test]
    fn retain_keys_reports_removed_entries() {
        let mut store = Store::new();
        store.record(ActivityKey::route(1, 1), 1.0, 30);
        store.record(ActivityKey::route(1, 9), 1.0, 30);
        let removed = store.retain_keys(|key| *key == ActivityKey::route(1, 1));
        assert_eq!(removed, vec![ActivityKey::route(1, 9)]);
        assert_eq!(store.len(), 1);
    }
}
