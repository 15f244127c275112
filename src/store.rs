//! Disk-backed store for records that must survive restarts.
//!
//! One JSON file per record, shaped `{"updated_at": <RFC 3339>, ...payload}`.
//! Writes go to a fresh temporary file in the target directory, are synced,
//! and then renamed over the canonical path, so the file on disk is always
//! either the previous complete record or the new one.
//!
//! The store never expires anything; callers judge staleness from
//! [`PersistentRecord::updated_at`].

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::telemetry;
use crate::{PriceGateError, Result};

/// A persisted payload and the moment it was written.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistentRecord<T> {
    pub updated_at: DateTime<Utc>,
    pub payload: T,
}

impl<T> PersistentRecord<T> {
    pub fn new(payload: T) -> Self {
        Self {
            updated_at: Utc::now(),
            payload,
        }
    }

    /// Whether the record was written more than `max_age` ago.
    pub fn is_older_than(&self, max_age: Duration) -> bool {
        let age = Utc::now().signed_duration_since(self.updated_at);
        age.to_std().is_ok_and(|age| age > max_age)
    }
}

/// On-disk shape: the payload's fields sit next to `updated_at`.
#[derive(Serialize, Deserialize)]
struct RecordFile<T> {
    updated_at: DateTime<Utc>,
    #[serde(flatten)]
    payload: T,
}

/// A single durable record with an in-memory mirror.
pub struct PersistentStore<T> {
    name: &'static str,
    path: PathBuf,
    mirror: RwLock<Option<PersistentRecord<T>>>,
    // Serializes writers; readers only ever touch the mirror.
    write_lock: tokio::sync::Mutex<()>,
}

impl<T> PersistentStore<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Create a store backed by `path`. Nothing is read until the first `get`.
    pub fn new(name: &'static str, path: impl Into<PathBuf>) -> Self {
        Self {
            name,
            path: path.into(),
            mirror: RwLock::new(None),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current record, from the mirror or else from disk.
    ///
    /// A missing file is `Ok(None)`. An unreadable or corrupt file is a
    /// [`PriceGateError::Persistence`] error.
    pub async fn get(&self) -> Result<Option<PersistentRecord<T>>> {
        if let Some(record) = self.mirrored() {
            return Ok(Some(record));
        }

        let path = self.path.clone();
        let loaded = tokio::task::spawn_blocking(move || read_record::<T>(&path))
            .await
            .map_err(|e| PriceGateError::persistence(&self.path, e.to_string()))??;

        let Some(record) = loaded else {
            debug!(store = self.name, path = %self.path.display(), "no persisted record");
            return Ok(None);
        };

        let mut mirror = self.mirror.write().unwrap_or_else(PoisonError::into_inner);
        // A concurrent `set` may have landed while we were reading.
        let current = mirror.get_or_insert(record).clone();
        Ok(Some(current))
    }

    /// Durably replace the record with `payload`, stamped now.
    ///
    /// On failure the mirror is left untouched.
    pub async fn set(&self, payload: T) -> Result<PersistentRecord<T>> {
        self.set_record(PersistentRecord::new(payload)).await
    }

    /// Durably replace the record.
    pub async fn set_record(&self, record: PersistentRecord<T>) -> Result<PersistentRecord<T>> {
        let _writer = self.write_lock.lock().await;

        let path = self.path.clone();
        let to_write = record.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            let staged = stage(&path, &to_write)?;
            commit(staged, &path)
        })
        .await
        .map_err(|e| PriceGateError::persistence(&self.path, e.to_string()))
        .and_then(|r| r);

        let status = if outcome.is_ok() { "ok" } else { "error" };
        metrics::counter!(telemetry::STORE_WRITES_TOTAL, "store" => self.name, "status" => status)
            .increment(1);

        if let Err(e) = outcome {
            warn!(store = self.name, error = %e, "persist failed");
            return Err(e);
        }

        *self.mirror.write().unwrap_or_else(PoisonError::into_inner) = Some(record.clone());
        debug!(store = self.name, path = %self.path.display(), "record persisted");
        Ok(record)
    }

    fn mirrored(&self) -> Option<PersistentRecord<T>> {
        self.mirror
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

fn read_record<T: DeserializeOwned>(path: &Path) -> Result<Option<PersistentRecord<T>>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(PriceGateError::persistence(path, e.to_string())),
    };
    let file: RecordFile<T> = serde_json::from_slice(&bytes)
        .map_err(|e| PriceGateError::persistence(path, format!("corrupt record: {e}")))?;
    Ok(Some(PersistentRecord {
        updated_at: file.updated_at,
        payload: file.payload,
    }))
}

/// Write the serialized record to a synced temporary file beside `path`.
///
/// Dropping the returned handle deletes the temporary file and leaves the
/// canonical path untouched.
fn stage<T: Serialize>(path: &Path, record: &PersistentRecord<T>) -> Result<NamedTempFile> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(|e| {
        PriceGateError::persistence(dir, format!("failed to create directory: {e}"))
    })?;

    let file = RecordFile {
        updated_at: record.updated_at,
        payload: &record.payload,
    };
    let json = serde_json::to_vec_pretty(&file)?;

    let mut tmp = NamedTempFile::new_in(dir)
        .map_err(|e| PriceGateError::persistence(dir, format!("failed to create temp file: {e}")))?;
    tmp.write_all(&json)
        .and_then(|()| tmp.flush())
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| PriceGateError::persistence(tmp.path(), format!("failed to write: {e}")))?;
    Ok(tmp)
}

/// Atomically move a staged file over `path`.
fn commit(staged: NamedTempFile, path: &Path) -> Result<()> {
    staged
        .persist(path)
        .map_err(|e| PriceGateError::persistence(path, format!("failed to rename: {}", e.error)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CoinCatalog, CoinMeta};

    fn catalog(ids: &[&str]) -> CoinCatalog {
        CoinCatalog {
            coins: ids
                .iter()
                .map(|id| CoinMeta::new(*id, id.to_uppercase(), *id))
                .collect(),
        }
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store: PersistentStore<CoinCatalog> =
            PersistentStore::new("meta", dir.path().join("coins_meta.json"));
        assert!(store.get().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn set_then_get_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("coins_meta.json");

        let store = PersistentStore::new("meta", &path);
        store.set(catalog(&["bitcoin", "ethereum"])).await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(raw["updated_at"].is_string());
        assert_eq!(raw["coins"].as_array().unwrap().len(), 2);

        // A fresh store over the same file reads what was written.
        let reopened: PersistentStore<CoinCatalog> = PersistentStore::new("meta", &path);
        let record = reopened.get().await.unwrap().unwrap();
        assert_eq!(record.payload, catalog(&["bitcoin", "ethereum"]));
    }

    #[tokio::test]
    async fn get_after_set_uses_mirror() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coins_meta.json");
        let store = PersistentStore::new("meta", &path);

        store.set(catalog(&["bitcoin"])).await.unwrap();
        std::fs::remove_file(&path).unwrap();

        let record = store.get().await.unwrap().unwrap();
        assert_eq!(record.payload, catalog(&["bitcoin"]));
    }

    #[tokio::test]
    async fn interrupted_write_leaves_previous_file_intact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coins_meta.json");
        let store = PersistentStore::new("meta", &path);
        store.set(catalog(&["bitcoin"])).await.unwrap();
        let before = std::fs::read(&path).unwrap();

        // Staged but never renamed.
        let staged = stage(&path, &PersistentRecord::new(catalog(&["dogecoin"]))).unwrap();
        drop(staged);

        assert_eq!(std::fs::read(&path).unwrap(), before);
        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[tokio::test]
    async fn failed_write_keeps_mirror() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();

        let store = PersistentStore::new("meta", blocker.join("coins_meta.json"));
        let err = store.set(catalog(&["bitcoin"])).await.unwrap_err();

        assert!(matches!(err, PriceGateError::Persistence { .. }));
        assert!(store.mirrored().is_none());
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coins_meta.json");
        std::fs::write(&path, b"{not json").unwrap();

        let store: PersistentStore<CoinCatalog> = PersistentStore::new("meta", &path);
        assert!(matches!(
            store.get().await,
            Err(PriceGateError::Persistence { .. })
        ));
    }

    #[test]
    fn record_age() {
        let mut record = PersistentRecord::new(());
        assert!(!record.is_older_than(Duration::from_secs(60)));
        record.updated_at = Utc::now() - chrono::Duration::days(8);
        assert!(record.is_older_than(Duration::from_secs(7 * 24 * 3600)));
    }
}
