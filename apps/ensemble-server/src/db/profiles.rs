//! Durable per-identity profile storage.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::StoreError;
use crate::models::profile::Profile;

/// Abstraction over the profile store, keyed by `stable_id`.
///
/// Backed by a JSON file in production and an in-memory map in tests.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get(&self, stable_id: &str) -> Result<Option<Profile>, StoreError>;
    async fn set(&self, profile: &Profile) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// In-memory implementation (for tests)
// ---------------------------------------------------------------------------

pub struct MemoryStore {
    data: Mutex<HashMap<String, Profile>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            data: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn get(&self, stable_id: &str) -> Result<Option<Profile>, StoreError> {
        Ok(self.data.lock().get(stable_id).cloned())
    }

    async fn set(&self, profile: &Profile) -> Result<(), StoreError> {
        self.data
            .lock()
            .insert(profile.stable_id.clone(), profile.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// JSON file implementation
// ---------------------------------------------------------------------------

struct FileInner {
    path: PathBuf,
    data: RwLock<HashMap<String, Profile>>,
    /// Serializes whole-file rewrites between the background writer and `flush`.
    write_lock: tokio::sync::Mutex<()>,
}

impl FileInner {
    async fn persist(&self) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let bytes = {
            let data = self.data.read();
            serde_json::to_vec(&*data)?
        };

        let tmp = tmp_path(&self.path);
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

/// Profile store persisted as one JSON object keyed by `stable_id`.
///
/// Reads are served from memory. Every `set` schedules a full rewrite of the
/// file on a background task; bursts of updates coalesce into one write.
pub struct JsonFileStore {
    inner: Arc<FileInner>,
    dirty: mpsc::UnboundedSender<()>,
}

impl JsonFileStore {
    /// Load the file at `path` and start the background writer.
    ///
    /// A missing or unreadable file yields an empty store. Must be called
    /// from within a Tokio runtime.
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let data = load(&path).await;
        tracing::info!(path = %path.display(), profiles = data.len(), "profile store loaded");

        let inner = Arc::new(FileInner {
            path,
            data: RwLock::new(data),
            write_lock: tokio::sync::Mutex::new(()),
        });

        let (dirty, mut rx) = mpsc::unbounded_channel::<()>();
        let writer = inner.clone();
        tokio::spawn(async move {
            while rx.recv().await.is_some() {
                while rx.try_recv().is_ok() {}
                if let Err(err) = writer.persist().await {
                    tracing::error!(%err, path = %writer.path.display(), "failed to write profile store");
                }
            }
        });

        Self { inner, dirty }
    }

    /// Rewrite the file now, waiting for the write to finish.
    pub async fn flush(&self) -> Result<(), StoreError> {
        self.inner.persist().await
    }

    pub fn len(&self) -> usize {
        self.inner.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ProfileStore for JsonFileStore {
    async fn get(&self, stable_id: &str) -> Result<Option<Profile>, StoreError> {
        Ok(self.inner.data.read().get(stable_id).cloned())
    }

    async fn set(&self, profile: &Profile) -> Result<(), StoreError> {
        self.inner
            .data
            .write()
            .insert(profile.stable_id.clone(), profile.clone());
        // Only fails once the writer task is gone, i.e. during runtime shutdown.
        if self.dirty.send(()).is_err() {
            tracing::warn!("profile writer stopped; update kept in memory only");
        }
        Ok(())
    }
}

async fn load(path: &Path) -> HashMap<String, Profile> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return HashMap::new(),
        Err(err) => {
            tracing::warn!(%err, path = %path.display(), "cannot read profile store; starting empty");
            return HashMap::new();
        }
    };

    let raw: HashMap<String, Value> = match serde_json::from_slice(&bytes) {
        Ok(raw) => raw,
        Err(err) => {
            tracing::warn!(%err, path = %path.display(), "profile store is not a JSON object; starting empty");
            return HashMap::new();
        }
    };

    raw.into_iter()
        .filter_map(|(key, value)| match serde_json::from_value::<Profile>(value) {
            Ok(mut profile) => {
                profile.stable_id = key.clone();
                Some((key, profile))
            }
            Err(err) => {
                tracing::warn!(%err, stable_id = %key, "skipping malformed profile record");
                None
            }
        })
        .collect()
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
