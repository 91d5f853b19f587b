//! Local persisted key-value state.
//!
//! The worker keeps two keys: `failedLogs` (the retry queue) and `machineId`.
//! [`LocalStore`] is the capability; [`JsonFileStore`] persists to a single
//! JSON object on disk and [`MemoryStore`] keeps everything in memory.

use crate::error::{Result, WardenError};
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

/// Key holding the serialized retry queue.
pub const FAILED_LOGS_KEY: &str = "failedLogs";

/// Key holding the persistent machine id.
pub const MACHINE_ID_KEY: &str = "machineId";

/// Asynchronous key-value storage.
///
/// Writes replace the whole value of a key. There is no transaction support;
/// callers needing read-modify-write must serialize themselves.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Read a key, `None` when unset.
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Replace the value of a key.
    async fn set(&self, key: &str, value: Value) -> Result<()>;
}

/// Read and decode a typed value.
///
/// # Errors
///
/// Returns [`WardenError::Storage`] when the stored value has the wrong shape.
pub async fn get_json<T: DeserializeOwned>(store: &dyn LocalStore, key: &str) -> Result<Option<T>> {
    match store.get(key).await? {
        None => Ok(None),
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| WardenError::Storage(format!("malformed value for '{key}': {e}"))),
    }
}

/// Encode and write a typed value.
///
/// # Errors
///
/// Propagates encode and storage errors.
pub async fn set_json<T: Serialize + Sync>(store: &dyn LocalStore, key: &str, value: &T) -> Result<()> {
    store.set(key, serde_json::to_value(value)?).await
}

/// Return the persisted machine id, generating and storing a v4 UUID on
/// first use.
///
/// # Errors
///
/// Propagates storage errors.
pub async fn machine_id(store: &dyn LocalStore) -> Result<String> {
    if let Some(id) = get_json::<String>(store, MACHINE_ID_KEY).await? {
        if !id.is_empty() {
            return Ok(id);
        }
    }
    let id = uuid::Uuid::new_v4().to_string();
    set_json(store, MACHINE_ID_KEY, &id).await?;
    info!(machine_id = %id, "generated new machine id");
    Ok(id)
}

/// In-memory store. State is lost when dropped.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<Map<String, Value>>,
}

impl MemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LocalStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let values = self
            .values
            .lock()
            .map_err(|_| WardenError::Storage("memory store lock poisoned".into()))?;
        Ok(values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| WardenError::Storage("memory store lock poisoned".into()))?;
        values.insert(key.to_owned(), value);
        Ok(())
    }
}

/// Store backed by one JSON object file.
///
/// Every write rewrites the file through a temp file and rename so a crash
/// never leaves a truncated document behind.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    io_lock: tokio::sync::Mutex<()>,
}

impl JsonFileStore {
    /// Store persisted at `path`. The file is created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            io_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Store at the default state file location.
    pub fn open_default() -> Self {
        Self::new(crate::warden_dirs::state_file())
    }

    /// Backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Map<String, Value>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(e.into()),
        };
        if content.trim().is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(WardenError::Storage(format!(
                "{} does not contain a JSON object",
                self.path.display()
            ))),
            Err(e) => Err(WardenError::Storage(format!(
                "cannot parse {}: {e}",
                self.path.display()
            ))),
        }
    }

    async fn save(&self, values: &Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let content = serde_json::to_vec_pretty(values)?;
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), keys = values.len(), "persisted local state");
        Ok(())
    }
}

#[async_trait]
impl LocalStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let _guard = self.io_lock.lock().await;
        Ok(self.load().await?.remove(key))
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let _guard = self.io_lock.lock().await;
        let mut values = self.load().await?;
        values.insert(key.to_owned(), value);
        self.save(&values).await
    }
}
