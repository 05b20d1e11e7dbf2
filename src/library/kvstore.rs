//! Tiny persisted key/value store
//!
//! Holds the monitor chat identifiers and the pending recording pause across
//! restarts. Writes are serialized through a mutex; the JSON backing file is
//! persisted by a background task on a fixed ticker, on explicit flush, and
//! when the store is closed.

use crate::constants::KV_PERSIST_INTERVAL;
use async_trait::async_trait;
use log::{error, warn};
use serde_json::{Map, Value};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::time::interval;

/// Persisted string and string-array storage
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;
    async fn set(&self, key: &str, value: &str);
    async fn del(&self, key: &str);

    /// All strings found under any of the given keys, in key order
    async fn get_array(&self, keys: &[&str]) -> Vec<String>;
    async fn set_array(&self, key: &str, values: Vec<String>);
    async fn append_array(&self, key: &str, value: &str);
    async fn remove_from_array(&self, key: &str, value: &str);

    /// Persist dirty state now instead of waiting for the next ticker
    async fn flush(&self);
    /// Drain the writer, persist and release the backing file
    async fn close(&self);
}

enum Control {
    Flush,
    Close(oneshot::Sender<()>),
}

/// [`KeyValueStore`] backed by a single JSON document on disk
pub struct JsonFileStore {
    data: Arc<Mutex<Map<String, Value>>>,
    dirty: Arc<AtomicBool>,
    control: mpsc::Sender<Control>,
}

impl JsonFileStore {
    /// Opens (or creates) the backing file and starts the persistence task
    pub async fn open(path: &Path) -> std::io::Result<Self> {
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e),
        };

        let data: Map<String, Value> = if raw.trim().is_empty() {
            Map::new()
        } else {
            serde_json::from_str(&raw)
                .map_err(|e| std::io::Error::new(ErrorKind::InvalidData, e))?
        };

        let data = Arc::new(Mutex::new(data));
        let dirty = Arc::new(AtomicBool::new(false));
        let (control, control_rx) = mpsc::channel(4);

        tokio::spawn(Self::persist_loop(
            path.to_path_buf(),
            data.clone(),
            dirty.clone(),
            control_rx,
        ));

        Ok(Self {
            data,
            dirty,
            control,
        })
    }

    async fn persist_loop(
        path: PathBuf,
        data: Arc<Mutex<Map<String, Value>>>,
        dirty: Arc<AtomicBool>,
        mut control_rx: mpsc::Receiver<Control>,
    ) {
        let mut ticker = interval(KV_PERSIST_INTERVAL);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => Self::persist_if_dirty(&path, &data, &dirty).await,
                cmd = control_rx.recv() => match cmd {
                    Some(Control::Flush) => Self::persist_if_dirty(&path, &data, &dirty).await,
                    Some(Control::Close(ack)) => {
                        Self::persist_if_dirty(&path, &data, &dirty).await;
                        ack.send(()).ok();
                        return;
                    }
                    None => {
                        Self::persist_if_dirty(&path, &data, &dirty).await;
                        return;
                    }
                },
            }
        }
    }

    async fn persist_if_dirty(
        path: &Path,
        data: &Arc<Mutex<Map<String, Value>>>,
        dirty: &Arc<AtomicBool>,
    ) {
        if !dirty.swap(false, Ordering::AcqRel) {
            return;
        }

        let serialized = {
            let data = data.lock().await;
            serde_json::to_string(&*data)
        };

        match serialized {
            Ok(serialized) => {
                if let Err(e) = tokio::fs::write(path, serialized).await {
                    error!("failed to persist store to {}: {}", path.display(), e);
                    dirty.store(true, Ordering::Release);
                }
            }
            Err(e) => error!("failed to serialize store: {}", e),
        }
    }

    fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }
}

fn string_array(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(entries)) => entries
            .iter()
            .filter_map(|v| v.as_str().map(str::to_owned))
            .collect(),
        _ => Vec::new(),
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn get(&self, key: &str) -> Option<String> {
        self.data
            .lock()
            .await
            .get(key)
            .and_then(|v| v.as_str().map(str::to_owned))
    }

    async fn set(&self, key: &str, value: &str) {
        self.data
            .lock()
            .await
            .insert(key.to_owned(), Value::String(value.to_owned()));
        self.mark_dirty();
    }

    async fn del(&self, key: &str) {
        self.data.lock().await.remove(key);
        self.mark_dirty();
    }

    async fn get_array(&self, keys: &[&str]) -> Vec<String> {
        let data = self.data.lock().await;
        keys.iter()
            .flat_map(|key| string_array(data.get(*key)))
            .collect()
    }

    async fn set_array(&self, key: &str, values: Vec<String>) {
        let entries = values.into_iter().map(Value::String).collect();
        self.data
            .lock()
            .await
            .insert(key.to_owned(), Value::Array(entries));
        self.mark_dirty();
    }

    async fn append_array(&self, key: &str, value: &str) {
        let mut data = self.data.lock().await;
        let mut entries = string_array(data.get(key));
        entries.push(value.to_owned());
        data.insert(
            key.to_owned(),
            Value::Array(entries.into_iter().map(Value::String).collect()),
        );
        drop(data);
        self.mark_dirty();
    }

    async fn remove_from_array(&self, key: &str, value: &str) {
        let mut data = self.data.lock().await;
        let entries: Vec<Value> = string_array(data.get(key))
            .into_iter()
            .filter(|v| v != value)
            .map(Value::String)
            .collect();
        data.insert(key.to_owned(), Value::Array(entries));
        drop(data);
        self.mark_dirty();
    }

    async fn flush(&self) {
        if self.control.send(Control::Flush).await.is_err() {
            warn!("store writer is gone, flush dropped");
        }
    }

    async fn close(&self) {
        let (ack, done) = oneshot::channel();
        if self.control.send(Control::Close(ack)).await.is_ok() {
            done.await.ok();
        }
    }
}

/// Volatile [`KeyValueStore`] used in tests and as a fallback when the backing
/// file cannot be opened
#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<Map<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Option<String> {
        self.data
            .lock()
            .await
            .get(key)
            .and_then(|v| v.as_str().map(str::to_owned))
    }

    async fn set(&self, key: &str, value: &str) {
        self.data
            .lock()
            .await
            .insert(key.to_owned(), Value::String(value.to_owned()));
    }

    async fn del(&self, key: &str) {
        self.data.lock().await.remove(key);
    }

    async fn get_array(&self, keys: &[&str]) -> Vec<String> {
        let data = self.data.lock().await;
        keys.iter()
            .flat_map(|key| string_array(data.get(*key)))
            .collect()
    }

    async fn set_array(&self, key: &str, values: Vec<String>) {
        let entries = values.into_iter().map(Value::String).collect();
        self.data
            .lock()
            .await
            .insert(key.to_owned(), Value::Array(entries));
    }

    async fn append_array(&self, key: &str, value: &str) {
        let mut data = self.data.lock().await;
        let mut entries = string_array(data.get(key));
        entries.push(value.to_owned());
        data.insert(
            key.to_owned(),
            Value::Array(entries.into_iter().map(Value::String).collect()),
        );
    }

    async fn remove_from_array(&self, key: &str, value: &str) {
        let mut data = self.data.lock().await;
        let entries: Vec<Value> = string_array(data.get(key))
            .into_iter()
            .filter(|v| v != value)
            .map(Value::String)
            .collect();
        data.insert(key.to_owned(), Value::Array(entries));
    }

    async fn flush(&self) {}

    async fn close(&self) {}
}
