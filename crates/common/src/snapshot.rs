//! Storage snapshots and the capture seam
//!
//! A [`StorageSnapshot`] is the full key/value content of one browser storage
//! medium at one point in time. Snapshots are captured through a
//! [`StorageSource`], which the scenario harness implements on top of a live
//! browser page and [`MemoryStorage`] implements in-process.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::debug;

use crate::error::{CheckError, Result};
use crate::types::StorageKind;

/// Immutable content of one storage medium, in capture order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSnapshot {
    kind: StorageKind,
    entries: Vec<(String, String)>,
}

impl StorageSnapshot {
    /// Build a snapshot. A repeated key keeps its first position and its last value.
    pub fn new<K, V, I>(kind: StorageKind, entries: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut out: Vec<(String, String)> = Vec::new();
        for (key, value) in entries {
            let key = key.into();
            let value = value.into();
            match out.iter_mut().find(|(k, _)| *k == key) {
                Some(existing) => existing.1 = value,
                None => out.push((key, value)),
            }
        }
        Self { kind, entries: out }
    }

    pub fn kind(&self) -> StorageKind {
        self.kind
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Raw key count, including keys the grammar does not recognise
    pub fn total_entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse an exported snapshot: either a JSON object of string values or an
    /// array of `[key, value]` pairs.
    pub fn from_json(kind: StorageKind, json: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        let entries = match value {
            serde_json::Value::Object(map) => map
                .into_iter()
                .map(|(k, v)| -> Result<(String, String)> {
                    Ok((k, value_as_storage_string(v)?))
                })
                .collect::<Result<Vec<_>>>()?,
            serde_json::Value::Array(items) => items
                .into_iter()
                .map(|item| -> Result<(String, String)> {
                    match item {
                        serde_json::Value::Array(mut pair) if pair.len() == 2 => {
                            let v = pair.pop().unwrap_or_default();
                            match pair.pop() {
                                Some(serde_json::Value::String(k)) => {
                                    Ok((k, value_as_storage_string(v)?))
                                }
                                _ => Err(CheckError::SnapshotFormat(
                                    "entry key must be a string".to_string(),
                                )),
                            }
                        }
                        other => Err(CheckError::SnapshotFormat(format!(
                            "expected [key, value] pair, got {}",
                            other
                        ))),
                    }
                })
                .collect::<Result<Vec<_>>>()?,
            other => {
                return Err(CheckError::SnapshotFormat(format!(
                    "expected object or array at top level, got {}",
                    type_name(&other)
                )))
            }
        };
        Ok(Self::new(kind, entries))
    }

    /// Load an exported snapshot from a file
    pub fn from_file(kind: StorageKind, path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(kind, &content)
    }

    /// Export as a JSON object preserving capture order
    pub fn to_json(&self) -> Result<String> {
        let map: serde_json::Map<String, serde_json::Value> = self
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect();
        Ok(serde_json::to_string_pretty(&map)?)
    }
}

// Storage only holds strings; a nested object in an export is the
// already-parsed form of a stored JSON string.
fn value_as_storage_string(value: serde_json::Value) -> Result<String> {
    match value {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Null => Err(CheckError::SnapshotFormat(
            "storage values cannot be null".to_string(),
        )),
        other => Ok(serde_json::to_string(&other)?),
    }
}

fn type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// Something that can read every key/value pair of a storage medium
#[async_trait]
pub trait StorageSource: Send + Sync {
    async fn read_storage(&self, kind: StorageKind) -> Result<Vec<(String, String)>>;
}

/// Capture a fresh snapshot of `kind` from `source`.
///
/// Fails with [`CheckError::StorageUnavailable`] when the source errors or
/// does not answer within `timeout`.
pub async fn capture_snapshot<S>(
    source: &S,
    kind: StorageKind,
    timeout: Duration,
) -> Result<StorageSnapshot>
where
    S: StorageSource + ?Sized,
{
    let entries = match tokio::time::timeout(timeout, source.read_storage(kind)).await {
        Ok(Ok(entries)) => entries,
        Ok(Err(CheckError::StorageUnavailable { kind, reason })) => {
            return Err(CheckError::StorageUnavailable { kind, reason })
        }
        Ok(Err(e)) => return Err(CheckError::storage_unavailable(kind, e.to_string())),
        Err(_) => {
            return Err(CheckError::storage_unavailable(
                kind,
                format!("read timed out after {} ms", timeout.as_millis()),
            ))
        }
    };

    let snapshot = StorageSnapshot::new(kind, entries);
    debug!(
        "Captured {} with {} entries",
        kind,
        snapshot.total_entry_count()
    );
    Ok(snapshot)
}

/// In-process storage with `localStorage`/`sessionStorage` semantics
#[derive(Debug, Default)]
pub struct MemoryStorage {
    local: RwLock<Vec<(String, String)>>,
    session: RwLock<Vec<(String, String)>>,
    closed: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn area(&self, kind: StorageKind) -> &RwLock<Vec<(String, String)>> {
        match kind {
            StorageKind::Local => &self.local,
            StorageKind::Session => &self.session,
        }
    }

    pub fn set_item(&self, kind: StorageKind, key: &str, value: &str) {
        let mut area = self.area(kind).write();
        match area.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value.to_string(),
            None => area.push((key.to_string(), value.to_string())),
        }
    }

    pub fn get_item(&self, kind: StorageKind, key: &str) -> Option<String> {
        self.area(kind)
            .read()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    pub fn remove_item(&self, kind: StorageKind, key: &str) {
        self.area(kind).write().retain(|(k, _)| k != key);
    }

    pub fn clear(&self, kind: StorageKind) {
        self.area(kind).write().clear();
    }

    pub fn len(&self, kind: StorageKind) -> usize {
        self.area(kind).read().len()
    }

    pub fn is_empty(&self, kind: StorageKind) -> bool {
        self.len(kind) == 0
    }

    /// Simulate the owning page going away; later reads fail
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl StorageSource for MemoryStorage {
    async fn read_storage(&self, kind: StorageKind) -> Result<Vec<(String, String)>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(CheckError::storage_unavailable(kind, "page closed"));
        }
        Ok(self.area(kind).read().clone())
    }
}
