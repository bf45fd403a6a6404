//! Persistent state slots.
//!
//! Every component keeps its durable state in a named slot holding one
//! JSON document. `JsonFileStore` maps slots to pretty-printed files
//! under a root directory so operators can inspect and edit state with
//! a text editor; `MemoryStore` backs tests.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::types::EngineError;

/// Raw slot access. Implementations hold one JSON document per slot.
pub trait StateStore: Send + Sync {
    /// `None` when the slot has never been written.
    fn read_slot(&self, slot: &str) -> Result<Option<String>, EngineError>;
    fn write_slot(&self, slot: &str, json: &str) -> Result<(), EngineError>;
    fn delete_slot(&self, slot: &str) -> Result<(), EngineError>;
}

fn storage_err(slot: &str, err: impl std::fmt::Display) -> EngineError {
    EngineError::Storage {
        slot: slot.to_string(),
        message: err.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Typed helpers
// ---------------------------------------------------------------------------

/// Read and deserialize a slot.
pub fn load<T: DeserializeOwned>(
    store: &dyn StateStore,
    slot: &str,
) -> Result<Option<T>, EngineError> {
    match store.read_slot(slot)? {
        Some(json) => {
            let value = serde_json::from_str(&json).map_err(|e| storage_err(slot, e))?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

/// Serialize and write a slot.
pub fn save<T: Serialize>(
    store: &dyn StateStore,
    slot: &str,
    value: &T,
) -> Result<(), EngineError> {
    let json = serde_json::to_string_pretty(value).map_err(|e| storage_err(slot, e))?;
    store.write_slot(slot, &json)
}

/// Append one record to a slot holding a JSON array.
pub fn append<T: Serialize>(
    store: &dyn StateStore,
    slot: &str,
    record: &T,
) -> Result<(), EngineError> {
    let mut records: Vec<serde_json::Value> = load(store, slot)?.unwrap_or_default();
    let value = serde_json::to_value(record).map_err(|e| storage_err(slot, e))?;
    records.push(value);
    save(store, slot, &records)
}

// ---------------------------------------------------------------------------
// File-backed store
// ---------------------------------------------------------------------------

/// Stores each slot as `<root>/<slot>.json`.
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn slot_path(&self, slot: &str) -> PathBuf {
        self.root.join(format!("{slot}.json"))
    }
}

impl StateStore for JsonFileStore {
    fn read_slot(&self, slot: &str) -> Result<Option<String>, EngineError> {
        let path = self.slot_path(slot);
        if !path.exists() {
            return Ok(None);
        }
        fs::read_to_string(&path)
            .map(Some)
            .map_err(|e| storage_err(slot, e))
    }

    fn write_slot(&self, slot: &str, json: &str) -> Result<(), EngineError> {
        fs::create_dir_all(&self.root).map_err(|e| storage_err(slot, e))?;
        fs::write(self.slot_path(slot), json).map_err(|e| storage_err(slot, e))
    }

    fn delete_slot(&self, slot: &str) -> Result<(), EngineError> {
        let path = self.slot_path(slot);
        if path.exists() {
            fs::remove_file(&path).map_err(|e| storage_err(slot, e))?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// Keeps slots in a map. Used by tests and dry runs.
#[derive(Default)]
pub struct MemoryStore {
    slots: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStore {
    fn read_slot(&self, slot: &str) -> Result<Option<String>, EngineError> {
        let slots = self
            .slots
            .lock()
            .map_err(|_| storage_err(slot, "store mutex poisoned"))?;
        Ok(slots.get(slot).cloned())
    }

    fn write_slot(&self, slot: &str, json: &str) -> Result<(), EngineError> {
        let mut slots = self
            .slots
            .lock()
            .map_err(|_| storage_err(slot, "store mutex poisoned"))?;
        slots.insert(slot.to_string(), json.to_string());
        Ok(())
    }

    fn delete_slot(&self, slot: &str) -> Result<(), EngineError> {
        let mut slots = self
            .slots
            .lock()
            .map_err(|_| storage_err(slot, "store mutex poisoned"))?;
        slots.remove(slot);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
