// tabkeeper Settings Store
// Persisted key-value settings with typed, defaulted section loaders.
// Values are JSON; the store itself knows nothing about defaults.

use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use rusqlite::params;
use serde_json::{json, Map, Value};

use crate::database::connection::Database;
use crate::types::errors::SettingsError;
use crate::types::settings::{SettingsSection, KNOWN_IMPORT_KEYS};

/// Trait defining the key-value settings store interface.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Returns the stored values for those of `keys` that are present.
    async fn get(&self, keys: &[String]) -> Result<Map<String, Value>, SettingsError>;
    /// Writes every entry of `values`, replacing previous values.
    async fn set(&self, values: Map<String, Value>) -> Result<(), SettingsError>;
    /// Returns every stored key.
    async fn all(&self) -> Result<Map<String, Value>, SettingsError>;
}

/// In-memory store for tests and the demo binary.
#[derive(Default)]
pub struct MemorySettingsStore {
    values: Mutex<Map<String, Value>>,
    fail_reads: Mutex<bool>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent read fail, to exercise default fallbacks.
    pub fn set_fail_reads(&self, fail: bool) {
        if let Ok(mut flag) = self.fail_reads.lock() {
            *flag = fail;
        }
    }

    fn check_reads(&self) -> Result<(), SettingsError> {
        let failing = self.fail_reads.lock().map(|f| *f).unwrap_or(false);
        if failing {
            return Err(SettingsError::Storage("reads disabled".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn get(&self, keys: &[String]) -> Result<Map<String, Value>, SettingsError> {
        self.check_reads()?;
        let values = self
            .values
            .lock()
            .map_err(|e| SettingsError::Storage(e.to_string()))?;
        Ok(keys
            .iter()
            .filter_map(|k| values.get(k).map(|v| (k.clone(), v.clone())))
            .collect())
    }

    async fn set(&self, values: Map<String, Value>) -> Result<(), SettingsError> {
        let mut stored = self
            .values
            .lock()
            .map_err(|e| SettingsError::Storage(e.to_string()))?;
        stored.extend(values);
        Ok(())
    }

    async fn all(&self) -> Result<Map<String, Value>, SettingsError> {
        self.check_reads()?;
        let values = self
            .values
            .lock()
            .map_err(|e| SettingsError::Storage(e.to_string()))?;
        Ok(values.clone())
    }
}

/// SQLite-backed store; each key is one row holding its JSON value.
pub struct SqliteSettingsStore {
    db: Arc<Database>,
}

impl SqliteSettingsStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    fn now() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64
    }
}

#[async_trait]
impl SettingsStore for SqliteSettingsStore {
    async fn get(&self, keys: &[String]) -> Result<Map<String, Value>, SettingsError> {
        let conn = self.db.connection();
        let mut stmt = conn.prepare("SELECT value FROM settings WHERE key = ?1")?;
        let mut found = Map::new();
        for key in keys {
            let raw: Option<String> = match stmt.query_row(params![key], |row| row.get(0)) {
                Ok(v) => Some(v),
                Err(rusqlite::Error::QueryReturnedNoRows) => None,
                Err(e) => return Err(e.into()),
            };
            if let Some(raw) = raw {
                found.insert(key.clone(), serde_json::from_str(&raw)?);
            }
        }
        Ok(found)
    }

    async fn set(&self, values: Map<String, Value>) -> Result<(), SettingsError> {
        let mut conn = self.db.connection();
        let tx = conn.transaction()?;
        let now = Self::now();
        for (key, value) in values {
            tx.execute(
                "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, serde_json::to_string(&value)?, now],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    async fn all(&self) -> Result<Map<String, Value>, SettingsError> {
        let conn = self.db.connection();
        let mut stmt = conn.prepare("SELECT key, value FROM settings ORDER BY key")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
        let mut all = Map::new();
        for row in rows {
            let (key, raw) = row?;
            all.insert(key, serde_json::from_str(&raw)?);
        }
        Ok(all)
    }
}

/// The keys a section owns, taken from its default serialization.
pub fn section_keys<S: SettingsSection>() -> Vec<String> {
    match serde_json::to_value(S::default()) {
        Ok(Value::Object(map)) => map.keys().cloned().collect(),
        _ => Vec::new(),
    }
}

/// Reads a section, filling missing keys from defaults.
pub async fn try_load<S: SettingsSection>(store: &dyn SettingsStore) -> Result<S, SettingsError> {
    let mut merged = match serde_json::to_value(S::default())? {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    let stored = store.get(&section_keys::<S>()).await?;
    merged.extend(stored);
    Ok(serde_json::from_value(Value::Object(merged))?)
}

/// Reads a section; any failure falls back to the section defaults.
pub async fn load<S: SettingsSection>(store: &dyn SettingsStore) -> S {
    match try_load::<S>(store).await {
        Ok(section) => section,
        Err(e) => {
            tracing::warn!(section = S::SECTION, error = %e, "settings read failed, using defaults");
            S::default()
        }
    }
}

/// Validates and persists a whole section.
pub async fn save<S: SettingsSection>(store: &dyn SettingsStore, section: &S) -> Result<(), SettingsError> {
    section.validate()?;
    match serde_json::to_value(section)? {
        Value::Object(map) => store.set(map).await,
        other => Err(SettingsError::Serialization(format!(
            "section {} did not serialize to an object: {}",
            S::SECTION,
            other
        ))),
    }
}

/// Persists a section without validation (engine-owned bookkeeping such as labels).
pub async fn save_unchecked<S: SettingsSection>(store: &dyn SettingsStore, section: &S) -> Result<(), SettingsError> {
    if let Value::Object(map) = serde_json::to_value(section)? {
        store.set(map).await?;
    }
    Ok(())
}

/// Wraps every stored key in the export envelope.
pub async fn export_settings(store: &dyn SettingsStore) -> Result<Value, SettingsError> {
    let settings = store.all().await?;
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    Ok(json!({
        "version": "1.0",
        "timestamp": timestamp,
        "settings": settings,
    }))
}

/// Accepts either the export envelope or a bare settings object that carries
/// at least one known key, and overwrites the stored values with it.
///
/// Returns the number of keys written.
pub async fn import_settings(store: &dyn SettingsStore, blob: &Value) -> Result<usize, SettingsError> {
    let settings = match blob.get("settings") {
        Some(Value::Object(map)) => map.clone(),
        _ => match blob {
            Value::Object(map) if KNOWN_IMPORT_KEYS.iter().any(|k| map.contains_key(*k)) => map.clone(),
            _ => {
                return Err(SettingsError::InvalidImport(
                    "expected exported settings JSON".to_string(),
                ))
            }
        },
    };
    let count = settings.len();
    store.set(settings).await?;
    Ok(count)
}
