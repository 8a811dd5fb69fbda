//! StateStore — redb-backed persistence for pipemesh.
//!
//! Provides typed CRUD over pipelines, runtimes and runtime instances.
//! All values are JSON-serialized into redb's `&[u8]` value columns. The
//! store supports both on-disk and in-memory backends (the latter for
//! testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

type Table = TableDefinition<'static, &'static str, &'static [u8]>;

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(PIPELINES).map_err(map_err!(Table))?;
        txn.open_table(RUNTIMES).map_err(map_err!(Table))?;
        txn.open_table(INSTANCES).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn put_json<T: Serialize>(&self, table: Table, key: &str, value: &T) -> StateResult<()> {
        let bytes = serde_json::to_vec(value).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut t = txn.open_table(table).map_err(map_err!(Table))?;
            t.insert(key, bytes.as_slice()).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn get_json<T: DeserializeOwned>(&self, table: Table, key: &str) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let t = txn.open_table(table).map_err(map_err!(Table))?;
        match t.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let value = serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Scan a table, keeping entries whose key starts with `prefix`.
    fn scan_json<T: DeserializeOwned>(&self, table: Table, prefix: &str) -> StateResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let t = txn.open_table(table).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in t.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(prefix) {
                let item = serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                results.push(item);
            }
        }
        Ok(results)
    }

    fn delete_key(&self, table: Table, key: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut t = txn.open_table(table).map_err(map_err!(Table))?;
            existed = t.remove(key).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(existed)
    }

    // ── Pipelines ──────────────────────────────────────────────────

    /// Insert or replace a pipeline definition.
    pub fn put_pipeline(&self, pipeline: &PipelineDefinition) -> StateResult<()> {
        self.put_json(PIPELINES, pipeline.table_key(), pipeline)?;
        debug!(name = %pipeline.name, "pipeline stored");
        Ok(())
    }

    pub fn get_pipeline(&self, name: &str) -> StateResult<Option<PipelineDefinition>> {
        self.get_json(PIPELINES, name)
    }

    /// List all pipelines, ordered by name.
    pub fn list_pipelines(&self) -> StateResult<Vec<PipelineDefinition>> {
        self.scan_json(PIPELINES, "")
    }

    /// Delete a pipeline. Returns true if it existed.
    pub fn delete_pipeline(&self, name: &str) -> StateResult<bool> {
        let existed = self.delete_key(PIPELINES, name)?;
        debug!(%name, existed, "pipeline deleted");
        Ok(existed)
    }

    // ── Runtimes ───────────────────────────────────────────────────

    /// Insert or update a runtime definition. The id must already be set.
    pub fn put_runtime(&self, runtime: &RuntimeDefinition) -> StateResult<()> {
        self.put_json(RUNTIMES, &runtime.id, runtime)?;
        debug!(id = %runtime.id, name = %runtime.name, "runtime stored");
        Ok(())
    }

    pub fn get_runtime(&self, id: &str) -> StateResult<Option<RuntimeDefinition>> {
        self.get_json(RUNTIMES, id)
    }

    /// Find a runtime by its unique name.
    pub fn find_runtime_by_name(&self, name: &str) -> StateResult<Option<RuntimeDefinition>> {
        Ok(self
            .list_runtimes()?
            .into_iter()
            .find(|rt| rt.name == name))
    }

    pub fn list_runtimes(&self) -> StateResult<Vec<RuntimeDefinition>> {
        self.scan_json(RUNTIMES, "")
    }

    /// Delete a runtime and all of its instances. Returns true if it existed.
    pub fn delete_runtime(&self, id: &str) -> StateResult<bool> {
        let existed = self.delete_key(RUNTIMES, id)?;
        let removed = self.delete_instances_for_runtime(id)?;
        debug!(%id, existed, instances = removed, "runtime deleted");
        Ok(existed)
    }

    // ── Instances ──────────────────────────────────────────────────

    pub fn put_instance(&self, instance: &RuntimeInstance) -> StateResult<()> {
        self.put_json(INSTANCES, &instance.table_key(), instance)
    }

    /// Get an instance by its composite key.
    pub fn get_instance(&self, key: &str) -> StateResult<Option<RuntimeInstance>> {
        self.get_json(INSTANCES, key)
    }

    pub fn list_instances(&self) -> StateResult<Vec<RuntimeInstance>> {
        self.scan_json(INSTANCES, "")
    }

    /// List all instances for a given runtime id.
    pub fn list_instances_for_runtime(&self, runtime_id: &str) -> StateResult<Vec<RuntimeInstance>> {
        self.scan_json(INSTANCES, &format!("{runtime_id}:"))
    }

    /// Delete an instance by composite key. Returns true if it existed.
    pub fn delete_instance(&self, key: &str) -> StateResult<bool> {
        self.delete_key(INSTANCES, key)
    }

    /// Delete all instances of a runtime. Returns number deleted.
    pub fn delete_instances_for_runtime(&self, runtime_id: &str) -> StateResult<u32> {
        let prefix = format!("{runtime_id}:");
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let mut count = 0u32;
        {
            let mut table = txn.open_table(INSTANCES).map_err(map_err!(Table))?;
            let keys: Vec<String> = table
                .iter()
                .map_err(map_err!(Read))?
                .filter_map(|entry| {
                    let (key, _) = entry.ok()?;
                    let k = key.value().to_string();
                    k.starts_with(&prefix).then_some(k)
                })
                .collect();
            for key in &keys {
                if table.remove(key.as_str()).map_err(map_err!(Write))?.is_some() {
                    count += 1;
                }
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(count)
    }
}
