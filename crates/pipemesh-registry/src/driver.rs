//! Orchestrator drivers: where runtimes and instances come from.

use async_trait::async_trait;
use tracing::{debug, info};
use uuid::Uuid;

use pipemesh_state::{RuntimeDefinition, RuntimeInstance, StateStore};

use crate::error::{RegistryError, RegistryResult};

/// The orchestrator as the registry sees it.
///
/// Only the result shapes matter here; how a driver talks to its
/// orchestrator is its own business.
#[async_trait]
pub trait OrchestratorDriver: Send + Sync {
    async fn list_runtimes(&self) -> RegistryResult<Vec<RuntimeDefinition>>;

    async fn list_instances(&self) -> RegistryResult<Vec<RuntimeInstance>>;

    /// Create or update a runtime. Returns the definition with its id set.
    async fn deploy(&self, definition: RuntimeDefinition) -> RegistryResult<RuntimeDefinition>;

    /// Remove a runtime. Returns false if it did not exist.
    async fn delete(&self, id: &str) -> RegistryResult<bool>;
}

/// Driver backed by the local redb [`StateStore`].
///
/// Runtimes are stored as declared; instances appear when a process
/// registers itself and disappear when it deregisters.
#[derive(Clone)]
pub struct StoreDriver {
    store: StateStore,
}

impl StoreDriver {
    pub fn new(store: StateStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Record a live instance. Its owning runtime must exist.
    pub fn register_instance(&self, instance: &RuntimeInstance) -> RegistryResult<()> {
        if self.store.get_runtime(&instance.runtime_id)?.is_none() {
            return Err(RegistryError::NotFound(format!(
                "runtime id {}",
                instance.runtime_id
            )));
        }
        self.store.put_instance(instance)?;
        info!(instance = %instance.id, runtime = %instance.runtime_id, "instance registered");
        Ok(())
    }

    /// Remove an instance by its id, whichever runtime owns it.
    pub fn deregister_instance(&self, instance_id: &str) -> RegistryResult<bool> {
        let found = self
            .store
            .list_instances()?
            .into_iter()
            .find(|i| i.id == instance_id);
        let Some(instance) = found else {
            return Ok(false);
        };
        let existed = self.store.delete_instance(&instance.table_key())?;
        info!(instance = %instance_id, "instance deregistered");
        Ok(existed)
    }
}

#[async_trait]
impl OrchestratorDriver for StoreDriver {
    async fn list_runtimes(&self) -> RegistryResult<Vec<RuntimeDefinition>> {
        Ok(self.store.list_runtimes()?)
    }

    async fn list_instances(&self) -> RegistryResult<Vec<RuntimeInstance>> {
        Ok(self.store.list_instances()?)
    }

    async fn deploy(&self, mut definition: RuntimeDefinition) -> RegistryResult<RuntimeDefinition> {
        if definition.name.is_empty() {
            return Err(RegistryError::Invalid("runtime name is empty".to_string()));
        }
        // An existing runtime keeps its id.
        match self.store.find_runtime_by_name(&definition.name)? {
            Some(existing) => definition.id = existing.id,
            None if definition.id.is_empty() => definition.id = Uuid::new_v4().to_string(),
            None => {}
        }
        definition.state = Some("deployed".to_string());
        self.store.put_runtime(&definition)?;
        debug!(id = %definition.id, name = %definition.name, "runtime deployed");
        Ok(definition)
    }

    async fn delete(&self, id: &str) -> RegistryResult<bool> {
        Ok(self.store.delete_runtime(id)?)
    }
}
