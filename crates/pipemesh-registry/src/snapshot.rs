//! Immutable point-in-time view of runtimes and their instances.

use std::collections::HashMap;

use pipemesh_state::{RuntimeDefinition, RuntimeInstance};

/// One consistent generation of the registry.
///
/// Built in full before it is published; never mutated afterwards.
/// Every instance in a snapshot references a runtime of the same
/// snapshot; instances whose owner is unknown are dropped at build time.
#[derive(Debug, Default)]
pub struct RegistrySnapshot {
    generation: u64,
    /// Runtimes ordered by name.
    runtimes: Vec<RuntimeDefinition>,
    by_name: HashMap<String, usize>,
    by_id: HashMap<String, usize>,
    /// Instances keyed by owning runtime name, ordered by instance id.
    instances_by_name: HashMap<String, Vec<RuntimeInstance>>,
    instance_by_id: HashMap<String, RuntimeInstance>,
}

impl RegistrySnapshot {
    pub fn build(
        generation: u64,
        mut runtimes: Vec<RuntimeDefinition>,
        mut instances: Vec<RuntimeInstance>,
    ) -> Self {
        runtimes.sort_by(|a, b| a.name.cmp(&b.name));
        runtimes.dedup_by(|a, b| a.name == b.name);

        let by_name: HashMap<String, usize> = runtimes
            .iter()
            .enumerate()
            .map(|(i, rt)| (rt.name.clone(), i))
            .collect();
        let by_id: HashMap<String, usize> = runtimes
            .iter()
            .enumerate()
            .map(|(i, rt)| (rt.id.clone(), i))
            .collect();

        instances.sort_by(|a, b| a.id.cmp(&b.id));
        let mut instances_by_name: HashMap<String, Vec<RuntimeInstance>> = HashMap::new();
        let mut instance_by_id = HashMap::new();
        for instance in instances {
            let Some(&idx) = by_id.get(&instance.runtime_id) else {
                continue;
            };
            instances_by_name
                .entry(runtimes[idx].name.clone())
                .or_default()
                .push(instance.clone());
            instance_by_id.insert(instance.id.clone(), instance);
        }

        Self {
            generation,
            runtimes,
            by_name,
            by_id,
            instances_by_name,
            instance_by_id,
        }
    }

    /// Monotonic counter, bumped by every successful refresh.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn by_name(&self, name: &str) -> Option<&RuntimeDefinition> {
        self.by_name.get(name).map(|&i| &self.runtimes[i])
    }

    pub fn by_id(&self, id: &str) -> Option<&RuntimeDefinition> {
        self.by_id.get(id).map(|&i| &self.runtimes[i])
    }

    /// All instances of the runtime named `name`. Empty when unknown.
    pub fn instances_for_service(&self, name: &str) -> &[RuntimeInstance] {
        self.instances_by_name
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn instance_by_id(&self, id: &str) -> Option<&RuntimeInstance> {
        self.instance_by_id.get(id)
    }

    /// Runtimes in name order.
    pub fn runtimes(&self) -> &[RuntimeDefinition] {
        &self.runtimes
    }

    pub fn instance_count(&self) -> usize {
        self.instance_by_id.len()
    }
}
