//! redb table definitions for the pipemesh state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized domain types).

use redb::TableDefinition;

/// Pipeline definitions keyed by `{name}`.
pub const PIPELINES: TableDefinition<&str, &[u8]> = TableDefinition::new("pipelines");

/// Runtime definitions keyed by `{runtime_id}`.
pub const RUNTIMES: TableDefinition<&str, &[u8]> = TableDefinition::new("runtimes");

/// Runtime instances keyed by `{runtime_id}:{instance_id}`.
pub const INSTANCES: TableDefinition<&str, &[u8]> = TableDefinition::new("instances");
