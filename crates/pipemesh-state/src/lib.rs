//! pipemesh-state — domain types and embedded state store for pipemesh.
//!
//! Backed by [redb](https://docs.rs/redb), persists pipeline definitions,
//! runtime definitions, and runtime instances. The runtime tables are the
//! backing store of the local orchestrator driver; pipelines are read by
//! gateways either directly or through the manager API.
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns.
//! Instances use a composite `{runtime_id}:{instance_id}` key so that all
//! instances of one runtime can be found with a prefix scan.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod naming;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use naming::{MAX_CLUSTER_NAME_LEN, stable_name};
pub use store::StateStore;
pub use types::*;
