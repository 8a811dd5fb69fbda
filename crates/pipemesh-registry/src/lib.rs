//! pipemesh-registry — the authoritative view of runtimes and instances.
//!
//! The [`RuntimeRegistry`] pulls runtimes and instances from an
//! [`OrchestratorDriver`] on a fixed interval and publishes them as an
//! immutable [`RegistrySnapshot`]. Readers load the current snapshot
//! without locking; the refresher is the only writer and replaces the
//! whole snapshot in one atomic swap.
//!
//! [`ServiceRegistry`] holds the legacy, directly registered services
//! that the mesh service-discovery lookup filters over.

pub mod driver;
pub mod error;
pub mod registry;
pub mod services;
pub mod snapshot;

pub use driver::{OrchestratorDriver, StoreDriver};
pub use error::{RegistryError, RegistryResult};
pub use registry::RuntimeRegistry;
pub use services::ServiceRegistry;
pub use snapshot::RegistrySnapshot;
