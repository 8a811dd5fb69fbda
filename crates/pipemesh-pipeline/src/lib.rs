//! pipemesh-pipeline — carrying a request through a chain of runtimes.
//!
//! A gateway's [`Dispatcher`] resolves a named pipeline from its
//! [`PipelineCatalog`] and runs it in one of two ways:
//!
//! - **HTTP chain**: the gateway calls each stage in turn through its
//!   sidecar and feeds every response into the next stage.
//! - **gRPC chain**: the gateway sends an [`Envelope`] to stage 0 and
//!   parks the caller in the [`CorrelationTable`]. Each runtime's
//!   [`Forwarder`] executes its stage and sends the envelope on; the last
//!   stage (or the first failing one) sends it back to the gateway
//!   instance that started it, which resolves the parked caller.
//!
//! All hops go through the local sidecar; the destination runtime name
//! is the request authority and the sidecar routes on it.

pub mod catalog;
pub mod correlation;
pub mod dispatcher;
pub mod envelope;
pub mod error;
pub mod executor;
pub mod forwarder;
pub mod hops;
pub mod proto;
pub mod transport;

pub use catalog::{ManagerSource, PipelineCatalog, PipelineSource, StoreSource};
pub use correlation::{CorrelationTable, PendingHandle};
pub use dispatcher::{Dispatcher, DispatcherConfig};
pub use envelope::new_request_id;
pub use error::{PipelineError, PipelineResult};
pub use executor::StageAction;
pub use forwarder::{Forwarder, HopOutcome};
pub use hops::{HopClient, SidecarHttpHops};
pub use proto::{Envelope, EnvelopeError, Stage};
pub use transport::{EnvelopeHandler, EnvelopeSender, GrpcSender, PipelineGrpc};
