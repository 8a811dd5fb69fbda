//! pipemesh-core — shared building blocks for the pipemesh crates.
//!
//! Holds the `pipemesh.toml` configuration model, the duration syntax
//! used throughout the config (`500ms`, `5s`, `2m`), the fixed allow-list
//! of tracing headers that every pipeline hop propagates, and the small
//! HTTP/1 client every component uses to reach its sidecar.

pub mod config;
pub mod headers;
pub mod http;

pub use config::{PipemeshConfig, parse_duration};
pub use headers::{TRACE_HEADERS, TraceHeaders};
pub use http::{HttpCall, HttpError, HttpReply};
