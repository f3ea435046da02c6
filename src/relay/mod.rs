//! Relay module
//!
//! Builds outbound requests for upstream backends and sends them over the
//! channel's transport.

pub mod adaptor;
pub mod client;
pub mod dispatch;
pub mod header_override;
pub mod headers;
pub mod keepalive;
pub mod logging;

pub use adaptor::{Adaptor, TaskAdaptor};
pub use client::ClientSelector;
pub use dispatch::{Dispatcher, UpstreamSocket};
pub use header_override::{HeaderOperation, HeaderOverrides};
pub use keepalive::{KeepaliveSupervisor, StopReason};
pub use logging::{init_tracing, DispatchLog};
