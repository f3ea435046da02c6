//! Relay Dispatch - outbound request layer for a multi-backend API relay
//!
//! Turns an inbound client request plus a channel's configuration into an
//! upstream HTTP or websocket request. Provider adaptors supply the URL and
//! their own headers; per-channel header overrides are merged last; the
//! request goes out over a pooled or proxy-bound client, with SSE keepalive
//! pings written downstream while a streaming request waits on the upstream.

pub mod config;
pub mod context;
pub mod error;
pub mod relay;
pub mod streaming;

pub use crate::config::{settings_channel, Config, GeneralSettings};
pub use crate::context::{ChannelMeta, RelayContext, RelayInfo, RelayMode};
pub use crate::error::{RelayError, RelayResult};
pub use crate::relay::{
    Adaptor, ClientSelector, Dispatcher, KeepaliveSupervisor, StopReason, TaskAdaptor,
    UpstreamSocket,
};
pub use crate::streaming::{Downstream, SseDownstream};
