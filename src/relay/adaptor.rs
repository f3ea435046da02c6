//! Backend adaptor abstraction
//!
//! Each upstream provider plugs into the dispatcher through one of these
//! traits. Implementations only compute URLs and headers; they never send
//! anything themselves.
//!
//! # Security
//!
//! Implementations MUST:
//! - Never forward client Authorization headers to upstream providers
//! - Use the channel API key from [`RelayInfo::channel_meta`]

use axum::http::HeaderMap;

use crate::context::{RelayContext, RelayInfo};

/// Relay adaptor for direct JSON, form and websocket sends
pub trait Adaptor: Send + Sync {
    /// Provider name for logging
    fn name(&self) -> &'static str;

    /// Full upstream URL for this relay
    fn get_request_url(&self, info: &RelayInfo) -> anyhow::Result<String>;

    /// Add provider headers (auth, versioning) to `headers`
    ///
    /// Channel header overrides are applied after this and take precedence.
    fn setup_request_header(
        &self,
        inbound: &RelayContext,
        headers: &mut HeaderMap,
        info: &RelayInfo,
    ) -> anyhow::Result<()>;
}

/// Adaptor for asynchronous task submission APIs
///
/// Task adaptors own every outbound header; channel overrides are not
/// applied to task requests.
pub trait TaskAdaptor: Send + Sync {
    fn name(&self) -> &'static str;

    fn build_request_url(&self, info: &RelayInfo) -> anyhow::Result<String>;

    fn build_request_header(
        &self,
        inbound: &RelayContext,
        request: &mut reqwest::Request,
        info: &RelayInfo,
    ) -> anyhow::Result<()>;
}
