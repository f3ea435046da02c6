//! Dispatch logging utilities
//!
//! Structured logging with a short correlation id per outbound dispatch.

use std::time::Instant;

use tracing::{debug, error, info, Span};
use uuid::Uuid;

use crate::context::{RelayInfo, RelayMode};

/// Correlation and timing data for one outbound dispatch
#[derive(Debug, Clone)]
pub struct DispatchLog {
    /// Unique identifier for this dispatch (for log correlation)
    pub trace_id: String,
    pub start_time: Instant,
    /// Adaptor handling this dispatch
    pub adaptor: &'static str,
    pub channel_id: i64,
    pub relay_mode: RelayMode,
    pub streaming: bool,
}

impl DispatchLog {
    pub fn new(adaptor: &'static str, info: &RelayInfo) -> Self {
        Self {
            trace_id: Uuid::new_v4().to_string()[..8].to_string(), // Short ID for readability
            start_time: Instant::now(),
            adaptor,
            channel_id: info.channel_id(),
            relay_mode: info.relay_mode,
            streaming: info.is_stream,
        }
    }

    /// Get elapsed time in milliseconds
    pub fn elapsed_ms(&self) -> u128 {
        self.start_time.elapsed().as_millis()
    }

    /// Log the start of a dispatch
    pub fn log_request_start(&self, kind: &str) {
        info!(
            trace_id = %self.trace_id,
            adaptor = %self.adaptor,
            channel_id = %self.channel_id,
            relay_mode = %self.relay_mode,
            streaming = %self.streaming,
            kind = %kind,
            "Dispatching request to upstream"
        );
    }

    /// Log the resolved upstream URL (debug mode only)
    pub fn log_url_resolved(&self, url: &str) {
        debug!(
            trace_id = %self.trace_id,
            adaptor = %self.adaptor,
            url = %url,
            "Resolved upstream URL"
        );
    }

    pub fn log_headers_prepared(&self, header_count: usize, override_count: usize) {
        debug!(
            trace_id = %self.trace_id,
            header_count = %header_count,
            override_count = %override_count,
            "Headers prepared for upstream request"
        );
    }

    pub fn log_upstream_response(&self, status: u16) {
        info!(
            trace_id = %self.trace_id,
            adaptor = %self.adaptor,
            channel_id = %self.channel_id,
            relay_mode = %self.relay_mode,
            status = %status,
            elapsed_ms = %self.elapsed_ms(),
            "Response received from upstream"
        );
    }

    pub fn log_upstream_error(&self, error: &str) {
        error!(
            trace_id = %self.trace_id,
            adaptor = %self.adaptor,
            channel_id = %self.channel_id,
            relay_mode = %self.relay_mode,
            streaming = %self.streaming,
            elapsed_ms = %self.elapsed_ms(),
            error = %error,
            "do request failed"
        );
    }

    pub fn log_websocket_connected(&self, url: &str) {
        info!(
            trace_id = %self.trace_id,
            adaptor = %self.adaptor,
            channel_id = %self.channel_id,
            url = %url,
            elapsed_ms = %self.elapsed_ms(),
            "Websocket connected to upstream"
        );
    }

    /// Create a tracing span for this dispatch
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "relay_dispatch",
            trace_id = %self.trace_id,
            adaptor = %self.adaptor,
            channel_id = %self.channel_id,
            relay_mode = %self.relay_mode,
            streaming = %self.streaming,
        )
    }
}

/// Install a fmt subscriber honouring `RUST_LOG`, falling back to `default_filter`
///
/// Safe to call more than once; only the first call has an effect.
pub fn init_tracing(default_filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with_target(true)
        .try_init();
}
