//! Per-request relay context
//!
//! Built by the inbound layer for every client request and handed to the
//! dispatcher read-only.

use std::fmt;
use std::sync::Arc;

use axum::http::{HeaderMap, Method};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::streaming::Downstream;

/// How the inbound request was classified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RelayMode {
    #[default]
    Chat,
    AudioTranscription,
    AudioTranslation,
    /// Websocket realtime session
    Realtime,
    /// Asynchronous task submission
    Task,
}

impl RelayMode {
    /// Audio uploads are relayed as multipart forms
    pub fn is_multipart_form(self) -> bool {
        matches!(self, RelayMode::AudioTranscription | RelayMode::AudioTranslation)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RelayMode::Chat => "chat",
            RelayMode::AudioTranscription => "audio_transcription",
            RelayMode::AudioTranslation => "audio_translation",
            RelayMode::Realtime => "realtime",
            RelayMode::Task => "task",
        }
    }
}

impl fmt::Display for RelayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Channel identity and credential
#[derive(Debug, Clone, Default)]
pub struct ChannelMeta {
    pub channel_id: i64,
    /// Resolved upstream API key, substituted for `{api_key}` in overrides
    pub api_key: String,
}

/// Resolved routing information for one relay
#[derive(Debug, Clone, Default)]
pub struct RelayInfo {
    pub relay_mode: RelayMode,
    pub is_stream: bool,
    /// Per-request opt-out of SSE keepalive pings
    pub disable_ping: bool,
    pub channel_meta: Option<ChannelMeta>,
    /// Proxy URL configured on the channel
    pub proxy: Option<String>,
    /// Raw header override configuration as stored on the channel
    pub headers_override: Map<String, Value>,
}

impl RelayInfo {
    /// Channel id for logging, -1 when no channel is attached
    pub fn channel_id(&self) -> i64 {
        self.channel_meta.as_ref().map_or(-1, |meta| meta.channel_id)
    }
}

/// Handle on the inbound client request
///
/// Carries the request line and headers, the cancellation token tied to
/// the client connection, and the downstream writer used for SSE pings.
#[derive(Clone)]
pub struct RelayContext {
    pub method: Method,
    pub headers: HeaderMap,
    cancel: CancellationToken,
    downstream: Arc<dyn Downstream>,
}

impl RelayContext {
    pub fn new(method: Method, headers: HeaderMap, downstream: Arc<dyn Downstream>) -> Self {
        Self {
            method,
            headers,
            cancel: CancellationToken::new(),
            downstream,
        }
    }

    /// Tie this context to an existing connection lifetime
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// First value of `name`, or an empty string when absent or not UTF-8
    pub fn header(&self, name: &str) -> &str {
        header_value(&self.headers, name)
    }

    /// Fires when the inbound client goes away
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn downstream(&self) -> &Arc<dyn Downstream> {
        &self.downstream
    }
}

impl fmt::Debug for RelayContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayContext")
            .field("method", &self.method)
            .field("headers", &self.headers)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// First value of `name` in `headers`, empty when absent
///
/// Names that are not valid header names simply never match.
pub fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
}
