//! Error types for the relay dispatcher
//!
//! Construction-stage failures abort a dispatch before any network call.
//! Upstream failures are reported once and never retried here.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Message shown to clients when upstream transport errors are hidden
pub const HIDDEN_UPSTREAM_MESSAGE: &str = "upstream error: do request failed";

/// Dispatch-level errors
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("get request url failed: {0}")]
    UrlResolution(#[source] anyhow::Error),

    #[error("new request failed: {0}")]
    RequestConstruction(String),

    #[error("setup request header failed: {0}")]
    HeaderSetup(#[source] anyhow::Error),

    #[error("channel header override is invalid: {0}")]
    HeaderOverrideInvalid(String),

    #[error("new proxy http client failed: {0}")]
    ProxyClientConstruction(String),

    #[error("do request failed: {source}")]
    UpstreamSend {
        #[source]
        source: reqwest::Error,
        hide_message: bool,
    },

    #[error("dial failed to {url}: {source}")]
    WebsocketDial {
        url: String,
        #[source]
        source: tokio_tungstenite::tungstenite::Error,
    },

    #[error("SSE ping data send timeout")]
    KeepaliveSendTimeout,

    #[error("request context cancelled during ping")]
    KeepaliveSendCancelled,

    #[error("SSE ping error: {0}")]
    KeepaliveSend(String),
}

impl RelayError {
    /// Stable machine-readable code for logs and error bodies
    pub fn code(&self) -> &'static str {
        match self {
            RelayError::UrlResolution(_) => "URL_RESOLUTION_FAILED",
            RelayError::RequestConstruction(_) => "REQUEST_CONSTRUCTION_FAILED",
            RelayError::HeaderSetup(_) => "HEADER_SETUP_FAILED",
            RelayError::HeaderOverrideInvalid(_) => "CHANNEL_HEADER_OVERRIDE_INVALID",
            RelayError::ProxyClientConstruction(_) => "PROXY_CLIENT_CONSTRUCTION_FAILED",
            RelayError::UpstreamSend { .. } => "DO_REQUEST_FAILED",
            RelayError::WebsocketDial { .. } => "WEBSOCKET_DIAL_FAILED",
            RelayError::KeepaliveSendTimeout => "KEEPALIVE_SEND_TIMEOUT",
            RelayError::KeepaliveSendCancelled => "KEEPALIVE_SEND_CANCELLED",
            RelayError::KeepaliveSend(_) => "KEEPALIVE_SEND_FAILED",
        }
    }

    /// HTTP status reported to the inbound client
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::UpstreamSend { .. } | RelayError::WebsocketDial { .. } => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message that is safe to show the inbound client
    pub fn client_message(&self) -> String {
        match self {
            RelayError::UpstreamSend {
                hide_message: true, ..
            } => HIDDEN_UPSTREAM_MESSAGE.to_string(),
            _ => self.to_string(),
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Error details
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.code().to_string(),
                message: self.client_message(),
            },
        };

        (self.status(), Json(body)).into_response()
    }
}

/// Result type alias for convenience
pub type RelayResult<T> = Result<T, RelayError>;
