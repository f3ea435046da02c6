//! SSE (Server-Sent Events) downstream writers
//!
//! The dispatcher never writes response bodies itself. During a streaming
//! send it only needs two things from the inbound side: a way to mark the
//! response as an event stream, and a way to push keepalive frames so idle
//! proxies between us and the client do not drop the connection.

use std::convert::Infallible;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue};
use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// SSE comment frame used as keepalive
pub const PING_FRAME: &[u8] = b": PING\n\n";

/// Media type of an SSE response
pub const EVENT_STREAM: &str = "text/event-stream";

/// Inbound response writer as seen by the dispatcher
#[async_trait]
pub trait Downstream: Send + Sync {
    /// Mark the inbound response as an event stream
    fn set_event_stream_headers(&self);

    /// Write and flush one keepalive frame
    ///
    /// May block when the client stops reading; callers bound it with a
    /// timeout.
    async fn ping(&self) -> Result<()>;
}

/// Downstream backed by a bounded channel feeding an axum body
///
/// # Example
/// ```
/// use relay_dispatch::streaming::{into_body, SseDownstream};
///
/// let (downstream, rx) = SseDownstream::channel(16);
/// let body = into_body(rx);
/// # drop((downstream, body));
/// ```
pub struct SseDownstream {
    sender: mpsc::Sender<Bytes>,
    headers: Mutex<HeaderMap>,
}

impl SseDownstream {
    /// Create a downstream and the receiver the response body reads from
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<Bytes>) {
        let (sender, receiver) = mpsc::channel(buffer);
        let downstream = Self {
            sender,
            headers: Mutex::new(HeaderMap::new()),
        };
        (downstream, receiver)
    }

    /// Headers recorded for the inbound response so far
    pub fn response_headers(&self) -> HeaderMap {
        self.headers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Forward an already-framed chunk to the client
    pub async fn send(&self, chunk: Bytes) -> Result<()> {
        self.sender
            .send(chunk)
            .await
            .map_err(|_| anyhow!("client disconnected"))
    }
}

#[async_trait]
impl Downstream for SseDownstream {
    fn set_event_stream_headers(&self) {
        let mut headers = self
            .headers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(EVENT_STREAM));
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    }

    async fn ping(&self) -> Result<()> {
        self.send(Bytes::from_static(PING_FRAME)).await
    }
}

/// Turn the receiving half of an [`SseDownstream`] into a response body
pub fn into_body(receiver: mpsc::Receiver<Bytes>) -> Body {
    Body::from_stream(ReceiverStream::new(receiver).map(Ok::<_, Infallible>))
}
