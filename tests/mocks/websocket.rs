//! Mock websocket upstream
//!
//! Accepts one connection and reports the handshake headers it received.

use axum::http::HeaderMap;
use futures::StreamExt;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

pub struct MockWebsocketUpstream {
    url: String,
    headers: oneshot::Receiver<HeaderMap>,
}

impl MockWebsocketUpstream {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind websocket listener");
        let addr = listener.local_addr().expect("listener address");
        let (headers_tx, headers_rx) = oneshot::channel();

        tokio::spawn(async move {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let callback = move |request: &Request, response: Response| {
                let _ = headers_tx.send(request.headers().clone());
                Ok::<Response, ErrorResponse>(response)
            };
            if let Ok(mut socket) = tokio_tungstenite::accept_hdr_async(stream, callback).await {
                // Hold the socket open until the client goes away.
                while let Some(Ok(_)) = socket.next().await {}
            }
        });

        Self {
            url: format!("ws://{addr}"),
            headers: headers_rx,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Handshake headers of the accepted connection
    pub async fn handshake_headers(self) -> HeaderMap {
        self.headers.await.expect("websocket handshake observed")
    }
}

/// Plain TCP listener that records the first byte a client sends
///
/// A TLS client opens with a handshake record (`0x16`); the listener then
/// hangs up without answering.
pub struct MockTlsListener {
    url: String,
    first_byte: oneshot::Receiver<u8>,
}

/// First byte of a TLS handshake record
pub const TLS_HANDSHAKE_RECORD: u8 = 0x16;

impl MockTlsListener {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind tls listener");
        let addr = listener.local_addr().expect("listener address");
        let (byte_tx, byte_rx) = oneshot::channel();

        tokio::spawn(async move {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            let mut buf = [0u8; 1];
            if let Ok(1) = stream.read(&mut buf).await {
                let _ = byte_tx.send(buf[0]);
            }
        });

        Self {
            url: format!("wss://{addr}"),
            first_byte: byte_rx,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn first_byte(self) -> Option<u8> {
        self.first_byte.await.ok()
    }
}
