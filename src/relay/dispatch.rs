//! Outbound request dispatch
//!
//! Four sends share one shape: resolve the URL through the adaptor, build
//! headers (adaptor first, channel overrides last), pick a transport and
//! issue the request. Streaming sends run the keepalive supervisor around
//! the network call.
//!
//! Request bodies are owned by the send functions and dropped on every
//! return path, success or failure.

use axum::http::{header, HeaderMap, Method};
use bytes::Bytes;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::Instrument;

use crate::config::{Config, GeneralSettings};
use crate::context::{RelayContext, RelayInfo};
use crate::error::{RelayError, RelayResult};
use crate::relay::adaptor::{Adaptor, TaskAdaptor};
use crate::relay::client::ClientSelector;
use crate::relay::header_override;
use crate::relay::headers::{apply_overrides, copy_inbound_header, setup_api_request_header};
use crate::relay::keepalive::KeepaliveSupervisor;
use crate::relay::logging::DispatchLog;

/// Upstream websocket connection
pub type UpstreamSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Builds and sends outbound requests for one relay instance
pub struct Dispatcher {
    clients: ClientSelector,
    settings: watch::Receiver<GeneralSettings>,
    hide_upstream_errors: bool,
    debug_enabled: bool,
}

impl Dispatcher {
    /// Create a dispatcher with its own pooled client
    pub fn new(config: &Config, settings: watch::Receiver<GeneralSettings>) -> RelayResult<Self> {
        Ok(Self::with_clients(ClientSelector::new(config)?, config, settings))
    }

    pub fn with_clients(
        clients: ClientSelector,
        config: &Config,
        settings: watch::Receiver<GeneralSettings>,
    ) -> Self {
        Self {
            clients,
            settings,
            hide_upstream_errors: config.hide_upstream_errors,
            debug_enabled: config.debug_enabled,
        }
    }

    pub fn clients(&self) -> &ClientSelector {
        &self.clients
    }

    /// Relay a JSON (or other opaque) body
    pub async fn send_json(
        &self,
        adaptor: &dyn Adaptor,
        inbound: &RelayContext,
        info: &RelayInfo,
        body: reqwest::Body,
    ) -> RelayResult<reqwest::Response> {
        let log = DispatchLog::new(adaptor.name(), info);
        let span = log.create_span();
        log.log_request_start("json");

        async {
            let url = self.resolve_url(adaptor, info, &log)?;
            let mut request = new_request(inbound.method.clone(), &url, body)?;

            setup_api_request_header(info, inbound, request.headers_mut());
            adaptor
                .setup_request_header(inbound, request.headers_mut(), info)
                .map_err(RelayError::HeaderSetup)?;
            self.merge_overrides(inbound, info, request.headers_mut(), &log)?;

            self.execute(request, inbound, info, &log).await
        }
        .instrument(span)
        .await
    }

    /// Relay a multipart form, preserving the inbound boundary
    pub async fn send_form(
        &self,
        adaptor: &dyn Adaptor,
        inbound: &RelayContext,
        info: &RelayInfo,
        body: reqwest::Body,
    ) -> RelayResult<reqwest::Response> {
        let log = DispatchLog::new(adaptor.name(), info);
        let span = log.create_span();
        log.log_request_start("form");

        async {
            let url = self.resolve_url(adaptor, info, &log)?;
            let mut request = new_request(inbound.method.clone(), &url, body)?;

            copy_inbound_header(inbound, request.headers_mut(), header::CONTENT_TYPE);
            adaptor
                .setup_request_header(inbound, request.headers_mut(), info)
                .map_err(RelayError::HeaderSetup)?;
            self.merge_overrides(inbound, info, request.headers_mut(), &log)?;

            self.execute(request, inbound, info, &log).await
        }
        .instrument(span)
        .await
    }

    /// Open a websocket to the upstream
    ///
    /// Only the handshake happens here; the caller drives the message
    /// exchange on the returned socket.
    pub async fn send_websocket(
        &self,
        adaptor: &dyn Adaptor,
        inbound: &RelayContext,
        info: &RelayInfo,
    ) -> RelayResult<UpstreamSocket> {
        let log = DispatchLog::new(adaptor.name(), info);
        let span = log.create_span();
        log.log_request_start("websocket");

        async {
            let url = self.resolve_url(adaptor, info, &log)?;

            let mut headers = HeaderMap::new();
            adaptor
                .setup_request_header(inbound, &mut headers, info)
                .map_err(RelayError::HeaderSetup)?;
            self.merge_overrides(inbound, info, &mut headers, &log)?;
            copy_inbound_header(inbound, &mut headers, header::CONTENT_TYPE);

            let dial_error = |source| RelayError::WebsocketDial {
                url: url.clone(),
                source,
            };
            let mut request = url.as_str().into_client_request().map_err(dial_error)?;
            request.headers_mut().extend(headers);

            let (socket, _response) = connect_async(request).await.map_err(dial_error)?;
            log.log_websocket_connected(&url);
            Ok::<_, RelayError>(socket)
        }
        .instrument(span)
        .await
    }

    /// Build a task submission request without sending it
    ///
    /// The body is held as `Bytes`, so the request can be cloned and
    /// replayed with [`reqwest::Request::try_clone`]. Channel header
    /// overrides are not applied; the task adaptor owns every header.
    pub fn build_task_request(
        &self,
        adaptor: &dyn TaskAdaptor,
        inbound: &RelayContext,
        info: &RelayInfo,
        body: Bytes,
    ) -> RelayResult<reqwest::Request> {
        let url = adaptor
            .build_request_url(info)
            .map_err(RelayError::UrlResolution)?;
        let mut request = new_request(inbound.method.clone(), &url, body.into())?;

        adaptor
            .build_request_header(inbound, &mut request, info)
            .map_err(RelayError::HeaderSetup)?;
        Ok(request)
    }

    /// Submit a task to an asynchronous job API
    pub async fn send_task(
        &self,
        adaptor: &dyn TaskAdaptor,
        inbound: &RelayContext,
        info: &RelayInfo,
        body: Bytes,
    ) -> RelayResult<reqwest::Response> {
        let log = DispatchLog::new(adaptor.name(), info);
        let span = log.create_span();
        log.log_request_start("task");

        async {
            let request = self.build_task_request(adaptor, inbound, info, body)?;
            self.execute(request, inbound, info, &log).await
        }
        .instrument(span)
        .await
    }

    /// Send an already-built request through the channel's transport
    pub async fn send_request(
        &self,
        request: reqwest::Request,
        inbound: &RelayContext,
        info: &RelayInfo,
    ) -> RelayResult<reqwest::Response> {
        let log = DispatchLog::new("direct", info);
        let span = log.create_span();
        log.log_request_start("direct");
        self.execute(request, inbound, info, &log)
            .instrument(span)
            .await
    }

    fn resolve_url(
        &self,
        adaptor: &dyn Adaptor,
        info: &RelayInfo,
        log: &DispatchLog,
    ) -> RelayResult<String> {
        let url = adaptor
            .get_request_url(info)
            .map_err(RelayError::UrlResolution)?;
        if self.debug_enabled {
            log.log_url_resolved(&url);
        }
        Ok(url)
    }

    fn merge_overrides(
        &self,
        inbound: &RelayContext,
        info: &RelayInfo,
        headers: &mut HeaderMap,
        log: &DispatchLog,
    ) -> RelayResult<()> {
        let overrides = header_override::resolve(&inbound.headers, Some(info))?;
        apply_overrides(headers, &overrides)?;
        log.log_headers_prepared(headers.len(), overrides.len());
        Ok(())
    }

    async fn execute(
        &self,
        request: reqwest::Request,
        inbound: &RelayContext,
        info: &RelayInfo,
        log: &DispatchLog,
    ) -> RelayResult<reqwest::Response> {
        let client = self.clients.select(info.proxy.as_deref())?;

        let pinger = if info.is_stream {
            inbound.downstream().set_event_stream_headers();
            let settings = *self.settings.borrow();
            (settings.ping_interval_enabled && !info.disable_ping).then(|| {
                KeepaliveSupervisor::start(
                    settings.ping_interval(),
                    inbound.cancellation().clone(),
                    inbound.downstream().clone(),
                )
            })
        } else {
            None
        };

        let result = client.execute(request).await;

        if let Some(pinger) = pinger {
            pinger.stop().await;
        }

        match result {
            Ok(response) => {
                log.log_upstream_response(response.status().as_u16());
                Ok(response)
            }
            Err(e) => {
                log.log_upstream_error(&e.to_string());
                Err(RelayError::UpstreamSend {
                    source: e,
                    hide_message: self.hide_upstream_errors,
                })
            }
        }
    }
}

fn new_request(method: Method, url: &str, body: reqwest::Body) -> RelayResult<reqwest::Request> {
    let parsed = reqwest::Url::parse(url)
        .map_err(|e| RelayError::RequestConstruction(format!("invalid url {url}: {e}")))?;
    let mut request = reqwest::Request::new(method, parsed);
    *request.body_mut() = Some(body);
    Ok(request)
}
