//! Failure path tests
//!
//! Every failure before the network call must leave the upstream untouched.

use axum::http::{Method, StatusCode};
use serde_json::json;

use crate::common::{channel_info, dispatcher, inbound, TestAdaptor};
use crate::mocks::MockUpstream;
use relay_dispatch::error::HIDDEN_UPSTREAM_MESSAGE;
use relay_dispatch::{Config, RelayError};

#[tokio::test]
async fn test_url_resolution_failure_sends_nothing() {
    let upstream = MockUpstream::start().await;
    upstream.mock_chat_completion_success().await;

    let (dispatcher, _settings) = dispatcher(&Config::default());
    let mut adaptor = TestAdaptor::new(upstream.uri());
    adaptor.fail_url = true;
    let (ctx, _) = inbound(Method::POST, &[]);

    let err = dispatcher
        .send_json(&adaptor, &ctx, &channel_info(json!({})), "{}".into())
        .await
        .unwrap_err();

    assert!(matches!(err, RelayError::UrlResolution(_)));
    assert!(err.to_string().starts_with("get request url failed"));
    assert!(upstream.received_requests().await.is_empty());
}

#[tokio::test]
async fn test_header_setup_failure_sends_nothing() {
    let upstream = MockUpstream::start().await;
    upstream.mock_chat_completion_success().await;

    let (dispatcher, _settings) = dispatcher(&Config::default());
    let mut adaptor = TestAdaptor::new(upstream.uri());
    adaptor.fail_header = true;
    let (ctx, _) = inbound(Method::POST, &[]);

    let err = dispatcher
        .send_form(&adaptor, &ctx, &channel_info(json!({})), "".into())
        .await
        .unwrap_err();

    assert!(matches!(err, RelayError::HeaderSetup(_)));
    assert!(upstream.received_requests().await.is_empty());
}

#[tokio::test]
async fn test_non_string_override_is_a_configuration_error() {
    let upstream = MockUpstream::start().await;
    upstream.mock_chat_completion_success().await;

    let (dispatcher, _settings) = dispatcher(&Config::default());
    let adaptor = TestAdaptor::new(upstream.uri());
    let (ctx, _) = inbound(Method::POST, &[]);
    let info = channel_info(json!({"X-Retries": 3}));

    let err = dispatcher
        .send_json(&adaptor, &ctx, &info, "{}".into())
        .await
        .unwrap_err();

    assert!(matches!(err, RelayError::HeaderOverrideInvalid(_)));
    assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(upstream.received_requests().await.is_empty());
}

#[tokio::test]
async fn test_unencodable_override_value_is_rejected() {
    let upstream = MockUpstream::start().await;
    upstream.mock_chat_completion_success().await;

    let (dispatcher, _settings) = dispatcher(&Config::default());
    let adaptor = TestAdaptor::new(upstream.uri());
    let (ctx, _) = inbound(Method::POST, &[]);
    let info = channel_info(json!({"X-Note": "line\r\nInjected: yes"}));

    let err = dispatcher
        .send_json(&adaptor, &ctx, &info, "{}".into())
        .await
        .unwrap_err();

    assert!(matches!(err, RelayError::HeaderOverrideInvalid(_)));
    assert!(upstream.received_requests().await.is_empty());
}

#[tokio::test]
async fn test_invalid_proxy_fails_without_direct_fallback() {
    let upstream = MockUpstream::start().await;
    upstream.mock_chat_completion_success().await;

    let (dispatcher, _settings) = dispatcher(&Config::default());
    let adaptor = TestAdaptor::new(upstream.uri());
    let (ctx, _) = inbound(Method::POST, &[]);
    let mut info = channel_info(json!({}));
    info.proxy = Some("ftp://proxy.local:21".to_string());

    let err = dispatcher
        .send_json(&adaptor, &ctx, &info, "{}".into())
        .await
        .unwrap_err();

    assert!(matches!(err, RelayError::ProxyClientConstruction(_)));
    assert!(upstream.received_requests().await.is_empty());
    assert_eq!(dispatcher.clients().cached_proxy_clients(), 0);
}

#[tokio::test]
async fn test_connection_refused_hides_transport_detail() {
    let (dispatcher, _settings) = dispatcher(&Config::default());
    let adaptor = TestAdaptor::new("http://127.0.0.1:1");
    let (ctx, _) = inbound(Method::POST, &[]);

    let err = dispatcher
        .send_json(&adaptor, &ctx, &channel_info(json!({})), "{}".into())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        RelayError::UpstreamSend {
            hide_message: true,
            ..
        }
    ));
    assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(err.client_message(), HIDDEN_UPSTREAM_MESSAGE);
}

#[tokio::test]
async fn test_connection_refused_with_visible_errors() {
    let config = Config {
        hide_upstream_errors: false,
        ..Config::default()
    };
    let (dispatcher, _settings) = dispatcher(&config);
    let adaptor = TestAdaptor::new("http://127.0.0.1:1");
    let (ctx, _) = inbound(Method::POST, &[]);

    let err = dispatcher
        .send_json(&adaptor, &ctx, &channel_info(json!({})), "{}".into())
        .await
        .unwrap_err();

    assert!(err.client_message().starts_with("do request failed"));
}
