//! Task API submission tests

use axum::http::Method;
use bytes::Bytes;
use pretty_assertions::assert_eq;
use serde_json::json;

use crate::common::{channel_info, constants, dispatcher, inbound, TestTaskAdaptor};
use crate::mocks::{header_str, MockUpstream};
use relay_dispatch::{Config, RelayMode};

fn task_body() -> Bytes {
    Bytes::from(json!({"prompt": "a cat surfing", "duration": 5}).to_string())
}

#[tokio::test]
async fn test_task_request_is_replayable() {
    let (dispatcher, _settings) = dispatcher(&Config::default());
    let adaptor = TestTaskAdaptor {
        base_url: "http://upstream.invalid".to_string(),
    };
    let (ctx, _) = inbound(Method::POST, &[]);
    let mut info = channel_info(json!({}));
    info.relay_mode = RelayMode::Task;

    let request = dispatcher
        .build_task_request(&adaptor, &ctx, &info, task_body())
        .unwrap();

    let replay = request.try_clone().expect("byte bodies can be cloned");
    assert_eq!(replay.url().as_str(), "http://upstream.invalid/v1/video/generations");
    assert_eq!(
        replay.body().and_then(|b| b.as_bytes()),
        Some(task_body().as_ref())
    );
    assert_eq!(replay.headers()["content-type"], "application/json");
}

#[tokio::test]
async fn test_task_send_ignores_channel_overrides() {
    let upstream = MockUpstream::start().await;
    upstream.mock_task_submit_success().await;

    let (dispatcher, _settings) = dispatcher(&Config::default());
    let adaptor = TestTaskAdaptor {
        base_url: upstream.uri(),
    };
    let (ctx, _) = inbound(Method::POST, &[("content-type", "text/plain")]);
    let mut info = channel_info(json!({
        "Authorization": "Bearer override",
        "X-Extra": "extra"
    }));
    info.relay_mode = RelayMode::Task;

    let response = dispatcher
        .send_task(&adaptor, &ctx, &info, task_body())
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let received = upstream.only_request().await;
    assert_eq!(
        header_str(&received, "authorization"),
        format!("Bearer {}", constants::TEST_API_KEY)
    );
    assert_eq!(header_str(&received, "x-extra"), "");
    assert_eq!(header_str(&received, "content-type"), "application/json");
    assert_eq!(received.body, task_body().to_vec());
}

#[tokio::test]
async fn test_built_task_request_can_be_sent_twice() {
    let upstream = MockUpstream::start().await;
    upstream.mock_task_submit_success().await;

    let (dispatcher, _settings) = dispatcher(&Config::default());
    let adaptor = TestTaskAdaptor {
        base_url: upstream.uri(),
    };
    let (ctx, _) = inbound(Method::POST, &[]);
    let info = channel_info(json!({}));

    let request = dispatcher
        .build_task_request(&adaptor, &ctx, &info, task_body())
        .unwrap();
    let replay = request.try_clone().unwrap();

    dispatcher.send_request(request, &ctx, &info).await.unwrap();
    dispatcher.send_request(replay, &ctx, &info).await.unwrap();

    let requests = upstream.received_requests().await;
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].body, requests[1].body);
}
