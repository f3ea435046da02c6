//! Mock HTTP upstream
//!
//! ```rust,ignore
//! let upstream = MockUpstream::start().await;
//! upstream.mock_chat_completion_success().await;
//! // point a TestAdaptor at upstream.uri()
//! ```

use std::time::Duration;

use serde_json::{json, Value};
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, Request, ResponseTemplate,
};

use crate::common::constants;

/// Mock upstream server wrapper
pub struct MockUpstream {
    server: MockServer,
}

impl MockUpstream {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    pub fn chat_completion_body() -> Value {
        json!({
            "id": "chatcmpl-test",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "Hello"},
                "finish_reason": "stop"
            }]
        })
    }

    pub async fn mock_chat_completion_success(&self) {
        Mock::given(method("POST"))
            .and(path(constants::CHAT_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(Self::chat_completion_body()))
            .mount(&self.server)
            .await;
    }

    /// Streaming response that only starts after `delay`
    pub async fn mock_chat_completion_delayed(&self, delay: Duration) {
        Mock::given(method("POST"))
            .and(path(constants::CHAT_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string("data: [DONE]\n\n")
                    .set_delay(delay),
            )
            .mount(&self.server)
            .await;
    }

    pub async fn mock_transcription_success(&self) {
        Mock::given(method("POST"))
            .and(path(constants::TRANSCRIPTION_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"text": "hello"})))
            .mount(&self.server)
            .await;
    }

    pub async fn mock_task_submit_success(&self) {
        Mock::given(method("POST"))
            .and(path(constants::TASK_PATH))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"task_id": "task_123"})),
            )
            .mount(&self.server)
            .await;
    }

    pub async fn received_requests(&self) -> Vec<Request> {
        self.server.received_requests().await.unwrap_or_default()
    }

    /// The single request the upstream saw
    pub async fn only_request(&self) -> Request {
        let mut requests = self.received_requests().await;
        assert_eq!(requests.len(), 1, "expected exactly one upstream request");
        requests.remove(0)
    }
}

/// Header value as a string, empty when absent
pub fn header_str<'a>(request: &'a Request, name: &str) -> &'a str {
    request
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}
