//! End-to-end tests against a transport bound to an ephemeral port.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use pretty_assertions::assert_eq;
use reqwest::StatusCode;
use serde_json::{Value, json};
use tidemcp_core::{Request, Response};
use tidemcp_http::{
    CancellationToken, Delivery, HttpConfig, HttpSseTransport, RequestStream, SESSION_ID_HEADER,
    Transport, TransportError,
};
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

type ByteStream = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

struct Server {
    transport: Arc<HttpSseTransport>,
    requests: RequestStream,
    base: String,
    client: reqwest::Client,
}

impl Server {
    async fn start(config: HttpConfig) -> Self {
        let transport = Arc::new(HttpSseTransport::new(HttpConfig {
            port: 0,
            ..config
        }));
        let requests = transport.receive().unwrap();
        transport.start(CancellationToken::new()).await.unwrap();
        let addr = transport.local_addr().expect("bound address");

        Self {
            transport,
            requests,
            base: format!("http://{addr}"),
            client: reqwest::Client::new(),
        }
    }

    async fn subscribe(&self) -> SseClient {
        let response = self
            .client
            .get(format!("{}/sse", self.base))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let header_id = response.headers()[SESSION_ID_HEADER]
            .to_str()
            .unwrap()
            .to_string();

        let mut client = SseClient {
            stream: Box::pin(response.bytes_stream()),
            buffer: String::new(),
            endpoint: String::new(),
        };
        let (event, data) = client.next_event().await.expect("endpoint event");
        assert_eq!(event, "endpoint");
        assert_eq!(data, format!("/message?sessionId={header_id}"));
        client.endpoint = data;
        client
    }

    async fn publish(&self, session: &SseClient, body: impl Into<reqwest::Body>) -> StatusCode {
        self.client
            .post(format!("{}{}", self.base, session.endpoint))
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await
            .unwrap()
            .status()
    }

    async fn next_request(&mut self) -> Option<Request> {
        timeout(WAIT, self.requests.next())
            .await
            .expect("timed out waiting for request")
    }
}

/// Minimal SSE reader: one `(event, data)` pair per blank-line-delimited block,
/// comment-only blocks skipped.
struct SseClient {
    stream: ByteStream,
    buffer: String,
    endpoint: String,
}

impl SseClient {
    /// Next raw blank-line-delimited block, comments included.
    async fn next_block(&mut self) -> Option<String> {
        loop {
            if let Some(pos) = self.buffer.find("\n\n") {
                return Some(self.buffer.drain(..pos + 2).collect());
            }

            let chunk = timeout(WAIT, self.stream.next())
                .await
                .expect("timed out waiting for event")?;
            self.buffer
                .push_str(&String::from_utf8_lossy(&chunk.ok()?));
        }
    }

    async fn next_event(&mut self) -> Option<(String, String)> {
        loop {
            let block = self.next_block().await?;
            let mut event = String::from("message");
            let mut data = Vec::new();
            for line in block.lines() {
                if let Some(rest) = line.strip_prefix("event:") {
                    event = rest.trim().to_string();
                } else if let Some(rest) = line.strip_prefix("data:") {
                    data.push(rest.trim_start().to_string());
                }
            }
            if data.is_empty() {
                continue;
            }
            return Some((event, data.join("\n")));
        }
    }

    async fn next_message(&mut self) -> Value {
        let (event, data) = self.next_event().await.expect("stream ended");
        assert_eq!(event, "message");
        serde_json::from_str(&data).unwrap()
    }

    async fn assert_no_message(&mut self) {
        assert!(
            timeout(Duration::from_millis(200), self.next_event())
                .await
                .is_err(),
            "expected no message"
        );
    }
}

async fn wait_for_sessions(transport: &HttpSseTransport, expected: usize) {
    timeout(WAIT, async {
        while transport.session_count() != expected {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("session count never settled");
}

#[tokio::test]
async fn test_request_and_routed_reply() {
    let mut server = Server::start(HttpConfig::default()).await;
    let mut session = server.subscribe().await;
    assert_eq!(server.transport.session_count(), 1);

    let status = server
        .publish(&session, r#"{"jsonrpc":"2.0","id":1,"method":"initialize"}"#)
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let request = server.next_request().await.unwrap();
    assert_eq!(request.method, "initialize");
    assert!(request.origin.is_some());

    let reply = Response::reply_to(&request).with_result(json!({"ok": true}));
    server.transport.send(reply).await.unwrap();

    assert_eq!(
        session.next_message().await,
        json!({"jsonrpc": "2.0", "id": 1, "result": {"ok": true}})
    );
}

#[tokio::test]
async fn test_routed_reply_reaches_only_origin() {
    let mut server = Server::start(HttpConfig::default()).await;
    let mut first = server.subscribe().await;
    let mut second = server.subscribe().await;

    server
        .publish(&second, r#"{"jsonrpc":"2.0","id":"b","method":"ping"}"#)
        .await;
    let request = server.next_request().await.unwrap();
    server
        .transport
        .send(Response::reply_to(&request).with_result(json!({})))
        .await
        .unwrap();

    assert_eq!(second.next_message().await["id"], json!("b"));
    first.assert_no_message().await;
}

#[tokio::test]
async fn test_broadcast_mode_reaches_every_session() {
    let mut server = Server::start(HttpConfig {
        delivery: Delivery::Broadcast,
        ..Default::default()
    })
    .await;
    let mut first = server.subscribe().await;
    let mut second = server.subscribe().await;

    server
        .publish(&first, r#"{"jsonrpc":"2.0","id":3,"method":"ping"}"#)
        .await;
    let request = server.next_request().await.unwrap();
    server
        .transport
        .send(Response::reply_to(&request).with_result(json!({})))
        .await
        .unwrap();

    assert_eq!(first.next_message().await["id"], json!(3));
    assert_eq!(second.next_message().await["id"], json!(3));
}

#[tokio::test]
async fn test_malformed_body_errors_on_stream() {
    let mut server = Server::start(HttpConfig::default()).await;
    let mut session = server.subscribe().await;

    let status = server.publish(&session, "{invalid json}").await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let message = session.next_message().await;
    assert_eq!(message["error"]["code"], json!(-32700));
    assert_eq!(message["id"], Value::Null);

    let status = server
        .publish(&session, r#"{"jsonrpc":"1.0","id":9,"method":"ping"}"#)
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let message = session.next_message().await;
    assert_eq!(message["error"]["code"], json!(-32600));
    assert_eq!(message["id"], json!(9));

    // Neither reached the inbound queue
    server
        .publish(&session, r#"{"jsonrpc":"2.0","id":10,"method":"ping"}"#)
        .await;
    assert_eq!(server.next_request().await.unwrap().id, Some(10.into()));
    assert_eq!(server.transport.metrics().protocol_errors, 2);
}

#[tokio::test]
async fn test_unknown_session_is_rejected() {
    let server = Server::start(HttpConfig::default()).await;

    let status = server
        .client
        .post(format!("{}/message?sessionId=nope", server.base))
        .body(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#)
        .send()
        .await
        .unwrap()
        .status();
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let status = server
        .client
        .get(format!("{}/message", server.base))
        .send()
        .await
        .unwrap()
        .status();
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_concurrent_publishes_all_arrive() {
    const N: i64 = 24;
    let mut server = Server::start(HttpConfig {
        inbound_capacity: 32,
        ..Default::default()
    })
    .await;
    let session = server.subscribe().await;
    let url = format!("{}{}", server.base, session.endpoint);

    let mut calls = Vec::new();
    for i in 0..N {
        let client = server.client.clone();
        let url = url.clone();
        calls.push(tokio::spawn(async move {
            client
                .post(url)
                .body(format!(r#"{{"jsonrpc":"2.0","id":{i},"method":"ping"}}"#))
                .send()
                .await
                .unwrap()
                .status()
        }));
    }
    for call in calls {
        assert_eq!(call.await.unwrap(), StatusCode::ACCEPTED);
    }

    let mut ids = Vec::new();
    for _ in 0..N {
        let request = server.next_request().await.unwrap();
        match request.id {
            Some(tidemcp_core::RequestId::Number(n)) => ids.push(n),
            other => panic!("unexpected id {other:?}"),
        }
    }
    ids.sort_unstable();
    assert_eq!(ids, (0..N).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_full_inbound_queue_returns_503() {
    let mut server = Server::start(HttpConfig {
        inbound_capacity: 2,
        ..Default::default()
    })
    .await;
    let mut session = server.subscribe().await;

    for id in 1..=2 {
        let status = server
            .publish(
                &session,
                format!(r#"{{"jsonrpc":"2.0","id":{id},"method":"ping"}}"#),
            )
            .await;
        assert_eq!(status, StatusCode::ACCEPTED);
    }

    let status = server
        .publish(&session, r#"{"jsonrpc":"2.0","id":3,"method":"ping"}"#)
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let message = session.next_message().await;
    assert_eq!(message["id"], json!(3));
    assert_eq!(message["error"]["code"], json!(-32603));
    assert_eq!(message["error"]["data"], json!("request queue full"));
    assert_eq!(server.transport.metrics().requests_rejected, 1);

    // Draining the queue makes room again
    assert!(server.next_request().await.is_some());
    let status = server
        .publish(&session, r#"{"jsonrpc":"2.0","id":4,"method":"ping"}"#)
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
}

#[tokio::test]
async fn test_disconnect_deregisters_session() {
    let server = Server::start(HttpConfig {
        keep_alive_secs: 1,
        ..Default::default()
    })
    .await;
    let session = server.subscribe().await;
    assert_eq!(server.transport.session_count(), 1);

    drop(session);
    wait_for_sessions(&server.transport, 0).await;

    let err = server
        .transport
        .send(Response::success(Some(1.into()), json!({})))
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::NoActiveSessions));
}

#[tokio::test]
async fn test_idle_stream_receives_keep_alive_comment() {
    let server = Server::start(HttpConfig {
        keep_alive_secs: 1,
        ..Default::default()
    })
    .await;
    let mut session = server.subscribe().await;

    let block = timeout(Duration::from_secs(3), session.next_block())
        .await
        .expect("no keep-alive within the interval")
        .expect("stream ended");
    assert!(
        block
            .lines()
            .any(|line| line.strip_prefix(':').map(str::trim) == Some("keep-alive")),
        "expected a keep-alive comment, got {block:?}"
    );
    assert_eq!(server.transport.session_count(), 1);
}

#[tokio::test]
async fn test_close_ends_streams() {
    let mut server = Server::start(HttpConfig {
        shutdown_grace_secs: 2,
        ..Default::default()
    })
    .await;
    let mut session = server.subscribe().await;

    server.transport.close().await.unwrap();

    assert!(session.next_event().await.is_none());
    assert!(server.next_request().await.is_none());
    assert_eq!(server.transport.session_count(), 0);
    assert!(matches!(
        server
            .transport
            .send(Response::success(Some(1.into()), json!({})))
            .await,
        Err(TransportError::Closed)
    ));
}

#[tokio::test]
async fn test_cancellation_ends_request_stream() {
    let transport = HttpSseTransport::new(HttpConfig {
        port: 0,
        ..Default::default()
    });
    let mut requests = transport.receive().unwrap();
    let token = CancellationToken::new();
    transport.start(token.clone()).await.unwrap();

    token.cancel();
    assert!(timeout(WAIT, requests.next()).await.unwrap().is_none());
    transport.close().await.unwrap();
}

#[tokio::test]
async fn test_start_is_idempotent() {
    let server = Server::start(HttpConfig::default()).await;
    let addr = server.transport.local_addr();

    server
        .transport
        .start(CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(server.transport.local_addr(), addr);
    assert_eq!(
        server.transport.endpoint(),
        Some(format!("{}/sse", server.base))
    );
}
