//! The consumption loop driven end-to-end over an in-memory line transport.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tidemcp::{
    BuiltinDispatcher, CancellationToken, Dispatcher, HttpConfig, HttpSseTransport, Request,
    Response, StdioConfig, StdioTransport, Transport, TransportState, serve,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines};
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

struct Client {
    input: DuplexStream,
    output: Lines<BufReader<DuplexStream>>,
}

impl Client {
    async fn send(&mut self, line: &str) {
        self.input
            .write_all(format!("{line}\n").as_bytes())
            .await
            .unwrap();
    }

    async fn recv(&mut self) -> Value {
        let line = timeout(WAIT, self.output.next_line())
            .await
            .expect("timed out waiting for response")
            .unwrap()
            .expect("output closed");
        serde_json::from_str(&line).unwrap()
    }
}

fn line_transport() -> (Arc<StdioTransport>, Client) {
    let (input, server_in) = tokio::io::duplex(64 * 1024);
    let (server_out, client_out) = tokio::io::duplex(64 * 1024);
    let transport = StdioTransport::from_raw(server_in, server_out, StdioConfig::default());
    let client = Client {
        input,
        output: BufReader::new(client_out).lines(),
    };
    (Arc::new(transport), client)
}

#[tokio::test]
async fn test_serve_answers_over_stdio() {
    let (transport, mut client) = line_transport();
    let server = tokio::spawn(serve(
        transport.clone(),
        Arc::new(BuiltinDispatcher::new("test-server", "0.0.1")),
        CancellationToken::new(),
    ));

    client
        .send(r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2025-06-18"}}"#)
        .await;
    let response = client.recv().await;
    assert_eq!(response["id"], json!(1));
    assert_eq!(response["result"]["serverInfo"]["name"], json!("test-server"));
    assert_eq!(response["result"]["protocolVersion"], json!("2025-06-18"));

    // Notifications get no reply; the ping after it is answered next
    client
        .send(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
        .await;
    client.send(r#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#).await;
    assert_eq!(
        client.recv().await,
        json!({"jsonrpc": "2.0", "id": 2, "result": {}})
    );

    client
        .send(r#"{"jsonrpc":"2.0","id":"x","method":"tools/list"}"#)
        .await;
    let response = client.recv().await;
    assert_eq!(response["id"], json!("x"));
    assert_eq!(response["error"]["code"], json!(-32601));

    client.send("{invalid json}").await;
    assert_eq!(client.recv().await["error"]["code"], json!(-32700));

    // End of input ends the loop and closes the transport
    client.input.shutdown().await.unwrap();
    timeout(WAIT, server).await.unwrap().unwrap().unwrap();
    assert_eq!(transport.state().await, TransportState::Closed);
}

/// Replies only after a delay chosen by the request.
struct SlowDispatcher;

#[async_trait]
impl Dispatcher for SlowDispatcher {
    async fn dispatch(&self, request: Request) -> Option<Response> {
        let delay = request
            .params
            .as_ref()
            .and_then(|p| p["delay_ms"].as_u64())
            .unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(delay)).await;
        Some(Response::reply_to(&request).with_result(json!({"delay_ms": delay})))
    }
}

#[tokio::test]
async fn test_slow_request_does_not_block_later_ones() {
    let (transport, mut client) = line_transport();
    let server = tokio::spawn(serve(
        transport,
        Arc::new(SlowDispatcher),
        CancellationToken::new(),
    ));

    client
        .send(r#"{"jsonrpc":"2.0","id":"slow","method":"work","params":{"delay_ms":400}}"#)
        .await;
    client
        .send(r#"{"jsonrpc":"2.0","id":"fast","method":"work","params":{"delay_ms":0}}"#)
        .await;

    assert_eq!(client.recv().await["id"], json!("fast"));
    assert_eq!(client.recv().await["id"], json!("slow"));

    // In-flight handlers finish before the loop returns
    client
        .send(r#"{"jsonrpc":"2.0","id":"last","method":"work","params":{"delay_ms":200}}"#)
        .await;
    client.input.shutdown().await.unwrap();
    assert_eq!(client.recv().await["id"], json!("last"));
    timeout(WAIT, server).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn test_cancellation_stops_http_serve() {
    let transport = Arc::new(HttpSseTransport::new(HttpConfig {
        port: 0,
        ..Default::default()
    }));
    let shutdown = CancellationToken::new();
    let server = tokio::spawn(serve(
        transport.clone(),
        Arc::new(BuiltinDispatcher::default()),
        shutdown.clone(),
    ));

    timeout(WAIT, async {
        while transport.local_addr().is_none() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("server never bound");

    shutdown.cancel();
    timeout(WAIT, server).await.unwrap().unwrap().unwrap();
    assert_eq!(transport.state().await, TransportState::Closed);
}
