//! End-to-end tests over a real TCP connection.

use std::time::Duration;

use meridian_core::{HttpError, Value};
use meridian_extract::{DeclaredType, MetadataStore, RouteMetadata, RouteParamDescriptor};
use meridian_pipeline::{ApiController, Dispatcher, PassThrough};
use meridian_server::{Server, ShutdownSignal};
use meridian_telemetry::AccessLog;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

fn dispatcher() -> Dispatcher {
    let store = MetadataStore::builder()
        .route(RouteMetadata::get("notes", "show", "/notes/{id}").declare(DeclaredType::NUMBER))
        .param(RouteParamDescriptor::path(0, "id"))
        .route(RouteMetadata::post("notes", "create", "/notes").declare(DeclaredType::STRING))
        .param(RouteParamDescriptor::body(0, "title"))
        .build()
        .unwrap();

    let mut builder = Dispatcher::builder(store);
    builder
        .controller("notes", || ApiController::new(PassThrough))
        .unwrap()
        .action("show", |_, args| async move {
            match args.get(0) {
                Value::Number(n) if *n == 1.0 => Ok(Value::from("first")),
                _ => Err(HttpError::not_found("Note not found")),
            }
        })
        .action("create", |_, args| async move { args.get(0).clone() });
    builder.build().unwrap()
}

async fn start() -> (std::net::SocketAddr, ShutdownSignal, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = ShutdownSignal::new();

    let server = Server::builder(dispatcher())
        .access_log(AccessLog::new("notes-test").with_metrics(false))
        .request_timeout(Duration::from_secs(2))
        .shutdown_timeout(Duration::from_secs(1))
        .build();

    let signal = shutdown.clone();
    let handle = tokio::spawn(async move {
        server.serve(listener, signal).await.unwrap();
    });
    (addr, shutdown, handle)
}

async fn send(addr: std::net::SocketAddr, request: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await.unwrap();
    String::from_utf8(raw).unwrap()
}

fn body_of(response: &str) -> &str {
    response.split("\r\n\r\n").nth(1).unwrap_or_default()
}

#[tokio::test]
async fn test_get_success_envelope() {
    let (addr, shutdown, handle) = start().await;

    let response = send(addr, "GET /notes/1 HTTP/1.1\r\nHost: test\r\nConnection: close\r\n\r\n").await;
    assert!(response.starts_with("HTTP/1.1 200 OK"), "{response}");
    assert!(response.to_lowercase().contains("content-type: application/json"));
    let body: serde_json::Value = serde_json::from_str(body_of(&response)).unwrap();
    assert_eq!(body, serde_json::json!({"result": true, "data": "first"}));

    shutdown.trigger();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_protocol_error_envelope() {
    let (addr, shutdown, handle) = start().await;

    let response = send(addr, "GET /notes/2 HTTP/1.1\r\nHost: test\r\nConnection: close\r\n\r\n").await;
    assert!(response.starts_with("HTTP/1.1 404"), "{response}");
    let body: serde_json::Value = serde_json::from_str(body_of(&response)).unwrap();
    assert_eq!(body, serde_json::json!({"result": false, "data": "Note not found"}));

    shutdown.trigger();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_post_json_body() {
    let (addr, shutdown, handle) = start().await;

    let payload = r#"{"title":"groceries"}"#;
    let request = format!(
        "POST /notes HTTP/1.1\r\nHost: test\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{payload}",
        payload.len()
    );
    let response = send(addr, &request).await;
    assert!(response.starts_with("HTTP/1.1 200 OK"), "{response}");
    let body: serde_json::Value = serde_json::from_str(body_of(&response)).unwrap();
    assert_eq!(body["data"], "groceries");

    shutdown.trigger();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_malformed_json_is_400() {
    let (addr, shutdown, handle) = start().await;

    let request = "POST /notes HTTP/1.1\r\nHost: test\r\nContent-Type: application/json\r\nContent-Length: 5\r\nConnection: close\r\n\r\n{oops";
    let response = send(addr, request).await;
    assert!(response.starts_with("HTTP/1.1 400"), "{response}");
    let body: serde_json::Value = serde_json::from_str(body_of(&response)).unwrap();
    assert_eq!(body["result"], false);
    assert_eq!(body["data"], "The specified json body is invalid.");

    shutdown.trigger();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_shutdown_stops_accepting() {
    let (addr, shutdown, handle) = start().await;
    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(3), handle)
        .await
        .expect("server should stop")
        .unwrap();
    assert!(TcpStream::connect(addr).await.is_err());
}
