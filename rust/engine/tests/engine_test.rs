use restful::api::*;
use restful_engine::{EngineConfig, EngineError, HttpEngine};
use serde_json::json;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

struct Greeter {
    greeting: String,
}

fn dispatcher() -> Dispatcher {
    let mut builder = Application::builder();
    builder
        .singleton::<Greeter>(Provider::from_fn(|| Greeter {
            greeting: "hello".to_string(),
        }))
        .unwrap()
        .resource(
            Resource::<Greeter>::new("/greetings")
                .get("/{name}", |greeter, args| {
                    Reply::json(&json!({
                        "message": format!("{} {}", greeter.greeting, args.path("name")?),
                        "client": args.header("x-client"),
                    }))
                })
                .post("", |_, args| {
                    let body: serde_json::Value = args.json()?;
                    Reply::json(&body)
                })
                .param(ParamSpec::body()),
        )
        .unwrap();
    builder.build().unwrap()
}

fn engine(max_body_bytes: usize) -> HttpEngine {
    let config = EngineConfig {
        bind: "127.0.0.1:0".to_string(),
        max_body_bytes,
        ..EngineConfig::default()
    };
    HttpEngine::new(dispatcher(), config)
}

struct RawResponse {
    status: u16,
    head: String,
    body: String,
}

async fn send(addr: SocketAddr, raw: &str) -> RawResponse {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(raw.as_bytes()).await.unwrap();
    let mut buffer = Vec::new();
    stream.read_to_end(&mut buffer).await.unwrap();

    let text = String::from_utf8(buffer).unwrap();
    let (head, body) = text.split_once("\r\n\r\n").unwrap();
    let status = head
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .unwrap();
    RawResponse {
        status,
        head: head.to_ascii_lowercase(),
        body: body.to_string(),
    }
}

fn post(path: &str, content_type: &str, body: &str) -> String {
    format!(
        "POST {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\nContent-Type: {}\r\nContent-Length: {}\r\n\r\n{}",
        path,
        content_type,
        body.len(),
        body
    )
}

#[tokio::test]
async fn test_request_reaches_dispatcher() {
    let mut engine = engine(1024);
    let addr = engine.serve().unwrap();

    let response = send(
        addr,
        "GET /greetings/ada%20l HTTP/1.1\r\nHost: localhost\r\nX-Client: tests\r\nConnection: close\r\n\r\n",
    )
    .await;

    assert_eq!(response.status, 200);
    assert!(response.head.contains("content-type: application/json"));
    let body: serde_json::Value = serde_json::from_str(&response.body).unwrap();
    assert_eq!(body, json!({"message": "hello ada l", "client": "tests"}));

    engine.shutdown();
    assert!(!engine.is_running());
}

#[tokio::test]
async fn test_json_body_round_trip_and_validation() {
    let mut engine = engine(1024);
    let addr = engine.serve().unwrap();

    let echoed = send(addr, &post("/greetings", "application/json", r#"{"a":1}"#)).await;
    assert_eq!(echoed.status, 200);
    assert_eq!(echoed.body, r#"{"a":1}"#);

    let malformed = send(addr, &post("/greetings", "application/json", "{nope")).await;
    assert_eq!(malformed.status, 400);
    assert!(malformed.body.contains("detail"));
}

#[tokio::test]
async fn test_oversized_body_is_rejected_before_dispatch() {
    let mut engine = engine(16);
    let addr = engine.serve().unwrap();

    let payload = format!(r#"{{"padding":"{}"}}"#, "x".repeat(64));
    let response = send(addr, &post("/greetings", "application/json", &payload)).await;

    assert_eq!(response.status, 413);
    let body: serde_json::Value = serde_json::from_str(&response.body).unwrap();
    assert_eq!(body["detail"], "request body exceeds 16 bytes");
}

#[tokio::test]
async fn test_unmatched_and_wrong_method() {
    let mut engine = engine(1024);
    let addr = engine.serve().unwrap();

    let missing = send(
        addr,
        "GET /nowhere HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    )
    .await;
    assert_eq!(missing.status, 404);

    let wrong = send(
        addr,
        "DELETE /greetings/bob HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    )
    .await;
    assert_eq!(wrong.status, 405);
    assert!(wrong.head.contains("allow: get, head, options"));
}

#[tokio::test]
async fn test_second_serve_is_rejected() {
    let mut engine = engine(1024);
    engine.serve().unwrap();
    assert!(matches!(engine.serve(), Err(EngineError::AlreadyRunning)));
    assert!(engine.local_addr().is_some());

    engine.shutdown();
    assert!(engine.local_addr().is_none());
}
