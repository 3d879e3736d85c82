//! Serving a pipeline over real TCP connections.

use std::net::SocketAddr;
use std::sync::Arc;

use http::StatusCode;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use vigil::journal::{Journaler, Level, MemoryJournaler};
use vigil::middleware::{Chain, RecoveryLogger};
use vigil::panic::abort;
use vigil::{serve_listener, Request, Response, Router};

struct Running {
    addr: SocketAddr,
    sink: Arc<MemoryJournaler>,
    stop: oneshot::Sender<()>,
    server: JoinHandle<Result<(), vigil::Error>>,
}

async fn start() -> Running {
    let sink = Arc::new(MemoryJournaler::new());
    let journaler: Arc<dyn Journaler> = sink.clone();

    let app = Chain::new()
        .with(RecoveryLogger::new(journaler))
        .then(
            Router::new()
                .get("/peer", |req: Request| async move { req.remote_string() })
                .get("/boom", |_req: Request| async {
                    if true {
                        panic!("handler bug");
                    }
                    Response::text("unreachable")
                })
                .get("/abort", |_req: Request| async {
                    if true {
                        abort();
                    }
                    Response::text("unreachable")
                })
                .post("/echo", |req: Request| async move { Response::json(req.body().to_vec()) }),
        );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop, stopped) = oneshot::channel::<()>();
    let server = tokio::spawn(serve_listener(listener, app, async move {
        let _ = stopped.await;
    }));

    Running { addr, sink, stop, server }
}

/// Sends one HTTP/1.1 request and returns everything read before the
/// server closed the connection.
async fn roundtrip(addr: SocketAddr, head: &str, body: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "{head} HTTP/1.1\r\nhost: localhost\r\nconnection: close\r\ncontent-length: {}\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut raw = Vec::new();
    let _ = stream.read_to_end(&mut raw).await;
    String::from_utf8_lossy(&raw).into_owned()
}

#[tokio::test]
async fn serves_requests_with_peer_address_and_body() {
    let running = start().await;

    let res = roundtrip(running.addr, "GET /peer", "").await;
    assert!(res.starts_with("HTTP/1.1 200 OK"), "{res}");
    assert!(res.contains("127.0.0.1:"), "{res}");

    let res = roundtrip(running.addr, "POST /echo", r#"{"a":1}"#).await;
    assert!(res.starts_with("HTTP/1.1 200 OK"), "{res}");
    assert!(res.contains("application/json"), "{res}");
    assert!(res.ends_with(r#"{"a":1}"#), "{res}");

    let res = roundtrip(running.addr, "GET /missing", "").await;
    assert!(res.starts_with("HTTP/1.1 404"), "{res}");

    running.stop.send(()).unwrap();
    running.server.await.unwrap().unwrap();

    let completed = running
        .sink
        .entries()
        .into_iter()
        .filter(|e| e.message() == Some("request completed"))
        .count();
    assert_eq!(completed, 3);
}

#[tokio::test]
async fn handler_panic_becomes_500_and_server_keeps_serving() {
    let running = start().await;

    let res = roundtrip(running.addr, "GET /boom", "").await;
    assert!(res.starts_with(&format!("HTTP/1.1 {}", StatusCode::INTERNAL_SERVER_ERROR.as_u16())), "{res}");

    let res = roundtrip(running.addr, "GET /peer", "").await;
    assert!(res.starts_with("HTTP/1.1 200 OK"), "{res}");

    running.stop.send(()).unwrap();
    running.server.await.unwrap().unwrap();

    assert!(running.sink.entries().iter().any(|e| e.level == Level::Error));
}

#[tokio::test]
async fn abort_drops_the_connection_without_a_response() {
    let running = start().await;

    let res = roundtrip(running.addr, "GET /abort", "").await;
    assert!(!res.contains("HTTP/1.1"), "aborted request got a response: {res}");

    let res = roundtrip(running.addr, "GET /peer", "").await;
    assert!(res.starts_with("HTTP/1.1 200 OK"), "{res}");

    running.stop.send(()).unwrap();
    running.server.await.unwrap().unwrap();

    let entries = running.sink.entries();
    assert!(entries.iter().any(|e| e.level == Level::Debug
        && e.message() == Some("hit suppressed abort panic")));
    assert!(entries.iter().all(|e| e.level != Level::Error));
}
