mod common;

use std::sync::Arc;

use common::{ChannelSink, RecordingTracer, next_batch};
use http::{Method, StatusCode};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tracewrap::{
    Context, HandlerError, Instrumentation, Metric, Request, Response, Router, Settings,
};

async fn get_user(_: Context<()>, req: Request) -> Result<Response, HandlerError> {
    match req.param("id") {
        Some("42") => Ok(Response::json(r#"{"id":42}"#)),
        _ => Err(HandlerError::status(StatusCode::NOT_FOUND, "no such user")),
    }
}

async fn create_user(_: Context<()>, req: Request) -> Result<Response, HandlerError> {
    let name: serde_json::Value = serde_json::from_slice(req.body())?;
    Ok(Response::builder()
        .status(StatusCode::CREATED)
        .json(serde_json::to_vec(&name)?))
}

/// Sends one HTTP/1.1 request and returns the raw response text.
async fn send(addr: std::net::SocketAddr, raw: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.expect("connect");
    stream.write_all(raw.as_bytes()).await.expect("write request");
    let mut out = Vec::new();
    stream.read_to_end(&mut out).await.expect("read response");
    String::from_utf8(out).expect("utf-8 response")
}

/// A server running on an ephemeral port; `stop` shuts it down.
struct Running {
    addr: std::net::SocketAddr,
    stop: oneshot::Sender<()>,
    server: tokio::task::JoinHandle<Result<(), tracewrap::Error>>,
}

impl Running {
    async fn start(router: Router<()>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let (stop, stopped) = oneshot::channel::<()>();
        let server = tokio::spawn(tracewrap::serve_with_shutdown(listener, router, async move {
            let _ = stopped.await;
        }));
        Self { addr, stop, server }
    }

    async fn shutdown(self) {
        self.stop.send(()).expect("server still running");
        self.server.await.expect("server task").expect("server result");
    }
}

async fn body_len(_: Context<()>, req: Request) -> Result<String, HandlerError> {
    Ok(format!("len={}", req.body().len()))
}

fn recorded(tracer: &RecordingTracer, sink: ChannelSink) -> Instrumentation {
    Instrumentation::new().tracer(tracer.clone()).sink(sink)
}

#[tokio::test]
async fn test_end_to_end_over_tcp() {
    let tracer = RecordingTracer::default();
    let (sink, mut rx) = ChannelSink::new();
    let settings = Settings::from_toml(
        r#"
        [proxy]
        header_mask_value = "***"
        mask_header_keys = ["Authorization"]
        "#,
    )
    .expect("settings should parse");

    let router = Router::new(Arc::new(()), Instrumentation::new().tracer(tracer.clone()).sink(sink).config(settings))
        .on(Method::GET, "/users/{id}", get_user)
        .on(Method::POST, "/users", create_user);

    let running = Running::start(router).await;
    let addr = running.addr;

    let ok = send(addr, "GET /users/42 HTTP/1.1\r\nHost: test\r\nConnection: close\r\n\r\n").await;
    assert!(ok.starts_with("HTTP/1.1 200 OK\r\n"), "{ok}");
    assert!(ok.ends_with(r#"{"id":42}"#), "{ok}");

    let missing = send(
        addr,
        "GET /users/7 HTTP/1.1\r\nHost: test\r\nAuthorization: secret123\r\nConnection: close\r\n\r\n",
    )
    .await;
    assert!(missing.starts_with("HTTP/1.1 404 Not Found\r\n"), "{missing}");
    assert!(missing.to_ascii_lowercase().contains("content-type: application/json"), "{missing}");
    assert!(missing.ends_with(r#"{"code":404,"msg":"no such user"}"#), "{missing}");

    let body = r#"{"name":"alice"}"#;
    let created = send(
        addr,
        &format!(
            "POST /users HTTP/1.1\r\nHost: test\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        ),
    )
    .await;
    assert!(created.starts_with("HTTP/1.1 201 Created\r\n"), "{created}");
    assert!(created.ends_with(body), "{created}");

    let bad = send(
        addr,
        "POST /users HTTP/1.1\r\nHost: test\r\nContent-Length: 3\r\nConnection: close\r\n\r\nnot",
    )
    .await;
    assert!(bad.starts_with("HTTP/1.1 500 Internal Server Error\r\n"), "{bad}");
    assert!(bad.ends_with(r#"{"code":500,"msg":"unknown error"}"#), "{bad}");

    let unrouted = send(addr, "GET /nowhere HTTP/1.1\r\nHost: test\r\nConnection: close\r\n\r\n").await;
    assert!(unrouted.starts_with("HTTP/1.1 404 Not Found\r\n"), "{unrouted}");
    assert!(unrouted.ends_with(r#"{"code":404,"msg":"not found"}"#), "{unrouted}");

    let spans = tracer.spans();
    assert_eq!(spans.len(), 5);
    assert!(spans.iter().all(|s| s.finish_count() == 1));
    let masked = spans[1].tag("http.headers").expect("headers tag");
    assert!(masked.contains(r#""authorization":"***""#), "{masked}");

    for _ in 0..5 {
        let batch = next_batch(&mut rx).await;
        assert!(common::find(&batch, "client_ip").is_some_and(|m| m.value.to_string() == "127.0.0.1"));
    }

    running.shutdown().await;
}

#[tokio::test]
async fn test_unmatched_route_is_traced_and_measured() {
    let tracer = RecordingTracer::default();
    let (sink, mut rx) = ChannelSink::new();
    let router = Router::new((), recorded(&tracer, sink)).on(Method::GET, "/users", body_len);
    let running = Running::start(router).await;

    let res = send(
        running.addr,
        "GET /nowhere HTTP/1.1\r\nHost: test\r\nConnection: close\r\n\r\n",
    )
    .await;
    assert!(res.starts_with("HTTP/1.1 404 Not Found\r\n"), "{res}");
    assert!(res.to_ascii_lowercase().contains("content-type: application/json"), "{res}");
    assert!(res.ends_with(r#"{"code":404,"msg":"not found"}"#), "{res}");

    let span = tracer.only_span();
    assert_eq!(span.name, "GET /nowhere");
    assert_eq!(span.finish_count(), 1);
    assert_eq!(span.tag("http.status_code").as_deref(), Some("404"));

    let batch = next_batch(&mut rx).await;
    assert_eq!(
        common::find(&batch, "http_response_code"),
        Some(&Metric::indexed("http_response_code", "404"))
    );
    assert_eq!(common::find(&batch, "http_uri"), Some(&Metric::new("http_uri", "/nowhere")));
    assert!(rx.try_recv().is_err());

    running.shutdown().await;
}

#[tokio::test]
async fn test_truncated_body_reaches_handler_empty() {
    let tracer = RecordingTracer::default();
    let (sink, mut rx) = ChannelSink::new();
    let router = Router::new((), recorded(&tracer, sink)).on(Method::POST, "/echo", body_len);
    let running = Running::start(router).await;

    let mut stream = TcpStream::connect(running.addr).await.expect("connect");
    stream
        .write_all(b"POST /echo HTTP/1.1\r\nHost: test\r\nContent-Length: 50\r\n\r\nabc")
        .await
        .expect("write request");
    stream.shutdown().await.expect("close write half");
    let mut out = Vec::new();
    stream.read_to_end(&mut out).await.expect("read response");
    let res = String::from_utf8(out).expect("utf-8 response");

    assert!(res.starts_with("HTTP/1.1 200 OK\r\n"), "{res}");
    assert!(res.ends_with("len=0"), "{res}");

    let span = tracer.only_span();
    assert_eq!(span.tag("http.request_body").as_deref(), Some(""));
    assert_eq!(span.finish_count(), 1);
    let _ = next_batch(&mut rx).await;

    running.shutdown().await;
}

#[tokio::test]
async fn test_body_over_limit_reaches_handler_empty() {
    let tracer = RecordingTracer::default();
    let (sink, mut rx) = ChannelSink::new();
    let router = Router::new((), recorded(&tracer, sink))
        .body_limit(8)
        .on(Method::POST, "/echo", body_len);
    let running = Running::start(router).await;

    let within = send(
        running.addr,
        "POST /echo HTTP/1.1\r\nHost: test\r\nContent-Length: 8\r\nConnection: close\r\n\r\n12345678",
    )
    .await;
    assert!(within.ends_with("len=8"), "{within}");

    let over = send(
        running.addr,
        "POST /echo HTTP/1.1\r\nHost: test\r\nContent-Length: 9\r\nConnection: close\r\n\r\n123456789",
    )
    .await;
    assert!(over.starts_with("HTTP/1.1 200 OK\r\n"), "{over}");
    assert!(over.ends_with("len=0"), "{over}");

    let spans = tracer.spans();
    assert_eq!(spans.len(), 2);
    assert_eq!(spans[1].tag("http.request_body").as_deref(), Some(""));
    for _ in 0..2 {
        let _ = next_batch(&mut rx).await;
    }

    running.shutdown().await;
}
