use std::io::Read;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use flate2::read::GzDecoder;
use http::{HeaderMap, StatusCode};
use http_body_util::{BodyExt, Empty, Full};
use hyper_util::rt::TokioIo;
use sheath::health::{Health, HealthState};
use sheath::middleware::{AccessRecord, Gzip, LogOption, Logging};
use sheath::{Handler, Request, Response, Router, Server, handler_fn};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

struct Running {
    addr: SocketAddr,
    stop: oneshot::Sender<()>,
    task: JoinHandle<Result<(), sheath::Error>>,
}

async fn start(server: impl FnOnce(TcpListener) -> Server, app: impl Handler) -> Running {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop, stopped) = oneshot::channel::<()>();
    let task = tokio::spawn(server(listener).serve_with_shutdown(app, async move {
        let _ = stopped.await;
    }));
    Running { addr, stop, task }
}

async fn send(addr: SocketAddr, req: http::Request<Full<Bytes>>) -> (StatusCode, HeaderMap, Bytes) {
    let stream = TcpStream::connect(addr).await.unwrap();
    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
        .await
        .unwrap();
    tokio::spawn(conn);

    let res = sender.send_request(req).await.unwrap();
    let (parts, body) = res.into_parts();
    let body = body.collect().await.unwrap().to_bytes();
    (parts.status, parts.headers, body)
}

async fn get(addr: SocketAddr, path: &str) -> (StatusCode, HeaderMap, Bytes) {
    let req = http::Request::get(path)
        .header("host", "localhost")
        .body(Full::default())
        .unwrap();
    send(addr, req).await
}

fn report() -> impl Handler {
    handler_fn(|_req, w| {
        Box::pin(async move {
            w.write_status(StatusCode::OK);
            for i in 0..200 {
                w.write(format!("line {i}\n").as_bytes())?;
            }
            Ok(())
        })
    })
}

async fn echo(mut req: Request) -> Result<Response, StatusCode> {
    let body = req.bytes().await.map_err(|_| StatusCode::BAD_REQUEST)?;
    Ok(Response::json(body))
}

#[tokio::test]
async fn gzip_route_is_compressed_over_the_wire() {
    let server = start(Server::from_listener, Router::new().get("/report", Gzip::new(report()))).await;

    let (status, headers, body) = get(server.addr, "/report").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get("content-encoding").unwrap(), "gzip");

    let mut text = String::new();
    GzDecoder::new(&body[..]).read_to_string(&mut text).unwrap();
    assert!(text.starts_with("line 0\nline 1\n"));
    assert!(text.ends_with("line 199\n"));

    server.stop.send(()).unwrap();
    server.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn logging_wraps_the_whole_router() {
    let records: Arc<Mutex<Vec<AccessRecord>>> = Arc::default();
    let sink = Arc::clone(&records);
    let app = Logging::new(
        Router::new().post("/echo", echo),
        [LogOption::Path, LogOption::Code, LogOption::Length, LogOption::RequestBody],
    )
    .on_record(move |r| sink.lock().unwrap().push(r.clone()));
    let server = start(Server::from_listener, app).await;

    let (status, _, body) = get(server.addr, "/missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.is_empty());

    let req = http::Request::post("/echo")
        .header("host", "localhost")
        .body(Full::from(r#"{ "a": 1 }"#))
        .unwrap();
    let (status, _, body) = send(server.addr, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{ "a": 1 }"#);

    server.stop.send(()).unwrap();
    server.task.await.unwrap().unwrap();

    let records = records.lock().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].path.as_deref(), Some("/missing"));
    assert_eq!(records[0].code, Some(404));
    assert_eq!(records[0].len, Some(0));
    assert_eq!(records[1].code, Some(200));
    assert_eq!(records[1].len, Some(10));
    assert_eq!(records[1].req.as_deref(), Some(r#"{"a":1}"#));
}

#[tokio::test]
async fn readiness_fails_while_draining() {
    let health = Arc::new(Health::new());
    let app = Router::new()
        .get("/readyz", health.handler())
        .get("/healthz", sheath::health::liveness);
    let shared = Arc::clone(&health);
    let server = start(
        move |listener| {
            Server::from_listener(listener)
                .health(shared)
                .drain_delay(Duration::from_millis(500))
        },
        app,
    )
    .await;

    let (status, _, _) = get(server.addr, "/readyz").await;
    assert_eq!(status, StatusCode::OK);

    server.stop.send(()).unwrap();
    while health.state() != HealthState::ShuttingDown {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    // Still accepting during the drain delay, but no longer ready.
    let (status, _, _) = get(server.addr, "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let (status, _, _) = get(server.addr, "/healthz").await;
    assert_eq!(status, StatusCode::OK);

    tokio::time::timeout(Duration::from_secs(5), server.task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn handler_error_after_commit_aborts_the_body() {
    let failing = handler_fn(|_req, w| {
        Box::pin(async move {
            w.write_status(StatusCode::ACCEPTED);
            w.write(b"partial")?;
            // Let the head and first chunk reach the client before failing.
            tokio::time::sleep(Duration::from_millis(50)).await;
            Err(sheath::Error::handler("backend went away"))
        })
    });
    let crash = handler_fn(|_req, _w| {
        Box::pin(async move { Err(sheath::Error::handler("nothing written")) })
    });
    let app = Router::new().get("/late", failing).get("/early", crash);
    let server = start(Server::from_listener, app).await;

    let stream = TcpStream::connect(server.addr).await.unwrap();
    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
        .await
        .unwrap();
    tokio::spawn(conn);
    let req = http::Request::get("/late")
        .header("host", "localhost")
        .body(Empty::<Bytes>::new())
        .unwrap();
    let res = sender.send_request(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    assert!(res.into_body().collect().await.is_err());

    let (status, _, _) = get(server.addr, "/early").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    server.stop.send(()).unwrap();
    server.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn gzip_handler_failing_before_output_gets_500() {
    let crash = handler_fn(|_req, _w| {
        Box::pin(async move { Err(sheath::Error::handler("nothing written")) })
    });
    let server = start(Server::from_listener, Router::new().get("/early", Gzip::new(crash))).await;

    let (status, headers, body) = get(server.addr, "/early").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(headers.get("content-encoding").is_none());
    assert!(body.is_empty());

    server.stop.send(()).unwrap();
    server.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn empty_request_body_is_fine() {
    let server = start(Server::from_listener, Router::new().post("/echo", echo)).await;
    let stream = TcpStream::connect(server.addr).await.unwrap();
    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
        .await
        .unwrap();
    tokio::spawn(conn);
    let req = http::Request::post("/echo")
        .header("host", "localhost")
        .body(Empty::<Bytes>::new())
        .unwrap();
    let res = sender.send_request(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.into_body().collect().await.unwrap().to_bytes().is_empty());

    server.stop.send(()).unwrap();
    server.task.await.unwrap().unwrap();
}
