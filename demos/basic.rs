//! Minimal sheath example: logged, gzipped JSON endpoints and health checks.
//!
//! Run with:
//!   RUST_LOG=info,sheath::access=debug cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/users/42
//!   curl --compressed http://localhost:3000/report
//!   curl -X POST 'http://localhost:3000/users?dry_run=1' \
//!        -H 'content-type: application/json' \
//!        -d '{ "name": "alice" }'
//!   curl http://localhost:3000/healthz
//!   curl -i http://localhost:3000/readyz

use std::sync::Arc;
use std::time::Duration;

use http::StatusCode;
use http::header::{CONTENT_TYPE, HeaderValue};
use sheath::health::{self, Health};
use sheath::middleware::{Gzip, LogOption, Logging};
use sheath::{Request, Response, Router, Server, handler_fn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), sheath::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let health = Arc::new(Health::new());

    let access = || {
        vec![
            LogOption::Path,
            LogOption::Code,
            LogOption::Duration,
            LogOption::Length,
            LogOption::Query,
        ]
    };

    let app = Router::new()
        .get("/users/{id}", Logging::new(get_user, access()))
        .post(
            "/users",
            Logging::new(create_user, [LogOption::Path, LogOption::Code, LogOption::RequestBody]),
        )
        .get("/report", Logging::new(Gzip::new(report()), access()))
        .get("/healthz", health::liveness)
        .get("/readyz", health.handler());

    Server::bind("0.0.0.0:3000")
        .health(health)
        .drain_delay(Duration::from_secs(5))
        .serve(app)
        .await
}

// GET /users/{id}
async fn get_user(req: Request) -> Response {
    let id = req.param("id").unwrap_or("unknown");
    Response::json(format!(r#"{{"id":"{id}","name":"alice"}}"#))
}

// POST /users
//
// The request body was already read by the logger; the handler still sees it
// from the start.
async fn create_user(mut req: Request) -> Response {
    match req.bytes().await {
        Ok(body) if !body.is_empty() => Response::builder()
            .status(StatusCode::CREATED)
            .header("location", "/users/99")
            .json(r#"{"id":"99","name":"new_user"}"#),
        _ => Response::status(StatusCode::BAD_REQUEST),
    }
}

// GET /report: streamed in chunks, each one compressed on the way out.
fn report() -> impl sheath::Handler {
    handler_fn(|_req, w| {
        Box::pin(async move {
            w.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static("text/csv"));
            w.write_status(StatusCode::OK);
            w.write(b"id,name\n")?;
            for id in 0..1000 {
                w.write(format!("{id},user-{id}\n").as_bytes())?;
            }
            Ok(())
        })
    })
}
