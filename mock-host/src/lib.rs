//! Test support for the exchange core: an HTTP fixture server and an
//! in-memory scripted host.
//!
//! # Design
//! The fixture server is a small axum app with deterministic routes, used
//! by live end-to-end tests that drive the outbound client over a real
//! transport. [`ScriptedHost`] lives in [`scripted`] and needs no network
//! at all: it implements the core's host traits in memory with per-step
//! failure injection and an operation log.

pub mod scripted;

pub use scripted::{DeliveredResponse, ScriptedHost, SentRequest, Step};

use axum::extract::Path;
use axum::http::{header, StatusCode, Uri};
use axum::response::IntoResponse;
use axum::routing::{any, get};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

/// What `/echo` reports back about the request it received.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Echo {
    pub method: String,
    pub path: String,
    pub body: String,
}

pub fn app() -> Router {
    Router::new()
        .route("/hello", get(hello))
        .route("/echo", any(echo))
        .route("/status/{code}", get(status))
        .route("/large/{len}", get(large))
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn hello() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/plain")], "Hello, world!")
}

async fn echo(method: axum::http::Method, uri: Uri, body: String) -> Json<Echo> {
    Json(Echo {
        method: method.to_string(),
        path: uri.path().to_string(),
        body,
    })
}

async fn status(Path(code): Path<u16>) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// `len` bytes of a repeating pattern, capped at 1 MiB.
async fn large(Path(len): Path<usize>) -> Vec<u8> {
    let len = len.min(1 << 20);
    b"0123456789".iter().copied().cycle().take(len).collect()
}
