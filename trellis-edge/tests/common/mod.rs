//! Test harness: an in-process mock controller.
//!
//! Tests assemble an axum router speaking the controller's envelope protocol
//! and drive the real client against it over loopback HTTP.

// each test binary uses a different subset of the harness
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::Router;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// A mock controller bound to an ephemeral loopback port.
pub struct MockController {
    pub addr: SocketAddr,
    task: JoinHandle<()>,
}

impl MockController {
    /// Serve `router` on an ephemeral port.
    pub async fn serve(router: Router) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock controller");
        let addr = listener.local_addr().expect("mock controller addr");
        let task = tokio::spawn(async move {
            axum::serve(listener, router).await.expect("mock controller");
        });
        Self { addr, task }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

impl Drop for MockController {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Envelope with a `data` member.
pub fn ok(data: Value) -> Value {
    json!({ "data": data })
}

/// Envelope with an `error` member.
pub fn error(code: &str, message: &str) -> Value {
    json!({ "error": { "code": code, "message": message } })
}

/// Envelope for one page of a paged endpoint.
pub fn page(limit: u32, offset: u32, total: u32, data: Value) -> Value {
    json!({
        "meta": { "pagination": { "limit": limit, "offset": offset, "totalCount": total } },
        "data": data,
    })
}

/// The version envelope advertising an edge/v1 path prefix.
pub fn version_with_prefix(prefix: &str) -> Value {
    ok(json!({
        "version": "v1.1.15",
        "revision": "test",
        "buildDate": "2025-05-04 18:09:50",
        "apiVersions": { "edge": { "v1": { "path": prefix } } },
    }))
}

/// A version envelope without API version paths; the client adopts no
/// prefix, so repeated calls keep hitting `/version`.
pub fn version_plain() -> Value {
    ok(json!({
        "version": "v1.1.15",
        "revision": "test",
        "buildDate": "2025-05-04 18:09:50",
    }))
}

/// The login envelope for a session with the given id and token.
pub fn api_session(id: &str, token: &str) -> Value {
    ok(json!({ "id": id, "token": token }))
}

/// `limit`/`offset` query parameters of a paged request.
pub fn paging_params(query: &str) -> (u32, u32) {
    let mut limit = 0;
    let mut offset = 0;
    for pair in query.split('&') {
        if let Some(value) = pair.strip_prefix("limit=") {
            limit = value.parse().unwrap_or(0);
        } else if let Some(value) = pair.strip_prefix("offset=") {
            offset = value.parse().unwrap_or(0);
        }
    }
    (limit, offset)
}

/// Shared request counter for handlers.
#[derive(Clone, Default)]
pub struct Counter(Arc<AtomicUsize>);

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bump(&self) -> usize {
        self.0.fetch_add(1, Ordering::SeqCst)
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Install a test subscriber once per process.
pub fn init_tracing() {
    use std::sync::Once;
    static ONCE: Once = Once::new();
    ONCE.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "info".into()),
            )
            .with_test_writer()
            .try_init();
    });
}
