//! Local HTTP doubles for provider tests.

use std::sync::{Arc, Mutex};

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use serde_json::Value;

/// One request as the mock server saw it.
#[derive(Debug, Clone)]
pub(crate) struct Recorded {
    pub headers: HeaderMap,
    pub body: Value,
}

#[derive(Clone)]
struct MockState {
    status: StatusCode,
    reply: String,
    seen: Arc<Mutex<Vec<Recorded>>>,
}

async fn handle(
    State(state): State<MockState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, String) {
    state.seen.lock().unwrap().push(Recorded { headers, body });
    (state.status, state.reply.clone())
}

/// Serve `reply` with `status` for every POST to `path`. Returns the base URL
/// and the list of recorded requests.
pub(crate) async fn mock_server(
    path: &str,
    status: u16,
    reply: &str,
) -> (String, Arc<Mutex<Vec<Recorded>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let state = MockState {
        status: StatusCode::from_u16(status).unwrap(),
        reply: reply.to_string(),
        seen: seen.clone(),
    };
    let router = Router::new().route(path, post(handle)).with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    (format!("http://{addr}"), seen)
}
