//! End-to-end tests for the reqwest transport.
//!
//! Runs a small in-memory document-version service on a random local port
//! and drives it through `ApiClient` and `DocumentController`.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use docver_core::{
    ApiClient, ControllerError, DocumentController, Phase, ReqwestTransport, SessionStore,
};
use serde_json::{json, Value};

/// In-memory stand-in for the remote service.
#[derive(Default)]
struct Service {
    versions: Mutex<HashMap<String, Vec<Value>>>,
    authorization: Mutex<Vec<Option<String>>>,
    fail_next_create: AtomicBool,
}

impl Service {
    fn record_auth(&self, headers: &HeaderMap) {
        let value = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        self.authorization.lock().unwrap().push(value);
    }

    fn seed(&self, id: &str, text: &str) {
        let mut versions = self.versions.lock().unwrap();
        let list = versions.entry(id.to_string()).or_default();
        let number = list.len() as u64 + 1;
        list.push(version(number, text));
    }
}

fn version(number: u64, text: &str) -> Value {
    json!({
        "versionId": format!("v{}", number),
        "versionNumber": number,
        "uploadedAt": format!("2024-01-01T00:00:{:02}Z", number),
        "originalText": text
    })
}

async fn latest(
    State(service): State<Arc<Service>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    service.record_auth(&headers);
    if id == "no-content" {
        return StatusCode::NO_CONTENT.into_response();
    }
    let versions = service.versions.lock().unwrap();
    let latest = versions
        .get(&id)
        .and_then(|list| list.last().cloned())
        .unwrap_or(Value::Null);
    Json(latest).into_response()
}

async fn create(
    State(service): State<Arc<Service>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    service.record_auth(&headers);
    if service.fail_next_create.swap(false, Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "database unavailable").into_response();
    }
    let Some(text) = body.get("text").and_then(Value::as_str) else {
        return (StatusCode::BAD_REQUEST, "text is required").into_response();
    };
    service.seed(&id, text);
    (StatusCode::CREATED, Json(json!({ "message": "created" }))).into_response()
}

async fn spawn_service(service: Arc<Service>) -> SocketAddr {
    let app = Router::new()
        .route("/api/documents/{id}/versions/latest", get(latest))
        .route("/api/documents/{id}/versions", post(create))
        .with_state(service);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn client(addr: SocketAddr, session: Arc<SessionStore>) -> Arc<ApiClient> {
    let transport = ReqwestTransport::new(Duration::from_secs(5)).unwrap();
    Arc::new(ApiClient::new(&format!("http://{}", addr), transport, session))
}

#[tokio::test]
async fn test_open_edit_save_against_live_service() {
    let service = Arc::new(Service::default());
    service.seed("doc1", "hello");
    service.seed("doc1", "hello");
    service.seed("doc1", "hello");
    let addr = spawn_service(Arc::clone(&service)).await;

    let controller = DocumentController::new("doc1", client(addr, Arc::new(SessionStore::new())));
    controller.open().await.unwrap();
    assert_eq!(controller.text(), "hello");
    assert_eq!(controller.latest().unwrap().version_number, 3);

    controller.edit("hello world").unwrap();
    let latest = controller.save().await.unwrap().unwrap();
    assert_eq!(latest.version_number, 4);
    assert_eq!(latest.display_time, "2024-01-01 00:00:04 UTC");
    assert_eq!(controller.text(), "hello world");

    // A fresh view of the same document sees what was just saved
    let reopened = DocumentController::new("doc1", Arc::clone(controller.client()));
    reopened.open().await.unwrap();
    assert_eq!(reopened.text(), "hello world");
    assert_eq!(reopened.latest(), Some(latest));
}

#[tokio::test]
async fn test_document_without_versions() {
    let service = Arc::new(Service::default());
    let addr = spawn_service(service).await;
    let client = client(addr, Arc::new(SessionStore::new()));

    for id in ["fresh", "no-content"] {
        let controller = DocumentController::new(id, Arc::clone(&client));
        controller.open().await.unwrap();
        assert_eq!(controller.phase(), Phase::Ready);
        assert_eq!(controller.text(), "");
        assert_eq!(controller.latest(), None);
    }
}

#[tokio::test]
async fn test_server_error_on_create_preserves_buffer() {
    let service = Arc::new(Service::default());
    service.seed("doc1", "hello");
    let addr = spawn_service(Arc::clone(&service)).await;

    let controller = DocumentController::new("doc1", client(addr, Arc::new(SessionStore::new())));
    controller.open().await.unwrap();
    controller.edit("hello world").unwrap();

    service.fail_next_create.store(true, Ordering::SeqCst);
    match controller.save().await {
        Err(ControllerError::SaveFailed(e)) => {
            assert_eq!(e.status(), Some(reqwest::StatusCode::INTERNAL_SERVER_ERROR));
            assert_eq!(e.to_string(), "database unavailable");
        }
        other => panic!("expected save failure, got {:?}", other),
    }
    assert_eq!(controller.text(), "hello world");
    assert_eq!(controller.latest().unwrap().version_number, 1);
}

#[tokio::test]
async fn test_bearer_token_follows_session() {
    let service = Arc::new(Service::default());
    service.seed("doc1", "hello");
    let addr = spawn_service(Arc::clone(&service)).await;

    let session = Arc::new(SessionStore::new());
    let controller = DocumentController::new("doc1", client(addr, Arc::clone(&session)));

    controller.open().await.unwrap();
    session.login("t0ken");
    controller.open().await.unwrap();
    session.logout();
    controller.open().await.unwrap();

    assert_eq!(
        *service.authorization.lock().unwrap(),
        vec![None, Some("Bearer t0ken".to_string()), None]
    );
}

#[tokio::test]
async fn test_unreachable_service_is_transport_error() {
    // Reserve a port, then free it so nothing is listening there
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let controller = DocumentController::new("doc1", client(addr, Arc::new(SessionStore::new())));
    match controller.open().await {
        Err(ControllerError::LoadFailed(e)) => {
            assert!(e.is_transport());
            assert_eq!(e.to_string(), "unable to connect to the service");
        }
        other => panic!("expected load failure, got {:?}", other),
    }
    assert_eq!(controller.latest(), None);
}
