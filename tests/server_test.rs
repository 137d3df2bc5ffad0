mod helpers;

use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::{json, Value};

use helpers::{test_extractor, test_gateway, MemoryBlobStore, ScriptedBackend};
use intentmem::server::{build_router, AppState};

const SEND_TO_ALI: &str = r#"{"type":"TRANSACTION","summary":"Sending 10 SUI to Ali.","data":{"action_type":"TRANSFER","params":{"amount":"10","token":"SUI","recipient":"Ali"}}}"#;

struct TestServer {
    addr: SocketAddr,
    backend: Arc<ScriptedBackend>,
    store: Arc<MemoryBlobStore>,
    client: reqwest::Client,
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }
}

async fn spawn_server(reply: &str) -> TestServer {
    let backend = ScriptedBackend::always(reply);
    let store = MemoryBlobStore::new();
    let state = AppState {
        extractor: test_extractor(backend.clone()),
        gateway: test_gateway(store.clone()),
        default_epochs: 5,
    };
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, build_router(state)).await.unwrap();
    });
    TestServer {
        addr,
        backend,
        store,
        client: reqwest::Client::new(),
    }
}

#[tokio::test]
async fn analyze_returns_normalized_intent() {
    let server = spawn_server(SEND_TO_ALI).await;
    let response = server
        .client
        .post(server.url("/api/analyze"))
        .json(&json!({
            "message": "Send 10 SUI to Ali",
            "history": [
                {"role": "user", "content": "hi"},
                {"role": "assistant", "content": "Hello! How can I help?"}
            ],
            "model": "pro",
            "memoryContext": {
                "aiSummary": "Pays Ali back on Fridays.",
                "recentActivities": ["sent 3 SUI to Ali"]
            }
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["type"], "TRANSACTION");
    assert_eq!(body["data"]["action_type"], "TRANSFER");
    assert_eq!(body["data"]["params"]["amount"], "10");
    assert_eq!(body["data"]["params"]["recipient"], "Ali");
    assert!(body["data"]["params"]["token"].is_null());

    let prompt = server.backend.last_prompt().unwrap();
    assert!(prompt.contains("Pays Ali back on Fridays."));
    assert!(prompt.contains("sent 3 SUI to Ali"));
    assert!(prompt.contains("Hello! How can I help?"));
}

#[tokio::test]
async fn analyze_with_unusable_output_still_answers_ok() {
    let server = spawn_server("I'm not sure what you mean").await;
    let response = server
        .client
        .post(server.url("/api/analyze"))
        .json(&json!({ "message": "blorp" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["type"], "CHAT");
    assert_eq!(body["data"]["action_type"], "NONE");
    assert!(body["data"]["params"].is_object());
    assert!(!body["summary"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn analyze_rejects_empty_and_malformed_requests() {
    let server = spawn_server(SEND_TO_ALI).await;

    let response = server
        .client
        .post(server.url("/api/analyze"))
        .json(&json!({ "message": "   " }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["type"], "CHAT");

    let response = server
        .client
        .post(server.url("/api/analyze"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert!(response.status().is_client_error());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["type"], "CHAT");

    assert_eq!(server.backend.calls(), 0);
}

#[tokio::test]
async fn blob_put_then_get() {
    let server = spawn_server(SEND_TO_ALI).await;
    let payload = json!({ "walletAddress": "0xabc", "chatHistory": [] });

    let response = server
        .client
        .put(server.url("/api/blob?epochs=3"))
        .json(&payload)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    let pointer = body["pointer"].as_str().unwrap().to_string();
    assert_eq!(server.store.put_calls(), 1);

    let response = server
        .client
        .get(server.url(&format!("/api/blob?pointer={pointer}")))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "application/json"
    );
    let fetched: Value = response.json().await.unwrap();
    assert_eq!(fetched, payload);
}

#[tokio::test]
async fn blob_errors_map_to_http_statuses() {
    let server = spawn_server(SEND_TO_ALI).await;

    let response = server
        .client
        .get(server.url("/api/blob?pointer=missing"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    let response = server
        .client
        .put(server.url("/api/blob"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    server.store.set_failing(true);
    let response = server
        .client
        .put(server.url("/api/blob"))
        .body("{}")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 502);
}

#[tokio::test]
async fn health_reports_generation_state() {
    let server = spawn_server(SEND_TO_ALI).await;
    let body: Value = server
        .client
        .get(server.url("/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["generation_configured"], true);
}
