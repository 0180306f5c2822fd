//! Ollama client tests against a fake model service on a loopback port.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use db_ask::error::ErrorKind;
use db_ask::llm::{LlmClient, OllamaClient, OllamaConfig};
use pretty_assertions::assert_eq;
use serde_json::{json, Value as JsonValue};
use tokio::net::TcpListener;

/// Request bodies the fake service received, in order.
type Received = Arc<Mutex<Vec<JsonValue>>>;

/// Serves `app` on an ephemeral port and returns its base URL.
async fn spawn_fake(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn client_for(base_url: &str, model: &str) -> OllamaClient {
    OllamaClient::new(OllamaConfig::new(model).with_url(base_url)).unwrap()
}

async fn record_generate(
    State(received): State<Received>,
    Json(body): Json<JsonValue>,
) -> Json<JsonValue> {
    received.lock().unwrap().push(body);
    Json(json!({
        "model": "qwen2.5-coder:1.5b",
        "response": "```sql\nSELECT 1;\n```",
        "done": true,
    }))
}

#[tokio::test]
async fn test_complete_sends_generate_request() {
    let received = Received::default();
    let app = Router::new()
        .route("/api/generate", post(record_generate))
        .with_state(received.clone());
    let url = spawn_fake(app).await;

    let client = client_for(&url, "qwen2.5-coder:1.5b");
    let text = client.complete("Question: \"anything\"").await.unwrap();

    assert_eq!(text, "```sql\nSELECT 1;\n```");

    let bodies = received.lock().unwrap();
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0]["model"], "qwen2.5-coder:1.5b");
    assert_eq!(bodies[0]["prompt"], "Question: \"anything\"");
    assert_eq!(bodies[0]["stream"], false);
    assert!(bodies[0]["options"]["temperature"].is_number());
}

#[tokio::test]
async fn test_complete_error_status_is_model_error() {
    let app = Router::new().route(
        "/api/generate",
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "model crashed") }),
    );
    let url = spawn_fake(app).await;

    let err = client_for(&url, "m").complete("hi").await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ModelError);
    assert!(err.to_string().contains("500"), "got: {err}");
    assert!(!err.to_string().contains("model crashed"));
}

#[tokio::test]
async fn test_complete_missing_response_field_is_model_error() {
    let app = Router::new().route(
        "/api/generate",
        post(|| async { Json(json!({"done": true})) }),
    );
    let url = spawn_fake(app).await;

    let err = client_for(&url, "m").complete("hi").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ModelError);
}

#[tokio::test]
async fn test_slow_generate_is_model_timeout() {
    let app = Router::new().route(
        "/api/generate",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Json(json!({"response": "SELECT 1"}))
        }),
    );
    let url = spawn_fake(app).await;

    let config = OllamaConfig {
        timeout: Duration::from_millis(200),
        ..OllamaConfig::new("m").with_url(url)
    };
    let client = OllamaClient::new(config).unwrap();

    let err = client.complete("hi").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ModelTimeout);
}

#[tokio::test]
async fn test_list_models_and_has_model() {
    let app = Router::new().route(
        "/api/tags",
        get(|| async {
            Json(json!({
                "models": [
                    {"name": "qwen2.5-coder:1.5b", "size": 986061892},
                    {"name": "llama3:latest", "size": 4661224676u64},
                ]
            }))
        }),
    );
    let url = spawn_fake(app).await;

    let client = client_for(&url, "llama3");
    let models = client.list_models().await.unwrap();

    assert_eq!(models, vec!["qwen2.5-coder:1.5b", "llama3:latest"]);
    assert!(client.is_available().await);
    assert!(client.has_model().await.unwrap());
    assert!(!client_for(&url, "mistral").has_model().await.unwrap());
}

#[tokio::test]
async fn test_pull_model_reads_progress_stream() {
    let received = Received::default();
    let app = Router::new()
        .route(
            "/api/pull",
            post(
                |State(received): State<Received>, Json(body): Json<JsonValue>| async move {
                    received.lock().unwrap().push(body);
                    concat!(
                        "{\"status\":\"pulling manifest\"}\n",
                        "{\"status\":\"downloading\",\"completed\":10,\"total\":100}\n",
                        "{\"status\":\"verifying sha256 digest\"}\n",
                        "{\"status\":\"success\"}\n",
                    )
                    .into_response()
                },
            ),
        )
        .with_state(received.clone());
    let url = spawn_fake(app).await;

    client_for(&url, "qwen2.5-coder:1.5b")
        .pull_model()
        .await
        .unwrap();

    let bodies = received.lock().unwrap();
    assert_eq!(bodies[0]["name"], "qwen2.5-coder:1.5b");
    assert_eq!(bodies[0]["stream"], true);
}

#[tokio::test]
async fn test_pull_model_surfaces_stream_error() {
    let app = Router::new().route(
        "/api/pull",
        post(|| async {
            "{\"status\":\"pulling manifest\"}\n{\"error\":\"pull model manifest: file does not exist\"}\n"
        }),
    );
    let url = spawn_fake(app).await;

    let err = client_for(&url, "no-such-model").pull_model().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ModelError);
    assert!(err.to_string().contains("file does not exist"));
}

#[tokio::test]
async fn test_unreachable_service() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let client = client_for(&url, "m");

    assert!(!client.is_available().await);
    let err = client.complete("hi").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ModelUnavailable);
}
