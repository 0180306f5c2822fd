//! HTTP surface tests against the axum router with mock backends.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use db_ask::bootstrap::BootstrapState;
use db_ask::db::{ExecutionLimits, MockDatabaseClient, MockOutcome, QueryResult, Value};
use db_ask::llm::{MockLlmClient, MockReply, PromptTemplate};
use db_ask::pipeline::Pipeline;
use db_ask::query::QueryExecutor;
use db_ask::server::{router, AppState};
use pretty_assertions::assert_eq;
use serde_json::{json, Value as JsonValue};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

fn app_with(
    llm: MockLlmClient,
    db: MockDatabaseClient,
    bootstrap: BootstrapState,
) -> (Router, watch::Sender<BootstrapState>) {
    let executor = QueryExecutor::new(Arc::new(db), ExecutionLimits::default());
    let pipeline = Pipeline::new(
        Arc::new(llm),
        executor,
        PromptTemplate::new("Table: users\n  - id: integer\n  - name: text"),
    );
    let (tx, rx) = watch::channel(bootstrap);
    let state = AppState::new(pipeline, rx, CancellationToken::new());
    (router(state), tx)
}

fn app(llm: MockLlmClient, db: MockDatabaseClient) -> Router {
    app_with(llm, db, BootstrapState::Ready).0
}

fn ask_request(body: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/ask")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, JsonValue) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(JsonValue::Null);
    (status, body)
}

fn users() -> QueryResult {
    QueryResult::with_data(
        vec!["id".to_string(), "name".to_string()],
        vec![
            vec![Value::Int(1), Value::String("Ada".to_string())],
            vec![Value::Int(2), Value::String("Grace".to_string())],
        ],
    )
}

#[tokio::test]
async fn test_ask_returns_rows() {
    let db = MockDatabaseClient::new().with_result("from users", users());
    let app = app(MockLlmClient::new(), db);

    let (status, body) = send(app, ask_request(r#"{"question": "show me all users"}"#)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "question": "show me all users",
            "sql": "SELECT * FROM users",
            "columns": ["id", "name"],
            "rows": [{"id": 1, "name": "Ada"}, {"id": 2, "name": "Grace"}],
            "row_count": 2,
            "truncated": false,
        })
    );
}

#[tokio::test]
async fn test_ask_rejects_delete_without_executing() {
    let db = MockDatabaseClient::new();
    let app = app(MockLlmClient::new(), db.clone());

    let (status, body) = send(app, ask_request(r#"{"question": "delete user 1"}"#)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_kind"], "ValidationRejected");
    assert_eq!(body["reason"], "non-select statement");
    assert_eq!(body["sql"], "DELETE FROM users WHERE id = 1");
    assert_eq!(db.execution_count(), 0);
}

#[tokio::test]
async fn test_ask_rejects_stacked_statements() {
    let llm = MockLlmClient::new().with_response("sneaky", "SELECT 1; DROP TABLE users");
    let db = MockDatabaseClient::new();
    let app = app(llm, db.clone());

    let (status, body) = send(app, ask_request(r#"{"question": "something sneaky"}"#)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_kind"], "ValidationRejected");
    assert_eq!(body["reason"], "multiple statements");
    assert_eq!(db.execution_count(), 0);
}

#[tokio::test]
async fn test_ask_rejects_forbidden_keyword() {
    let llm = MockLlmClient::new().with_response("lock", "SELECT * FROM users FOR UPDATE");
    let db = MockDatabaseClient::new();
    let app = app(llm, db.clone());

    let (status, body) = send(app, ask_request(r#"{"question": "lock the users"}"#)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["reason"], "forbidden keyword present");
    assert_eq!(body["sql"], "SELECT * FROM users FOR UPDATE");
    assert_eq!(db.execution_count(), 0);
}

#[tokio::test]
async fn test_malformed_json_is_invalid_request() {
    let app = app(MockLlmClient::new(), MockDatabaseClient::new());

    let (status, body) = send(app, ask_request("{not json")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_kind"], "InvalidRequest");
}

#[tokio::test]
async fn test_missing_question_is_invalid_request() {
    let app = app(MockLlmClient::new(), MockDatabaseClient::new());

    let (status, body) = send(app, ask_request(r#"{"query": "all users"}"#)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_kind"], "InvalidRequest");
}

#[tokio::test]
async fn test_blank_question_never_reaches_model() {
    let llm = MockLlmClient::new();
    let app = app(llm.clone(), MockDatabaseClient::new());

    let (status, body) = send(app, ask_request(r#"{"question": "   "}"#)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_kind"], "InvalidRequest");
    assert_eq!(llm.call_count(), 0);
}

#[tokio::test]
async fn test_prose_answer_is_unprocessable() {
    let app = app(MockLlmClient::new(), MockDatabaseClient::new());

    let (status, body) =
        send(app, ask_request(r#"{"question": "what is the meaning of life"}"#)).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error_kind"], "ExtractionFailed");
}

#[tokio::test]
async fn test_model_unavailable_is_service_unavailable() {
    let app = app(MockLlmClient::new().unreachable(), MockDatabaseClient::new());

    let (status, body) = send(app, ask_request(r#"{"question": "show me all users"}"#)).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error_kind"], "ModelUnavailable");
}

#[tokio::test]
async fn test_model_error_is_bad_gateway() {
    let llm = MockLlmClient::new().with_script([MockReply::Error("HTTP 500".to_string())]);
    let app = app(llm, MockDatabaseClient::new());

    let (status, body) = send(app, ask_request(r#"{"question": "show me all users"}"#)).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error_kind"], "ModelError");
}

#[tokio::test]
async fn test_busy_pool_sets_retry_after() {
    let db = MockDatabaseClient::new().with_script([MockOutcome::Busy]);
    let app = app(MockLlmClient::new(), db);

    let response = app
        .oneshot(ask_request(r#"{"question": "show me all users"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.headers()["retry-after"], "1");
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: JsonValue = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error_kind"], "ServiceBusy");
    assert_eq!(body["sql"], "SELECT * FROM users");
}

#[tokio::test]
async fn test_execution_timeout_is_gateway_timeout() {
    let db = MockDatabaseClient::new().with_script([MockOutcome::Timeout]);
    let app = app(MockLlmClient::new(), db);

    let (status, body) = send(app, ask_request(r#"{"question": "show me all users"}"#)).await;

    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body["error_kind"], "ExecutionTimeout");
}

#[tokio::test]
async fn test_health_ready() {
    let app = app(MockLlmClient::new().with_model("qwen"), MockDatabaseClient::new());

    let (status, body) = send(app, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "status": "healthy",
            "database": "ok",
            "model_service": "ok",
            "model": "qwen",
            "bootstrap": "ready",
        })
    );
}

#[tokio::test]
async fn test_health_follows_bootstrap() {
    let (app, tx) = app_with(
        MockLlmClient::new(),
        MockDatabaseClient::new(),
        BootstrapState::Pending,
    );

    let (status, body) = send(app.clone(), get("/health")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "unhealthy");
    assert_eq!(body["bootstrap"], "pending");

    tx.send_replace(BootstrapState::Ready);
    let (status, body) = send(app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["bootstrap"], "ready");
}

#[tokio::test]
async fn test_health_recovers_from_failed_bootstrap() {
    let (app, tx) = app_with(
        MockLlmClient::new(),
        MockDatabaseClient::new(),
        BootstrapState::Failed("model service did not answer after 2 attempts".to_string()),
    );

    let (status, body) = send(app.clone(), get("/health")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["bootstrap"], "failed");

    // A later bootstrap round succeeding flips the service healthy.
    tx.send_replace(BootstrapState::Ready);
    let (status, body) = send(app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_health_reports_missing_model() {
    let llm = MockLlmClient::new().with_installed_models(vec!["llama3:8b".to_string()]);
    let app = app(llm, MockDatabaseClient::new());

    let (status, body) = send(app, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["model"], "not_loaded");
}

#[tokio::test]
async fn test_health_database_down() {
    let app = app(MockLlmClient::new(), MockDatabaseClient::new().unreachable());

    let (status, body) = send(app, get("/health")).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["database"], "error");
    assert_eq!(body["model_service"], "ok");
}

#[tokio::test]
async fn test_health_model_service_down() {
    let app = app(MockLlmClient::new().unreachable(), MockDatabaseClient::new());

    let (status, body) = send(app, get("/health")).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["model_service"], "error");
    assert_eq!(body["model"], JsonValue::Null);
}

#[tokio::test]
async fn test_root_lists_endpoints() {
    let app = app(MockLlmClient::new(), MockDatabaseClient::new());

    let (status, body) = send(app, get("/")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["endpoints"]["ask"], "/ask (POST)");
    assert_eq!(body["endpoints"]["health"], "/health");
}
