//! Route handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

use super::response::{ApiError, AskResponse};
use super::AppState;

/// `POST /ask` body.
#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub question: String,
}

/// `GET /health` body.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct HealthBody {
    pub status: &'static str,
    pub database: &'static str,
    pub model_service: &'static str,
    /// Model name when installed, `not_loaded` when missing, null when the
    /// service is down.
    pub model: Option<String>,
    pub bootstrap: &'static str,
}

pub async fn ask(
    State(state): State<AppState>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return ApiError::from(rejection).into_response(),
    };

    let cancel = state.cancel.child_token();
    match state.pipeline.ask(&request.question, &cancel).await {
        Ok(outcome) => Json(AskResponse::from(&outcome)).into_response(),
        Err(failure) => ApiError::from(failure).into_response(),
    }
}

pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthBody>) {
    let db = state.pipeline.executor().database();
    let llm = state.pipeline.llm();

    let (db_ok, model) = tokio::join!(db.ping(), llm.has_model());
    let bootstrap = state.bootstrap.borrow().clone();

    let database = if db_ok.is_ok() { "ok" } else { "error" };
    let (model_service, model) = match model {
        Ok(true) => ("ok", Some(llm.model().to_string())),
        Ok(false) => ("ok", Some("not_loaded".to_string())),
        Err(_) => ("error", None),
    };

    let healthy = database == "ok" && model_service == "ok" && bootstrap.is_ready();
    let body = HealthBody {
        status: if healthy { "healthy" } else { "unhealthy" },
        database,
        model_service,
        model,
        bootstrap: bootstrap.as_str(),
    };

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

pub async fn root() -> Json<JsonValue> {
    Json(json!({
        "message": "db-ask: natural-language questions over PostgreSQL",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "health": "/health",
            "ask": "/ask (POST)",
        },
    }))
}
