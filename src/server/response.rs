//! Response bodies and error-to-status mapping.

use axum::extract::rejection::JsonRejection;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::db::Records;
use crate::error::{AskError, ErrorKind};
use crate::pipeline::{AskOutcome, Failure};
use crate::safety::RejectReason;

/// Seconds clients are asked to wait after a `ServiceBusy`.
const RETRY_AFTER_SECS: &str = "1";

/// Successful `/ask` body.
#[derive(Debug, Serialize)]
pub struct AskResponse<'a> {
    pub question: &'a str,
    pub sql: &'a str,
    pub columns: &'a [String],
    pub rows: Records<'a>,
    pub row_count: usize,
    pub truncated: bool,
}

impl<'a> From<&'a AskOutcome> for AskResponse<'a> {
    fn from(outcome: &'a AskOutcome) -> Self {
        Self {
            question: &outcome.question,
            sql: &outcome.sql,
            columns: &outcome.result.columns,
            rows: outcome.result.records(),
            row_count: outcome.result.row_count(),
            truncated: outcome.result.truncated,
        }
    }
}

/// Error body shared by every failing endpoint.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error_kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<RejectReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
}

/// HTTP status for each error kind.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidRequest | ErrorKind::ValidationRejected | ErrorKind::ExecutionError => {
            StatusCode::BAD_REQUEST
        }
        ErrorKind::ExtractionFailed => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::ModelError => StatusCode::BAD_GATEWAY,
        ErrorKind::ModelUnavailable
        | ErrorKind::ConnectionError
        | ErrorKind::ServiceBusy
        | ErrorKind::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::ModelTimeout | ErrorKind::ExecutionTimeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::ConfigError | ErrorKind::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// An error on its way to the client.
#[derive(Debug)]
pub struct ApiError {
    error: AskError,
    sql: Option<String>,
}

impl ApiError {
    pub fn body(&self) -> ErrorBody {
        let message = match &self.error {
            AskError::Internal(_) | AskError::Config(_) => "internal server error".to_string(),
            other => other.to_string(),
        };
        ErrorBody {
            error_kind: self.error.kind(),
            message,
            reason: self.error.reject_reason(),
            sql: self.sql.clone(),
        }
    }
}

impl From<AskError> for ApiError {
    fn from(error: AskError) -> Self {
        Self { error, sql: None }
    }
}

impl From<Failure> for ApiError {
    fn from(failure: Failure) -> Self {
        Self {
            error: failure.error,
            sql: failure.sql,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        AskError::invalid_request(rejection.body_text()).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.error.kind();
        let status = status_for(kind);
        let mut resp = (status, Json(self.body())).into_response();
        if kind == ErrorKind::ServiceBusy {
            resp.headers_mut()
                .insert("retry-after", HeaderValue::from_static(RETRY_AFTER_SECS));
        }
        resp
    }
}
