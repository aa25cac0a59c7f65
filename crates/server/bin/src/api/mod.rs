//! Internal HTTP API
//!
//! Thin batch endpoints over the dispatch manager. Every batch answers
//! `207 Multi-Status` with one result per item, in request order.

mod metrics;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use dispatcher_server_application::DispatchManager;
use dispatcher_server_domain::{
    CancelInput, ConnectionStatus, DomainError, RecipientId, RequestContext, RunInput,
};
use dispatcher_shared::event_topics::headers;
use serde::{Deserialize, Serialize};
use tracing::Instrument;

pub use metrics::metrics_router;

/// Name of the calling service recorded on every run
pub const SERVICE_HEADER: &str = "x-rh-dispatcher-service";
const DEFAULT_SERVICE: &str = "internal";

// ============================================================================
// Types
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RunCreated {
    pub code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RunCanceled {
    pub code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct StatusRequest {
    pub org_id: String,
    pub recipient: RecipientId,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RecipientStatus {
    pub org_id: String,
    pub recipient: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ConnectionStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// ============================================================================
// API State
// ============================================================================

pub struct ApiState {
    pub manager: Arc<DispatchManager>,
    /// Per-item deadline, rate limiter wait included
    pub request_timeout: Duration,
}

pub fn create_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/internal/v2/dispatch", post(dispatch))
        .route("/internal/v2/cancel", post(cancel))
        .route("/internal/v2/connection_status", post(connection_status))
        .route("/health", get(health_check))
        .with_state(state)
}

fn request_context(request_headers: &HeaderMap, org_id: &str, timeout: Duration) -> RequestContext {
    let ctx = match request_headers
        .get(headers::REQUEST_ID)
        .and_then(|v| v.to_str().ok())
    {
        Some(request_id) => RequestContext::new(request_id),
        None => RequestContext::generated(),
    };
    ctx.with_org_id(org_id).with_timeout(timeout)
}

fn dispatch_code(err: &DomainError) -> StatusCode {
    match err {
        DomainError::RecipientNotFound { .. } => StatusCode::NOT_FOUND,
        DomainError::Validation { .. } => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn cancel_code(err: &DomainError) -> StatusCode {
    match err {
        DomainError::RunNotFound { .. } | DomainError::RecipientNotFound { .. } => {
            StatusCode::NOT_FOUND
        }
        DomainError::Validation { .. } | DomainError::RunCancelType { .. } => {
            StatusCode::BAD_REQUEST
        }
        DomainError::RunNotCancelable { .. } => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// ============================================================================
// Handlers
// ============================================================================

async fn health_check() -> &'static str {
    "OK"
}

async fn dispatch(
    State(state): State<Arc<ApiState>>,
    request_headers: HeaderMap,
    Json(inputs): Json<Vec<RunInput>>,
) -> (StatusCode, Json<Vec<RunCreated>>) {
    let service = request_headers
        .get(SERVICE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(DEFAULT_SERVICE)
        .to_string();

    let mut results = Vec::with_capacity(inputs.len());
    for input in inputs {
        let ctx = request_context(&request_headers, &input.org_id, state.request_timeout);
        let outcome = state
            .manager
            .process_run(&ctx, &service, input)
            .instrument(ctx.span())
            .await;

        results.push(match outcome {
            Ok(result) => RunCreated {
                code: StatusCode::CREATED.as_u16(),
                id: Some(result.run_id.to_string()),
                correlation_id: Some(result.correlation_id.to_string()),
                message: None,
            },
            Err(err) => RunCreated {
                code: dispatch_code(&err).as_u16(),
                id: None,
                correlation_id: None,
                message: Some(err.to_string()),
            },
        });
    }

    (StatusCode::MULTI_STATUS, Json(results))
}

async fn cancel(
    State(state): State<Arc<ApiState>>,
    request_headers: HeaderMap,
    Json(inputs): Json<Vec<CancelInput>>,
) -> (StatusCode, Json<Vec<RunCanceled>>) {
    let mut results = Vec::with_capacity(inputs.len());
    for input in inputs {
        let ctx = request_context(&request_headers, &input.org_id, state.request_timeout);
        let run_id = input.run_id.to_string();
        let outcome = state
            .manager
            .process_cancel(&ctx, input)
            .instrument(ctx.span())
            .await;

        results.push(match outcome {
            Ok(_) => RunCanceled {
                code: StatusCode::ACCEPTED.as_u16(),
                run_id: Some(run_id),
                message: None,
            },
            Err(err) => RunCanceled {
                code: cancel_code(&err).as_u16(),
                run_id: Some(run_id),
                message: Some(err.to_string()),
            },
        });
    }

    (StatusCode::MULTI_STATUS, Json(results))
}

async fn connection_status(
    State(state): State<Arc<ApiState>>,
    request_headers: HeaderMap,
    Json(requests): Json<Vec<StatusRequest>>,
) -> (StatusCode, Json<Vec<RecipientStatus>>) {
    let mut results = Vec::with_capacity(requests.len());
    for request in requests {
        let ctx = request_context(&request_headers, &request.org_id, state.request_timeout);
        let outcome = state
            .manager
            .connection_status(&ctx, &request.org_id, &request.recipient)
            .instrument(ctx.span())
            .await;

        let (status, message) = match outcome {
            Ok(status) => (Some(status), None),
            Err(err) => (None, Some(err.to_string())),
        };
        results.push(RecipientStatus {
            org_id: request.org_id,
            recipient: request.recipient.to_string(),
            status,
            message,
        });
    }

    (StatusCode::MULTI_STATUS, Json(results))
}
