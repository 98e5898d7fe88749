//! HTTP handlers for the query intake endpoint.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error};

use crate::orchestrator::Orchestrator;
use crate::query::Query;

use super::types::{create_error_response, current_timestamp, ErrorResponse, HealthResponse, QueryRequest};

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
}

/// GET /health
pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        service: "aperture-orchestrator",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: current_timestamp(),
    })
}

/// POST /v1/query — validates the request, hands it to the Orchestrator,
/// and streams the resulting `AnswerEvent` sequence back as SSE frames.
pub async fn submit_query(
    State(state): State<ApiState>,
    Json(request): Json<QueryRequest>,
) -> Result<Response, ErrorResponse> {
    debug!(mode = ?request.mode, "received query");

    let query = Query::new(request.text, request.mode, request.constraints, request.trace_id).map_err(|e| {
        create_error_response(e.to_string(), "invalid_request_error".to_string())
    })?;

    let mut rx = state.orchestrator.clone().handle(query);
    let (tx, body_rx) = tokio::sync::mpsc::channel::<Result<axum::body::Bytes, std::io::Error>>(64);

    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let frame = match serde_json::to_string(&event) {
                Ok(json) => format!("data: {}\n\n", json),
                Err(e) => {
                    error!(error = %e, "failed to serialize answer event");
                    continue;
                }
            };
            if tx.send(Ok(axum::body::Bytes::from(frame))).await.is_err() {
                break;
            }
        }
    });

    let body = Body::wrap_stream(ReceiverStream::new(body_rx));

    Ok(Response::builder()
        .header("Content-Type", "text/event-stream")
        .header("Cache-Control", "no-cache")
        .header("Connection", "keep-alive")
        .body(body)
        .unwrap()
        .into_response())
}

/// Fallback for unknown routes.
pub async fn not_found() -> impl IntoResponse {
    let error = create_error_response("not found".to_string(), "invalid_request_error".to_string());
    (StatusCode::NOT_FOUND, Json(error))
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        let status = match self.error.error_type.as_str() {
            "invalid_request_error" => StatusCode::BAD_REQUEST,
            "internal_error" => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        };
        (status, Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode as HttpStatus;

    #[tokio::test]
    async fn health_check_returns_ok() {
        let response = health_check().await.into_response();
        assert_eq!(response.status(), HttpStatus::OK);
    }
}
