//! HTTP wire types for the query intake endpoint.
//!
//! The request body deserializes straight into the fields [`crate::query::Query::new`]
//! needs; the response body is the SSE frame carrying one serialized
//! [`crate::envelope::AnswerEvent`] per line, so the types here are
//! intentionally thin.

use serde::{Deserialize, Serialize};

use crate::query::{Constraints, QueryMode};

/// POST /v1/query body.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
    pub text: String,
    #[serde(default)]
    pub mode: QueryMode,
    #[serde(default)]
    pub constraints: Constraints,
    #[serde(default)]
    pub trace_id: Option<String>,
}

/// Error body returned for malformed or rejected requests, named after the
/// OpenAI-compatible `error` envelope convention.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorDetail {
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: String,
}

pub fn create_error_response(message: String, error_type: String) -> ErrorResponse {
    ErrorResponse { error: ErrorDetail { message, error_type } }
}

/// GET /health body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub timestamp: u64,
}

pub fn current_timestamp() -> u64 {
    chrono::Utc::now().timestamp() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_request_applies_defaults_when_fields_are_omitted() {
        let req: QueryRequest = serde_json::from_str(r#"{"text":"what is rag?"}"#).unwrap();
        assert_eq!(req.text, "what is rag?");
        assert_eq!(req.mode, QueryMode::Simple);
        assert!(req.trace_id.is_none());
    }

    #[test]
    fn error_response_serializes_with_type_field() {
        let resp = create_error_response("bad query".to_string(), "invalid_request_error".to_string());
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"type\":\"invalid_request_error\""));
    }
}
