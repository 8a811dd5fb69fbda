//! Gateway entry point and runtime stage execution over HTTP.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::Value;
use tracing::{debug, warn};

use pipemesh_core::TraceHeaders;

use crate::response::{ApiResponse, error_response, pipeline_error};
use crate::{GatewayState, RuntimeState};

/// Allow-listed trace headers of an inbound request.
pub fn trace_headers(headers: &HeaderMap) -> TraceHeaders {
    TraceHeaders::collect(|name| {
        headers
            .get(name.to_ascii_lowercase().as_str())
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    })
}

pub async fn health() -> impl IntoResponse {
    ApiResponse::ok("ok")
}

/// Run the pipeline registered as `endpoint` over the request body and
/// answer with the final payload.
pub async fn serve(
    State(state): State<GatewayState>,
    Path(endpoint): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Response {
    let trace = trace_headers(&headers);
    match state.dispatcher.dispatch(&endpoint, payload, trace).await {
        Ok(result) => Json(result).into_response(),
        Err(e) => {
            warn!(%endpoint, error = %e, "pipeline request failed");
            pipeline_error(&e)
        }
    }
}

/// One HTTP-chain hop: execute the configured action on the body.
pub async fn execute_stage(
    State(state): State<RuntimeState>,
    Path(action): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Response {
    let trace = trace_headers(&headers);
    debug!(%action, "executing stage");
    match state.action.execute(&action, payload, &trace).await {
        Ok(result) => Json(result).into_response(),
        Err(message) => error_response(&message, StatusCode::INTERNAL_SERVER_ERROR),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::http::HeaderValue;
    use pipemesh_pipeline::StageAction;
    use serde_json::json;

    #[test]
    fn only_allow_listed_headers_are_kept() {
        let mut headers = HeaderMap::new();
        headers.insert("x-request-id", HeaderValue::from_static("req-1"));
        headers.insert("x-b3-traceid", HeaderValue::from_static("abc"));
        headers.insert("cookie", HeaderValue::from_static("session=1"));

        let trace = trace_headers(&headers);
        assert_eq!(trace.len(), 2);
        assert_eq!(trace.get("X-B3-TraceId"), Some("abc"));
    }

    #[tokio::test]
    async fn stage_applies_configured_action() {
        let state = RuntimeState {
            action: Arc::new(StageAction::Tag {
                field: "served_by".to_string(),
                value: "m1".to_string(),
            }),
        };
        let resp = execute_stage(
            State(state),
            Path("predict".to_string()),
            HeaderMap::new(),
            Json(json!({"x": 1})),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn stage_failure_is_a_server_error() {
        let state = RuntimeState {
            action: Arc::new(StageAction::Tag {
                field: "served_by".to_string(),
                value: "m1".to_string(),
            }),
        };
        let resp = execute_stage(
            State(state),
            Path("predict".to_string()),
            HeaderMap::new(),
            Json(json!(42)),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
