//! Response envelope shared by every JSON endpoint.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use pipemesh_pipeline::PipelineError;
use pipemesh_registry::RegistryError;

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
pub(crate) struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    pub(crate) fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

pub(crate) fn error_response(msg: &str, status: StatusCode) -> Response {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
        .into_response()
}

pub(crate) fn pipeline_error_status(e: &PipelineError) -> StatusCode {
    match e {
        PipelineError::NotFound(_) => StatusCode::NOT_FOUND,
        PipelineError::InvalidSequence { .. }
        | PipelineError::Serialization(_)
        | PipelineError::Rejected(_) => StatusCode::BAD_REQUEST,
        PipelineError::Upstream { .. } | PipelineError::Transport(_) => StatusCode::BAD_GATEWAY,
        PipelineError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
    }
}

pub(crate) fn pipeline_error(e: &PipelineError) -> Response {
    error_response(&e.to_string(), pipeline_error_status(e))
}

pub(crate) fn registry_error(e: &RegistryError) -> Response {
    let status = match e {
        RegistryError::NotFound(_) => StatusCode::NOT_FOUND,
        RegistryError::Invalid(_) => StatusCode::BAD_REQUEST,
        RegistryError::Driver(_) => StatusCode::BAD_GATEWAY,
        RegistryError::State(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(&e.to_string(), status)
}
