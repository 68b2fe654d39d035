//! Mapping from store errors to HTTP responses.

use au_core::AuError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

/// Wrapper turning [`AuError`] into an HTTP response with a JSON body.
#[derive(Debug)]
pub struct ApiError(pub AuError);

impl ApiError {
    /// The status this error maps to.
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            AuError::NotFound { .. } => StatusCode::NOT_FOUND,
            AuError::Invalid { .. } => StatusCode::BAD_REQUEST,
            AuError::Conflict(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<AuError> for ApiError {
    fn from(err: AuError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self.0, "request failed");
        } else {
            tracing::debug!(error = %self.0, status = %status, "request rejected");
        }
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_the_error_kind() {
        assert_eq!(
            ApiError(AuError::NotFound {
                kind: "workspace",
                id: "x".to_string()
            })
            .status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError(AuError::Invalid {
                field: "alias",
                reason: "too short".to_string()
            })
            .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError(AuError::Conflict("locked".to_string())).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError(AuError::Corrupt("bad".to_string())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
