//! API error types and response formatting.

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// API error type that converts to appropriate HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Toggle without a valid member token.
    #[error("unauthorized")]
    Unauthorized,

    /// Client exceeded its request budget.
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Internal server error (task join failures, etc.).
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),

    /// SQLite failure inside the applause engine.
    #[error("storage error: {0}")]
    Storage(applause_core::Error),
}

impl From<applause_core::Error> for ApiError {
    fn from(err: applause_core::Error) -> Self {
        match err {
            applause_core::Error::Unauthorized => Self::Unauthorized,
            // Unparseable URLs are answered with zero before they become errors.
            invalid @ applause_core::Error::InvalidUrl(_) => {
                Self::Internal(anyhow::Error::new(invalid))
            }
            other => Self::Storage(other),
        }
    }
}

/// JSON error response body.
#[derive(Debug, Clone, Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message) = match &self {
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                Some("A signed-in member token is required".to_string()),
            ),
            Self::RateLimited { .. } => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limited",
                Some("Too many requests".to_string()),
            ),
            Self::Internal(err) => {
                tracing::error!(error = %err, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    Some("An internal error occurred".to_string()),
                )
            }
            Self::Storage(err) => {
                tracing::error!(error = %err, "storage error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "storage_error",
                    Some("A database error occurred".to_string()),
                )
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            message,
        };

        let mut response = (status, Json(body)).into_response();
        if let Self::RateLimited { retry_after_secs } = self {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn unauthorized_is_401_json() {
        let response = ApiError::Unauthorized.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body["error"], "unauthorized");
    }

    #[tokio::test]
    async fn rate_limited_sets_retry_after() {
        let response = ApiError::RateLimited { retry_after_secs: 17 }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "17");
    }

    #[tokio::test]
    async fn storage_error_hides_details() {
        let core = applause_core::Error::Io(std::io::Error::other("disk full"));
        let response = ApiError::from(core).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"], "storage_error");
        assert_eq!(body["message"], "A database error occurred");
    }

    #[test]
    fn core_errors_map_to_api_errors() {
        assert!(matches!(
            ApiError::from(applause_core::Error::Unauthorized),
            ApiError::Unauthorized
        ));
        assert!(matches!(
            ApiError::from(applause_core::Error::InvalidUrl("x".into())),
            ApiError::Internal(_)
        ));
        assert!(matches!(
            ApiError::from(applause_core::Error::Io(std::io::Error::other("disk"))),
            ApiError::Storage(_)
        ));
    }
}
