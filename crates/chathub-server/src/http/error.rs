//! HTTP error responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chathub_core::{AuthError, StoreError};
use serde_json::json;
use thiserror::Error;

/// Error returned by API handlers, rendered as `{"error": "..."}`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or invalid credentials.
    #[error(transparent)]
    Unauthorized(#[from] AuthError),
    /// The request body was unusable.
    #[error("{0}")]
    BadRequest(String),
    /// The message store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ApiError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) | Self::Store(StoreError::InvalidMessage(_)) => {
                StatusCode::BAD_REQUEST
            }
            Self::Store(StoreError::Unavailable(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn public_message(&self) -> String {
        match self {
            Self::Unauthorized(_) => "Unauthorized".into(),
            Self::Store(StoreError::Unavailable(_)) => "Failed to save message".into(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(json!({ "error": self.public_message() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(resp: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn unauthorized_hides_detail() {
        let resp = ApiError::from(AuthError::InvalidToken("bad sig".into())).into_response();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(resp).await["error"], "Unauthorized");
    }

    #[tokio::test]
    async fn invalid_message_is_bad_request() {
        let resp =
            ApiError::from(StoreError::InvalidMessage("content is empty".into())).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(resp).await["error"],
            "invalid message: content is empty"
        );
    }

    #[tokio::test]
    async fn store_unavailable_is_500() {
        let resp = ApiError::from(StoreError::Unavailable("disk".into())).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(resp).await["error"], "Failed to save message");
    }

    #[test]
    fn bad_request_status() {
        assert_eq!(
            ApiError::BadRequest("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
    }
}
