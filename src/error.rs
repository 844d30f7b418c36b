//! HTTP-facing error type.
//!
//! Domain errors from [`crate::service`] are wrapped in [`AppError`], which
//! renders every failure as `{"error": "..."}` with a matching status code.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::service::TimelineError;

/// Application layer errors - used by HTTP handlers
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Timeline(#[from] TimelineError),

    /// Malformed form fields (cursor, limit, multipart body)
    #[error("{0}")]
    BadRequest(String),
}

/// Error response body for JSON responses
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Timeline(TimelineError::AllFeedsFailed(_)) => StatusCode::BAD_GATEWAY,
            AppError::Timeline(TimelineError::Internal(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Timeline(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = match &self {
            AppError::Timeline(TimelineError::Internal(msg)) => {
                tracing::error!("Internal error: {}", msg);
                "Internal server error".to_string()
            }
            AppError::Timeline(TimelineError::UpstreamFetch { url, source }) => {
                tracing::warn!(url = %url, error = %source, "OPML fetch failed");
                self.to_string()
            }
            other => other.to_string(),
        };

        (status, Json(ErrorResponse { error })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::FetchError;

    #[test]
    fn test_status_codes() {
        let cases = [
            (AppError::from(TimelineError::InputMissing), StatusCode::BAD_REQUEST),
            (AppError::from(TimelineError::NoFeedsFound), StatusCode::BAD_REQUEST),
            (
                AppError::from(TimelineError::Parse("bad".to_string())),
                StatusCode::BAD_REQUEST,
            ),
            (
                AppError::from(TimelineError::UpstreamFetch {
                    url: "https://example.com/subs.opml".to_string(),
                    source: FetchError::HttpStatus(404),
                }),
                StatusCode::BAD_REQUEST,
            ),
            (
                AppError::from(TimelineError::AllFeedsFailed(3)),
                StatusCode::BAD_GATEWAY,
            ),
            (
                AppError::from(TimelineError::Internal("boom".to_string())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                AppError::BadRequest("Invalid limit".to_string()),
                StatusCode::BAD_REQUEST,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(err.status(), expected, "{err}");
        }
    }

    #[tokio::test]
    async fn test_body_carries_message() {
        let response = AppError::from(TimelineError::NoFeedsFound).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "No RSS URLs found in the OPML file");
    }

    #[tokio::test]
    async fn test_internal_message_hidden() {
        let response =
            AppError::from(TimelineError::Internal("secret detail".to_string())).into_response();

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Internal server error");
    }
}
