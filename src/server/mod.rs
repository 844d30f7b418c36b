//! HTTP surface: router, shared state and handlers.

mod form;
mod handlers;

pub use form::{PageLimits, UploadForm, MAX_LIMIT};
pub use handlers::HealthResponse;

use axum::{
    extract::DefaultBodyLimit,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use std::any::Any as PanicPayload;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::error::AppError;
use crate::feed::FeedSource;
use crate::service::{TimelineError, TimelineService};

/// Largest accepted request body (OPML uploads).
const MAX_BODY_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Application state shared across all handlers
pub struct AppState<S> {
    pub timeline: Arc<TimelineService<S>>,
    pub limits: PageLimits,
}

// Manual impl: cloning the state must not require `S: Clone`
impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            timeline: Arc::clone(&self.timeline),
            limits: self.limits,
        }
    }
}

impl<S> AppState<S> {
    pub fn new(timeline: TimelineService<S>, limits: PageLimits) -> Self {
        Self {
            timeline: Arc::new(timeline),
            limits,
        }
    }
}

impl PageLimits {
    pub fn from_config(config: &Config) -> Self {
        let fallback = Self::default();
        Self {
            default: NonZeroUsize::new(config.default_limit).unwrap_or(fallback.default),
            max: NonZeroUsize::new(config.max_limit).unwrap_or(fallback.max),
        }
    }
}

/// Builds the service router.
pub fn router<S>(state: AppState<S>) -> Router
where
    S: FeedSource + 'static,
{
    Router::new()
        .route("/", get(handlers::index))
        .route("/health", get(handlers::health))
        .route("/upload_opml", post(handlers::upload_opml::<S>))
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Turns a panic anywhere in a handler into a JSON 500.
fn panic_response(payload: Box<dyn PanicPayload + Send + 'static>) -> Response {
    let detail = if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else {
        "handler panicked".to_string()
    };
    AppError::from(TimelineError::Internal(detail)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_panic_payload_renders_internal_error() {
        let response = panic_response(Box::new("index out of bounds"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_limits_from_config() {
        let config = Config {
            default_limit: 10,
            max_limit: 50,
            ..Config::default()
        };
        let limits = PageLimits::from_config(&config);
        assert_eq!(limits.default.get(), 10);
        assert_eq!(limits.max.get(), 50);
    }

    #[test]
    fn test_limits_from_zeroed_config_fall_back() {
        let config = Config {
            default_limit: 0,
            max_limit: 0,
            ..Config::default()
        };
        assert_eq!(PageLimits::from_config(&config), PageLimits::default());
    }
}
