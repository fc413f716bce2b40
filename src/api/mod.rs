//! API module
//!
//! HTTP endpoints and middleware. A thin binding layer over the engines.

pub mod error;
pub mod extract;
pub mod middleware;
pub mod routes;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use routes::{create_router, sandbox_router, AppState};

use axum::{middleware as axum_middleware, routing::get, Router};
use tower_http::trace::TraceLayer;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let mut api_router = create_router();
    if state.sandbox.is_some() {
        api_router = api_router.merge(sandbox_router());
    }
    let api_router = api_router.layer(axum_middleware::from_fn(middleware::logging_middleware));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_router)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
