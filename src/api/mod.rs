use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Request, State},
    http::{HeaderValue, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::AppState;

pub mod handlers;
pub mod imaging;

/// Upper bound on request bodies (images are the large ones).
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Build the full application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health endpoints (no auth)
        .route("/healthz", get(|| async { "ok" }))
        .route("/readyz", get(readiness_check))
        .route("/metrics", get(handlers::metrics))
        // Issuance (no auth; scope vocabulary checked here)
        .route("/token", post(handlers::issue_token))
        // Quotes, scope "quote"
        .route("/quote", post(handlers::create_quote))
        .route(
            "/quote/:id",
            get(handlers::get_quote)
                .put(handlers::update_quote)
                .delete(handlers::delete_quote),
        )
        // Image rotation, scope "image"
        .route("/image/:command", post(imaging::rotate_image))
        .fallback(fallback_404)
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(request_id_middleware))
        .layer(middleware::from_fn(security_headers_middleware))
}

async fn fallback_404() -> StatusCode {
    StatusCode::NOT_FOUND
}

/// Ready once the configured cipher key imports cleanly.
async fn readiness_check(State(state): State<Arc<AppState>>) -> Result<&'static str, StatusCode> {
    state.codec.keys().get().map(|_| "ok").map_err(|e| {
        tracing::error!("readiness: {}", e);
        StatusCode::SERVICE_UNAVAILABLE
    })
}

async fn request_id_middleware(req: Request, next: Next) -> Response {
    let req_id = uuid::Uuid::new_v4().to_string();
    let mut resp = next.run(req).await;
    if let Ok(val) = HeaderValue::from_str(&req_id) {
        resp.headers_mut().insert("x-request-id", val);
    }
    resp
}

/// Middleware: hardening headers on every response.
async fn security_headers_middleware(req: Request, next: Next) -> Response {
    let mut resp = next.run(req).await;
    let headers = resp.headers_mut();

    headers.insert("X-Content-Type-Options", HeaderValue::from_static("nosniff"));
    headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));
    // Responses may carry bearer tokens
    headers.insert("Cache-Control", HeaderValue::from_static("no-store"));
    headers.insert("Referrer-Policy", HeaderValue::from_static("no-referrer"));
    headers.remove("Server");

    resp
}
