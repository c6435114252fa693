use axum::http::HeaderMap;

use crate::errors::AppError;
use crate::AppState;

/// Validate the request's bearer token for `scope`, record the outcome, and
/// return the token as the caller's partition key.
pub async fn require_scope(
    state: &AppState,
    headers: &HeaderMap,
    scope: &str,
) -> Result<String, AppError> {
    match state.validator.validate(headers, Some(scope)).await {
        Ok(key) => {
            state.metrics.record_validation(scope, Ok(()));
            Ok(key)
        }
        Err(e) => {
            state.metrics.record_validation(scope, Err(&e));
            if e.is_rejection() {
                tracing::warn!(scope, reason = e.kind(), "token rejected: {}", e);
            }
            Err(e.into())
        }
    }
}
