use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::errors::AppError;
use crate::middleware::auth::require_scope;
use crate::models::quote::{Quote, QuoteInput};
use crate::token::{now_millis, TokenError, TokenResponse};
use crate::AppState;

pub const QUOTE_SCOPE: &str = "quote";

/// POST /token — URL-encoded body with an optional space-delimited `scope`.
pub async fn issue_token(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<TokenResponse>, AppError> {
    let scope = url::form_urlencoded::parse(&body)
        .find(|(k, _)| k == "scope")
        .map(|(_, v)| v.into_owned());

    if let Some(requested) = &scope {
        for s in requested.split(' ') {
            if !s.is_empty() && !state.config.is_scope_allowed(s) {
                tracing::warn!(scope = %s, "issue_token: scope not in allow-list");
                return Err(AppError::BadRequest(format!("Invalid scope \"{}\"", s)));
            }
        }
    }

    let resp = state
        .issuer
        .issue(scope.as_deref())
        .await
        .map_err(|e| match e {
            TokenError::Format(msg) => AppError::BadRequest(msg),
            other => other.into(),
        })?;
    state.metrics.record_issued();
    Ok(Json(resp))
}

/// GET /metrics — Prometheus text exposition.
pub async fn metrics(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    let body = state.metrics.render()?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    ))
}

/// POST /quote
pub async fn create_quote(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let key = require_scope(&state, &headers, QUOTE_SCOPE).await?;
    let new_quote = parse_input(&body)?
        .into_new()
        .map_err(AppError::BadRequest)?;

    let quote = state.quotes.create(&key, new_quote, now_millis()).await?;
    tracing::info!(quote_id = %quote.id, "quote created");
    Ok(Json(json!({ "id": quote.id })))
}

/// GET /quote/:id
pub async fn get_quote(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Quote>, AppError> {
    let key = require_scope(&state, &headers, QUOTE_SCOPE).await?;
    let id = parse_id(&id)?;
    state
        .quotes
        .get(&key, id, now_millis())
        .await?
        .map(Json)
        .ok_or(AppError::NotFound)
}

/// PUT /quote/:id
pub async fn update_quote(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let key = require_scope(&state, &headers, QUOTE_SCOPE).await?;
    let id = parse_id(&id)?;
    let update = parse_input(&body)?
        .into_update()
        .map_err(AppError::BadRequest)?;

    if !state.quotes.update(&key, id, update, now_millis()).await? {
        return Err(AppError::NotFound);
    }
    Ok(Json(json!({ "success": true })))
}

/// DELETE /quote/:id
pub async fn delete_quote(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    let key = require_scope(&state, &headers, QUOTE_SCOPE).await?;
    let id = parse_id(&id)?;
    state.quotes.delete(&key, id).await?;
    Ok(Json(json!({ "success": true })))
}

/// Bodies are parsed after authorization, so a bad token always wins over a
/// bad body.
fn parse_input(body: &[u8]) -> Result<QuoteInput, AppError> {
    serde_json::from_slice(body)
        .map_err(|e| AppError::BadRequest(format!("Invalid quote body: {}", e)))
}

/// An id that is not a UUID cannot name a quote.
fn parse_id(id: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(id).map_err(|_| AppError::NotFound)
}
