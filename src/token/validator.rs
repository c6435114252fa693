use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use std::sync::Arc;

use super::{fingerprint, now_millis, TokenCodec, TokenError, TokenPayload};
use crate::store::TokenStore;

const BEARER_PREFIX: &str = "Bearer ";

/// Validates inbound bearer tokens.
///
/// Steps run in order and the first failure wins:
/// 1. `Authorization: Bearer <token>` present
/// 2. store record exists and has not expired (no decryption yet)
/// 3. token decrypts and its tag verifies
/// 4. sealed expiration equals the record's expiration
/// 5. required scope is in the sealed scope set
/// 6. sealed expiration has not passed
#[derive(Clone)]
pub struct TokenValidator {
    codec: Arc<TokenCodec>,
    store: Arc<dyn TokenStore>,
}

impl TokenValidator {
    pub fn new(codec: Arc<TokenCodec>, store: Arc<dyn TokenStore>) -> Self {
        Self { codec, store }
    }

    /// Validate request headers. On success returns the bearer token itself,
    /// for use as an opaque partition key.
    pub async fn validate(
        &self,
        headers: &HeaderMap,
        required_scope: Option<&str>,
    ) -> Result<String, TokenError> {
        self.validate_at(headers, required_scope, now_millis()).await
    }

    pub async fn validate_at(
        &self,
        headers: &HeaderMap,
        required_scope: Option<&str>,
        now_ms: i64,
    ) -> Result<String, TokenError> {
        let token = extract_bearer(headers)?;
        self.validate_token_at(token, required_scope, now_ms).await
    }

    /// Steps 2–6 for a bearer value that has already been extracted.
    pub async fn validate_token_at(
        &self,
        token: &str,
        required_scope: Option<&str>,
        now_ms: i64,
    ) -> Result<String, TokenError> {
        let record = self.store.get(token).await?.ok_or(TokenError::NotFound)?;
        if now_ms > record.expiration {
            return Err(TokenError::Expired);
        }

        let payload = self.codec.decode(token)?;
        check_payload(&payload, record.expiration, required_scope, now_ms)?;

        tracing::debug!(
            token = %fingerprint(token),
            scope = required_scope.unwrap_or_default(),
            "token validated"
        );
        Ok(token.to_string())
    }
}

/// Pull the bearer value out of `Authorization` (header names are
/// case-insensitive in `HeaderMap`).
pub fn extract_bearer(headers: &HeaderMap) -> Result<&str, TokenError> {
    let value = match headers.get(AUTHORIZATION) {
        Some(v) if !v.is_empty() => v,
        _ => return Err(TokenError::MissingAuth),
    };
    value
        .to_str()
        .ok()
        .and_then(|v| v.strip_prefix(BEARER_PREFIX))
        .ok_or(TokenError::NotBearer)
}

/// Post-decryption checks (steps 4–6).
pub fn check_payload(
    payload: &TokenPayload,
    stored_expiration: i64,
    required_scope: Option<&str>,
    now_ms: i64,
) -> Result<(), TokenError> {
    if payload.expiration != stored_expiration {
        return Err(TokenError::ExpirationMismatch);
    }

    if let Some(required) = required_scope {
        if !payload.has_scope(required) {
            return Err(TokenError::ScopeMissing {
                required: required.to_string(),
                present: payload.scope.split(' ').collect::<Vec<_>>().join(", "),
            });
        }
    }

    if now_ms > payload.expiration {
        return Err(TokenError::Expired);
    }
    Ok(())
}
