//! Token management: encrypted, tamper-evident bearer tokens.
//!
//! Flow:
//! 1. `TokenIssuer` draws a nonce, stamps an expiration, encodes the payload
//!    with `TokenCodec` and writes a `TokenRecord` to the `TokenStore`.
//! 2. `TokenValidator` pulls the bearer value from `Authorization`, looks the
//!    record up, decrypts, cross-checks the two expirations and enforces the
//!    endpoint's scope.
//!
//! The validated bearer string is handed back to callers as an opaque
//! partition key. It is not an identity.

use thiserror::Error;

pub mod codec;
pub mod issuer;
pub mod key;
pub mod validator;

pub use codec::TokenCodec;
pub use issuer::{TokenIssuer, TokenResponse};
pub use key::{CipherKey, KeyLoader};
pub use validator::TokenValidator;

/// Fixed token lifetime (10 min).
pub const TOKEN_TTL_MS: i64 = 600_000;

/// Field delimiter inside the serialized payload. Never appears in a field.
pub const FIELD_DELIMITER: char = '\t';

/// Decrypted and authenticated token contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPayload {
    pub nonce: String,
    /// Space-delimited scope names, possibly empty.
    pub scope: String,
    /// Absolute expiration, epoch milliseconds.
    pub expiration: i64,
}

impl TokenPayload {
    /// Exact-match membership test against the space-split scope field.
    pub fn has_scope(&self, required: &str) -> bool {
        self.scope.split(' ').any(|s| s == required)
    }
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Missing authorization header")]
    MissingAuth,

    #[error("Authorization header is not a bearer token")]
    NotBearer,

    #[error("Invalid token")]
    NotFound,

    #[error("Token is expired")]
    Expired,

    #[error("Token expiration mismatch")]
    ExpirationMismatch,

    #[error("Invalid token data: {0}")]
    Format(String),

    #[error("Unable to decrypt token")]
    Decrypt,

    #[error("Corrupted token")]
    Integrity,

    #[error("Token does not include \"{required}\" scope ({present})")]
    ScopeMissing { required: String, present: String },

    #[error("cipher key unavailable: {0}")]
    Key(String),

    #[error("token store failure: {0}")]
    Store(#[from] anyhow::Error),
}

impl TokenError {
    /// True for the validation rejections reported to callers as 403.
    /// `Key` and `Store` are server faults.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, TokenError::Key(_) | TokenError::Store(_))
    }

    /// Short stable label, used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            TokenError::MissingAuth => "missing_auth",
            TokenError::NotBearer => "not_bearer",
            TokenError::NotFound => "not_found",
            TokenError::Expired => "expired",
            TokenError::ExpirationMismatch => "expiration_mismatch",
            TokenError::Format(_) => "format",
            TokenError::Decrypt => "decrypt",
            TokenError::Integrity => "integrity",
            TokenError::ScopeMissing { .. } => "scope_missing",
            TokenError::Key(_) => "key",
            TokenError::Store(_) => "store",
        }
    }
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Masked form of a bearer value for log lines. Never log the full token.
pub fn fingerprint(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() > 12 {
        let head: String = chars[..6].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}…{}", head, tail)
    } else {
        "****".to_string()
    }
}
