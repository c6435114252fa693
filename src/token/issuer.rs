use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{fingerprint, now_millis, TokenCodec, TokenError, TOKEN_TTL_MS};
use crate::store::{TokenRecord, TokenStore};

const NONCE_LEN: usize = 8;
/// Nonce characters are drawn from codepoints `[48, 128)`.
const NONCE_RANGE: std::ops::Range<u8> = 48..128;

/// OAuth2-style issuance response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// Mints tokens and records them in the store.
#[derive(Clone)]
pub struct TokenIssuer {
    codec: Arc<TokenCodec>,
    store: Arc<dyn TokenStore>,
}

impl TokenIssuer {
    pub fn new(codec: Arc<TokenCodec>, store: Arc<dyn TokenStore>) -> Self {
        Self { codec, store }
    }

    pub async fn issue(&self, scope: Option<&str>) -> Result<TokenResponse, TokenError> {
        self.issue_at(scope, now_millis()).await
    }

    /// Issue a token as of `now_ms`. One store write per call.
    pub async fn issue_at(
        &self,
        scope: Option<&str>,
        now_ms: i64,
    ) -> Result<TokenResponse, TokenError> {
        let nonce = generate_nonce();
        let expiration = now_ms + TOKEN_TTL_MS;
        let encoded = self
            .codec
            .encode(&nonce, scope.unwrap_or_default(), expiration)?;

        self.store
            .put(TokenRecord {
                token: encoded.clone(),
                expiration,
            })
            .await?;

        tracing::info!(
            token = %fingerprint(&encoded),
            scope = scope.unwrap_or_default(),
            expiration,
            "issued token"
        );

        Ok(TokenResponse {
            access_token: encoded,
            token_type: "Bearer".to_string(),
            expires_in: TOKEN_TTL_MS / 1000 - 1,
            scope: scope.map(String::from),
        })
    }
}

/// Freshness salt, not a secret.
fn generate_nonce() -> String {
    let mut rng = rand::thread_rng();
    (0..NONCE_LEN)
        .map(|_| char::from(rng.gen_range(NONCE_RANGE)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryTokenStore;
    use crate::token::KeyLoader;

    const KEY: &str = "AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8=";
    const NOW: i64 = 1_700_000_000_000;

    fn issuer() -> (TokenIssuer, Arc<TokenCodec>, MemoryTokenStore) {
        let codec = Arc::new(TokenCodec::new(KeyLoader::new(KEY)));
        let store = MemoryTokenStore::new();
        (
            TokenIssuer::new(codec.clone(), Arc::new(store.clone())),
            codec,
            store,
        )
    }

    #[test]
    fn test_nonce_shape() {
        for _ in 0..200 {
            let nonce = generate_nonce();
            assert_eq!(nonce.chars().count(), NONCE_LEN);
            assert!(nonce.chars().all(|c| (48..128).contains(&(c as u32))));
        }
    }

    #[tokio::test]
    async fn test_issue_response_shape() {
        let (issuer, _, _) = issuer();
        let resp = issuer.issue_at(Some("quote"), NOW).await.unwrap();
        assert_eq!(resp.token_type, "Bearer");
        assert_eq!(resp.expires_in, 599);
        assert_eq!(resp.scope.as_deref(), Some("quote"));

        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["token_type"], "Bearer");
        assert_eq!(json["expires_in"], 599);
    }

    #[tokio::test]
    async fn test_record_matches_sealed_expiration() {
        let (issuer, codec, store) = issuer();
        let resp = issuer.issue_at(Some("image quote"), NOW).await.unwrap();

        let record = store.get(&resp.access_token).await.unwrap().unwrap();
        assert_eq!(record.expiration, NOW + TOKEN_TTL_MS);

        let payload = codec.decode(&resp.access_token).unwrap();
        assert_eq!(payload.expiration, record.expiration);
        assert_eq!(payload.scope, "image quote");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_absent_scope_is_empty_and_omitted() {
        let (issuer, codec, _) = issuer();
        let resp = issuer.issue_at(None, NOW).await.unwrap();
        assert_eq!(codec.decode(&resp.access_token).unwrap().scope, "");

        let json = serde_json::to_value(&resp).unwrap();
        assert!(json.get("scope").is_none());
    }

    #[tokio::test]
    async fn test_consecutive_tokens_differ() {
        let (issuer, _, store) = issuer();
        let a = issuer.issue_at(Some("quote"), NOW).await.unwrap();
        let b = issuer.issue_at(Some("quote"), NOW).await.unwrap();
        assert_ne!(a.access_token, b.access_token);
        assert_eq!(store.len(), 2);
    }
}
