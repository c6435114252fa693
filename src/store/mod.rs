pub mod memory;
pub mod quotes;
pub mod redis_store;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::{Config, StoreBackend};
use memory::MemoryTokenStore;
use quotes::{MemoryQuoteStore, QuoteStore, RedisQuoteStore};
use redis_store::RedisTokenStore;

/// Persisted half of an issued token. Keyed by the encoded token string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub token: String,
    /// Epoch milliseconds. Equals the expiration sealed inside `token`.
    pub expiration: i64,
}

/// Narrow key-value capability for token records.
/// Implementations: MemoryTokenStore (DashMap), RedisTokenStore.
///
/// Backends expire records on their own schedule, at or after
/// `record.expiration`; `get` may therefore return a stale record and callers
/// must check the expiration themselves.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn get(&self, token: &str) -> anyhow::Result<Option<TokenRecord>>;

    async fn put(&self, record: TokenRecord) -> anyhow::Result<()>;
}

/// Store handles built from configuration.
pub struct Stores {
    pub tokens: Arc<dyn TokenStore>,
    pub quotes: Arc<dyn QuoteStore>,
    /// Set for the in-memory backend, which needs a periodic sweep.
    pub memory: Option<(MemoryTokenStore, MemoryQuoteStore)>,
}

impl Stores {
    pub fn memory() -> Self {
        let tokens = MemoryTokenStore::new();
        let quotes = MemoryQuoteStore::new();
        Self {
            tokens: Arc::new(tokens.clone()),
            quotes: Arc::new(quotes.clone()),
            memory: Some((tokens, quotes)),
        }
    }

    pub async fn connect(cfg: &Config) -> anyhow::Result<Self> {
        match cfg.store {
            StoreBackend::Memory => {
                tracing::info!("Using in-memory token and quote stores");
                Ok(Self::memory())
            }
            StoreBackend::Redis => {
                tracing::info!("Connecting to Redis...");
                let client = ::redis::Client::open(cfg.redis_url.as_str())?;
                let conn = ::redis::aio::ConnectionManager::new(client)
                    .await
                    .context("failed to connect to redis")?;
                Ok(Self {
                    tokens: Arc::new(RedisTokenStore::new(conn.clone(), cfg.token_table.clone())),
                    quotes: Arc::new(RedisQuoteStore::new(conn, cfg.quote_table.clone())),
                    memory: None,
                })
            }
        }
    }
}
