//! Quote storage, partitioned by the validated bearer token.

use async_trait::async_trait;
use dashmap::DashMap;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::sync::Arc;
use uuid::Uuid;

use super::redis_store::ttl_millis;
use crate::models::quote::{NewQuote, Quote, QuoteUpdate, QUOTE_TTL_MS};

#[async_trait]
pub trait QuoteStore: Send + Sync {
    async fn get(&self, partition: &str, id: Uuid, now_ms: i64) -> anyhow::Result<Option<Quote>>;

    async fn create(&self, partition: &str, quote: NewQuote, now_ms: i64) -> anyhow::Result<Quote>;

    /// Returns `false` when no live quote exists under `id`.
    async fn update(
        &self,
        partition: &str,
        id: Uuid,
        update: QuoteUpdate,
        now_ms: i64,
    ) -> anyhow::Result<bool>;

    /// Idempotent.
    async fn delete(&self, partition: &str, id: Uuid) -> anyhow::Result<()>;
}

fn new_quote(quote: NewQuote, now_ms: i64) -> Quote {
    Quote {
        id: Uuid::new_v4(),
        author: quote.author,
        quote: quote.quote,
        expiration: now_ms + QUOTE_TTL_MS,
    }
}

// ── In-memory ────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct MemoryQuoteStore {
    quotes: Arc<DashMap<(String, Uuid), Quote>>,
}

impl MemoryQuoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn evict_expired(&self, now_ms: i64) -> usize {
        let before = self.quotes.len();
        self.quotes.retain(|_, q| q.expiration >= now_ms);
        before - self.quotes.len()
    }
}

#[async_trait]
impl QuoteStore for MemoryQuoteStore {
    async fn get(&self, partition: &str, id: Uuid, now_ms: i64) -> anyhow::Result<Option<Quote>> {
        Ok(self
            .quotes
            .get(&(partition.to_string(), id))
            .filter(|q| q.expiration >= now_ms)
            .map(|q| q.value().clone()))
    }

    async fn create(&self, partition: &str, quote: NewQuote, now_ms: i64) -> anyhow::Result<Quote> {
        let quote = new_quote(quote, now_ms);
        self.quotes
            .insert((partition.to_string(), quote.id), quote.clone());
        Ok(quote)
    }

    async fn update(
        &self,
        partition: &str,
        id: Uuid,
        update: QuoteUpdate,
        now_ms: i64,
    ) -> anyhow::Result<bool> {
        match self.quotes.get_mut(&(partition.to_string(), id)) {
            Some(mut q) if q.expiration >= now_ms => {
                q.apply(update);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, partition: &str, id: Uuid) -> anyhow::Result<()> {
        self.quotes.remove(&(partition.to_string(), id));
        Ok(())
    }
}

// ── Redis ────────────────────────────────────────────────────

/// JSON quotes under `{table}:{partition}:{id}`, expiring through redis TTL.
#[derive(Clone)]
pub struct RedisQuoteStore {
    redis: ConnectionManager,
    table: String,
}

impl RedisQuoteStore {
    pub fn new(redis: ConnectionManager, table: impl Into<String>) -> Self {
        Self {
            redis,
            table: table.into(),
        }
    }

    fn key(&self, partition: &str, id: Uuid) -> String {
        format!("{}:{}:{}", self.table, partition, id)
    }
}

#[async_trait]
impl QuoteStore for RedisQuoteStore {
    async fn get(&self, partition: &str, id: Uuid, _now_ms: i64) -> anyhow::Result<Option<Quote>> {
        let mut conn = self.redis.clone();
        let raw = conn
            .get::<_, Option<String>>(self.key(partition, id))
            .await?;
        match raw {
            Some(v) => Ok(Some(serde_json::from_str(&v)?)),
            None => Ok(None),
        }
    }

    async fn create(&self, partition: &str, quote: NewQuote, now_ms: i64) -> anyhow::Result<Quote> {
        let quote = new_quote(quote, now_ms);
        let json = serde_json::to_string(&quote)?;
        let mut conn = self.redis.clone();
        redis::cmd("SET")
            .arg(self.key(partition, quote.id))
            .arg(json)
            .arg("PX")
            .arg(ttl_millis(quote.expiration, now_ms))
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(quote)
    }

    async fn update(
        &self,
        partition: &str,
        id: Uuid,
        update: QuoteUpdate,
        now_ms: i64,
    ) -> anyhow::Result<bool> {
        let Some(mut quote) = self.get(partition, id, now_ms).await? else {
            return Ok(false);
        };
        quote.apply(update);
        let json = serde_json::to_string(&quote)?;
        let mut conn = self.redis.clone();
        // XX: only overwrite a key that still exists; KEEPTTL: keep its expiry.
        let written: Option<String> = redis::cmd("SET")
            .arg(self.key(partition, id))
            .arg(json)
            .arg("XX")
            .arg("KEEPTTL")
            .query_async(&mut conn)
            .await?;
        Ok(written.is_some())
    }

    async fn delete(&self, partition: &str, id: Uuid) -> anyhow::Result<()> {
        let mut conn = self.redis.clone();
        conn.del::<_, ()>(self.key(partition, id)).await?;
        Ok(())
    }
}
