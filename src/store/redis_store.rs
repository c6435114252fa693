use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::{TokenRecord, TokenStore};
use crate::token::now_millis;

/// Redis-backed token store. Each record is a JSON value under
/// `{table}:{token}` written with a millisecond TTL ending at the record's
/// expiration, so Redis performs the garbage collection.
#[derive(Clone)]
pub struct RedisTokenStore {
    redis: ConnectionManager,
    table: String,
}

impl RedisTokenStore {
    pub fn new(redis: ConnectionManager, table: impl Into<String>) -> Self {
        Self {
            redis,
            table: table.into(),
        }
    }

    fn key(&self, token: &str) -> String {
        format!("{}:{}", self.table, token)
    }
}

#[async_trait]
impl TokenStore for RedisTokenStore {
    async fn get(&self, token: &str) -> anyhow::Result<Option<TokenRecord>> {
        let mut conn = self.redis.clone();
        let raw = conn.get::<_, Option<String>>(self.key(token)).await?;
        match raw {
            Some(v) => Ok(Some(serde_json::from_str(&v)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, record: TokenRecord) -> anyhow::Result<()> {
        let ttl_ms = ttl_millis(record.expiration, now_millis());
        let json = serde_json::to_string(&record)?;
        let mut conn = self.redis.clone();
        redis::cmd("SET")
            .arg(self.key(&record.token))
            .arg(json)
            .arg("PX")
            .arg(ttl_ms)
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }
}

/// Milliseconds from `now_ms` until `expiration_ms`, at least 1 (redis
/// rejects a zero or negative PX).
pub(crate) fn ttl_millis(expiration_ms: i64, now_ms: i64) -> u64 {
    (expiration_ms - now_ms).max(1) as u64
}
