use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

use super::{TokenRecord, TokenStore};

/// In-process token store. Expired records stay readable until the next
/// `evict_expired()` sweep, mirroring a TTL backend's lazy garbage collection.
#[derive(Clone, Default)]
pub struct MemoryTokenStore {
    records: Arc<DashMap<String, TokenRecord>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every record whose expiration is before `now_ms`.
    /// Returns the number of records removed.
    pub fn evict_expired(&self, now_ms: i64) -> usize {
        let before = self.records.len();
        self.records.retain(|_, record| record.expiration >= now_ms);
        before - self.records.len()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn get(&self, token: &str) -> anyhow::Result<Option<TokenRecord>> {
        Ok(self.records.get(token).map(|entry| entry.value().clone()))
    }

    async fn put(&self, record: TokenRecord) -> anyhow::Result<()> {
        self.records.insert(record.token.clone(), record);
        Ok(())
    }
}
