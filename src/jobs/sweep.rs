//! Background job: evict expired records from the in-memory stores.
//!
//! Redis expires keys on its own; this only runs for the memory backend.

use std::time::Duration;
use tokio::time;

use crate::store::memory::MemoryTokenStore;
use crate::store::quotes::MemoryQuoteStore;
use crate::token::now_millis;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Spawn the sweep task. Call this once at startup.
pub fn spawn(tokens: MemoryTokenStore, quotes: MemoryQuoteStore) {
    tokio::spawn(async move {
        let mut interval = time::interval(SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            sweep(&tokens, &quotes, now_millis());
        }
    });
}

fn sweep(tokens: &MemoryTokenStore, quotes: &MemoryQuoteStore, now_ms: i64) {
    let expired_tokens = tokens.evict_expired(now_ms);
    let expired_quotes = quotes.evict_expired(now_ms);
    if expired_tokens > 0 || expired_quotes > 0 {
        tracing::info!(
            tokens = expired_tokens,
            quotes = expired_quotes,
            "evicted expired records"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::quote::{NewQuote, QUOTE_TTL_MS};
    use crate::store::quotes::QuoteStore;
    use crate::store::{TokenRecord, TokenStore};

    #[tokio::test]
    async fn test_sweep_evicts_both_stores() {
        let tokens = MemoryTokenStore::new();
        let quotes = MemoryQuoteStore::new();
        tokens
            .put(TokenRecord {
                token: "t".into(),
                expiration: 1_000,
            })
            .await
            .unwrap();
        quotes
            .create(
                "t",
                NewQuote {
                    author: "a".into(),
                    quote: "q".into(),
                },
                0,
            )
            .await
            .unwrap();

        sweep(&tokens, &quotes, QUOTE_TTL_MS + 1);
        assert!(tokens.is_empty());
        assert_eq!(quotes.evict_expired(QUOTE_TTL_MS + 1), 0);
    }
}
