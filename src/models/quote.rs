use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Quote lifetime (15 min). Outlives the token that created it.
pub const QUOTE_TTL_MS: i64 = 900_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub id: Uuid,
    pub author: String,
    pub quote: String,
    /// Epoch milliseconds after which the quote is gone.
    pub expiration: i64,
}

/// Request body for create and update. Both fields optional on the wire;
/// `into_new` / `into_update` apply the per-operation rules.
#[derive(Debug, Default, Deserialize)]
pub struct QuoteInput {
    pub author: Option<String>,
    pub quote: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewQuote {
    pub author: String,
    pub quote: String,
}

/// Fields to overwrite. At least one is `Some`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteUpdate {
    pub author: Option<String>,
    pub quote: Option<String>,
}

impl QuoteInput {
    pub fn into_new(self) -> Result<NewQuote, String> {
        let author = non_empty(self.author).ok_or("author is required")?;
        let quote = non_empty(self.quote).ok_or("quote is required")?;
        Ok(NewQuote { author, quote })
    }

    pub fn into_update(self) -> Result<QuoteUpdate, String> {
        let update = QuoteUpdate {
            author: non_empty(self.author),
            quote: non_empty(self.quote),
        };
        if update.author.is_none() && update.quote.is_none() {
            return Err("Neither author nor quote were specified to update".to_string());
        }
        Ok(update)
    }
}

impl Quote {
    pub fn apply(&mut self, update: QuoteUpdate) {
        if let Some(author) = update.author {
            self.author = author;
        }
        if let Some(quote) = update.quote {
            self.quote = quote;
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(author: Option<&str>, quote: Option<&str>) -> QuoteInput {
        QuoteInput {
            author: author.map(String::from),
            quote: quote.map(String::from),
        }
    }

    #[test]
    fn test_new_quote_requires_both_fields() {
        assert_eq!(
            input(Some("Twain"), Some("Get started.")).into_new().unwrap(),
            NewQuote {
                author: "Twain".into(),
                quote: "Get started.".into()
            }
        );
        assert_eq!(
            input(None, Some("x")).into_new().unwrap_err(),
            "author is required"
        );
        assert_eq!(
            input(Some("Twain"), Some("")).into_new().unwrap_err(),
            "quote is required"
        );
    }

    #[test]
    fn test_update_requires_one_field() {
        let update = input(Some(""), Some("new text")).into_update().unwrap();
        assert_eq!(update.author, None);
        assert_eq!(update.quote.as_deref(), Some("new text"));
        assert!(input(None, Some("")).into_update().is_err());
    }

    #[test]
    fn test_apply_update_keeps_unset_fields() {
        let mut q = Quote {
            id: Uuid::new_v4(),
            author: "Twain".into(),
            quote: "old".into(),
            expiration: 0,
        };
        q.apply(QuoteUpdate {
            author: None,
            quote: Some("new".into()),
        });
        assert_eq!(q.author, "Twain");
        assert_eq!(q.quote, "new");
    }
}
