use crate::token::CipherKey;

/// Which backend holds token records and quotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Redis,
}

impl StoreBackend {
    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "redis" => Ok(StoreBackend::Redis),
            other => anyhow::bail!("TOKENGATE_STORE must be 'memory' or 'redis', got '{}'", other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug)]
pub struct Config {
    pub port: u16,
    /// Base64 AES-256 key material. Imported lazily by the codec.
    pub cipher_key: String,
    pub store: StoreBackend,
    pub redis_url: String,
    /// Logical identifier of the token store (redis key prefix).
    pub token_table: String,
    /// Logical identifier of the quote store (redis key prefix).
    pub quote_table: String,
    /// Scope names the issuance endpoint accepts.
    pub allowed_scopes: Vec<String>,
    pub log_format: LogFormat,
}

impl Config {
    pub fn is_scope_allowed(&self, scope: &str) -> bool {
        self.allowed_scopes.iter().any(|s| s == scope)
    }

    /// In-memory configuration with the given key, for tests and local runs.
    pub fn for_memory(cipher_key: impl Into<String>) -> Self {
        Self {
            port: 8080,
            cipher_key: cipher_key.into(),
            store: StoreBackend::Memory,
            redis_url: "redis://127.0.0.1:6379".into(),
            token_table: "tokengate-tokens".into(),
            quote_table: "tokengate-quotes".into(),
            allowed_scopes: vec!["image".into(), "quote".into()],
            log_format: LogFormat::Pretty,
        }
    }
}

/// Log format is read on its own so tracing can start before `load()`.
pub fn log_format() -> LogFormat {
    match std::env::var("TOKENGATE_LOG_FORMAT").as_deref() {
        Ok("json") => LogFormat::Json,
        _ => LogFormat::Pretty,
    }
}

/// Reads the process environment; `.env` is applied by the binary beforehand.
pub fn load() -> anyhow::Result<Config> {
    let cipher_key = match std::env::var("TOKENGATE_CIPHER_KEY") {
        Ok(k) if !k.trim().is_empty() => k,
        _ => {
            let env_mode = std::env::var("TOKENGATE_ENV")
                .or_else(|_| std::env::var("RUST_ENV"))
                .unwrap_or_default();
            if env_mode == "production" {
                anyhow::bail!(
                    "TOKENGATE_CIPHER_KEY is not set. \
                     Generate one with `tokengate keygen` before running in production."
                );
            }
            tracing::warn!(
                "TOKENGATE_CIPHER_KEY is not set, using an ephemeral key; issued tokens will not survive a restart"
            );
            CipherKey::generate()?.to_base64()
        }
    };

    Ok(Config {
        port: parse_port(&std::env::var("TOKENGATE_PORT").unwrap_or_else(|_| "8080".into()))?,
        cipher_key,
        store: StoreBackend::parse(
            &std::env::var("TOKENGATE_STORE").unwrap_or_else(|_| "memory".into()),
        )?,
        redis_url: std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into()),
        token_table: std::env::var("TABLE_NAME_TOKENS")
            .unwrap_or_else(|_| "tokengate-tokens".into()),
        quote_table: std::env::var("TABLE_NAME_QUOTES")
            .unwrap_or_else(|_| "tokengate-quotes".into()),
        allowed_scopes: parse_scopes(
            &std::env::var("TOKENGATE_ALLOWED_SCOPES").unwrap_or_else(|_| "image quote".into()),
        ),
        log_format: log_format(),
    })
}

fn parse_port(raw: &str) -> anyhow::Result<u16> {
    raw.trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("TOKENGATE_PORT must be a port number, got '{}'", raw))
}

/// Space- or comma-separated scope list.
fn parse_scopes(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ' ' || c == ',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
