//! tokengate — encrypted short-lived bearer tokens guarding two sample
//! services (quotes CRUD and image rotation).
//!
//! The binary in `main.rs` wires these modules into an axum server; the
//! library crate is what the integration tests in `tests/` drive.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod errors;
pub mod jobs;
pub mod middleware;
pub mod models;
pub mod store;
pub mod token;

use middleware::metrics::PrometheusRecorder;
use store::quotes::QuoteStore;
use store::TokenStore;
use token::{KeyLoader, TokenCodec, TokenIssuer, TokenValidator};

/// Shared application state passed to handlers and middleware.
pub struct AppState {
    pub config: config::Config,
    pub codec: Arc<TokenCodec>,
    pub issuer: TokenIssuer,
    pub validator: TokenValidator,
    pub quotes: Arc<dyn QuoteStore>,
    pub metrics: PrometheusRecorder,
}

impl AppState {
    /// The cipher key is not imported here; the codec does that on first use.
    pub fn new(
        config: config::Config,
        tokens: Arc<dyn TokenStore>,
        quotes: Arc<dyn QuoteStore>,
    ) -> anyhow::Result<Self> {
        let codec = Arc::new(TokenCodec::new(KeyLoader::new(config.cipher_key.clone())));
        Ok(Self {
            issuer: TokenIssuer::new(codec.clone(), tokens.clone()),
            validator: TokenValidator::new(codec.clone(), tokens),
            codec,
            quotes,
            metrics: PrometheusRecorder::new()?,
            config,
        })
    }
}
