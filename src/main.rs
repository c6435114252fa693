use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tokengate::config::{self, LogFormat};
use tokengate::store::Stores;
use tokengate::token::{now_millis, CipherKey, KeyLoader, TokenCodec};
use tokengate::{api, jobs, AppState};

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing(config::log_format());

    let args = cli::Cli::parse();

    let result = match args.command {
        Some(cli::Commands::Keygen) => {
            println!("{}", CipherKey::generate()?.to_base64());
            Ok(())
        }
        Some(cli::Commands::Serve { port }) => {
            let cfg = config::load()?;
            let port = port.unwrap_or(cfg.port);
            run_server(cfg, port).await
        }
        Some(cli::Commands::Issue { scope }) => {
            let cfg = config::load()?;
            handle_issue_command(cfg, scope).await
        }
        Some(cli::Commands::Inspect { token }) => {
            let cfg = config::load()?;
            handle_inspect_command(&cfg, &token)
        }
        None => {
            let cfg = config::load()?;
            let port = cfg.port;
            run_server(cfg, port).await
        }
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "tokengate=debug,tower_http=info".into()),
    );
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn run_server(cfg: config::Config, port: u16) -> anyhow::Result<()> {
    let stores = Stores::connect(&cfg).await?;
    if let Some((tokens, quotes)) = stores.memory.clone() {
        jobs::sweep::spawn(tokens, quotes);
        tracing::info!("Background sweep job started (memory store expiry every 60s)");
    }

    tracing::info!(
        token_table = %cfg.token_table,
        quote_table = %cfg.quote_table,
        allowed_scopes = ?cfg.allowed_scopes,
        "Initializing token subsystem..."
    );
    let state = Arc::new(AppState::new(cfg, stores.tokens, stores.quotes)?);
    let app = api::router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!("tokengate listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn handle_issue_command(cfg: config::Config, scope: Option<String>) -> anyhow::Result<()> {
    if cfg.store == config::StoreBackend::Memory {
        tracing::warn!("TOKENGATE_STORE=memory: the issued token only exists in this process");
    }
    if let Some(requested) = &scope {
        for s in requested.split(' ') {
            if !s.is_empty() && !cfg.is_scope_allowed(s) {
                anyhow::bail!("Invalid scope \"{}\"", s);
            }
        }
    }

    let stores = Stores::connect(&cfg).await?;
    let state = AppState::new(cfg, stores.tokens, stores.quotes)?;
    let resp = state.issuer.issue(scope.as_deref()).await?;
    println!("{}", serde_json::to_string_pretty(&resp)?);
    Ok(())
}

fn handle_inspect_command(cfg: &config::Config, token: &str) -> anyhow::Result<()> {
    let codec = TokenCodec::new(KeyLoader::new(cfg.cipher_key.clone()));
    let payload = codec.decode(token.trim())?;

    let expires_at = chrono::DateTime::from_timestamp_millis(payload.expiration)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "(out of range)".to_string());
    let remaining_secs = (payload.expiration - now_millis()) / 1000;

    println!("nonce:      {:?}", payload.nonce);
    println!("scope:      {:?}", payload.scope);
    println!("expiration: {} ({})", payload.expiration, expires_at);
    if remaining_secs > 0 {
        println!("remaining:  {}s", remaining_secs);
    } else {
        println!("remaining:  expired");
    }
    Ok(())
}
