use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use arx_sentinel::gateway::{self, AppState, ResultCache};
use arx_sentinel::{ReqwestFetcher, SentinelConfig, SentinelError};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "arx-gateway", version, about = "Ad and tracker filtering gateway")]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, env = "ARX_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind, overrides `[server] host`
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on, overrides `[server] port`
    #[arg(long, env = "ARX_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    if let Err(e) = run(Cli::parse()).await {
        tracing::error!("arx-gateway failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => SentinelConfig::load(path).await?,
        None => SentinelConfig::default(),
    };
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    let rules = Arc::new(config.rule_set().await?);
    let route = config.route()?;
    let script_url = config.script_url()?;
    let fetcher = Arc::new(ReqwestFetcher::new(
        config.gateway.user_agent.clone(),
        config.fetch_timeout(),
    )?);
    let pipeline = gateway::standard_pipeline(
        rules.clone(),
        route.clone(),
        config.gateway.rewrite_mode,
        &script_url,
    );
    tracing::info!(
        block_patterns = rules.block_pattern_count(),
        route = %route.base(),
        script = %script_url,
        mode = ?config.gateway.rewrite_mode,
        "Config loaded"
    );

    let state = AppState::new(rules, route, fetcher)
        .with_pipeline(pipeline)
        .with_cache(ResultCache::new(config.cache_ttl()));
    let app = gateway::build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| SentinelError::Config(format!("listen address: {e}")))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, version = env!("CARGO_PKG_VERSION"), "arx-gateway listening");

    axum::serve(listener, app).await?;
    Ok(())
}
