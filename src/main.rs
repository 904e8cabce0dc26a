use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use turnstile::admission::{AdmissionGate, CounterStore, RedisStore};
use turnstile::completion::OpenAiClient;
use turnstile::config::TurnstileConfig;
use turnstile::http::{router, AppState, ClientResolver, HttpServer};

/// Command line arguments. Flags override the config file.
#[derive(Parser, Debug)]
#[command(name = "turnstile")]
#[command(about = "Admission-gated LLM completion service")]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long, env = "TURNSTILE_CONFIG")]
    config: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// Redis connection URL
    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,

    /// API key for the completion provider
    #[arg(long, env = "OPENAI_KEY", hide_env_values = true)]
    openai_key: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(args: &Args) -> anyhow::Result<TurnstileConfig> {
    let mut config = match &args.config {
        Some(path) => TurnstileConfig::from_file(path)?,
        None => TurnstileConfig::default(),
    };

    if let Some(port) = args.port {
        config.server.listen_addr = SocketAddr::new(config.server.listen_addr.ip(), port);
    }
    if let Some(url) = &args.redis_url {
        config.store.url = url.clone();
    }
    if let Some(key) = &args.openai_key {
        config.completion.api_key = Some(key.clone());
    }

    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    info!("Starting Turnstile");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args)?;
    info!(listen_addr = %config.server.listen_addr, "Configuration loaded");

    let store = RedisStore::connect(&config.store).await?;
    match tokio::time::timeout(config.store.startup_ping_timeout(), store.ping()).await {
        Ok(Ok(())) => info!("Successfully connected to Redis"),
        Ok(Err(e)) => {
            error!(error = %e, "Failed to connect to Redis");
            return Err(e.into());
        }
        Err(_) => {
            error!("Timed out connecting to Redis");
            anyhow::bail!(
                "Redis ping timed out after {:?}",
                config.store.startup_ping_timeout()
            );
        }
    }

    let policy = config.admission_policy();
    info!(
        daily_limit = policy.daily_limit,
        window_limit = policy.window_limit,
        window_secs = policy.window_ttl.as_secs(),
        ban_secs = policy.ban_ttl.as_secs(),
        "Admission gate initialized"
    );

    let state = AppState {
        gate: Arc::new(AdmissionGate::new(Arc::new(store), policy)),
        completions: Arc::new(OpenAiClient::new(&config.completion)?),
        resolver: ClientResolver::new(config.server.trust_forwarded_headers),
    };

    let server = HttpServer::new(config.server.listen_addr, router(state, &config.server));
    server.serve_with_shutdown(shutdown_signal()).await?;

    info!("Turnstile stopped");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
