//! Weather Cache
//!
//! HTTP front for a rate-limited weather provider, backed by a read-through
//! TTL cache.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          weather-cache                           │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐       │
//! │  │  API server  │───▶│    Cache     │───▶│ OpenWeather  │       │
//! │  │  (/weather)  │    │ (read-thru)  │    │   provider   │       │
//! │  └──────────────┘    └──────┬───────┘    └──────────────┘       │
//! │  ┌──────────────┐           │                                   │
//! │  │Metrics server│◀──────────┘                                   │
//! │  └──────────────┘                                               │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use weather_cache::config::{self, Settings};
use weather_cache::server;
use weather_cache::{CacheConfig, OpenWeatherProvider, WeatherService};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Weather Cache - read-through TTL cache for current weather
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML settings file; flags override its values
    #[arg(long, env = "CONFIG_FILE")]
    config_file: Option<PathBuf>,

    /// API listen port [default: 8080]
    #[arg(long, env = "PORT")]
    port: Option<u16>,

    /// Metrics server bind address [default: 0.0.0.0:9090]
    #[arg(long, env = "METRICS_ADDR")]
    metrics_addr: Option<String>,

    /// OpenWeather API key
    #[arg(long, env = "OPENWEATHER_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// OpenWeather current-weather endpoint
    #[arg(long, env = "OPENWEATHER_URL")]
    api_url: Option<String>,

    /// Entry lifetime, e.g. "30m" [default: 30m]
    #[arg(long, env = "CACHE_TTL")]
    cache_ttl: Option<String>,

    /// Time between eviction sweeps, e.g. "1m" [default: 1m]
    #[arg(long, env = "EVICTION_INTERVAL")]
    eviction_interval: Option<String>,

    /// Bound on one provider attempt, or "none" [default: 10s]
    #[arg(long, env = "FETCH_TIMEOUT")]
    fetch_timeout: Option<String>,

    /// Retries after a transient provider failure [default: 2]
    #[arg(long, env = "FETCH_MAX_RETRIES")]
    max_retries: Option<u32>,

    /// Let every concurrent miss call the provider itself
    #[arg(long)]
    no_coalesce: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args)?;

    let settings = load_settings(&args)?;
    let cache_config = CacheConfig::try_from(&settings.cache)?;

    info!("Starting weather cache");
    info!("  Provider URL: {}", settings.openweather.api_url);
    info!("  Cache TTL: {}", config::format_duration(cache_config.ttl));
    info!(
        "  Eviction interval: {}",
        config::format_duration(cache_config.eviction_interval)
    );
    info!("  Coalesce fetches: {}", cache_config.coalesce_fetches);

    let provider = OpenWeatherProvider::new(settings.openweather.to_provider_config())?;
    let service = Arc::new(WeatherService::new(cache_config, provider)?);
    service.start()?;

    let shutdown = CancellationToken::new();

    let api_listener =
        server::bind(&format!("0.0.0.0:{}", settings.listen_port), "API").await?;
    let metrics_listener = server::bind(&settings.metrics_addr, "metrics").await?;

    let api = supervise(
        "API",
        shutdown.clone(),
        server::run_api_server(api_listener, Arc::clone(&service), shutdown.clone()),
    );
    let metrics = supervise(
        "Metrics",
        shutdown.clone(),
        server::run_metrics_server(metrics_listener, Arc::clone(&service), shutdown.clone()),
    );

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl-C")?;
            info!("Shutdown requested");
        }
        _ = shutdown.cancelled() => {
            error!("A server exited unexpectedly; shutting down");
        }
    }

    shutdown.cancel();
    for handle in [api, metrics] {
        if let Err(e) = handle.await {
            error!("Server task panicked: {}", e);
        }
    }
    service.stop().await;

    info!("Weather cache shutdown complete");
    Ok(())
}

/// Run a server to completion; any exit before shutdown cancels the rest
fn supervise<F>(name: &'static str, shutdown: CancellationToken, server: F) -> JoinHandle<()>
where
    F: std::future::Future<Output = weather_cache::Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = server.await {
            error!("{} server error: {}", name, e);
        }
        shutdown.cancel();
    })
}

// =============================================================================
// Configuration
// =============================================================================

/// File settings (if any) with explicit flags layered on top
fn load_settings(args: &Args) -> anyhow::Result<Settings> {
    let mut settings = match &args.config_file {
        Some(path) => Settings::from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => Settings::default(),
    };

    if let Some(port) = args.port {
        settings.listen_port = port;
    }
    if let Some(addr) = &args.metrics_addr {
        settings.metrics_addr = addr.clone();
    }
    if let Some(key) = &args.api_key {
        settings.openweather.api_key = Some(key.clone());
    }
    if let Some(url) = &args.api_url {
        settings.openweather.api_url = url.clone();
    }
    if let Some(ttl) = &args.cache_ttl {
        settings.cache.ttl = config::parse_duration(ttl).context("invalid --cache-ttl")?;
    }
    if let Some(interval) = &args.eviction_interval {
        settings.cache.eviction_interval =
            config::parse_duration(interval).context("invalid --eviction-interval")?;
    }
    if let Some(timeout) = &args.fetch_timeout {
        settings.cache.fetch_timeout =
            config::parse_optional_duration(timeout).context("invalid --fetch-timeout")?;
    }
    if let Some(retries) = args.max_retries {
        settings.cache.max_retries = retries;
    }
    if args.no_coalesce {
        settings.cache.coalesce_fetches = false;
    }

    Ok(settings)
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) -> anyhow::Result<()> {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive("hyper=warn".parse()?)
        .add_directive("reqwest=info".parse()?);

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
    Ok(())
}
