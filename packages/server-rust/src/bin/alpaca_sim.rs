//! `alpaca-sim`: serves a simulated ASCOM Alpaca observatory over HTTP.
//!
//! Entry point: argument parsing, tracing setup, configuration loading and
//! the server lifecycle. Ctrl-C triggers a graceful drain.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use alpaca_sim_server::exposure::StarFieldSynthesizer;
use alpaca_sim_server::network::TlsConfig;
use alpaca_sim_server::{ConfigSource, DeviceService, NetworkConfig, NetworkModule, ServerConfig};
use anyhow::Context;
use arc_swap::ArcSwap;
use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

/// Simulated ASCOM Alpaca observatory.
#[derive(Parser, Debug)]
#[command(name = "alpaca-sim", version, about)]
struct Cli {
    /// Bind address
    #[arg(long, default_value = "0.0.0.0", env = "ALPACA_SIM_HOST")]
    host: String,

    /// Listen port (0 picks a free port)
    #[arg(
        short,
        long,
        default_value_t = alpaca_sim_server::network::DEFAULT_PORT,
        env = "ALPACA_SIM_PORT"
    )]
    port: u16,

    /// Device configuration document (YAML). The built-in catalogue is used when omitted.
    #[arg(short, long, env = "ALPACA_SIM_CONFIG")]
    config: Option<PathBuf>,

    /// PEM certificate chain; enables HTTPS together with --tls-key
    #[arg(long, requires = "tls_key", env = "ALPACA_SIM_TLS_CERT")]
    tls_cert: Option<PathBuf>,

    /// PEM private key
    #[arg(long, requires = "tls_cert", env = "ALPACA_SIM_TLS_KEY")]
    tls_key: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, default_value = "pretty", env = "ALPACA_SIM_LOG_FORMAT")]
    log_format: LogFormat,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 30, env = "ALPACA_SIM_REQUEST_TIMEOUT")]
    request_timeout_secs: u64,

    /// Image synthesis timeout in seconds; overrides `gaia_query_timeout`
    #[arg(long, env = "ALPACA_SIM_SYNTHESIS_TIMEOUT")]
    synthesis_timeout_secs: Option<f64>,
}

/// `RUST_LOG` wins; otherwise everything at `info`.
fn setup_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Pretty => registry.with(fmt::layer().with_target(true)).init(),
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
    }
}

fn network_config(cli: &Cli) -> NetworkConfig {
    let tls = match (&cli.tls_cert, &cli.tls_key) {
        (Some(cert_path), Some(key_path)) => Some(TlsConfig {
            cert_path: cert_path.clone(),
            key_path: key_path.clone(),
        }),
        _ => None,
    };
    NetworkConfig {
        host: cli.host.clone(),
        port: cli.port,
        tls,
        request_timeout: Duration::from_secs(cli.request_timeout_secs),
        ..NetworkConfig::default()
    }
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown requested");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_tracing(cli.log_format);

    let source = cli
        .config
        .clone()
        .map_or(ConfigSource::Builtin, ConfigSource::File);
    let catalogue = source
        .load()
        .with_context(|| format!("loading device configuration from {source}"))?;
    info!(%source, devices = catalogue.registry.len(), "device catalogue loaded");

    let synthesis_timeout = match cli.synthesis_timeout_secs {
        Some(secs) => Some(
            Duration::try_from_secs_f64(secs).context("--synthesis-timeout-secs must be positive")?,
        ),
        None => None,
    };
    let server_config = ServerConfig {
        synthesis_timeout,
        ..ServerConfig::default()
    };

    let service = DeviceService::new(
        Arc::new(ArcSwap::from_pointee(catalogue)),
        source,
        Arc::new(StarFieldSynthesizer),
        Arc::new(server_config),
    );

    let mut module = NetworkModule::new(network_config(&cli), service);
    let port = module.start().await?;
    info!(port, "alpaca simulator listening");

    module.serve(shutdown_signal()).await
}
