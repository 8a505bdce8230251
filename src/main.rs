//! reflect-proxy
//!
//! A single-upstream HTTP relay built with Tokio and Axum.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────────┐
//!                    │                      RELAY                       │
//!   Client Request   │  ┌─────────┐   ┌───────────┐   ┌─────────────┐   │
//!   ─────────────────┼─▶│  http   │──▶│  request  │──▶│   client    │───┼──▶ Upstream
//!                    │  │ server  │   │ transform │   │ (deadline)  │   │
//!                    │  └─────────┘   └───────────┘   └──────┬──────┘   │
//!                    │                                       │          │
//!   Client Response  │  ┌─────────┐   ┌───────────┐          │          │
//!   ◀────────────────┼──│ channel │◀──│ response  │◀─────────┘          │
//!                    │  │  sink   │   │  relay    │                     │
//!                    │  └─────────┘   └───────────┘                     │
//!                    │                                                  │
//!                    │  config · security (header whitelist) · routing  │
//!                    │  observability · resilience · lifecycle          │
//!                    └──────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use reflect_proxy::config::{self, validation::validate_config, ConfigError, ProxyConfig};
use reflect_proxy::error::BoxError;
use reflect_proxy::http::HttpServer;
use reflect_proxy::lifecycle::{spawn_signal_listener, Shutdown};
use reflect_proxy::observability::init_logging;

#[derive(Parser, Debug)]
#[command(name = "reflect-proxy")]
#[command(about = "Relay HTTP requests to a single fixed upstream", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on, overriding the config file.
    #[arg(short, long)]
    bind: Option<String>,

    /// Upstream base URL, overriding the config file.
    #[arg(short, long)]
    forward_url: Option<String>,

    /// Upstream timeout in seconds, overriding the config file.
    #[arg(short, long)]
    timeout_secs: Option<u64>,
}

impl Cli {
    fn load(&self) -> Result<ProxyConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => config::load_config(path)?,
            None => ProxyConfig::default(),
        };

        if let Some(bind) = &self.bind {
            config.listener.bind_address = bind.clone();
        }
        if let Some(url) = &self.forward_url {
            config.upstream.forward_url = url.clone();
        }
        if let Some(secs) = self.timeout_secs {
            config.upstream.timeout_secs = secs;
        }

        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let cli = Cli::parse();
    let config = cli.load()?;

    init_logging(&config.observability);
    tracing::info!("reflect-proxy v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        forward_url = %config.upstream.forward_url,
        timeout_secs = config.upstream.timeout_secs,
        "Configuration loaded"
    );

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    spawn_signal_listener(shutdown);

    let server = HttpServer::new(config);
    server.run(listener, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
